use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

/// Typed transport error hierarchy.
///
/// Retryability is a property of the variant, not of the message text, so
/// the producer never has to pattern-match error strings.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("connection refused: {0}")]
    ConnectionRefused(String),
    #[error("connection reset: {0}")]
    ConnectionReset(String),
    #[error("i/o timeout: {0}")]
    IoTimeout(String),
    #[error("broker unavailable: {0}")]
    BrokerUnavailable(String),
    #[error("partition leader unavailable: {0}")]
    LeaderUnavailable(String),
    #[error("request timed out: {0}")]
    RequestTimedOut(String),
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error("payload could not be serialized: {0}")]
    Serialization(String),
    #[error("unknown consumer group `{0}`")]
    UnknownGroup(String),
}

impl TransportError {
    /// Transient network-level failures are worth retrying; cancellation and
    /// malformed payloads are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionRefused(_)
                | Self::ConnectionReset(_)
                | Self::IoTimeout(_)
                | Self::BrokerUnavailable(_)
                | Self::LeaderUnavailable(_)
                | Self::RequestTimedOut(_)
                | Self::NetworkUnreachable(_)
        )
    }
}

/// A record as handed to the transport: key, JSON payload, string headers.
#[derive(Debug, Clone)]
pub struct Record {
    pub key: String,
    pub payload: Vec<u8>,
    pub headers: Vec<(String, String)>,
}

/// A record as read back by a consumer, with its log coordinates.
#[derive(Debug, Clone)]
pub struct FetchedRecord {
    pub partition: usize,
    pub offset: u64,
    pub record: Record,
}

/// Keyed, partitioned, offset-addressed event log.
///
/// All records sharing a key land in one partition, which is what gives
/// per-session ordering downstream. Offsets are committed manually.
#[async_trait]
pub trait EventTransport: Send + Sync {
    /// Append a record to the partition owning its key. Synchronous
    /// single-ack write: returning `Ok` means the log has it.
    async fn publish(&self, record: Record) -> Result<(), TransportError>;

    /// Register a consumer group. A new group starts from the earliest
    /// offset of every partition; a known group resumes from its commits.
    async fn subscribe(&self, group: &str) -> Result<(), TransportError>;

    /// Fetch up to `max_records` across partitions, advancing the group's
    /// delivery position. Does not move committed offsets.
    async fn fetch(&self, group: &str, max_records: usize)
        -> Result<Vec<FetchedRecord>, TransportError>;

    /// Mark everything up to and including `offset` in `partition` as
    /// processed for `group`.
    async fn commit(&self, group: &str, partition: usize, offset: u64)
        -> Result<(), TransportError>;

    /// Rewind the group's delivery position to its committed offsets, so
    /// uncommitted records are redelivered.
    async fn seek_to_committed(&self, group: &str) -> Result<(), TransportError>;

    /// Control-connection liveness probe.
    async fn health_check(&self) -> Result<(), TransportError>;
}

#[derive(Debug, Clone, Copy, Default)]
struct GroupCursor {
    /// Next offset to deliver.
    delivered: u64,
    /// First unprocessed offset.
    committed: u64,
}

/// In-process implementation of [`EventTransport`] backed by per-partition
/// vectors. Serves tests and single-instance deployments; a networked broker
/// implementation slots in behind the same trait.
pub struct InMemoryBroker {
    partitions: Vec<RwLock<Vec<Record>>>,
    /// group -> per-partition cursors. Coarse mutex; cursor updates are
    /// cheap and never overlap record appends.
    cursors: Mutex<HashMap<String, Vec<GroupCursor>>>,
}

impl InMemoryBroker {
    pub fn new(partition_count: usize) -> Self {
        let partitions = (0..partition_count.max(1))
            .map(|_| RwLock::new(Vec::new()))
            .collect();
        Self {
            partitions,
            cursors: Mutex::new(HashMap::new()),
        }
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    pub fn partition_for(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.partitions.len()
    }

    /// Total records across all partitions (test helper).
    pub async fn record_count(&self) -> usize {
        let mut total = 0;
        for partition in &self.partitions {
            total += partition.read().await.len();
        }
        total
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new(8)
    }
}

#[async_trait]
impl EventTransport for InMemoryBroker {
    async fn publish(&self, record: Record) -> Result<(), TransportError> {
        let partition = self.partition_for(&record.key);
        self.partitions[partition].write().await.push(record);
        Ok(())
    }

    async fn subscribe(&self, group: &str) -> Result<(), TransportError> {
        let mut cursors = self.cursors.lock().await;
        cursors
            .entry(group.to_string())
            .or_insert_with(|| vec![GroupCursor::default(); self.partitions.len()]);
        Ok(())
    }

    async fn fetch(
        &self,
        group: &str,
        max_records: usize,
    ) -> Result<Vec<FetchedRecord>, TransportError> {
        let mut cursors = self.cursors.lock().await;
        let group_cursors = cursors
            .get_mut(group)
            .ok_or_else(|| TransportError::UnknownGroup(group.to_string()))?;

        let mut fetched = Vec::new();
        for (partition, cursor) in group_cursors.iter_mut().enumerate() {
            if fetched.len() >= max_records {
                break;
            }
            let log = self.partitions[partition].read().await;
            while (cursor.delivered as usize) < log.len() && fetched.len() < max_records {
                let offset = cursor.delivered;
                fetched.push(FetchedRecord {
                    partition,
                    offset,
                    record: log[offset as usize].clone(),
                });
                cursor.delivered += 1;
            }
        }
        Ok(fetched)
    }

    async fn commit(
        &self,
        group: &str,
        partition: usize,
        offset: u64,
    ) -> Result<(), TransportError> {
        let mut cursors = self.cursors.lock().await;
        let group_cursors = cursors
            .get_mut(group)
            .ok_or_else(|| TransportError::UnknownGroup(group.to_string()))?;
        if let Some(cursor) = group_cursors.get_mut(partition) {
            cursor.committed = cursor.committed.max(offset + 1);
        }
        Ok(())
    }

    async fn seek_to_committed(&self, group: &str) -> Result<(), TransportError> {
        let mut cursors = self.cursors.lock().await;
        let group_cursors = cursors
            .get_mut(group)
            .ok_or_else(|| TransportError::UnknownGroup(group.to_string()))?;
        for cursor in group_cursors.iter_mut() {
            cursor.delivered = cursor.committed;
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), TransportError> {
        Ok(())
    }
}
