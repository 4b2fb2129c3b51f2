use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::game::GameId;

/// Kinds of session-scoped events published to the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    GameStarted,
    MoveMade,
    GameCompleted,
    PlayerJoined,
    PlayerLeft,
    PlayerReconnected,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GameStarted => "GameStarted",
            Self::MoveMade => "MoveMade",
            Self::GameCompleted => "GameCompleted",
            Self::PlayerJoined => "PlayerJoined",
            Self::PlayerLeft => "PlayerLeft",
            Self::PlayerReconnected => "PlayerReconnected",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A session-scoped analytics event.
///
/// Published keyed by game id so all events of one session land in a single
/// partition and keep their order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameEvent {
    pub id: Uuid,
    pub event_type: EventKind,
    pub game_id: GameId,
    pub player_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl GameEvent {
    pub fn new(event_type: EventKind, game_id: GameId, player_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            game_id,
            player_id: player_id.into(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Partition key: the session id as UTF-8.
    pub fn partition_key(&self) -> String {
        self.game_id.to_string()
    }
}
