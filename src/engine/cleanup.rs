use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::game::{GameEndReason, GameStatus};

use super::GameEngine;

impl GameEngine {
    /// Cleanup worker: one loop ticking every `cleanup_interval` that
    /// forfeits expired disconnections, abandons idle sessions, trims the
    /// cache, and drops tracker entries for finished games. In-flight work
    /// finishes before shutdown because cancellation is only observed
    /// between sweeps.
    pub async fn run_cleanup(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.cleanup_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("Cleanup worker shutting down");
                    break;
                }
                _ = interval.tick() => {
                    self.sweep_once().await;
                }
            }
        }
    }

    /// One cleanup pass. Public so tests can drive it without the timer.
    pub async fn sweep_once(&self) {
        self.forfeit_expired_disconnections().await;
        self.abandon_idle_sessions().await;

        let trimmed = self.cache.trim_older_than(self.config.cache_max_age).await;
        if trimmed > 0 {
            debug!(trimmed, "Trimmed stale session cache entries");
        }

        self.drop_stale_tracker_entries().await;
    }

    /// (a) Forfeit games whose disconnected participant ran out the window.
    async fn forfeit_expired_disconnections(&self) {
        let expired = self
            .disconnects
            .expired(self.config.disconnect_timeout)
            .await;

        for (game_id, handle) in expired {
            // Clearing first makes each expiry processed at most once, even
            // if a reconnect races this sweep
            if !self.disconnects.clear(&game_id, &handle).await {
                continue;
            }
            if let Err(err) = self.handle_disconnection_timeout(game_id, &handle).await {
                warn!(%game_id, handle, error = %err, "Disconnect forfeit failed");
            }
        }
    }

    /// Award the game to the opponent of the player who never came back.
    async fn handle_disconnection_timeout(
        &self,
        game_id: crate::game::GameId,
        handle: &str,
    ) -> Result<(), crate::errors::GameError> {
        let Some(session) = self.get_session(&game_id).await? else {
            return Ok(());
        };
        if !session.status.is_active() {
            return Ok(());
        }
        let Some(color) = session.color_of(handle) else {
            return Ok(());
        };

        let winner = color.opponent();
        let completed = self
            .complete_game(game_id, Some(winner), GameEndReason::Disconnect)
            .await?;
        self.metrics.increment_disconnect_forfeits();
        info!(
            %game_id,
            disconnected = handle,
            winner = %winner,
            "Forfeited game after disconnect timeout"
        );
        self.notify_completion(completed, GameEndReason::Disconnect);
        Ok(())
    }

    /// (b) Abandon active sessions idle past `session_timeout`.
    async fn abandon_idle_sessions(&self) {
        let timeout = match chrono::Duration::from_std(self.config.session_timeout) {
            Ok(timeout) => timeout,
            Err(_) => return,
        };

        for game_id in self.cache.cached_ids().await {
            let Some(guard) = self.cache.get(&game_id).await else {
                continue;
            };
            let mut session = guard.lock().await;
            if session.status.is_terminal() {
                continue;
            }
            if Utc::now() - session.last_activity < timeout {
                continue;
            }

            session.status = GameStatus::Abandoned;
            session.ended_at = Some(Utc::now());
            let snapshot = session.clone();
            drop(session);

            if let Err(err) = self.store.update_session(&snapshot).await {
                warn!(%game_id, error = %err, "Failed to persist abandoned session");
            }
            self.metrics.increment_games_abandoned();
            self.cache.invalidate(&game_id).await;
            self.disconnects.remove_game(&game_id).await;
            info!(%game_id, "Abandoned idle session");
            self.notify_completion(snapshot, GameEndReason::Timeout);
        }
    }

    /// (d) Drop disconnect-tracker entries for games no longer active.
    /// Snapshot the tracked ids, resolve their status outside the tracker
    /// lock, then apply the removals in one pass.
    async fn drop_stale_tracker_entries(&self) {
        let tracked = self.disconnects.tracked_games().await;
        let mut finished = std::collections::HashSet::new();
        for game_id in tracked {
            match self.get_session(&game_id).await {
                Ok(Some(session)) if session.status.is_active() => {}
                Ok(_) => {
                    finished.insert(game_id);
                }
                // Leave the entry alone on a read failure; the next sweep
                // retries
                Err(_) => {}
            }
        }
        if !finished.is_empty() {
            self.disconnects
                .retain_games(|game_id| !finished.contains(game_id))
                .await;
        }
    }
}
