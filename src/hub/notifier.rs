use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::engine::CompletionNotice;
use crate::game::{is_bot_handle, Color, GameSession};
use crate::matchmaking::MatchOutcome;
use crate::protocol::ServerMessage;

use super::dispatch::game_ended_message;
use super::Hub;

/// Forward matchmaking outcomes to the players involved: `match_found`,
/// then a personalized `game_started`, then room attachment.
pub async fn run_match_notifier(
    hub: Hub,
    mut outcomes: mpsc::UnboundedReceiver<MatchOutcome>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                info!("Match notifier shutting down");
                break;
            }
            outcome = outcomes.recv() => {
                let Some(outcome) = outcome else { break };
                let is_bot = matches!(outcome, MatchOutcome::BotFallback { .. });
                announce_session(&hub, outcome.session(), is_bot);
            }
        }
    }
}

fn announce_session(hub: &Hub, session: &GameSession, is_bot: bool) {
    for (handle, color) in [
        (session.player1.as_str(), Color::Red),
        (session.player2.as_str(), Color::Yellow),
    ] {
        if is_bot_handle(handle) {
            continue;
        }
        hub.send_to(
            handle,
            ServerMessage::MatchFound {
                game_id: session.id,
                opponent: session.opponent_of(handle).unwrap_or_default().to_string(),
                is_bot,
            },
        );
        hub.send_to(
            handle,
            ServerMessage::GameStarted {
                game_id: session.id,
                opponent: session.opponent_of(handle).unwrap_or_default().to_string(),
                your_color: color.as_str().to_string(),
                current_turn: session.current_turn.as_str().to_string(),
                is_bot,
            },
        );
        hub.join_room(handle, session.id);
    }
    debug!(game_id = %session.id, is_bot, "Announced new session to players");
}

/// Broadcast `game_ended` for games the cleanup worker finished on its own
/// (disconnect forfeits and idle abandonments).
pub async fn run_completion_notifier(
    hub: Hub,
    mut completions: mpsc::UnboundedReceiver<CompletionNotice>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                info!("Completion notifier shutting down");
                break;
            }
            notice = completions.recv() => {
                let Some(notice) = notice else { break };
                debug!(
                    game_id = %notice.session.id,
                    reason = ?notice.reason,
                    "Announcing cleanup-driven completion"
                );
                hub.broadcast(
                    notice.session.id,
                    game_ended_message(&notice.session, notice.reason),
                    None,
                );
            }
        }
    }
}
