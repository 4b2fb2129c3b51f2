use std::sync::Arc;
use tracing::{debug, warn};

use crate::engine::{generate_bot_handle, BotStrategy, GameEngine};
use crate::errors::GameError;
use crate::game::{is_bot_handle, Color, GameEndReason, GameId, GameSession};
use crate::matchmaking::Matchmaker;
use crate::protocol::{
    ClientMessage, GameStatePayload, GameType, MoveMadePayload, ServerMessage,
};

use super::connection::Connection;
use super::Hub;

/// Single dispatch point for decoded client frames.
///
/// Every rejected action surfaces as a [`GameError`]; the connection reader
/// turns it into an `error` frame for the originator and nothing else. A
/// dispatch failure never tears down a session.
pub struct MessageHandler {
    engine: Arc<GameEngine>,
    matchmaker: Arc<Matchmaker>,
    hub: Hub,
    bot: Arc<dyn BotStrategy>,
}

impl MessageHandler {
    pub fn new(
        engine: Arc<GameEngine>,
        matchmaker: Arc<Matchmaker>,
        hub: Hub,
        bot: Arc<dyn BotStrategy>,
    ) -> Self {
        Self {
            engine,
            matchmaker,
            hub,
            bot,
        }
    }

    pub async fn handle(
        &self,
        conn: &Arc<Connection>,
        message: ClientMessage,
    ) -> Result<(), GameError> {
        match message {
            ClientMessage::JoinQueue { username } => self.join_queue(conn, &username).await,
            ClientMessage::LeaveQueue => {
                self.leave_queue(conn);
                Ok(())
            }
            ClientMessage::JoinGame {
                username,
                game_type,
            } => match game_type {
                GameType::Pvp => self.join_queue(conn, &username).await,
                GameType::Bot => self.start_bot_game(conn, &username).await,
            },
            ClientMessage::CreateCustomRoom { username } => {
                self.create_custom_room(conn, &username).await
            }
            ClientMessage::JoinCustomRoom {
                username,
                room_code,
            } => self.join_custom_room(conn, &username, &room_code).await,
            ClientMessage::MakeMove { game_id, column } => {
                self.make_move(conn, game_id, column).await
            }
            ClientMessage::Reconnect { game_id, username } => {
                self.reconnect(conn, game_id, &username).await
            }
            ClientMessage::LeaveGame => self.leave_game(conn).await,
            ClientMessage::Ping => {
                conn.send(ServerMessage::Pong);
                Ok(())
            }
        }
    }

    /// Cleanup after a closed socket: dequeue, start the forfeit window, and
    /// tell the room. Runs on every termination path.
    pub async fn handle_disconnect(&self, conn: &Arc<Connection>) {
        let Some(username) = conn.username() else {
            return;
        };
        self.matchmaker.leave(&username);

        let Some(game_id) = self.current_game(conn, &username).await else {
            return;
        };
        match self.engine.mark_disconnected(game_id, &username).await {
            Ok(()) => {
                self.hub.broadcast(
                    game_id,
                    ServerMessage::PlayerLeft {
                        game_id,
                        username: username.clone(),
                        reason: "disconnect".to_string(),
                    },
                    Some(&username),
                );
            }
            // Finished or unknown games need no forfeit window
            Err(GameError::GameNotActive(_)) | Err(GameError::GameNotFound(_)) => {}
            Err(err) => {
                warn!(%game_id, %username, error = %err, "Disconnect bookkeeping failed");
            }
        }
    }

    /// Bind the connection to a username and register it with the hub. The
    /// binding happens once; a frame carrying a different name is answered
    /// with an error frame and ignored.
    fn bind(&self, conn: &Arc<Connection>, username: &str) -> Result<String, GameError> {
        if username.is_empty() {
            return Err(GameError::EmptyHandle);
        }
        match conn.username() {
            Some(existing) if existing == username => Ok(existing),
            Some(existing) => {
                debug!(conn_id = %conn.id, %existing, requested = username, "Rejected connection rename");
                Err(GameError::ConnectionBound { bound: existing })
            }
            None => {
                let _ = conn.claim_username(username);
                self.hub.register(username, conn.id, conn.frame_sender());
                Ok(username.to_string())
            }
        }
    }

    fn attach(&self, conn: &Arc<Connection>, username: &str, game_id: GameId) {
        conn.set_game(game_id);
        self.hub.join_room(username, game_id);
    }

    /// The game this connection is playing. Queue-matched connections are
    /// attached by the notifier on the hub side only, so fall back to the
    /// engine's active-session lookup when the connection has no local
    /// attachment yet.
    async fn current_game(&self, conn: &Arc<Connection>, username: &str) -> Option<GameId> {
        if let Some(game_id) = conn.game() {
            return Some(game_id);
        }
        match self.engine.active_session_for(username).await {
            Ok(session) => session.map(|s| s.id),
            Err(err) => {
                warn!(username, error = %err, "Active-session lookup failed");
                None
            }
        }
    }

    async fn join_queue(&self, conn: &Arc<Connection>, username: &str) -> Result<(), GameError> {
        let username = self.bind(conn, username)?;
        let position = self.matchmaker.join(&username).await?;
        conn.send(ServerMessage::QueueJoined {
            position: position.position,
            estimated_wait: position.remaining_secs,
        });
        Ok(())
    }

    fn leave_queue(&self, conn: &Arc<Connection>) {
        if let Some(username) = conn.username() {
            self.matchmaker.leave(&username);
        }
        // Leaving an empty queue is still answered
        conn.send(ServerMessage::QueueStatus {
            in_queue: false,
            position: 0,
            wait_time: 0,
            time_remaining: 0,
        });
    }

    async fn start_bot_game(
        &self,
        conn: &Arc<Connection>,
        username: &str,
    ) -> Result<(), GameError> {
        let username = self.bind(conn, username)?;
        let bot = generate_bot_handle();
        let session = self.engine.create_session(&username, &bot).await?;
        self.attach(conn, &username, session.id);

        conn.send(ServerMessage::MatchFound {
            game_id: session.id,
            opponent: bot.clone(),
            is_bot: true,
        });
        conn.send(ServerMessage::GameStarted {
            game_id: session.id,
            opponent: bot,
            your_color: Color::Red.as_str().to_string(),
            current_turn: Color::Red.as_str().to_string(),
            is_bot: true,
        });
        Ok(())
    }

    async fn create_custom_room(
        &self,
        conn: &Arc<Connection>,
        username: &str,
    ) -> Result<(), GameError> {
        let username = self.bind(conn, username)?;
        let (session, code) = self.engine.create_custom_room(&username).await?;
        self.attach(conn, &username, session.id);
        conn.send(ServerMessage::RoomCreated {
            game_id: session.id,
            room_code: code,
        });
        Ok(())
    }

    async fn join_custom_room(
        &self,
        conn: &Arc<Connection>,
        username: &str,
        room_code: &str,
    ) -> Result<(), GameError> {
        let username = self.bind(conn, username)?;
        let session = self.engine.join_custom_room(room_code, &username).await?;
        self.attach(conn, &username, session.id);

        // Creator learns who joined, then both sides get their own view
        self.hub.send_to(
            &session.player1,
            ServerMessage::PlayerJoined {
                game_id: session.id,
                username: username.clone(),
                color: Color::Yellow.as_str().to_string(),
            },
        );
        self.hub.send_to(
            &session.player1,
            ServerMessage::GameStarted {
                game_id: session.id,
                opponent: username.clone(),
                your_color: Color::Red.as_str().to_string(),
                current_turn: Color::Red.as_str().to_string(),
                is_bot: false,
            },
        );
        conn.send(ServerMessage::GameStarted {
            game_id: session.id,
            opponent: session.player1.clone(),
            your_color: Color::Yellow.as_str().to_string(),
            current_turn: Color::Red.as_str().to_string(),
            is_bot: false,
        });
        Ok(())
    }

    async fn make_move(
        &self,
        conn: &Arc<Connection>,
        game_id: GameId,
        column: usize,
    ) -> Result<(), GameError> {
        let Some(username) = conn.username() else {
            return Err(GameError::PlayerNotInGame {
                game_id,
                handle: "anonymous".to_string(),
            });
        };

        let outcome = self.engine.apply_move(game_id, &username, column).await?;
        // Queue-matched connections attach lazily on their first move
        if conn.game().is_none() {
            conn.set_game(game_id);
        }
        self.broadcast_move(
            game_id,
            &outcome.record.player,
            &outcome.session,
            outcome.record.column,
            outcome.record.row,
        );

        if outcome.ended() {
            self.broadcast_game_ended(
                &outcome.session,
                if outcome.is_draw() {
                    GameEndReason::Draw
                } else {
                    GameEndReason::ConnectFour
                },
            );
            return Ok(());
        }

        // A bot opponent answers immediately through the same move path
        let next_player = outcome
            .session
            .player_for(outcome.session.current_turn)
            .to_string();
        if is_bot_handle(&next_player) {
            self.play_bot_move(game_id, &next_player, &outcome.session)
                .await;
        }
        Ok(())
    }

    async fn play_bot_move(&self, game_id: GameId, bot_handle: &str, session: &GameSession) {
        let Some(column) = self
            .bot
            .choose_column(&session.board, session.current_turn)
        else {
            return;
        };
        match self.engine.apply_move(game_id, bot_handle, column).await {
            Ok(outcome) => {
                self.broadcast_move(
                    game_id,
                    bot_handle,
                    &outcome.session,
                    outcome.record.column,
                    outcome.record.row,
                );
                if outcome.ended() {
                    self.broadcast_game_ended(
                        &outcome.session,
                        if outcome.is_draw() {
                            GameEndReason::Draw
                        } else {
                            GameEndReason::ConnectFour
                        },
                    );
                }
            }
            Err(err) => {
                warn!(%game_id, bot_handle, error = %err, "Bot move rejected");
            }
        }
    }

    async fn reconnect(
        &self,
        conn: &Arc<Connection>,
        game_id: GameId,
        username: &str,
    ) -> Result<(), GameError> {
        let username = self.bind(conn, username)?;
        let session = self.engine.mark_reconnected(game_id, &username).await?;

        self.attach(conn, &username, game_id);
        conn.send(ServerMessage::GameState(Box::new(game_state_payload(
            &session,
        ))));
        Ok(())
    }

    async fn leave_game(&self, conn: &Arc<Connection>) -> Result<(), GameError> {
        let Some(username) = conn.username() else {
            // Nothing to leave; clients may retry freely
            return Ok(());
        };
        let Some(game_id) = self.current_game(conn, &username).await else {
            return Ok(());
        };

        let Some(session) = self.engine.get_session(&game_id).await? else {
            // Leave is idempotent even for vanished games
            self.hub.leave_room(&username);
            conn.clear_game();
            return Ok(());
        };

        if session.status.is_active() {
            let winner = session.color_of(&username).map(Color::opponent);
            let completed = self
                .engine
                .complete_game(game_id, winner, GameEndReason::Forfeit)
                .await?;
            self.broadcast_game_ended(&completed, GameEndReason::Forfeit);
        }

        self.hub.broadcast(
            game_id,
            ServerMessage::PlayerLeft {
                game_id,
                username: username.clone(),
                reason: "left".to_string(),
            },
            Some(&username),
        );
        self.hub.leave_room(&username);
        conn.clear_game();
        Ok(())
    }

    fn broadcast_move(
        &self,
        game_id: GameId,
        player: &str,
        session: &GameSession,
        column: usize,
        row: usize,
    ) {
        self.hub.broadcast(
            game_id,
            ServerMessage::MoveMade(Box::new(MoveMadePayload {
                game_id,
                player: player.to_string(),
                column,
                row,
                board: session.board.to_rows(),
                next_turn: session.current_turn.as_str().to_string(),
                move_count: session.move_count,
            })),
            None,
        );
    }

    fn broadcast_game_ended(&self, session: &GameSession, reason: GameEndReason) {
        self.hub.broadcast(
            session.id,
            game_ended_message(session, reason),
            None,
        );
    }
}

/// Build the `game_ended` frame for a finished session.
pub fn game_ended_message(session: &GameSession, reason: GameEndReason) -> ServerMessage {
    ServerMessage::GameEnded {
        game_id: session.id,
        winner: session
            .winner
            .map(|color| session.player_for(color).to_string()),
        reason,
        duration: session.duration_secs(),
    }
}

/// Full state replay payload for `game_state` frames.
pub fn game_state_payload(session: &GameSession) -> GameStatePayload {
    GameStatePayload {
        game_id: session.id,
        player1: session.player1.clone(),
        player2: session.player2.clone(),
        board: session.board.to_rows(),
        current_turn: session.current_turn.as_str().to_string(),
        status: session.status.as_str().to_string(),
        winner: session
            .winner
            .map(|color| session.player_for(color).to_string()),
        move_count: session.move_count,
        start_time: session.started_at,
    }
}
