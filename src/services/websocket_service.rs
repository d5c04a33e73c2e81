use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{ClientMessage, ServerMessage},
    error::ServiceError,
    services::{battle_service, hosted_service},
    state::{
        SharedState,
        room::{ConnectionId, Outbox, send_direct},
    },
};

/// How long queued events may still be flushed once the client is gone.
const WRITER_DRAIN: Duration = Duration::from_secs(1);

/// Handle the full lifecycle of one client WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let connection: ConnectionId = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();
    let (outbox, mut events) = mpsc::unbounded_channel::<ServerMessage>();
    let (control_tx, mut control) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps session events flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                Some(frame) = control.recv() => frame,
                Some(event) = events.recv() => match serde_json::to_string(&event) {
                    Ok(payload) => Message::Text(payload.into()),
                    Err(err) => {
                        warn!(error = %err, "failed to serialize event `{event:?}`");
                        continue;
                    }
                },
                else => break,
            };
            let closing = matches!(frame, Message::Close(_));
            if sender.send(frame).await.is_err() || closing {
                break;
            }
        }
    });

    info!(connection = %connection, "client connected");

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                debug!(connection = %connection, payload = %text, "received client message");
                match ClientMessage::from_json_str(&text) {
                    Ok(intent) => {
                        if let Err(err) = dispatch(&state, connection, &outbox, intent).await {
                            debug!(connection = %connection, error = %err, "intent rejected");
                            send_direct(&outbox, ServerMessage::error(err));
                        }
                    }
                    Err(err) => {
                        warn!(connection = %connection, error = %err, "failed to parse client message");
                        send_direct(
                            &outbox,
                            ServerMessage::error(format!("malformed message: {err}")),
                        );
                    }
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = control_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(connection = %connection, "client closed");
                let _ = control_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {
                send_direct(&outbox, ServerMessage::error("binary frames are not supported"));
            }
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(connection = %connection, error = %err, "websocket error");
                break;
            }
        }
    }

    release(&state, connection).await;
    info!(connection = %connection, "client disconnected");

    finalize(writer_task, outbox, control_tx).await;
}

/// Route one parsed intent to the owning service.
pub async fn dispatch(
    state: &SharedState,
    connection: ConnectionId,
    outbox: &Outbox,
    intent: ClientMessage,
) -> Result<(), ServiceError> {
    match intent {
        ClientMessage::JoinAsHost { access_code } => {
            hosted_service::join_as_host(state, connection, outbox.clone(), &access_code).await
        }
        ClientMessage::JoinAsPlayer {
            access_code,
            nickname,
        } => {
            hosted_service::join_as_player(
                state,
                connection,
                outbox.clone(),
                &access_code,
                nickname,
            )
            .await
        }
        ClientMessage::RejoinAsPlayer {
            access_code,
            nickname,
        } => {
            hosted_service::rejoin_as_player(
                state,
                connection,
                outbox.clone(),
                &access_code,
                nickname,
            )
            .await
        }
        ClientMessage::StartGame { access_code } => {
            hosted_service::start_game(state, connection, &access_code).await
        }
        ClientMessage::ShowScoreboard { access_code } => {
            hosted_service::show_scoreboard(state, connection, &access_code).await
        }
        ClientMessage::AdvanceToNextQuestion { access_code } => {
            hosted_service::advance(state, connection, &access_code).await
        }
        ClientMessage::SubmitAnswer {
            access_code,
            option_index,
            remaining_time,
        } => {
            hosted_service::submit_answer(
                state,
                connection,
                &access_code,
                option_index,
                remaining_time,
            )
            .await
        }
        ClientMessage::CancelGame { access_code } => {
            hosted_service::cancel_game(state, connection, &access_code).await
        }
        ClientMessage::FindOpponent { profile, topic } => {
            battle_service::find_opponent(state, connection, outbox.clone(), profile, topic).await
        }
        ClientMessage::BattleAnswer { session_id, answer } => {
            battle_service::answer(state, connection, &session_id, answer).await
        }
        ClientMessage::RequestEarlyEnd { session_id } => {
            battle_service::request_early_end(state, connection, &session_id).await
        }
        ClientMessage::AcceptEarlyEnd { session_id } => {
            battle_service::accept_early_end(state, connection, &session_id).await
        }
        ClientMessage::DeclineEarlyEnd { session_id } => {
            battle_service::decline_early_end(state, connection, &session_id).await
        }
        ClientMessage::Unknown => Err(ServiceError::InvalidInput(
            "unknown message type".into(),
        )),
    }
}

/// Run every disconnect path of a connection; each one is a no-op when not applicable.
pub async fn release(state: &SharedState, connection: ConnectionId) {
    hosted_service::disconnect(state, connection).await;
    battle_service::disconnect(state, connection).await;
}

/// Ensure the writer task winds down before we return from the socket handler.
///
/// Session actors may still hold clones of the outbox, so the writer is aborted once
/// the drain window elapses.
async fn finalize(
    mut writer_task: JoinHandle<()>,
    outbox: Outbox,
    control: mpsc::UnboundedSender<Message>,
) {
    drop(outbox);
    drop(control);
    match tokio::time::timeout(WRITER_DRAIN, &mut writer_task).await {
        Ok(Err(err)) => debug!(error = %err, "websocket writer task ended abnormally"),
        Ok(Ok(())) => {}
        Err(_) => writer_task.abort(),
    }
}
