use tracing::{debug, info, warn};

use crate::{
    catalog::Topic,
    dto::ws::ServerMessage,
    error::ServiceError,
    state::{
        SharedState,
        battle::BattleHandle,
        game::PlayerProfile,
        matchmaking::{Enqueued, QueueEntry},
        room::{ConnectionId, Outbox, send_direct},
    },
};

/// Queue `connection` for a battle and pair it as soon as an opponent is waiting.
pub async fn find_opponent(
    state: &SharedState,
    connection: ConnectionId,
    outbox: Outbox,
    profile: PlayerProfile,
    topic: Topic,
) -> Result<(), ServiceError> {
    let profile = checked_profile(profile)?;
    if let Some(battle) = state.battles().member_session(&connection) {
        return Err(ServiceError::InvalidState(format!(
            "connection is already playing battle `{battle}`"
        )));
    }

    let mut queue = state.matchmaking().lock().await;
    let user_id = profile.user_id.clone();
    match queue.enqueue(QueueEntry {
        connection,
        profile,
        topic,
        outbox: outbox.clone(),
    }) {
        Enqueued::AlreadyQueued => {
            debug!(user = %user_id, "already waiting for an opponent");
            Ok(())
        }
        Enqueued::Waiting => {
            info!(user = %user_id, topic = %topic, queued = queue.len(), "waiting for an opponent");
            send_direct(&outbox, ServerMessage::WaitingForOpponent { topic });
            Ok(())
        }
        Enqueued::Paired(first, second) => {
            // Both connections must be bound to the battle before a disconnect can take the lock.
            let handle = BattleHandle::spawn(state.battle_context(), first, second)?;
            drop(queue);
            debug!(battle = %handle.id(), "battle spawned");
            Ok(())
        }
    }
}

pub async fn answer(
    state: &SharedState,
    connection: ConnectionId,
    session_id: &str,
    answer: String,
) -> Result<(), ServiceError> {
    state
        .battles()
        .find(session_id)?
        .answer(connection, answer)
        .await
}

pub async fn request_early_end(
    state: &SharedState,
    connection: ConnectionId,
    session_id: &str,
) -> Result<(), ServiceError> {
    state
        .battles()
        .find(session_id)?
        .request_end(connection)
        .await
}

pub async fn accept_early_end(
    state: &SharedState,
    connection: ConnectionId,
    session_id: &str,
) -> Result<(), ServiceError> {
    state
        .battles()
        .find(session_id)?
        .accept_end(connection)
        .await
}

pub async fn decline_early_end(
    state: &SharedState,
    connection: ConnectionId,
    session_id: &str,
) -> Result<(), ServiceError> {
    state
        .battles()
        .find(session_id)?
        .decline_end(connection)
        .await
}

/// Drop `connection` from the waiting line and forfeit its running battle, if any.
pub async fn disconnect(state: &SharedState, connection: ConnectionId) {
    if state
        .matchmaking()
        .lock()
        .await
        .remove_connection(&connection)
    {
        debug!(connection = %connection, "left the matchmaking queue");
    }

    let Some(battle) = state.battles().unbind_member(&connection) else {
        return;
    };
    let result = match state.battles().find(&battle) {
        Ok(handle) => handle.disconnect(connection).await,
        Err(err) => Err(err),
    };
    match result {
        Ok(()) | Err(ServiceError::Closed) | Err(ServiceError::NotFound(_)) => {}
        Err(err) => warn!(battle = %battle, error = %err, "battle disconnect failed"),
    }
}

fn checked_profile(profile: PlayerProfile) -> Result<PlayerProfile, ServiceError> {
    let user_id = profile.user_id.trim().to_string();
    let name = profile.name.trim().to_string();
    if user_id.is_empty() {
        return Err(ServiceError::InvalidInput("profile user id is required".into()));
    }
    if name.is_empty() {
        return Err(ServiceError::InvalidInput("profile name is required".into()));
    }
    Ok(PlayerProfile { user_id, name })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_are_trimmed_and_required() {
        let profile = checked_profile(PlayerProfile {
            user_id: " u-1 ".into(),
            name: " Ana ".into(),
        })
        .unwrap();
        assert_eq!(profile.user_id, "u-1");
        assert_eq!(profile.name, "Ana");

        assert!(
            checked_profile(PlayerProfile {
                user_id: "  ".into(),
                name: "Ana".into(),
            })
            .is_err()
        );
    }
}
