use futures::future::try_join_all;
use rand::{Rng, rng};
use tracing::{debug, info, warn};
use validator::Validate;

use crate::{
    dto::game::{CreateGameRequest, GameSummary, QuestionInput},
    error::ServiceError,
    state::{
        SharedState,
        game::{OPTION_COUNT, Question},
        hosted::HostedHandle,
        room::{ConnectionId, Outbox},
    },
};

/// Length of a generated access code.
pub const ACCESS_CODE_LENGTH: usize = 6;
/// Uppercase letters and digits without the look-alikes `0 O 1 I`.
const ACCESS_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const ACCESS_CODE_ATTEMPTS: usize = 16;

/// Open a hosted game from an explicit question set or from generated questions.
pub async fn create_game(
    state: &SharedState,
    request: CreateGameRequest,
) -> Result<GameSummary, ServiceError> {
    request
        .validate()
        .map_err(|err| ServiceError::InvalidInput(format!("validation failed: {err}")))?;

    let config = state.config();
    let questions = match request {
        CreateGameRequest {
            questions: Some(inputs),
            ..
        } => inputs
            .into_iter()
            .map(build_question)
            .collect::<Result<Vec<_>, _>>()?,
        CreateGameRequest {
            topic: Some(topic),
            question_count: Some(count),
            ..
        } => {
            ensure_question_limit(count, config.hosted.max_questions)?;
            let source = state.question_source();
            let generated =
                try_join_all((0..count).map(|_| source.next_question(topic))).await?;
            generated.into_iter().map(|(question, _)| question).collect()
        }
        _ => {
            return Err(ServiceError::InvalidInput(
                "provide either questions or a topic and a question count".into(),
            ));
        }
    };
    ensure_question_limit(questions.len(), config.hosted.max_questions)?;

    let total = questions.len();
    let code = unused_access_code(state)?;
    let handle = HostedHandle::spawn(
        state.hosted().clone(),
        code.clone(),
        questions,
        &config.hosted,
    )?;
    info!(code = %code, questions = total, "hosted game created");

    handle.summary().await
}

/// Public view of the game behind `code`.
pub async fn game_summary(state: &SharedState, code: &str) -> Result<GameSummary, ServiceError> {
    find_game(state, code)?.summary().await
}

/// Look a game up by a user-typed access code.
pub fn find_game(state: &SharedState, code: &str) -> Result<HostedHandle, ServiceError> {
    state.hosted().find(&normalize_access_code(code))
}

pub async fn join_as_host(
    state: &SharedState,
    connection: ConnectionId,
    outbox: Outbox,
    code: &str,
) -> Result<(), ServiceError> {
    ensure_free_for(state, connection, code)?;
    find_game(state, code)?.attach_host(connection, outbox).await
}

pub async fn join_as_player(
    state: &SharedState,
    connection: ConnectionId,
    outbox: Outbox,
    code: &str,
    nickname: String,
) -> Result<(), ServiceError> {
    ensure_free_for(state, connection, code)?;
    find_game(state, code)?
        .join(connection, outbox, nickname)
        .await
}

pub async fn rejoin_as_player(
    state: &SharedState,
    connection: ConnectionId,
    outbox: Outbox,
    code: &str,
    nickname: String,
) -> Result<(), ServiceError> {
    ensure_free_for(state, connection, code)?;
    find_game(state, code)?
        .rejoin(connection, outbox, nickname)
        .await
}

pub async fn start_game(
    state: &SharedState,
    connection: ConnectionId,
    code: &str,
) -> Result<(), ServiceError> {
    find_game(state, code)?.start(connection).await
}

pub async fn show_scoreboard(
    state: &SharedState,
    connection: ConnectionId,
    code: &str,
) -> Result<(), ServiceError> {
    find_game(state, code)?.show_scoreboard(connection).await
}

pub async fn advance(
    state: &SharedState,
    connection: ConnectionId,
    code: &str,
) -> Result<(), ServiceError> {
    find_game(state, code)?.advance(connection).await
}

pub async fn submit_answer(
    state: &SharedState,
    connection: ConnectionId,
    code: &str,
    option_index: usize,
    remaining_time: f64,
) -> Result<(), ServiceError> {
    find_game(state, code)?
        .submit_answer(connection, option_index, remaining_time)
        .await
}

pub async fn cancel_game(
    state: &SharedState,
    connection: ConnectionId,
    code: &str,
) -> Result<(), ServiceError> {
    find_game(state, code)?.cancel(connection).await
}

/// Forward a dropped transport to the game the connection belongs to, if any.
pub async fn disconnect(state: &SharedState, connection: ConnectionId) {
    let Some(code) = state.hosted().member_session(&connection) else {
        return;
    };
    let result = match state.hosted().find(&code) {
        Ok(handle) => handle.disconnect(connection).await,
        Err(err) => Err(err),
    };
    match result {
        Ok(()) | Err(ServiceError::Closed) | Err(ServiceError::NotFound(_)) => {
            debug!(code = %code, connection = %connection, "hosted connection released");
        }
        Err(err) => warn!(code = %code, error = %err, "hosted disconnect failed"),
    }
    state.hosted().unbind_member_from(&connection, &code);
}

/// Upper-case and trim a user-typed access code.
pub fn normalize_access_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// A connection takes part in at most one hosted game.
fn ensure_free_for(
    state: &SharedState,
    connection: ConnectionId,
    code: &str,
) -> Result<(), ServiceError> {
    match state.hosted().member_session(&connection) {
        Some(current) if current != normalize_access_code(code) => Err(
            ServiceError::InvalidState(format!("connection already belongs to game `{current}`")),
        ),
        _ => Ok(()),
    }
}

fn ensure_question_limit(count: usize, max: usize) -> Result<(), ServiceError> {
    if count > max {
        return Err(ServiceError::InvalidInput(format!(
            "a game holds at most {max} questions (got {count})"
        )));
    }
    Ok(())
}

fn build_question(input: QuestionInput) -> Result<Question, ServiceError> {
    let QuestionInput {
        text,
        options,
        correct_option_index,
    } = input;
    let options: [String; OPTION_COUNT] = options.try_into().map_err(|options: Vec<String>| {
        ServiceError::InvalidInput(format!(
            "a question needs exactly {OPTION_COUNT} options (got {})",
            options.len()
        ))
    })?;
    Question::new(text, options, correct_option_index)
}

fn generate_access_code() -> String {
    let mut rng = rng();
    (0..ACCESS_CODE_LENGTH)
        .map(|_| char::from(ACCESS_CODE_ALPHABET[rng.random_range(0..ACCESS_CODE_ALPHABET.len())]))
        .collect()
}

fn unused_access_code(state: &SharedState) -> Result<String, ServiceError> {
    (0..ACCESS_CODE_ATTEMPTS)
        .map(|_| generate_access_code())
        .find(|code| !state.hosted().contains(code))
        .ok_or_else(|| ServiceError::InvalidState("no free access code available".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_codes_use_the_unambiguous_alphabet() {
        for _ in 0..64 {
            let code = generate_access_code();
            assert_eq!(code.len(), ACCESS_CODE_LENGTH);
            assert!(code.bytes().all(|byte| ACCESS_CODE_ALPHABET.contains(&byte)));
        }
    }

    #[test]
    fn access_codes_are_normalized() {
        assert_eq!(normalize_access_code("  abc23k \n"), "ABC23K");
    }

    #[test]
    fn explicit_questions_need_four_options() {
        let input = QuestionInput {
            text: "Who wrote Fidelio?".into(),
            options: vec!["Beethoven".into(), "Mozart".into()],
            correct_option_index: 0,
        };
        assert!(matches!(
            build_question(input),
            Err(ServiceError::InvalidInput(_))
        ));
    }
}
