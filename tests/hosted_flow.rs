mod common;

use std::time::Duration;

use common::{Client, catalog_state};
use encore_back::{
    catalog::Topic,
    dto::{
        game::{CreateGameRequest, QuestionInput},
        ws::{ClientMessage, ServerMessage},
    },
    error::ServiceError,
    services::hosted_service,
    state::{SharedState, game::GameStatus, state_machine::HostedPhase},
};

fn question(text: &str, options: [&str; 4], correct: usize) -> QuestionInput {
    QuestionInput {
        text: text.into(),
        options: options.iter().map(|option| option.to_string()).collect(),
        correct_option_index: correct,
    }
}

async fn create_game(state: &SharedState) -> String {
    let request = CreateGameRequest {
        questions: Some(vec![
            question(
                "Who composed The Four Seasons?",
                ["Vivaldi", "Corelli", "Albinoni", "Scarlatti"],
                0,
            ),
            question(
                "Who composed the Goldberg Variations?",
                ["Handel", "Bach", "Rameau", "Couperin"],
                1,
            ),
        ]),
        topic: None,
        question_count: None,
    };
    hosted_service::create_game(state, request)
        .await
        .unwrap()
        .access_code
}

fn join(code: &str, nickname: &str) -> ClientMessage {
    ClientMessage::JoinAsPlayer {
        access_code: code.into(),
        nickname: nickname.into(),
    }
}

fn submit(code: &str, option_index: usize, remaining_time: f64) -> ClientMessage {
    ClientMessage::SubmitAnswer {
        access_code: code.into(),
        option_index,
        remaining_time,
    }
}

fn is_new_question(event: &ServerMessage) -> bool {
    matches!(event, ServerMessage::NewQuestion(_))
}

fn is_round_result(event: &ServerMessage) -> bool {
    matches!(event, ServerMessage::RoundResult { .. })
}

fn ranking_of(event: &ServerMessage) -> Vec<(String, u32)> {
    let ranking = match event {
        ServerMessage::RoundResult { ranking, .. } | ServerMessage::Scoreboard { ranking } => {
            ranking
        }
        ServerMessage::GameOver { final_ranking } => final_ranking,
        other => panic!("no ranking in {other:?}"),
    };
    ranking
        .iter()
        .map(|player| (player.nickname.clone(), player.score))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn full_game_scores_and_ranks_players() {
    let state = catalog_state();
    let code = create_game(&state).await;

    let mut host = Client::new();
    let mut ana = Client::new();
    let mut bea = Client::new();

    host.send(&state, ClientMessage::JoinAsHost { access_code: code.clone() })
        .await
        .unwrap();
    assert!(matches!(host.next().await, ServerMessage::GameSnapshot(_)));

    // Codes are matched case-insensitively.
    ana.send(&state, join(&code.to_lowercase(), "Ana")).await.unwrap();
    bea.send(&state, join(&code, "Bea")).await.unwrap();

    let ServerMessage::PlayerRosterUpdate { players } = host
        .until(|event| {
            matches!(event, ServerMessage::PlayerRosterUpdate { players } if players.len() == 2)
        })
        .await
    else {
        unreachable!()
    };
    assert_eq!(players[0].nickname, "Ana");
    assert_eq!(players[1].nickname, "Bea");

    host.send(&state, ClientMessage::StartGame { access_code: code.clone() })
        .await
        .unwrap();
    assert_eq!(
        ana.until(|event| matches!(event, ServerMessage::GameStarted { .. })).await,
        ServerMessage::GameStarted { total_questions: 2 }
    );
    assert_eq!(
        ana.next().await,
        ServerMessage::Countdown {
            next_index: 0,
            seconds: 3
        }
    );

    let ServerMessage::NewQuestion(view) = ana.until(is_new_question).await else {
        unreachable!()
    };
    assert_eq!(view.index, 0);
    assert_eq!(view.duration_seconds, 20);
    assert_eq!(view.total_questions, 2);
    bea.until(is_new_question).await;

    ana.send(&state, submit(&code, 0, 15.0)).await.unwrap();
    bea.send(&state, submit(&code, 1, 18.0)).await.unwrap();
    // A second submission is silently ignored.
    ana.send(&state, submit(&code, 1, 19.0)).await.unwrap();

    assert_eq!(
        host.until(|event| matches!(event, ServerMessage::LiveAnswerCount { count: 2, .. }))
            .await,
        ServerMessage::LiveAnswerCount {
            count: 2,
            total_connected: 2
        }
    );

    let result = host.until(is_round_result).await;
    let ServerMessage::RoundResult {
        correct_option_index,
        answer_histogram,
        ..
    } = &result
    else {
        unreachable!()
    };
    assert_eq!(*correct_option_index, 0);
    assert_eq!(answer_histogram, &vec![1, 1, 0, 0]);
    assert_eq!(
        ranking_of(&result),
        vec![("Ana".to_string(), 750), ("Bea".to_string(), 0)]
    );

    host.send(&state, ClientMessage::ShowScoreboard { access_code: code.clone() })
        .await
        .unwrap();
    let scoreboard = ana
        .until(|event| matches!(event, ServerMessage::Scoreboard { .. }))
        .await;
    assert_eq!(ranking_of(&scoreboard)[0], ("Ana".to_string(), 750));

    host.send(
        &state,
        ClientMessage::AdvanceToNextQuestion { access_code: code.clone() },
    )
    .await
    .unwrap();
    let ServerMessage::NewQuestion(view) = bea.until(is_new_question).await else {
        unreachable!()
    };
    assert_eq!(view.index, 1);

    bea.send(&state, submit(&code, 1, 20.0)).await.unwrap();
    let result = host.until(is_round_result).await;
    assert_eq!(
        ranking_of(&result),
        vec![("Bea".to_string(), 1000), ("Ana".to_string(), 750)]
    );

    host.send(
        &state,
        ClientMessage::AdvanceToNextQuestion { access_code: code.clone() },
    )
    .await
    .unwrap();
    let over = ana
        .until(|event| matches!(event, ServerMessage::GameOver { .. }))
        .await;
    assert_eq!(
        ranking_of(&over),
        vec![("Bea".to_string(), 1000), ("Ana".to_string(), 750)]
    );

    let summary = hosted_service::game_summary(&state, &code).await.unwrap();
    assert_eq!(summary.status, GameStatus::Finished);
    assert_eq!(summary.phase, HostedPhase::GameOver);

    host.send(&state, ClientMessage::CancelGame { access_code: code.clone() })
        .await
        .unwrap();
    assert!(matches!(
        hosted_service::game_summary(&state, &code).await,
        Err(ServiceError::NotFound(_))
    ));
    assert!(
        !ana.pending()
            .iter()
            .any(|event| matches!(event, ServerMessage::GameCanceled { .. }))
    );
}

#[tokio::test(start_paused = true)]
async fn disconnected_player_rejoins_with_score_and_one_answer() {
    let state = catalog_state();
    let code = create_game(&state).await;

    let mut host = Client::new();
    let mut ana = Client::new();
    let mut bea = Client::new();
    host.send(&state, ClientMessage::JoinAsHost { access_code: code.clone() })
        .await
        .unwrap();
    ana.send(&state, join(&code, "Ana")).await.unwrap();
    bea.send(&state, join(&code, "Bea")).await.unwrap();
    host.send(&state, ClientMessage::StartGame { access_code: code.clone() })
        .await
        .unwrap();

    bea.until(is_new_question).await;
    bea.send(&state, submit(&code, 0, 10.0)).await.unwrap();
    host.until(is_round_result).await;
    host.send(
        &state,
        ClientMessage::AdvanceToNextQuestion { access_code: code.clone() },
    )
    .await
    .unwrap();
    bea.until(|event| matches!(event, ServerMessage::NewQuestion(view) if view.index == 1))
        .await;

    bea.disconnect(&state).await;
    let ServerMessage::PlayerRosterUpdate { players } = host
        .until(|event| matches!(event, ServerMessage::PlayerRosterUpdate { .. }))
        .await
    else {
        unreachable!()
    };
    let bea_entry = players
        .iter()
        .find(|player| player.nickname == "Bea")
        .unwrap();
    assert!(!bea_entry.connected);
    assert_eq!(bea_entry.score, 500);

    // Reconnect under a fresh connection, typing the nickname differently.
    let mut bea_again = Client::new();
    bea_again
        .send(
            &state,
            ClientMessage::RejoinAsPlayer {
                access_code: code.clone(),
                nickname: " bea ".into(),
            },
        )
        .await
        .unwrap();
    let ServerMessage::GameSnapshot(snapshot) = bea_again.next().await else {
        panic!("rejoin must start with a snapshot");
    };
    assert_eq!(snapshot.phase, HostedPhase::QuestionOpen);
    assert_eq!(snapshot.question_index, Some(1));
    assert_eq!(snapshot.your_score, Some(500));
    assert!(!snapshot.already_answered);
    assert_eq!(snapshot.current_question.map(|view| view.index), Some(1));
    assert!(snapshot.remaining_time.is_some());

    bea_again.send(&state, submit(&code, 1, 10.0)).await.unwrap();
    bea_again.send(&state, submit(&code, 1, 10.0)).await.unwrap();

    let result = host.until(is_round_result).await;
    assert_eq!(
        ranking_of(&result),
        vec![("Bea".to_string(), 1000), ("Ana".to_string(), 0)]
    );
}

#[tokio::test(start_paused = true)]
async fn no_ticks_after_the_round_closes() {
    let state = catalog_state();
    let code = create_game(&state).await;

    let mut host = Client::new();
    let ana = Client::new();
    host.send(&state, ClientMessage::JoinAsHost { access_code: code.clone() })
        .await
        .unwrap();
    ana.send(&state, join(&code, "Ana")).await.unwrap();
    host.send(&state, ClientMessage::StartGame { access_code: code.clone() })
        .await
        .unwrap();

    host.until(is_round_result).await;
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(host.pending().is_empty());
}

#[tokio::test(start_paused = true)]
async fn protocol_violations_are_reported_to_the_sender_only() {
    let state = catalog_state();
    let code = create_game(&state).await;

    let host = Client::new();
    let ana = Client::new();
    let mallory = Client::new();
    host.send(&state, ClientMessage::JoinAsHost { access_code: code.clone() })
        .await
        .unwrap();

    // Starting without players is refused.
    assert!(matches!(
        host.send(&state, ClientMessage::StartGame { access_code: code.clone() })
            .await,
        Err(ServiceError::InvalidState(_))
    ));

    ana.send(&state, join(&code, "Ana")).await.unwrap();
    assert!(matches!(
        ana.send(&state, submit(&code, 0, 10.0)).await,
        Err(ServiceError::InvalidState(_))
    ));
    assert!(matches!(
        mallory.send(&state, join(&code, "ANA")).await,
        Err(ServiceError::InvalidInput(_))
    ));
    assert!(matches!(
        mallory
            .send(&state, ClientMessage::StartGame { access_code: code.clone() })
            .await,
        Err(ServiceError::Unauthorized(_))
    ));
    assert!(matches!(
        ana.send(&state, ClientMessage::CancelGame { access_code: code.clone() })
            .await,
        Err(ServiceError::Unauthorized(_))
    ));
    assert!(matches!(
        mallory.send(&state, join("ZZZZZZ", "Mal")).await,
        Err(ServiceError::NotFound(_))
    ));
    assert!(matches!(
        mallory.send(&state, ClientMessage::Unknown).await,
        Err(ServiceError::InvalidInput(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn host_disconnect_cancels_and_disposes_the_game() {
    let state = catalog_state();
    let code = create_game(&state).await;

    let host = Client::new();
    let mut ana = Client::new();
    host.send(&state, ClientMessage::JoinAsHost { access_code: code.clone() })
        .await
        .unwrap();
    ana.send(&state, join(&code, "Ana")).await.unwrap();

    host.disconnect(&state).await;
    let canceled = ana
        .until(|event| matches!(event, ServerMessage::GameCanceled { .. }))
        .await;
    assert!(matches!(canceled, ServerMessage::GameCanceled { .. }));
    assert!(state.hosted().is_empty());
    assert!(matches!(
        ana.send(&state, submit(&code, 0, 1.0)).await,
        Err(ServiceError::NotFound(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn topic_games_fall_back_to_catalog_questions() {
    let state = catalog_state();
    let summary = hosted_service::create_game(
        &state,
        CreateGameRequest {
            questions: None,
            topic: Some(Topic::Baroque),
            question_count: Some(3),
        },
    )
    .await
    .unwrap();

    assert_eq!(summary.total_questions, 3);
    assert_eq!(summary.status, GameStatus::Lobby);
    assert_eq!(summary.access_code.len(), hosted_service::ACCESS_CODE_LENGTH);

    let too_many = hosted_service::create_game(
        &state,
        CreateGameRequest {
            questions: None,
            topic: Some(Topic::Baroque),
            question_count: Some(500),
        },
    )
    .await;
    assert!(matches!(too_many, Err(ServiceError::InvalidInput(_))));
}

#[tokio::test(start_paused = true)]
async fn a_connection_hosts_at_most_one_game() {
    let state = catalog_state();
    let first = create_game(&state).await;
    let second = create_game(&state).await;

    let host = Client::new();
    host.send(&state, ClientMessage::JoinAsHost { access_code: first.clone() })
        .await
        .unwrap();
    assert!(matches!(
        host.send(&state, ClientMessage::JoinAsHost { access_code: second.clone() })
            .await,
        Err(ServiceError::InvalidState(_))
    ));
    // Re-attaching to its own game is accepted.
    host.send(
        &state,
        ClientMessage::JoinAsHost {
            access_code: first.to_lowercase(),
        },
    )
    .await
    .unwrap();

    host.disconnect(&state).await;
    assert!(!state.hosted().contains(&first));
    assert!(state.hosted().contains(&second));
}

#[tokio::test(start_paused = true)]
async fn games_without_a_host_expire() {
    let state = catalog_state();
    let abandoned = create_game(&state).await;
    let hosted = create_game(&state).await;

    let host = Client::new();
    host.send(&state, ClientMessage::JoinAsHost { access_code: hosted.clone() })
        .await
        .unwrap();
    let mut ana = Client::new();
    ana.send(&state, join(&abandoned, "Ana")).await.unwrap();

    let wait = state.config().hosted.host_wait().unwrap();
    tokio::time::sleep(wait + Duration::from_secs(1)).await;

    assert_eq!(
        ana.until(|event| matches!(event, ServerMessage::GameCanceled { .. }))
            .await,
        ServerMessage::GameCanceled {
            reason: "no host joined the game".into()
        }
    );
    assert!(!state.hosted().contains(&abandoned));
    assert!(state.hosted().contains(&hosted));

    // The expired game no longer holds the player.
    ana.send(&state, join(&hosted, "Ana")).await.unwrap();
}
