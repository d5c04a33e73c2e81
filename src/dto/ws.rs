//! WebSocket wire messages of both game modes.
//!
//! Hosted games and battles share one socket and one `type` namespace, so battle
//! messages carry a `battle-` prefix (`battle-answer`, `battle-question`,
//! `battle-round-result`) where the hosted names (`submit-answer`, `new-question`,
//! `round-result`) would otherwise collide.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    catalog::Topic,
    state::{
        game::{GameStatus, Participant, Player, PlayerProfile, Question},
        state_machine::HostedPhase,
    },
};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, ToSchema)]
/// Intents accepted from WebSocket clients.
#[serde(
    tag = "type",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    /// Bind this connection as the host of a hosted game.
    JoinAsHost { access_code: String },
    /// Enter a hosted game lobby.
    JoinAsPlayer {
        access_code: String,
        nickname: String,
    },
    /// Resume a disconnected player of a hosted game.
    RejoinAsPlayer {
        access_code: String,
        nickname: String,
    },
    /// Host: leave the lobby.
    StartGame { access_code: String },
    /// Host: reveal the ranking after a round.
    ShowScoreboard { access_code: String },
    /// Host: open the next question or finish the game.
    AdvanceToNextQuestion { access_code: String },
    /// Player: answer the open question.
    SubmitAnswer {
        access_code: String,
        option_index: usize,
        remaining_time: f64,
    },
    /// Host: abort the game.
    CancelGame { access_code: String },
    /// Enter the battle matchmaking queue.
    FindOpponent { profile: PlayerProfile, topic: Topic },
    /// Answer the current battle question with an option text.
    BattleAnswer { session_id: String, answer: String },
    /// Ask the opponent to stop the match now.
    RequestEarlyEnd { session_id: String },
    /// Agree to the opponent's early-end request.
    AcceptEarlyEnd { session_id: String },
    /// Refuse the opponent's early-end request and keep playing.
    DeclineEarlyEnd { session_id: String },
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    /// Parse an inbound text frame.
    pub fn from_json_str(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
/// Events pushed to WebSocket clients.
#[serde(
    tag = "type",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    /// Full view of a hosted game for the receiving connection.
    GameSnapshot(GameSnapshot),
    /// Roster changed (join, rejoin, disconnect).
    PlayerRosterUpdate { players: Vec<PlayerSummary> },
    /// The host started the game.
    GameStarted { total_questions: usize },
    /// The next question opens after `seconds`.
    Countdown { next_index: usize, seconds: u32 },
    /// A hosted question opened.
    NewQuestion(QuestionView),
    /// Remaining whole seconds of the open round. May be negative during the grace
    /// period; clients display negative values as zero.
    Tick { remaining_time: i64 },
    /// Progress of the open round, sent to the host only.
    LiveAnswerCount { count: usize, total_connected: usize },
    /// Round closed: right answer, distribution, and updated ranking.
    RoundResult {
        correct_option_index: usize,
        ranking: Vec<PlayerSummary>,
        answer_histogram: Vec<u32>,
    },
    /// Ranking revealed by the host.
    Scoreboard { ranking: Vec<PlayerSummary> },
    /// Last round played.
    GameOver { final_ranking: Vec<PlayerSummary> },
    /// The game was aborted.
    GameCanceled { reason: String },
    /// Queued for a battle; no opponent yet.
    WaitingForOpponent { topic: Topic },
    /// Battle paired.
    OpponentFound {
        session_id: String,
        participants: Vec<ParticipantSummary>,
        scores: BTreeMap<String, u32>,
    },
    /// New battle question.
    BattleQuestion {
        prompt_text: String,
        options: Vec<String>,
    },
    /// Battle round closed.
    BattleRoundResult {
        results: Vec<ParticipantResult>,
        scores: BTreeMap<String, u32>,
        correct_option: String,
    },
    /// The opponent left; the receiver wins by forfeit.
    OpponentDisconnected { winner_name: String },
    /// A participant asked for an early end.
    EarlyEndRequested { requester_name: String },
    /// The early-end request was declined; play resumes.
    EarlyEndDeclined { decliner_name: String },
    /// Battle finished. `winner_name` is absent on a tie.
    MatchOver {
        #[serde(skip_serializing_if = "Option::is_none")]
        winner_name: Option<String>,
        prize: i64,
    },
    /// The battle could not continue.
    BattleError { message: String },
    /// Intent rejected; sent to the originating connection only.
    Error { message: String },
}

impl ServerMessage {
    /// Build an error event from anything displayable.
    pub fn error(message: impl ToString) -> Self {
        ServerMessage::Error {
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Public projection of a hosted player.
pub struct PlayerSummary {
    pub nickname: String,
    pub score: u32,
    pub connected: bool,
}

impl From<&Player> for PlayerSummary {
    fn from(player: &Player) -> Self {
        Self {
            nickname: player.nickname.clone(),
            score: player.score,
            connected: player.connected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Question as shown to hosted players (without the answer).
pub struct QuestionView {
    pub index: usize,
    pub text: String,
    pub options: Vec<String>,
    pub duration_seconds: u32,
    pub total_questions: usize,
}

impl QuestionView {
    pub fn new(
        index: usize,
        question: &Question,
        duration_seconds: u32,
        total_questions: usize,
    ) -> Self {
        Self {
            index,
            text: question.prompt.clone(),
            options: question.options.to_vec(),
            duration_seconds,
            total_questions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Hosted game state tailored to the receiving connection.
pub struct GameSnapshot {
    pub access_code: String,
    pub status: GameStatus,
    pub phase: HostedPhase,
    /// `None` before the first question.
    pub question_index: Option<usize>,
    pub total_questions: usize,
    pub players: Vec<PlayerSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_question: Option<QuestionView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_time: Option<i64>,
    /// Whether the receiving player already answered the open question.
    pub already_answered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub your_score: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Public projection of a battle participant.
pub struct ParticipantSummary {
    pub user_id: String,
    pub name: String,
    pub score: u32,
}

impl From<&Participant> for ParticipantSummary {
    fn from(participant: &Participant) -> Self {
        Self {
            user_id: participant.profile.user_id.clone(),
            name: participant.profile.name.clone(),
            score: participant.score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Per-participant outcome of a battle round.
pub struct ParticipantResult {
    pub user_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    pub correct: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_kebab_case_intents_with_camel_case_fields() {
        let msg = ClientMessage::from_json_str(
            r#"{"type":"submit-answer","accessCode":"ABC123","optionIndex":2,"remainingTime":7.5}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::SubmitAnswer {
                access_code: "ABC123".into(),
                option_index: 2,
                remaining_time: 7.5,
            }
        );
    }

    #[test]
    fn parses_find_opponent_with_profile() {
        let msg = ClientMessage::from_json_str(
            r#"{"type":"find-opponent","profile":{"userId":"u1","name":"Ana"},"topic":"baroque"}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::FindOpponent {
                profile: PlayerProfile {
                    user_id: "u1".into(),
                    name: "Ana".into(),
                },
                topic: Topic::Baroque,
            }
        );
    }

    #[test]
    fn unknown_types_map_to_unknown() {
        let msg = ClientMessage::from_json_str(r#"{"type":"spectate"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Unknown);
    }

    #[test]
    fn server_events_are_tagged() {
        let json = serde_json::to_value(ServerMessage::LiveAnswerCount {
            count: 1,
            total_connected: 2,
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "live-answer-count", "count": 1, "totalConnected": 2})
        );

        let json = serde_json::to_value(ServerMessage::MatchOver {
            winner_name: None,
            prize: 20,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"type": "match-over", "prize": 20}));
    }
}
