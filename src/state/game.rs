use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    error::ServiceError,
    state::{room::ConnectionId, scoring::Ranked},
};

/// Number of options every question carries.
pub const OPTION_COUNT: usize = 4;

/// A multiple-choice question with exactly four options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    /// Text shown to players.
    pub prompt: String,
    /// The four candidate answers, in display order.
    pub options: [String; OPTION_COUNT],
    /// Index of the right option.
    pub correct: usize,
}

impl Question {
    /// Build a question, rejecting blank text, blank or duplicate options, and an
    /// out-of-range correct index.
    pub fn new(
        prompt: impl Into<String>,
        options: [String; OPTION_COUNT],
        correct: usize,
    ) -> Result<Self, ServiceError> {
        let prompt = prompt.into().trim().to_string();
        if prompt.is_empty() {
            return Err(ServiceError::InvalidInput(
                "question text must not be empty".into(),
            ));
        }

        let options = options.map(|option| option.trim().to_string());
        if options.iter().any(String::is_empty) {
            return Err(ServiceError::InvalidInput(
                "question options must not be empty".into(),
            ));
        }
        for (i, option) in options.iter().enumerate() {
            if options[..i]
                .iter()
                .any(|other| other.eq_ignore_ascii_case(option))
            {
                return Err(ServiceError::InvalidInput(format!(
                    "duplicate option `{option}`"
                )));
            }
        }

        if correct >= OPTION_COUNT {
            return Err(ServiceError::InvalidInput(format!(
                "correct option index {correct} is out of range"
            )));
        }

        Ok(Self {
            prompt,
            options,
            correct,
        })
    }

    /// Text of the right option.
    pub fn correct_option(&self) -> &str {
        &self.options[self.correct]
    }

    /// Whether `index` designates the right option.
    pub fn is_correct_index(&self, index: usize) -> bool {
        index == self.correct
    }

    /// Whether `answer` is the right option's text (case-insensitive).
    pub fn is_correct_text(&self, answer: &str) -> bool {
        self.correct_option().eq_ignore_ascii_case(answer.trim())
    }

    /// Index of the option whose text matches `answer`, if any.
    pub fn option_index(&self, answer: &str) -> Option<usize> {
        let answer = answer.trim();
        self.options
            .iter()
            .position(|option| option.eq_ignore_ascii_case(answer))
    }
}

/// Coarse lifecycle of a hosted game. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    Lobby,
    InProgress,
    Finished,
}

/// Participant of a hosted game.
#[derive(Debug, Clone)]
pub struct Player {
    /// Display nickname as typed by the player.
    pub nickname: String,
    /// Connection currently bound to this player.
    pub connection: ConnectionId,
    /// Cumulative score; never decreases.
    pub score: u32,
    /// Cleared on transport drop, set again on rejoin.
    pub connected: bool,
}

impl Ranked for Player {
    fn score(&self) -> u32 {
        self.score
    }
}

/// Public identity used for battle pairing and display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerProfile {
    /// Stable account identifier; at most one queue entry per identifier.
    pub user_id: String,
    /// Name shown to the opponent.
    pub name: String,
}

/// One side of a battle.
#[derive(Debug, Clone)]
pub struct Participant {
    pub connection: ConnectionId,
    pub profile: PlayerProfile,
    /// In-match score, independent of the persistent profile score.
    pub score: u32,
}

impl Ranked for Participant {
    fn score(&self) -> u32 {
        self.score
    }
}

/// Normalize a nickname into the key used for uniqueness checks.
pub fn nickname_key(nickname: &str) -> String {
    nickname.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(values: [&str; 4]) -> [String; 4] {
        values.map(String::from)
    }

    #[test]
    fn question_validation() {
        assert!(Question::new("Who?", options(["a", "b", "c", "d"]), 2).is_ok());
        assert!(Question::new("  ", options(["a", "b", "c", "d"]), 0).is_err());
        assert!(Question::new("Who?", options(["a", "", "c", "d"]), 0).is_err());
        assert!(Question::new("Who?", options(["a", "A", "c", "d"]), 0).is_err());
        assert!(Question::new("Who?", options(["a", "b", "c", "d"]), 4).is_err());
    }

    #[test]
    fn answer_matching_ignores_case_and_padding() {
        let question = Question::new(
            "Who wrote The Four Seasons?",
            options(["Bach", "Vivaldi", "Handel", "Purcell"]),
            1,
        )
        .unwrap();
        assert!(question.is_correct_text(" vivaldi "));
        assert!(!question.is_correct_text("Bach"));
        assert_eq!(question.option_index("HANDEL"), Some(2));
        assert_eq!(question.option_index("Mozart"), None);
    }

    #[test]
    fn nickname_keys_are_case_insensitive() {
        assert_eq!(nickname_key("  Bea "), nickname_key("bea"));
    }
}
