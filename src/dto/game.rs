use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    catalog::Topic,
    dto::{format_system_time, validation::validate_question_options, ws::PlayerSummary},
    state::{game::GameStatus, state_machine::HostedPhase},
};

/// Payload used to open a hosted game.
///
/// Either `questions` is supplied, or `topic` and `questionCount` ask the server to
/// produce the set.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateGameRequest {
    #[serde(default)]
    pub questions: Option<Vec<QuestionInput>>,
    #[serde(default)]
    pub topic: Option<Topic>,
    #[serde(default)]
    pub question_count: Option<usize>,
}

impl Validate for CreateGameRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        match (&self.questions, self.topic, self.question_count) {
            (Some(questions), None, None) => {
                if questions.is_empty() {
                    errors.add("questions", ValidationError::new("questions_empty"));
                }
                for question in questions {
                    if let Err(question_errors) = question.validate() {
                        errors.merge_self("questions", Err(question_errors));
                    }
                }
            }
            (None, Some(_), Some(count)) => {
                if count == 0 {
                    errors.add("question_count", ValidationError::new("question_count_zero"));
                }
            }
            _ => {
                let mut err = ValidationError::new("question_set");
                err.message =
                    Some("Provide either `questions` or both `topic` and `questionCount`".into());
                errors.add("questions", err);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// One explicit question of a hosted game.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct QuestionInput {
    #[validate(length(min = 1))]
    pub text: String,
    #[validate(custom(function = "validate_question_options"))]
    pub options: Vec<String>,
    #[validate(range(max = 3))]
    pub correct_option_index: usize,
}

/// Public view of a hosted game.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GameSummary {
    pub access_code: String,
    pub status: GameStatus,
    pub phase: HostedPhase,
    pub question_index: Option<usize>,
    pub total_questions: usize,
    pub players: Vec<PlayerSummary>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

impl GameSummary {
    pub fn new(
        access_code: &str,
        status: GameStatus,
        phase: HostedPhase,
        question_index: Option<usize>,
        total_questions: usize,
        players: Vec<PlayerSummary>,
        created_at: SystemTime,
    ) -> Self {
        Self {
            access_code: access_code.to_string(),
            status,
            phase,
            question_index,
            total_questions,
            players,
            created_at: format_system_time(created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(options: &[&str], correct: usize) -> QuestionInput {
        QuestionInput {
            text: "Who?".into(),
            options: options.iter().map(|option| option.to_string()).collect(),
            correct_option_index: correct,
        }
    }

    #[test]
    fn explicit_questions_are_validated() {
        let request = CreateGameRequest {
            questions: Some(vec![question(&["a", "b", "c", "d"], 1)]),
            topic: None,
            question_count: None,
        };
        assert!(request.validate().is_ok());

        let request = CreateGameRequest {
            questions: Some(vec![question(&["a", "b", "c"], 4)]),
            topic: None,
            question_count: None,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn exactly_one_question_source_is_required() {
        let neither = CreateGameRequest {
            questions: None,
            topic: Some(Topic::Baroque),
            question_count: None,
        };
        assert!(neither.validate().is_err());

        let generated = CreateGameRequest {
            questions: None,
            topic: Some(Topic::Baroque),
            question_count: Some(5),
        };
        assert!(generated.validate().is_ok());
    }
}
