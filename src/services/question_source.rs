//! Question Source Adapter: asks an external text generator for a question, parses the
//! labelled reply, and synthesizes a catalog question when generation fails.

use std::{sync::Arc, time::Duration};

use futures::future::{BoxFuture, FutureExt};
use rand::seq::{IndexedRandom, SliceRandom};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::{
    catalog::{Catalog, Topic},
    config::GeneratorConfig,
    state::game::{OPTION_COUNT, Question},
};

/// Failures of a single generation attempt.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// No generator configured (missing API key).
    #[error("question generation is disabled")]
    Disabled,
    /// Building the HTTP client failed.
    #[error("failed to build generation client")]
    Client {
        #[source]
        source: reqwest::Error,
    },
    /// The request could not be sent or its body could not be read.
    #[error("generation request failed")]
    Request {
        #[source]
        source: reqwest::Error,
    },
    /// The endpoint answered with a non-success status.
    #[error("generation endpoint returned status {0}")]
    Status(StatusCode),
    /// The endpoint answered without any text.
    #[error("generation endpoint returned no content")]
    EmptyResponse,
}

/// Reasons a generated reply cannot be turned into a [`Question`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("missing `{0}` line")]
    MissingField(&'static str),
    #[error("expected four options, found {0}")]
    OptionCount(usize),
    #[error("answer `{0}` matches no option")]
    UnknownAnswer(String),
    #[error("invalid question: {0}")]
    Invalid(String),
}

/// Raised when not even a catalog question can be produced.
#[derive(Debug, Error)]
pub enum FallbackError {
    #[error("catalog holds {available} usable composers for {topic}, at least four needed")]
    InsufficientCatalog { topic: Topic, available: usize },
    #[error("catalog entry for {topic} is invalid: {message}")]
    InvalidEntry { topic: Topic, message: String },
}

/// Where a question came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionOrigin {
    Generated,
    Fallback,
}

/// Opaque text-generation boundary: prompt in, free text out.
pub trait TextGenerator: Send + Sync {
    /// Produce a completion for `prompt`.
    fn generate(&self, prompt: String) -> BoxFuture<'static, Result<String, GenerationError>>;

    /// Whether calling [`generate`](Self::generate) can succeed at all.
    fn is_available(&self) -> bool {
        true
    }
}

/// Generator used when no API key is configured; always fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledGenerator;

impl TextGenerator for DisabledGenerator {
    fn generate(&self, _prompt: String) -> BoxFuture<'static, Result<String, GenerationError>> {
        async { Err(GenerationError::Disabled) }.boxed()
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// Client of an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Clone)]
pub struct HttpTextGenerator {
    client: Client,
    endpoint: Arc<str>,
    model: Arc<str>,
    api_key: Arc<str>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

impl HttpTextGenerator {
    pub fn new(config: &GeneratorConfig, api_key: String) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .build()
            .map_err(|source| GenerationError::Client { source })?;
        let endpoint = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            model: config.model.as_str().into(),
            api_key: api_key.into(),
        })
    }
}

impl TextGenerator for HttpTextGenerator {
    fn generate(&self, prompt: String) -> BoxFuture<'static, Result<String, GenerationError>> {
        let this = self.clone();
        async move {
            let body = ChatRequest {
                model: &this.model,
                messages: [ChatMessage {
                    role: "user",
                    content: &prompt,
                }],
                temperature: 0.8,
            };

            let response = this
                .client
                .post(this.endpoint.as_ref())
                .bearer_auth(this.api_key.as_ref())
                .json(&body)
                .send()
                .await
                .map_err(|source| GenerationError::Request { source })?;

            let status = response.status();
            if !status.is_success() {
                return Err(GenerationError::Status(status));
            }

            let payload: ChatResponse = response
                .json()
                .await
                .map_err(|source| GenerationError::Request { source })?;

            payload
                .choices
                .into_iter()
                .find_map(|choice| choice.message.content)
                .filter(|content| !content.trim().is_empty())
                .ok_or(GenerationError::EmptyResponse)
        }
        .boxed()
    }
}

/// Produces battle and hosted questions for a topic.
pub struct QuestionSource {
    generator: Arc<dyn TextGenerator>,
    catalog: Arc<Catalog>,
    attempts: u32,
    attempt_timeout: Duration,
}

impl QuestionSource {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        catalog: Arc<Catalog>,
        config: &GeneratorConfig,
    ) -> Self {
        Self {
            generator,
            catalog,
            attempts: config.attempts,
            attempt_timeout: config.attempt_timeout(),
        }
    }

    /// Pick the HTTP generator when an API key is configured, the disabled one otherwise.
    pub fn from_config(config: &GeneratorConfig, catalog: Arc<Catalog>) -> Self {
        let generator: Arc<dyn TextGenerator> = match config.api_key() {
            Some(key) => match HttpTextGenerator::new(config, key) {
                Ok(generator) => {
                    info!(model = %config.model, "question generation enabled");
                    Arc::new(generator)
                }
                Err(err) => {
                    warn!(error = %err, "failed to initialise question generator; using catalog only");
                    Arc::new(DisabledGenerator)
                }
            },
            None => {
                info!(
                    env = %config.api_key_env,
                    "no generator API key configured; using catalog questions only"
                );
                Arc::new(DisabledGenerator)
            }
        };
        Self::new(generator, catalog, config)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Prompt sent to the generator for `topic`.
    pub fn build_prompt(&self, topic: Topic) -> String {
        let composers = self
            .catalog
            .composers(topic)
            .iter()
            .map(|composer| composer.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "Write one multiple-choice music-history question about the {label} period ({years}).\n\
             Composers of the period include: {composers}.\n\
             Give exactly four distinct options, one of them correct.\n\
             Reply with exactly three lines and nothing else:\n\
             Question: <question text>\n\
             Options: A) <option> | B) <option> | C) <option> | D) <option>\n\
             Answer: <letter of the correct option>",
            label = topic.label(),
            years = topic.years(),
        )
    }

    /// Ask the generator up to `attempts` times, then fall back to the catalog.
    pub async fn next_question(
        &self,
        topic: Topic,
    ) -> Result<(Question, QuestionOrigin), FallbackError> {
        if self.generator.is_available() {
            let prompt = self.build_prompt(topic);
            for attempt in 1..=self.attempts {
                match timeout(self.attempt_timeout, self.generator.generate(prompt.clone())).await
                {
                    Ok(Ok(text)) => match parse_response(&text) {
                        Ok(question) => return Ok((question, QuestionOrigin::Generated)),
                        Err(err) => {
                            warn!(%topic, attempt, error = %err, "unparsable generated question")
                        }
                    },
                    Ok(Err(err)) => warn!(%topic, attempt, error = %err, "question generation failed"),
                    Err(_) => warn!(%topic, attempt, "question generation timed out"),
                }
            }
            warn!(%topic, "falling back to a catalog question");
        } else {
            debug!(%topic, "generator disabled; using a catalog question");
        }

        self.fallback_question(topic)
            .map(|question| (question, QuestionOrigin::Fallback))
    }

    /// "Who composed <work>?" with the composer and three same-period distractors.
    pub fn fallback_question(&self, topic: Topic) -> Result<Question, FallbackError> {
        let composers = self.catalog.composers(topic);
        if composers.len() < OPTION_COUNT {
            return Err(FallbackError::InsufficientCatalog {
                topic,
                available: composers.len(),
            });
        }

        let mut rng = rand::rng();
        let with_works: Vec<_> = composers
            .iter()
            .filter(|composer| !composer.works.is_empty())
            .collect();
        let available = with_works.len();
        let Some(composer) = with_works.choose(&mut rng) else {
            return Err(FallbackError::InsufficientCatalog { topic, available });
        };
        let Some(work) = composer.works.choose(&mut rng) else {
            return Err(FallbackError::InsufficientCatalog { topic, available });
        };

        let others: Vec<_> = composers
            .iter()
            .filter(|other| !other.name.eq_ignore_ascii_case(&composer.name))
            .collect();
        let mut options: Vec<String> = others
            .choose_multiple(&mut rng, OPTION_COUNT - 1)
            .map(|other| other.name.clone())
            .collect();
        options.push(composer.name.clone());
        options.shuffle(&mut rng);

        let correct = options
            .iter()
            .position(|option| option == &composer.name)
            .unwrap_or_default();
        let options: [String; OPTION_COUNT] =
            options
                .try_into()
                .map_err(|options: Vec<String>| FallbackError::InsufficientCatalog {
                    topic,
                    available: options.len(),
                })?;

        Question::new(format!("Who composed {work}?"), options, correct).map_err(|err| {
            FallbackError::InvalidEntry {
                topic,
                message: err.to_string(),
            }
        })
    }
}

/// Parse the three-line `Question:` / `Options:` / `Answer:` reply format.
///
/// Labels are case-insensitive; markdown emphasis and list bullets around them are
/// ignored. The answer may be a letter (`B`, `B)`, `b.`) or the option text.
pub fn parse_response(text: &str) -> Result<Question, ParseError> {
    let mut prompt = None;
    let mut options = None;
    let mut answer = None;

    for line in text.lines() {
        let line = strip_decoration(line);
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        let value = strip_decoration(value);
        match strip_decoration(label).to_ascii_lowercase().as_str() {
            "question" if prompt.is_none() => prompt = Some(value.to_string()),
            "options" if options.is_none() => options = Some(value.to_string()),
            "answer" | "correct answer" if answer.is_none() => answer = Some(value.to_string()),
            _ => {}
        }
    }

    let prompt = prompt.ok_or(ParseError::MissingField("Question"))?;
    let options = options.ok_or(ParseError::MissingField("Options"))?;
    let answer = answer.ok_or(ParseError::MissingField("Answer"))?;

    let options: Vec<String> = options
        .split('|')
        .map(|option| strip_option_label(option).to_string())
        .filter(|option| !option.is_empty())
        .collect();
    let options: [String; OPTION_COUNT] = options
        .try_into()
        .map_err(|options: Vec<String>| ParseError::OptionCount(options.len()))?;

    let correct = answer_index(&answer, &options).ok_or(ParseError::UnknownAnswer(answer))?;

    Question::new(prompt, options, correct).map_err(|err| ParseError::Invalid(err.to_string()))
}

fn strip_decoration(text: &str) -> &str {
    text.trim()
        .trim_start_matches(['-', '•'])
        .trim_start()
        .trim_matches(|c: char| c == '*' || c == '_' || c == '`')
        .trim()
}

/// Drop a leading `A)`, `A.`, `A:` or `(A)` marker from an option.
fn strip_option_label(option: &str) -> &str {
    let option = option.trim();
    let unwrapped = option.strip_prefix('(').unwrap_or(option);
    let mut chars = unwrapped.chars();
    match (chars.next(), chars.next()) {
        (Some(letter), Some(')' | '.' | ':')) if letter_index(letter).is_some() => {
            unwrapped[2..].trim()
        }
        _ => option,
    }
}

fn letter_index(letter: char) -> Option<usize> {
    match letter.to_ascii_uppercase() {
        'A' => Some(0),
        'B' => Some(1),
        'C' => Some(2),
        'D' => Some(3),
        _ => None,
    }
}

fn answer_index(answer: &str, options: &[String; OPTION_COUNT]) -> Option<usize> {
    let answer = answer.trim().trim_end_matches('.');
    if let Some(index) = options
        .iter()
        .position(|option| option.eq_ignore_ascii_case(answer))
    {
        return Some(index);
    }

    let marker = answer.strip_prefix('(').unwrap_or(answer);
    let mut chars = marker.chars();
    match (chars.next(), chars.next()) {
        (Some(letter), None | Some(')' | '.' | ':' | ' ')) => letter_index(letter),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use crate::catalog::Composer;

    use super::*;

    struct Scripted {
        replies: Mutex<VecDeque<Result<String, GenerationError>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, GenerationError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl TextGenerator for Scripted {
        fn generate(&self, _prompt: String) -> BoxFuture<'static, Result<String, GenerationError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(GenerationError::EmptyResponse));
            async move { reply }.boxed()
        }
    }

    struct Hanging;

    impl TextGenerator for Hanging {
        fn generate(&self, _prompt: String) -> BoxFuture<'static, Result<String, GenerationError>> {
            futures::future::pending().boxed()
        }
    }

    fn source(generator: Arc<dyn TextGenerator>) -> QuestionSource {
        QuestionSource::new(
            generator,
            Arc::new(Catalog::builtin()),
            &GeneratorConfig::default(),
        )
    }

    const WELL_FORMED: &str = "Question: Who composed the Brandenburg Concertos?\n\
         Options: A) Handel | B) Bach | C) Vivaldi | D) Telemann\n\
         Answer: B";

    #[test]
    fn parses_letter_answers() {
        let question = parse_response(WELL_FORMED).unwrap();
        assert_eq!(question.prompt, "Who composed the Brandenburg Concertos?");
        assert_eq!(question.options[0], "Handel");
        assert_eq!(question.correct_option(), "Bach");
    }

    #[test]
    fn parses_text_answers_and_markdown() {
        let reply = "Sure!\n**Question:** Which form did Haydn help establish?\n\
                     - **Options:** (A) Symphony | (B) Madrigal | (C) Motet | (D) Organum\n\
                     **Answer:** symphony";
        let question = parse_response(reply).unwrap();
        assert_eq!(question.correct, 0);
        assert_eq!(question.options[3], "Organum");
    }

    #[test]
    fn rejects_incomplete_replies() {
        assert_eq!(
            parse_response("Options: A) a | B) b | C) c | D) d\nAnswer: A"),
            Err(ParseError::MissingField("Question"))
        );
        assert_eq!(
            parse_response("Question: q\nOptions: A) a | B) b | C) c\nAnswer: A"),
            Err(ParseError::OptionCount(3))
        );
        assert!(matches!(
            parse_response("Question: q\nOptions: A) a | B) b | C) c | D) d\nAnswer: E"),
            Err(ParseError::UnknownAnswer(_))
        ));
    }

    #[test]
    fn fallback_uses_same_period_composers() {
        let source = source(Arc::new(DisabledGenerator));
        for topic in Topic::ALL {
            let question = source.fallback_question(topic).unwrap();
            assert!(question.prompt.starts_with("Who composed "));
            for option in &question.options {
                assert!(source.catalog().is_composer_in(topic, option));
            }
        }
    }

    #[test]
    fn fallback_fails_on_under_populated_topics() {
        let catalog = Catalog::new(vec![
            Composer::new("Perotin", Topic::Medieval, &["Viderunt omnes"]),
            Composer::new("Leonin", Topic::Medieval, &["Magnus liber organi"]),
        ]);
        let source = QuestionSource::new(
            Arc::new(DisabledGenerator),
            Arc::new(catalog),
            &GeneratorConfig::default(),
        );
        assert!(matches!(
            source.fallback_question(Topic::Medieval),
            Err(FallbackError::InsufficientCatalog { available: 2, .. })
        ));
    }

    #[tokio::test]
    async fn retries_before_falling_back() {
        let generator = Scripted::new(vec![
            Ok("no idea".into()),
            Err(GenerationError::EmptyResponse),
            Ok(WELL_FORMED.into()),
        ]);
        let source = source(generator.clone());
        let (question, origin) = source.next_question(Topic::Baroque).await.unwrap();
        assert_eq!(origin, QuestionOrigin::Generated);
        assert_eq!(question.correct_option(), "Bach");
        assert_eq!(generator.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn unparsable_replies_fall_back_to_the_catalog() {
        let generator = Scripted::new((0..3).map(|_| Ok("garbage".to_string())).collect());
        let source = source(generator.clone());
        let (question, origin) = source.next_question(Topic::Romantic).await.unwrap();
        assert_eq!(origin, QuestionOrigin::Fallback);
        assert!(
            source
                .catalog()
                .is_composer_in(Topic::Romantic, question.correct_option())
        );
        assert_eq!(generator.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_generator_times_out_into_fallback() {
        let source = source(Arc::new(Hanging));
        let (_, origin) = source.next_question(Topic::Modern).await.unwrap();
        assert_eq!(origin, QuestionOrigin::Fallback);
    }
}
