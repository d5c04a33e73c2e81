//! Application-level configuration loading: round timings, awards, and question generation.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "ENCORE_BACK_CONFIG_PATH";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Tunables of the hosted ("Kahoot-style") quiz.
    pub hosted: HostedConfig,
    /// Tunables of the head-to-head battle mode.
    pub battle: BattleConfig,
    /// External text-generation settings.
    pub generator: GeneratorConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
/// Timing and scoring of hosted games.
pub struct HostedConfig {
    /// Nominal answering window of every question.
    pub question_duration_secs: u32,
    /// Countdown between the start/advance command and the question opening (0 opens directly).
    pub countdown_secs: u32,
    /// Extra delay before the authoritative round close, absorbing broadcast latency.
    pub grace_ms: u64,
    /// Points awarded for an instant correct answer.
    pub max_points: u32,
    /// Upper bound on the number of questions a single game may hold.
    pub max_questions: usize,
    /// How long a new game waits for its host before it is discarded (0 waits forever).
    pub host_wait_secs: u64,
}

impl Default for HostedConfig {
    fn default() -> Self {
        Self {
            question_duration_secs: 20,
            countdown_secs: 3,
            grace_ms: 1_500,
            max_points: 1_000,
            max_questions: 30,
            host_wait_secs: 600,
        }
    }
}

impl HostedConfig {
    /// Answering window as a [`Duration`].
    pub fn question_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.question_duration_secs))
    }

    /// Grace period as a [`Duration`].
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }

    /// Countdown as a [`Duration`].
    pub fn countdown(&self) -> Duration {
        Duration::from_secs(u64::from(self.countdown_secs))
    }

    /// Host wait as a [`Duration`], `None` when lobbies never expire.
    pub fn host_wait(&self) -> Option<Duration> {
        (self.host_wait_secs > 0).then(|| Duration::from_secs(self.host_wait_secs))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
/// Scoring and award amounts of battles.
pub struct BattleConfig {
    /// In-match points per correct answer.
    pub points_per_correct: u32,
    /// Persistent score awarded to the winner of a decided match.
    pub winner_prize: i64,
    /// Persistent score awarded to both players on a tie.
    pub tie_consolation: i64,
    /// Persistent score removed from a player leaving a running match.
    pub disconnect_penalty: i64,
    /// Pause between a round result and the next question.
    pub next_question_delay_ms: u64,
}

impl Default for BattleConfig {
    fn default() -> Self {
        Self {
            points_per_correct: 10,
            winner_prize: 50,
            tie_consolation: 20,
            disconnect_penalty: 30,
            next_question_delay_ms: 3_000,
        }
    }
}

impl BattleConfig {
    /// Inter-question delay as a [`Duration`].
    pub fn next_question_delay(&self) -> Duration {
        Duration::from_millis(self.next_question_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
/// Settings of the OpenAI-compatible text-generation endpoint.
pub struct GeneratorConfig {
    /// Base URL of the API (without the `/chat/completions` suffix).
    pub base_url: String,
    /// Model identifier sent with every request.
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// Attempts made before falling back to a catalog question.
    pub attempts: u32,
    /// Timeout applied to each individual attempt.
    pub attempt_timeout_ms: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-4o-mini".into(),
            api_key_env: "ENCORE_LLM_API_KEY".into(),
            attempts: 3,
            attempt_timeout_ms: 10_000,
        }
    }
}

impl GeneratorConfig {
    /// Per-attempt timeout as a [`Duration`].
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    /// API key read from the configured environment variable, if set and non-empty.
    pub fn api_key(&self) -> Option<String> {
        env::var(&self.api_key_env)
            .ok()
            .filter(|value| !value.trim().is_empty())
    }
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<AppConfig>(&contents) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        question_duration_secs = config.hosted.question_duration_secs,
                        generator_attempts = config.generator.attempts,
                        "loaded configuration"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
