//! Round bookkeeping shared by hosted games and battles.
//!
//! Both variants collect at most one answer per participant per question and score
//! answers when the round closes; they differ in *when* the round closes and *how*
//! an answer is scored. Those differences live in [`RoundPolicy`].

use std::{hash::Hash, time::Duration};

use indexmap::IndexMap;

use crate::{
    config::{BattleConfig, HostedConfig},
    state::scoring,
};

/// Outcome of an answer submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// First answer of this participant for the round; stored.
    Recorded,
    /// The participant already answered; the new answer was dropped.
    Duplicate,
}

/// Answers of the current round, first write wins.
#[derive(Debug, Clone)]
pub struct AnswerBook<K, A> {
    answers: IndexMap<K, A>,
}

impl<K, A> Default for AnswerBook<K, A> {
    fn default() -> Self {
        Self {
            answers: IndexMap::new(),
        }
    }
}

impl<K: Hash + Eq, A> AnswerBook<K, A> {
    /// Create an empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `answer` unless `who` already answered this round.
    pub fn submit(&mut self, who: K, answer: A) -> Submission {
        if self.answers.contains_key(&who) {
            return Submission::Duplicate;
        }
        self.answers.insert(who, answer);
        Submission::Recorded
    }

    /// Answer stored for `who`, if any.
    pub fn get(&self, who: &K) -> Option<&A> {
        self.answers.get(who)
    }

    /// Whether `who` already answered.
    pub fn contains(&self, who: &K) -> bool {
        self.answers.contains_key(who)
    }

    /// Number of answers stored.
    pub fn count(&self) -> usize {
        self.answers.len()
    }

    /// Answers in submission order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &A)> {
        self.answers.iter()
    }

    /// Forget every answer, ready for the next question.
    pub fn clear(&mut self) {
        self.answers.clear();
    }
}

/// What ends a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosePolicy {
    /// The round timer's deferred close, after `duration + grace`, regardless of answers.
    Timer { duration: Duration, grace: Duration },
    /// The arrival of the last expected answer; no timeout.
    AllAnswered,
}

/// How a correct answer is turned into points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringPolicy {
    /// Linear decay with the remaining time, up to `max_points`.
    TimeDecay { max_points: u32, duration_secs: u32 },
    /// Constant increment.
    Flat { points: u32 },
}

/// Per-variant round rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundPolicy {
    pub close: ClosePolicy,
    pub scoring: ScoringPolicy,
}

impl RoundPolicy {
    /// Fixed-duration rounds scored by answer speed.
    pub fn hosted(config: &HostedConfig) -> Self {
        Self {
            close: ClosePolicy::Timer {
                duration: config.question_duration(),
                grace: config.grace(),
            },
            scoring: ScoringPolicy::TimeDecay {
                max_points: config.max_points,
                duration_secs: config.question_duration_secs,
            },
        }
    }

    /// Rounds closing on the second answer, flat scoring.
    pub fn battle(config: &BattleConfig) -> Self {
        Self {
            close: ClosePolicy::AllAnswered,
            scoring: ScoringPolicy::Flat {
                points: config.points_per_correct,
            },
        }
    }

    /// Whether an answer count alone closes the round.
    pub fn should_close(&self, answered: usize, expected: usize) -> bool {
        match self.close {
            ClosePolicy::Timer { .. } => false,
            ClosePolicy::AllAnswered => expected > 0 && answered >= expected,
        }
    }

    /// Points earned by one answer. `remaining_secs` is ignored by flat scoring.
    pub fn score(&self, correct: bool, remaining_secs: f64) -> u32 {
        match self.scoring {
            ScoringPolicy::TimeDecay {
                max_points,
                duration_secs,
            } => scoring::time_decay_points(correct, remaining_secs, duration_secs, max_points),
            ScoringPolicy::Flat { points } => scoring::flat_points(correct, points),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_answer_wins() {
        let mut book = AnswerBook::new();
        assert_eq!(book.submit("ana", 1), Submission::Recorded);
        assert_eq!(book.submit("ana", 3), Submission::Duplicate);
        assert_eq!(book.get(&"ana"), Some(&1));
        assert_eq!(book.count(), 1);

        book.clear();
        assert!(!book.contains(&"ana"));
        assert_eq!(book.submit("ana", 3), Submission::Recorded);
    }

    #[test]
    fn hosted_rounds_never_close_on_answer_count() {
        let policy = RoundPolicy::hosted(&HostedConfig::default());
        assert!(!policy.should_close(5, 5));
        assert!(!policy.should_close(0, 0));
    }

    #[test]
    fn battle_rounds_close_on_the_last_answer() {
        let policy = RoundPolicy::battle(&BattleConfig::default());
        assert!(!policy.should_close(1, 2));
        assert!(policy.should_close(2, 2));
        assert!(!policy.should_close(0, 0));
    }

    #[test]
    fn policies_score_differently() {
        let hosted = RoundPolicy::hosted(&HostedConfig::default());
        let battle = RoundPolicy::battle(&BattleConfig::default());
        assert_eq!(hosted.score(true, 10.0), 500);
        assert_eq!(battle.score(true, 10.0), 10);
        assert_eq!(battle.score(true, 0.0), 10);
        assert_eq!(hosted.score(false, 20.0), 0);
    }
}
