//! Pure scoring helpers shared by both game variants.

/// Points for a hosted answer: linear in the remaining time, truncated toward zero.
///
/// `remaining_secs` is client supplied, so it is clamped into `0..=duration_secs`.
/// Incorrect answers, missing answers and zero-length rounds yield zero.
pub fn time_decay_points(
    correct: bool,
    remaining_secs: f64,
    duration_secs: u32,
    max_points: u32,
) -> u32 {
    if !correct || duration_secs == 0 || !remaining_secs.is_finite() {
        return 0;
    }
    let duration = f64::from(duration_secs);
    let remaining = remaining_secs.clamp(0.0, duration);
    (f64::from(max_points) * remaining / duration).trunc() as u32
}

/// Points for a battle answer: a flat increment when correct.
pub fn flat_points(correct: bool, points: u32) -> u32 {
    if correct { points } else { 0 }
}

/// Anything that can be placed on a leaderboard.
pub trait Ranked {
    /// Cumulative score used for ordering.
    fn score(&self) -> u32;
}

/// Order entries by score, highest first.
///
/// The sort is stable: equal scores keep their input order, which for rosters is
/// the order players joined in.
pub fn rank<T: Ranked + Clone>(entries: impl IntoIterator<Item = T>) -> Vec<T> {
    let mut ranked: Vec<T> = entries.into_iter().collect();
    ranked.sort_by(|a, b| b.score().cmp(&a.score()));
    ranked
}

/// Count answers per option, zero-count options included. Out-of-range indexes are ignored.
pub fn histogram(answers: impl IntoIterator<Item = usize>) -> [u32; 4] {
    let mut counts = [0u32; 4];
    for index in answers {
        if let Some(slot) = counts.get_mut(index) {
            *slot += 1;
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Entry(&'static str, u32);

    impl Ranked for Entry {
        fn score(&self) -> u32 {
            self.1
        }
    }

    #[test]
    fn more_remaining_time_never_scores_less() {
        let mut previous = u32::MAX;
        for tenths in (0..=200).rev() {
            let points = time_decay_points(true, f64::from(tenths) / 10.0, 20, 1_000);
            assert!(points <= previous);
            previous = points;
        }
        assert_eq!(time_decay_points(true, 20.0, 20, 1_000), 1_000);
        assert_eq!(time_decay_points(true, 10.0, 20, 1_000), 500);
        assert_eq!(time_decay_points(true, 0.0, 20, 1_000), 0);
    }

    #[test]
    fn incorrect_answers_score_zero() {
        assert_eq!(time_decay_points(false, 20.0, 20, 1_000), 0);
        assert_eq!(flat_points(false, 10), 0);
        assert_eq!(flat_points(true, 10), 10);
    }

    #[test]
    fn client_supplied_time_is_clamped() {
        assert_eq!(time_decay_points(true, 999.0, 20, 1_000), 1_000);
        assert_eq!(time_decay_points(true, -4.0, 20, 1_000), 0);
        assert_eq!(time_decay_points(true, f64::NAN, 20, 1_000), 0);
        assert_eq!(time_decay_points(true, 5.0, 0, 1_000), 0);
    }

    #[test]
    fn truncates_fractional_points() {
        // 1000 * 7 / 30 = 233.33…
        assert_eq!(time_decay_points(true, 7.0, 30, 1_000), 233);
    }

    #[test]
    fn rank_is_descending_and_stable() {
        let ranked = rank(vec![
            Entry("ana", 10),
            Entry("bea", 30),
            Entry("cid", 10),
            Entry("dan", 30),
        ]);
        assert_eq!(
            ranked,
            vec![
                Entry("bea", 30),
                Entry("dan", 30),
                Entry("ana", 10),
                Entry("cid", 10),
            ]
        );
    }

    #[test]
    fn histogram_keeps_empty_options() {
        assert_eq!(histogram([0, 2, 2, 7]), [1, 0, 2, 0]);
        assert_eq!(histogram([]), [0, 0, 0, 0]);
    }
}
