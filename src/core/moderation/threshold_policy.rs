// Maps a classifier verdict and the configured threshold to a decision.

use super::moderation_config::Threshold;
use super::moderation_models::{Decision, Verdict};

/// `Act` iff the highest category score is at or above `threshold`.
///
/// Only one action is taken per message no matter how many categories
/// cross the line; the highest one is kept for logging.
pub fn evaluate(verdict: &Verdict, threshold: Threshold) -> Decision {
    match verdict.highest() {
        Some(top) if top.score >= threshold.value() => Decision::Act {
            category: top.category.clone(),
            score: top.score,
        },
        _ => Decision::Allow,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    fn threshold(value: f64) -> Threshold {
        Threshold::new(value).unwrap()
    }

    #[test]
    fn equal_score_acts() {
        let verdict = Verdict::from_scores([("Violence", 0.8)]);
        assert!(evaluate(&verdict, threshold(0.8)).is_act());
    }

    #[test]
    fn score_just_below_allows() {
        let verdict = Verdict::from_scores([("Violence", 0.8 - EPSILON)]);
        assert_eq!(evaluate(&verdict, threshold(0.8)), Decision::Allow);
    }

    #[test]
    fn score_just_above_acts() {
        let verdict = Verdict::from_scores([("Violence", 0.8 + EPSILON)]);
        assert!(evaluate(&verdict, threshold(0.8)).is_act());
    }

    #[test]
    fn boundary_holds_across_thresholds() {
        for t in [0.0, 0.25, 0.5, 0.75, 1.0] {
            let at = Verdict::from_scores([("Hate", t)]);
            assert!(evaluate(&at, threshold(t)).is_act(), "score == {t}");

            if t > 0.0 {
                let below = Verdict::from_scores([("Hate", t - 0.01)]);
                assert_eq!(evaluate(&below, threshold(t)), Decision::Allow, "below {t}");
            }
        }
    }

    #[test]
    fn highest_category_is_reported() {
        let verdict = Verdict::from_scores([("Hate", 0.9), ("Violence", 0.95), ("Sexual", 0.1)]);

        assert_eq!(
            evaluate(&verdict, threshold(0.5)),
            Decision::Act {
                category: "Violence".to_string(),
                score: 0.95,
            }
        );
    }

    #[test]
    fn empty_verdict_allows_even_at_zero() {
        assert_eq!(evaluate(&Verdict::safe(), threshold(0.0)), Decision::Allow);
    }
}
