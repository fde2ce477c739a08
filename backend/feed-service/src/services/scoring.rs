//! Feed ranking score.
//!
//! A fresh item starts with a novelty bonus that shrinks linearly to zero
//! over `novelty_expiry_hours`; engagement is added on top. Once the novelty
//! window has passed the total decays geometrically by `time_decay_factor`
//! per additional day.

use chrono::{DateTime, Utc};

use crate::config::ScoringConfig;

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

#[derive(Debug, Clone)]
pub struct ScoreEngine {
    weights: ScoringConfig,
}

impl ScoreEngine {
    pub fn new(weights: ScoringConfig) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ScoringConfig {
        &self.weights
    }

    /// Score an item. Items dated in the future (clock skew between services)
    /// get a negative age and therefore a novelty bonus above the maximum;
    /// the age is intentionally not clamped.
    pub fn score(
        &self,
        created_at: DateTime<Utc>,
        likes: u64,
        retweets: u64,
        now: DateTime<Utc>,
    ) -> f64 {
        let w = &self.weights;
        let hours_since_creation =
            (now - created_at).num_milliseconds() as f64 / MILLIS_PER_HOUR;

        let novelty = w.max_novelty_factor
            * (1.0 - hours_since_creation / w.novelty_expiry_hours).max(0.0);
        let engagement = likes as f64 * w.like_weight + retweets as f64 * w.retweet_weight;
        let total = novelty + engagement;

        let time_coefficient = if hours_since_creation > w.novelty_expiry_hours {
            w.time_decay_factor
                .powf((hours_since_creation - w.novelty_expiry_hours) / 24.0)
        } else {
            1.0
        };

        total * time_coefficient
    }
}

impl Default for ScoreEngine {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}
