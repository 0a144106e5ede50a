//! Difficulty → engine configuration.
//!
//! A [`BucketTable`] partitions the difficulty axis into contiguous buckets
//! with inclusive upper bounds. Resolution is total: anything at or below the
//! first threshold lands in the first bucket, anything above the
//! second-highest threshold lands in the last one, and NaN falls through to
//! the last bucket as well. Identical inputs always select the identical
//! profile, which is what lets the engine registry reuse instances.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::GoParams;

/// Search parameters and model selection for one difficulty level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifficultyProfile {
    /// Wall-clock budget for one move.
    pub time_budget_ms: u64,
    /// Node cap; 0 means unlimited.
    #[serde(default)]
    pub node_budget: u64,
    /// Depth cap; 0 means unlimited.
    #[serde(default)]
    pub depth_budget: u32,
    /// Softmax temperature in [0, 1]. Higher plays more randomly.
    pub temperature: f32,
    /// Weights the engine instance is loaded with.
    pub model_id: String,
}

impl DifficultyProfile {
    fn new(time_ms: u64, depth: u32, nodes: u64, temperature: f32, model: &str) -> Self {
        Self {
            time_budget_ms: time_ms,
            node_budget: nodes,
            depth_budget: depth,
            temperature,
            model_id: model.to_string(),
        }
    }

    /// Per-search limits. Zero budgets are left out so the engine treats them
    /// as unlimited.
    pub fn go_params(&self) -> GoParams {
        GoParams {
            movetime: Duration::from_millis(self.time_budget_ms),
            depth: (self.depth_budget > 0).then_some(self.depth_budget),
            nodes: (self.node_budget > 0).then_some(self.node_budget),
        }
    }
}

/// One row of the table: every difficulty `<= max_difficulty` not claimed by
/// an earlier row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub max_difficulty: f64,
    #[serde(flatten)]
    pub profile: DifficultyProfile,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TableError {
    #[error("difficulty table has no buckets")]
    Empty,
    #[error("bucket {index}: threshold {value} is not finite")]
    NonFinite { index: usize, value: f64 },
    #[error("bucket {index}: threshold {value} does not exceed the previous threshold")]
    NotIncreasing { index: usize, value: f64 },
    #[error("model {model:?} is used with temperatures {first} and {second}")]
    ConflictingTemperature {
        model: String,
        first: f32,
        second: f32,
    },
}

/// Validated, non-empty bucket table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Bucket>", into = "Vec<Bucket>")]
pub struct BucketTable {
    buckets: Vec<Bucket>,
}

impl BucketTable {
    /// Build a table, checking that thresholds are finite and strictly
    /// increasing and that each model is only ever given one temperature.
    /// Temperature is applied when an engine is created, so a second value
    /// for the same model would silently never take effect.
    pub fn new(buckets: Vec<Bucket>) -> Result<Self, TableError> {
        if buckets.is_empty() {
            return Err(TableError::Empty);
        }

        let mut previous: Option<f64> = None;
        let mut temperatures: HashMap<&str, f32> = HashMap::new();
        for (index, bucket) in buckets.iter().enumerate() {
            let value = bucket.max_difficulty;
            if !value.is_finite() {
                return Err(TableError::NonFinite { index, value });
            }
            if let Some(prev) = previous
                && value <= prev
            {
                return Err(TableError::NotIncreasing { index, value });
            }
            previous = Some(value);

            let profile = &bucket.profile;
            if let Some(&first) = temperatures.get(profile.model_id.as_str()) {
                if first != profile.temperature {
                    return Err(TableError::ConflictingTemperature {
                        model: profile.model_id.clone(),
                        first,
                        second: profile.temperature,
                    });
                }
            } else {
                temperatures.insert(&profile.model_id, profile.temperature);
            }
        }

        Ok(Self { buckets })
    }

    /// Map a difficulty to exactly one profile. Never fails.
    pub fn resolve(&self, difficulty: f64) -> &DifficultyProfile {
        let (last, rest) = self
            .buckets
            .split_last()
            .expect("BucketTable is never empty");
        rest.iter()
            .find(|bucket| difficulty <= bucket.max_difficulty)
            .map_or(&last.profile, |bucket| &bucket.profile)
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    /// First profile for each distinct model, in table order.
    pub fn distinct_models(&self) -> Vec<&DifficultyProfile> {
        let mut seen = Vec::new();
        let mut out = Vec::new();
        for bucket in &self.buckets {
            let model = bucket.profile.model_id.as_str();
            if !seen.contains(&model) {
                seen.push(model);
                out.push(&bucket.profile);
            }
        }
        out
    }
}

impl TryFrom<Vec<Bucket>> for BucketTable {
    type Error = TableError;

    fn try_from(buckets: Vec<Bucket>) -> Result<Self, Self::Error> {
        Self::new(buckets)
    }
}

impl From<BucketTable> for Vec<Bucket> {
    fn from(table: BucketTable) -> Self {
        table.buckets
    }
}

impl Default for BucketTable {
    /// Ten buckets from a ~200 Elo network up to a ~2700 one. Every search
    /// is capped at a single node, so move choice comes straight from the
    /// policy head and lookups stay fast.
    fn default() -> Self {
        let row = |max, time, depth, nodes, temp, model| Bucket {
            max_difficulty: max,
            profile: DifficultyProfile::new(time, depth, nodes, temp, model),
        };
        let buckets = vec![
            row(0.1, 200, 1, 1, 0.5, "elo-206"),
            // Much stronger than its name on its own; the temperature keeps it honest.
            row(0.2, 200, 1, 1, 0.5, "elo-416"),
            row(0.3, 200, 2, 1, 0.5, "elo-754"),
            // Stock lc0 setup used depth 30 with no node cap here, which searches
            // the full 200 ms and plays well above the 0.5 bucket:
            // row(0.4, 200, 30, 0, 0.5, "elo-999"),
            row(0.4, 200, 3, 1, 0.5, "elo-999"),
            row(0.5, 200, 4, 1, 0.5, "maia-1100.pb"),
            row(0.6, 200, 5, 1, 0.5, "maia-1500.pb"),
            row(0.7, 200, 6, 1, 0.5, "maia-1900.pb"),
            row(0.8, 200, 8, 1, 0.5, "elo-2100"),
            row(0.9, 200, 13, 1, 0.5, "elo-2304"),
            row(1.0, 200, 18, 1, 0.5, "elo-2701"),
        ];
        Self::new(buckets).expect("default difficulty table is valid")
    }
}
