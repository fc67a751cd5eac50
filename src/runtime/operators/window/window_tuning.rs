use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// How window function values are computed within a partition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccumulationStrategy {
    /// Incremental for retractable functions, full recompute otherwise.
    #[default]
    Auto,
    /// Rebuild the accumulator from scratch for every document.
    FullRecompute,
    /// Slide one accumulator across the partition; non-retractable functions fall back to full recompute.
    Incremental,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowOperatorSpec {
    pub strategy: AccumulationStrategy,
    /// Upper bound on documents buffered for a single partition.
    pub max_partition_size: Option<usize>,
}

impl Default for WindowOperatorSpec {
    fn default() -> Self {
        Self {
            strategy: AccumulationStrategy::Auto,
            max_partition_size: None,
        }
    }
}

impl WindowOperatorSpec {
    pub fn with_strategy(mut self, strategy: AccumulationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_max_partition_size(mut self, max: usize) -> Self {
        self.max_partition_size = Some(max);
        self
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("failed to parse window operator tuning (yaml)")
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("failed to parse window operator tuning (json)")
    }
}
