//! Write strategy selection

use serde::Serialize;
use std::fmt;

/// How a window's records reach the warehouse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteStrategy {
    /// Batched upserts
    Streaming,
    /// Staging artifact, staging table, then one merge
    Bulk,
}

impl WriteStrategy {
    /// Pick a strategy from a window's estimated size
    ///
    /// Windows strictly above `threshold` go bulk. An unknown estimate is
    /// treated as small.
    ///
    /// ```
    /// use strata::core::strategy::WriteStrategy;
    ///
    /// assert_eq!(WriteStrategy::choose(Some(10_001), 10_000), WriteStrategy::Bulk);
    /// assert_eq!(WriteStrategy::choose(Some(10_000), 10_000), WriteStrategy::Streaming);
    /// assert_eq!(WriteStrategy::choose(None, 10_000), WriteStrategy::Streaming);
    /// ```
    pub fn choose(count_estimate: Option<u64>, threshold: u64) -> Self {
        match count_estimate {
            Some(count) if count > threshold => WriteStrategy::Bulk,
            _ => WriteStrategy::Streaming,
        }
    }

    /// Apply a caller override (`Some(true)` forces bulk) before the estimate
    pub fn resolve(force_bulk: Option<bool>, count_estimate: Option<u64>, threshold: u64) -> Self {
        match force_bulk {
            Some(true) => WriteStrategy::Bulk,
            Some(false) => WriteStrategy::Streaming,
            None => Self::choose(count_estimate, threshold),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WriteStrategy::Streaming => "streaming",
            WriteStrategy::Bulk => "bulk",
        }
    }
}

impl fmt::Display for WriteStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
