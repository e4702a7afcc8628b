//! Confidence-gated decision policy

use crate::config::ResolutionConfig;

/// What to do with an album's winning score
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Score ≥ high threshold: write the year, overwriting any existing one
    Apply,
    /// Low ≤ score < high: write only where no year is set
    ApplyIfMissing,
    /// Score < low threshold, or nothing to score: leave entries untouched
    Pending,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Apply => "Apply",
            Decision::ApplyIfMissing => "ApplyIfMissing",
            Decision::Pending => "Pending",
        }
    }

    /// Whether an entry currently holding `current` should receive `year`
    pub fn should_write(&self, current: Option<i32>, year: i32) -> bool {
        match self {
            Decision::Apply => current != Some(year),
            Decision::ApplyIfMissing => current.is_none(),
            Decision::Pending => false,
        }
    }
}

/// Thresholds for [`Decision`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionPolicy {
    pub high_threshold: i32,
    pub low_threshold: i32,
}

impl DecisionPolicy {
    pub fn new(high_threshold: i32, low_threshold: i32) -> Self {
        Self {
            high_threshold,
            low_threshold,
        }
    }

    pub fn from_config(config: &ResolutionConfig) -> Self {
        Self::new(config.high_confidence_threshold, config.low_confidence_threshold)
    }

    pub fn decide(&self, score: Option<i32>) -> Decision {
        match score {
            Some(s) if s >= self.high_threshold => Decision::Apply,
            Some(s) if s >= self.low_threshold => Decision::ApplyIfMissing,
            _ => Decision::Pending,
        }
    }

    /// Lowest score that may be cached as a positive answer
    pub fn rejection_floor(&self) -> i32 {
        self.low_threshold
    }
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self::from_config(&ResolutionConfig::default())
    }
}
