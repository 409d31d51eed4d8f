//! Admission filter for newly observed targets.
//!
//! Pure: no I/O, no shared state.

use serde::{Deserialize, Serialize};

use crate::models::TargetInfo;

/// Which targets count as relevant to the crawl's domain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelevancePolicy {
    /// Only targets carrying the content-policy flag.
    #[default]
    FlaggedOnly,
    /// Only targets without the flag.
    UnflaggedOnly,
    Any,
}

impl RelevancePolicy {
    pub fn matches(self, flagged: bool) -> bool {
        match self {
            Self::FlaggedOnly => flagged,
            Self::UnflaggedOnly => !flagged,
            Self::Any => true,
        }
    }

    /// Whether searches should include flagged results at all.
    pub fn includes_flagged(self) -> bool {
        !matches!(self, Self::UnflaggedOnly)
    }
}

/// Why a target was or was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVerdict {
    Accept,
    TooSmall,
    Irrelevant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetFilter {
    pub min_audience: i64,
    pub relevance: RelevancePolicy,
}

impl Default for TargetFilter {
    fn default() -> Self {
        Self {
            min_audience: 500,
            relevance: RelevancePolicy::default(),
        }
    }
}

impl TargetFilter {
    pub fn new(min_audience: i64, relevance: RelevancePolicy) -> Self {
        Self {
            min_audience,
            relevance,
        }
    }

    pub fn evaluate(&self, info: &TargetInfo) -> FilterVerdict {
        if info.audience < self.min_audience {
            FilterVerdict::TooSmall
        } else if !self.relevance.matches(info.flagged) {
            FilterVerdict::Irrelevant
        } else {
            FilterVerdict::Accept
        }
    }

    pub fn accepts(&self, info: &TargetInfo) -> bool {
        self.evaluate(info) == FilterVerdict::Accept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(audience: i64, flagged: bool) -> TargetInfo {
        TargetInfo {
            name: "t".to_string(),
            audience,
            flagged,
            description: None,
        }
    }

    #[test]
    fn test_audience_threshold() {
        let filter = TargetFilter::new(500, RelevancePolicy::Any);
        assert_eq!(filter.evaluate(&info(499, true)), FilterVerdict::TooSmall);
        assert_eq!(filter.evaluate(&info(500, false)), FilterVerdict::Accept);
    }

    #[test]
    fn test_relevance_policies() {
        let flagged_only = TargetFilter::new(0, RelevancePolicy::FlaggedOnly);
        assert!(flagged_only.accepts(&info(10, true)));
        assert_eq!(flagged_only.evaluate(&info(10, false)), FilterVerdict::Irrelevant);

        let unflagged_only = TargetFilter::new(0, RelevancePolicy::UnflaggedOnly);
        assert!(unflagged_only.accepts(&info(10, false)));
        assert!(!unflagged_only.accepts(&info(10, true)));
        assert!(!RelevancePolicy::UnflaggedOnly.includes_flagged());
    }
}
