//! Pipeline stage identity and ordering.
//!
//! The pipeline has exactly three stages, totally ordered. Each stage has
//! one predecessor (none for the first); a stage may not start unless its
//! predecessor is complete as derived by the status evaluator.

use serde::{Deserialize, Serialize};

/// One step of the three-step collection pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollectionStage {
    /// Market capitalization snapshot collection.
    MarketCap,
    /// OHLCV history collection for the snapshot's symbols.
    Ohlcv,
    /// Best-K parameter computation over a resolved window.
    BestK,
}

impl CollectionStage {
    /// All stages in pipeline order.
    pub const ALL: [Self; 3] = [Self::MarketCap, Self::Ohlcv, Self::BestK];

    /// The immediate predecessor stage, if any.
    #[must_use]
    pub fn predecessor(self) -> Option<Self> {
        match self {
            Self::MarketCap => None,
            Self::Ohlcv => Some(Self::MarketCap),
            Self::BestK => Some(Self::Ohlcv),
        }
    }

    /// Stable wire/log name for the stage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MarketCap => "market-cap",
            Self::Ohlcv => "ohlcv",
            Self::BestK => "best-k",
        }
    }
}

impl std::fmt::Display for CollectionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predecessor_chain_matches_pipeline_order() {
        assert_eq!(CollectionStage::MarketCap.predecessor(), None);
        assert_eq!(
            CollectionStage::Ohlcv.predecessor(),
            Some(CollectionStage::MarketCap)
        );
        assert_eq!(
            CollectionStage::BestK.predecessor(),
            Some(CollectionStage::Ohlcv)
        );
    }

    #[test]
    fn wire_names_are_stable() {
        let names: Vec<&str> = CollectionStage::ALL.iter().map(|s| s.as_str()).collect();
        assert_eq!(names, ["market-cap", "ohlcv", "best-k"]);
    }
}
