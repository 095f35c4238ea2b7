//! The fixed catalog of analysis features.
//!
//! Each feature is one kind of AI analysis the execution service can run.
//! Credit balances are metered per feature, so the set is closed -- adding
//! a feature means adding a variant here plus seed rows in the ledger.

use serde::{Deserialize, Serialize};

/// A dispatchable analysis feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    /// Technical chart read of a single instrument.
    ChartAnalysis,
    /// Long-form research report composition.
    Reports,
    /// News/social sentiment digest.
    Sentiment,
    /// Historical strategy backtest.
    Backtest,
}

impl Feature {
    /// Database/wire identifier for the feature.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ChartAnalysis => "chart_analysis",
            Self::Reports => "reports",
            Self::Sentiment => "sentiment",
            Self::Backtest => "backtest",
        }
    }

    /// Parse a database/wire identifier. Returns `None` for unknown names.
    pub fn from_str_opt(value: &str) -> Option<Self> {
        match value {
            "chart_analysis" => Some(Self::ChartAnalysis),
            "reports" => Some(Self::Reports),
            "sentiment" => Some(Self::Sentiment),
            "backtest" => Some(Self::Backtest),
            _ => None,
        }
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
