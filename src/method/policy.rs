use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Stage;

/// Rule selecting which stage's result a dispatch returns.
///
/// Every pre- and post-handler runs regardless of the policy; the policy
/// only picks which successful result is surfaced. An error from any stage
/// always wins over every policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ResultPolicy {
    /// Return the primary handler's result
    #[default]
    #[serde(rename = "primary", alias = "primary_result")]
    PrimaryResult,
    /// Return the first non-null result produced by any stage
    #[serde(rename = "first_non_null", alias = "first")]
    FirstNonNullResult,
    /// Return the result of the last stage that ran (waterfall)
    #[serde(rename = "last", alias = "latest", alias = "last_result")]
    LastResult,
}

impl ResultPolicy {
    /// Parse a policy name (`primary`, `first`/`first_non_null`, `last`/`latest`)
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "primary" | "primary_result" => Some(Self::PrimaryResult),
            "first" | "first_non_null" | "first_non_null_result" => Some(Self::FirstNonNullResult),
            "last" | "latest" | "last_result" => Some(Self::LastResult),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrimaryResult => "primary",
            Self::FirstNonNullResult => "first_non_null",
            Self::LastResult => "last",
        }
    }

    /// Fold one successful stage result into the selected value.
    ///
    /// Stages must be fed in execution order. `value` is already normalized,
    /// so `None` means the stage produced no result.
    #[inline]
    pub(crate) fn absorb(&self, selected: &mut Option<Value>, stage: Stage, value: Option<Value>) {
        match self {
            Self::PrimaryResult => {
                if stage == Stage::Primary {
                    *selected = value;
                }
            }
            Self::FirstNonNullResult => {
                if selected.is_none() {
                    *selected = value;
                }
            }
            Self::LastResult => *selected = value,
        }
    }
}
