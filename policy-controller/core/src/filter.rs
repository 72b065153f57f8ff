//! Configuration consumed by the proxy's rate limiting filter.
//!
//! The filter evaluates each policy's rules against a request. A rule applies when any of its
//! conditions holds (or when it has none); an applying rule contributes its data items as
//! descriptor entries on the call to the limiter service, under the policy's domain.

use crate::Error;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterConfig {
    pub failure_mode_deny: bool,
    pub policies: Vec<FilterPolicy>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterPolicy {
    /// The locator of the policy that contributed the rules.
    pub name: String,

    /// The limiter namespace that counters are evaluated in.
    pub domain: String,

    pub service: String,
    pub hostnames: Vec<String>,
    pub rules: Vec<CompiledRule>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledRule {
    /// Alternatives; an empty list always matches.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    pub data: Vec<DataItem>,
}

/// A conjunction of pattern expressions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub all_of: Vec<PatternExpression>,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PatternExpression {
    pub selector: String,
    pub operator: Operator,
    pub value: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Eq,
    Neq,
    StartsWith,
    EndsWith,
    Incl,
    Excl,
    Matches,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataItem {
    /// A fixed descriptor entry.
    Static { key: String, value: String },

    /// A descriptor entry resolved from request attributes at request time.
    Selector {
        selector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<String>,
    },
}

// === impl FilterConfig ===

impl FilterConfig {
    pub fn to_json(&self) -> Result<serde_json::Value, Error> {
        Ok(serde_json::to_value(self)?)
    }

    /// Total number of compiled rules across all policies.
    pub fn rules_len(&self) -> usize {
        self.policies.iter().map(|p| p.rules.len()).sum()
    }
}

// === impl PatternExpression ===

impl PatternExpression {
    pub fn new(selector: impl ToString, operator: Operator, value: impl ToString) -> Self {
        Self {
            selector: selector.to_string(),
            operator,
            value: value.to_string(),
        }
    }
}

// === impl Operator ===

impl std::str::FromStr for Operator {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "eq" => Ok(Self::Eq),
            "neq" => Ok(Self::Neq),
            "startswith" => Ok(Self::StartsWith),
            "endswith" => Ok(Self::EndsWith),
            "incl" => Ok(Self::Incl),
            "excl" => Ok(Self::Excl),
            "matches" => Ok(Self::Matches),
            _ => anyhow::bail!("unsupported operator: {s}"),
        }
    }
}
