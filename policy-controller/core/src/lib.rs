//! Gateway policy compilation.
//!
//! The controller turns rate limit policies attached to Gateway API resources into configuration
//! for two consumers: the proxy's rate limiting filter and the limiter service. Every pass is a
//! pure projection of the resources currently known to the controller:
//!
//! ```text
//! [ Gateway ] <- [ HTTPRoute ] <- [ Policy ]
//!      |              |
//!      +-- paths -----+--> merge --> compile --> [ FilterConfig ] + [ LimitIndex ]
//! ```
//!
//! - [`topology`] links gateways, listeners, routes and route rules, and attaches policies to
//!   them.
//! - [`merge`] resolves the effective rule set of every gateway-to-rule path, honoring defaults
//!   and overrides.
//! - [`ratelimit`] compiles effective limits into filter rules and limiter counters.
//! - [`limits`] aggregates counters so that a recomputed set can be compared against the deployed
//!   one without regard to ordering.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod config;
pub mod filter;
pub mod limits;
pub mod merge;
pub mod policy;
pub mod ratelimit;
pub mod routes;
pub mod topology;

#[cfg(test)]
mod tests;

pub use self::{
    config::Config,
    filter::{CompiledRule, Condition, DataItem, FilterConfig, FilterPolicy, Operator, PatternExpression},
    limits::{CounterDefinition, LimitIndex, LimitScope},
    merge::{EffectivePolicies, EffectiveRule, EffectiveRuleSet},
    policy::{Limit, MergeStrategy, Policy, PolicyKind, PolicySpec, Rate, RateUnit, Rule, Strategy, TargetRef},
    ratelimit::{compile, Compiled},
    topology::{Gateway, Listener, ParentRef, Path, PathError, PathErrorReason, PathNode, Route, RouteRule, Topology},
};

/// Identifies a namespaced resource.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to serialize proxy filter configuration: {0}")]
    Serialize(#[from] serde_json::Error),
}

// === impl ObjectKey ===

impl ObjectKey {
    pub fn new(namespace: impl ToString, name: impl ToString) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
