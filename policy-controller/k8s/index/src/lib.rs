//! Gateway Policy Controller index
//!
//! The index holds the cluster resources that rate limit compilation depends on:
//!
//! - Each `Gateway` is indexed with its listeners and whether it has been programmed.
//! - Each `HTTPRoute` is indexed with its parent references, which are only followed once the
//!   gateway has accepted the route, and its rules.
//! - Each `RateLimitPolicy` targets a gateway, a listener, a route or a route rule.
//! - The configured `Limiter` reports the counters that the limiter service currently enforces.
//!
//! ```text
//! [ Gateway ] <- [ HTTPRoute ] <- [ RateLimitPolicy ]
//!       \            /
//!        [ compile ] --> [ proxy filters ] + [ Limiter ]
//! ```
//!
//! Every update reruns compilation over the whole index. The compiled output is published on a
//! watch that only notifies when it changes; writes back to the cluster (policy statuses and
//! limiter counters) are sent on an update channel to be applied by the status controller.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod cluster_info;
mod gateway;
mod http_route;
mod index;
mod limiter;
pub mod metrics;
mod ratelimit_policy;


pub use self::{
    cluster_info::ClusterInfo,
    index::{Enforcement, Index, PolicyStatus, SharedIndex, Update},
    limiter::limiter_limits,
    metrics::IndexMetrics,
};
