//! Writes controller results back to the cluster.
//!
//! The index emits an [`Update`] whenever a policy's characterization changes or the limiter's
//! counters need to be replaced. The [`Controller`] turns each update into a merge patch: policy
//! updates patch the `RateLimitPolicy` status subresource with `Accepted` and `Enforced`
//! conditions, and limiter updates replace the `Limiter`'s `spec.limits`.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod conditions;
mod controller;


pub use self::{
    conditions::{accepted, enforced, policy_conditions},
    controller::{make_limiter_patch, make_policy_patch, Controller, ControllerMetrics},
};
pub use gateway_policy_controller_k8s_index::Update;
