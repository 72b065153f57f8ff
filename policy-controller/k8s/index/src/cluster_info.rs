use gateway_policy_controller_core::{Config, ObjectKey};

/// Holds cluster metadata.
#[derive(Clone, Debug)]
pub struct ClusterInfo {
    /// The name this controller reports in route and policy statuses.
    pub controller_name: String,

    /// The `Limiter` resource that receives compiled counters.
    pub limiter: ObjectKey,

    /// Settings for compiled output.
    pub config: Config,
}

impl ClusterInfo {
    pub(crate) fn is_limiter(&self, namespace: &str, name: &str) -> bool {
        self.limiter.namespace == namespace && self.limiter.name == name
    }
}
