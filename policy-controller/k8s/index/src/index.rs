use crate::{
    cluster_info::ClusterInfo, gateway, http_route, limiter, metrics::IndexMetrics,
    ratelimit_policy,
};
use ahash::AHashMap as HashMap;
use gateway_policy_controller_core::{
    compile, Compiled, Gateway, LimitIndex, ObjectKey, Policy, PolicyKind, Route, Topology,
};
use gateway_policy_controller_k8s_api::{
    gateway as api,
    policy::{Limiter, LimiterLimit, RateLimitPolicy},
    Resource, ResourceExt,
};
use parking_lot::RwLock;
use std::{collections::BTreeSet, sync::Arc};
use tokio::sync::{mpsc::UnboundedSender, watch};

pub type SharedIndex = Arc<RwLock<Index>>;

/// Holds the resources that feed compilation and the outputs of the last pass.
///
/// Every change to an indexed resource reruns the full pipeline. The compiled snapshot is
/// published on a watch, and changes that must be written back to the cluster (policy statuses and
/// the limiter's counters) are sent as [`Update`]s.
pub struct Index {
    cluster_info: ClusterInfo,

    gateways: HashMap<ObjectKey, Gateway>,
    routes: HashMap<ObjectKey, Route>,
    policies: HashMap<ObjectKey, PolicyEntry>,

    /// The counters currently configured on the limiter. `None` until the limiter is observed.
    deployed: Option<LimitIndex>,

    /// The last limiter configuration sent for writing, so that it isn't resent while the write is
    /// in flight. Cleared whenever a different limiter configuration is observed.
    pending_limiter: Option<LimitIndex>,

    /// The last status sent for each policy.
    statuses: HashMap<ObjectKey, (Option<i64>, PolicyStatus)>,

    compiled: watch::Sender<Compiled>,
    updates: UnboundedSender<Update>,
    metrics: IndexMetrics,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Update {
    PolicyStatus {
        id: ObjectKey,
        generation: Option<i64>,
        status: PolicyStatus,
    },
    Limiter {
        id: ObjectKey,
        limits: Vec<LimiterLimit>,
    },
}

/// Characterizes a policy after a compilation pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PolicyStatus {
    Accepted { enforcement: Enforcement },
    TargetNotFound,
    Invalid(String),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Enforcement {
    /// At least one of the policy's limits is effective on some path.
    Enforced,

    /// The policy reaches at least one path, but its limits are replaced by other policies.
    Overridden,

    /// The policy reaches no path or has no limits.
    Unknown,
}

struct PolicyEntry {
    generation: Option<i64>,
    policy: Result<Policy, String>,
}

// === impl Index ===

impl Index {
    pub fn shared(
        cluster_info: ClusterInfo,
        updates: UnboundedSender<Update>,
        metrics: IndexMetrics,
    ) -> SharedIndex {
        let (compiled, _) = watch::channel(Compiled::default());
        Arc::new(RwLock::new(Self {
            cluster_info,
            gateways: HashMap::default(),
            routes: HashMap::default(),
            policies: HashMap::default(),
            deployed: None,
            pending_limiter: None,
            statuses: HashMap::default(),
            compiled,
            updates,
            metrics,
        }))
    }

    /// Watches the compiled output of the index.
    pub fn compiled(&self) -> watch::Receiver<Compiled> {
        self.compiled.subscribe()
    }

    /// Returns the limiter configuration to deploy when the compiled counters differ from the
    /// deployed ones. A limiter that hasn't been observed is treated as having no counters.
    pub fn limiter_update(&self) -> Option<Vec<LimiterLimit>> {
        let compiled = self.compiled.borrow();
        let changed = match &self.deployed {
            Some(deployed) => compiled.limits != *deployed,
            None => !compiled.limits.is_empty(),
        };
        changed.then(|| limiter::limiter_limits(&compiled.limits))
    }

    /// Reruns the pipeline over the indexed resources and publishes the results.
    fn reindex(&mut self) {
        let policies = self
            .policies
            .values()
            .filter_map(|entry| entry.policy.as_ref().ok())
            .cloned();
        let topology = Topology::build(
            self.gateways.values().cloned(),
            self.routes.values().cloned(),
            policies,
        );
        let compiled = compile(&self.cluster_info.config, &topology);

        let invalid = self.policies.values().filter(|e| e.policy.is_err()).count();
        let unattached = topology.unattached().count();
        let rules = compiled.filters.values().map(|f| f.rules_len()).sum::<usize>();
        tracing::debug!(
            gateways = self.gateways.len(),
            routes = self.routes.len(),
            policies = self.policies.len(),
            invalid,
            unattached,
            rules,
            counters = compiled.limits.len(),
            "Reindexed"
        );
        self.metrics.reindexed(unattached, invalid, rules);
        self.metrics.set_size("Gateway", self.gateways.len());
        self.metrics.set_size("HTTPRoute", self.routes.len());
        self.metrics.set_size("RateLimitPolicy", self.policies.len());

        self.update_statuses(&topology, &compiled);

        let modified = self.compiled.send_if_modified(|current| {
            if *current == compiled {
                return false;
            }
            *current = compiled;
            true
        });
        if modified {
            tracing::debug!("Compiled output changed");
        }

        self.update_limiter();
    }

    fn update_statuses(&mut self, topology: &Topology, compiled: &Compiled) {
        let contributors = compiled.effective.contributors();
        let reachable = reachable_policies(topology, compiled);

        let mut keys = self.policies.keys().cloned().collect::<Vec<_>>();
        keys.sort();
        for key in keys {
            let Some(entry) = self.policies.get(&key) else {
                continue;
            };
            let status = match &entry.policy {
                Err(error) => PolicyStatus::Invalid(error.clone()),
                Ok(_) if !topology.is_attached(PolicyKind::RateLimit, &key) => {
                    PolicyStatus::TargetNotFound
                }
                Ok(policy) => {
                    let enforcement = if contributors.contains(&key) {
                        Enforcement::Enforced
                    } else if reachable.contains(&key) && policy.rules_len() > 0 {
                        Enforcement::Overridden
                    } else {
                        Enforcement::Unknown
                    };
                    PolicyStatus::Accepted { enforcement }
                }
            };

            let generation = entry.generation;
            if self.statuses.get(&key) == Some(&(generation, status.clone())) {
                continue;
            }
            tracing::debug!(policy = %key, ?status, "Policy status changed");
            self.statuses
                .insert(key.clone(), (generation, status.clone()));
            self.send(Update::PolicyStatus {
                id: key,
                generation,
                status,
            });
        }

        let policies = &self.policies;
        self.statuses.retain(|key, _| policies.contains_key(key));
    }

    fn update_limiter(&mut self) {
        let Some(limits) = self.limiter_update() else {
            self.pending_limiter = None;
            return;
        };
        let compiled = self.compiled.borrow().limits.clone();
        if self.pending_limiter.as_ref() == Some(&compiled) {
            return;
        }

        tracing::info!(
            limiter = %self.cluster_info.limiter,
            counters = limits.len(),
            "Updating limiter counters"
        );
        self.metrics.limiter_updated();
        self.pending_limiter = Some(compiled);
        self.send(Update::Limiter {
            id: self.cluster_info.limiter.clone(),
            limits,
        });
    }

    fn send(&self, update: Update) {
        if let Err(error) = self.updates.send(update) {
            tracing::error!(%error, "Failed to send update");
        }
    }
}

impl kubert::index::IndexNamespacedResource<api::Gateway> for Index {
    fn apply(&mut self, resource: api::Gateway) {
        let Some(key) = object_key(&resource) else {
            tracing::warn!(name = %resource.name_any(), "Gateway must have a namespace");
            return;
        };
        let gateway = gateway::gateway(key.clone(), resource);
        if self.gateways.get(&key) == Some(&gateway) {
            return;
        }
        tracing::debug!(gateway = %key, ready = gateway.ready, "Indexing gateway");
        self.gateways.insert(key, gateway);
        self.reindex();
    }

    fn delete(&mut self, namespace: String, name: String) {
        let key = ObjectKey::new(namespace, name);
        if self.gateways.remove(&key).is_some() {
            tracing::debug!(gateway = %key, "Deleted gateway");
            self.reindex();
        }
    }
}

impl kubert::index::IndexNamespacedResource<api::HttpRoute> for Index {
    fn apply(&mut self, resource: api::HttpRoute) {
        let Some(key) = object_key(&resource) else {
            tracing::warn!(name = %resource.name_any(), "HTTPRoute must have a namespace");
            return;
        };
        match http_route::route(key.clone(), resource) {
            Ok(route) => {
                if self.routes.get(&key) == Some(&route) {
                    return;
                }
                tracing::debug!(route = %key, "Indexing route");
                self.routes.insert(key, route);
            }
            Err(error) => {
                tracing::warn!(route = %key, %error, "Ignoring invalid route");
                if self.routes.remove(&key).is_none() {
                    return;
                }
            }
        }
        self.reindex();
    }

    fn delete(&mut self, namespace: String, name: String) {
        let key = ObjectKey::new(namespace, name);
        if self.routes.remove(&key).is_some() {
            tracing::debug!(route = %key, "Deleted route");
            self.reindex();
        }
    }
}

impl kubert::index::IndexNamespacedResource<RateLimitPolicy> for Index {
    fn apply(&mut self, resource: RateLimitPolicy) {
        let Some(key) = object_key(&resource) else {
            tracing::warn!(name = %resource.name_any(), "RateLimitPolicy must have a namespace");
            return;
        };
        let generation = resource.meta().generation;
        let policy = ratelimit_policy::policy(resource).map_err(|error| format!("{error:#}"));
        if let Err(error) = &policy {
            tracing::warn!(policy = %key, %error, "Invalid policy");
        }
        tracing::debug!(policy = %key, ?generation, "Indexing policy");
        self.policies.insert(key, PolicyEntry { generation, policy });
        self.reindex();
    }

    fn delete(&mut self, namespace: String, name: String) {
        let key = ObjectKey::new(namespace, name);
        if self.policies.remove(&key).is_some() {
            tracing::debug!(policy = %key, "Deleted policy");
            self.reindex();
        }
    }
}

impl kubert::index::IndexNamespacedResource<Limiter> for Index {
    fn apply(&mut self, resource: Limiter) {
        let namespace = resource.namespace().unwrap_or_default();
        if !self
            .cluster_info
            .is_limiter(&namespace, &resource.name_unchecked())
        {
            return;
        }
        let deployed = limiter::deployed(&resource);
        tracing::debug!(limiter = %self.cluster_info.limiter, counters = deployed.len(), "Observed limiter");
        // A new observation settles any write in flight, whether or not it landed.
        if self.deployed.as_ref() != Some(&deployed) {
            self.pending_limiter = None;
        }
        self.deployed = Some(deployed);
        self.update_limiter();
    }

    fn delete(&mut self, namespace: String, name: String) {
        if !self.cluster_info.is_limiter(&namespace, &name) {
            return;
        }
        tracing::debug!(limiter = %self.cluster_info.limiter, "Limiter deleted");
        self.deployed = None;
        self.pending_limiter = None;
        self.update_limiter();
    }
}

fn object_key<T: Resource>(resource: &T) -> Option<ObjectKey> {
    Some(ObjectKey::new(resource.namespace()?, resource.name_unchecked()))
}

/// Policies attached to a node on at least one path.
fn reachable_policies(topology: &Topology, compiled: &Compiled) -> BTreeSet<ObjectKey> {
    compiled
        .effective
        .iter()
        .flat_map(|(path, _)| path.attachment_points())
        .flat_map(|node| {
            topology
                .policies_at(&node, PolicyKind::RateLimit)
                .map(|p| p.key().clone())
                .collect::<Vec<_>>()
        })
        .collect()
}
