use crate::conditions;
use gateway_policy_controller_core::ObjectKey;
use gateway_policy_controller_k8s_api::{
    self as k8s,
    policy::{Limiter, LimiterLimit, RateLimitPolicy},
    Resource,
};
use gateway_policy_controller_k8s_index::{ClusterInfo, PolicyStatus, Update};
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};
use tokio::sync::mpsc::UnboundedReceiver;

pub struct Controller {
    client: k8s::Client,
    updates: UnboundedReceiver<Update>,
    field_manager: String,
    metrics: ControllerMetrics,
}

#[derive(Clone, Debug, Default)]
pub struct ControllerMetrics {
    patch_succeeded: Family<PatchLabels, Counter>,
    patch_failed: Family<PatchLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct PatchLabels {
    kind: String,
}

// === impl Controller ===

impl Controller {
    pub fn new(
        client: k8s::Client,
        updates: UnboundedReceiver<Update>,
        cluster_info: &ClusterInfo,
        metrics: ControllerMetrics,
    ) -> Self {
        Self {
            client,
            updates,
            field_manager: cluster_info.controller_name.clone(),
            metrics,
        }
    }

    /// Applies updates until the index is dropped.
    pub async fn process_updates(mut self) {
        let patch_params = k8s::PatchParams::apply(&self.field_manager);

        while let Some(update) = self.updates.recv().await {
            match update {
                Update::PolicyStatus {
                    id,
                    generation,
                    status,
                } => {
                    let patch = make_policy_patch(&id.name, generation, &status);
                    let api = k8s::Api::<RateLimitPolicy>::namespaced(
                        self.client.clone(),
                        &id.namespace,
                    );
                    let result = api.patch_status(&id.name, &patch_params, &patch).await;
                    self.record("RateLimitPolicy", &id, result.err());
                }
                Update::Limiter { id, limits } => {
                    let patch = make_limiter_patch(&id.name, limits);
                    let api =
                        k8s::Api::<Limiter>::namespaced(self.client.clone(), &id.namespace);
                    let result = api.patch(&id.name, &patch_params, &patch).await;
                    self.record("Limiter", &id, result.err());
                }
            }
        }
    }

    fn record(&self, kind: &str, id: &ObjectKey, error: Option<k8s::Error>) {
        let labels = PatchLabels {
            kind: kind.to_string(),
        };
        match error {
            None => {
                tracing::debug!(%kind, namespace = %id.namespace, name = %id.name, "Patched");
                self.metrics.patch_succeeded.get_or_create(&labels).inc();
            }
            Some(error) => {
                tracing::error!(%kind, namespace = %id.namespace, name = %id.name, %error, "Failed to patch");
                self.metrics.patch_failed.get_or_create(&labels).inc();
            }
        }
    }
}

// === impl ControllerMetrics ===

impl ControllerMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let metrics = Self::default();
        prom.register(
            "patch_succeeded",
            "Count of successful patch operations",
            metrics.patch_succeeded.clone(),
        );
        prom.register(
            "patch_failed",
            "Count of failed patch operations",
            metrics.patch_failed.clone(),
        );
        metrics
    }
}

/// Builds a merge patch for a policy's status subresource.
pub fn make_policy_patch(
    name: &str,
    generation: Option<i64>,
    status: &PolicyStatus,
) -> k8s::Patch<serde_json::Value> {
    #[cfg(not(test))]
    let timestamp = chrono::Utc::now();
    #[cfg(test)]
    let timestamp = chrono::DateTime::<chrono::Utc>::MIN_UTC;

    let conditions = conditions::policy_conditions(status, timestamp)
        .into_iter()
        .map(|mut condition| {
            condition.observed_generation = generation;
            condition
        })
        .collect::<Vec<_>>();

    let value = serde_json::json!({
        "apiVersion": RateLimitPolicy::api_version(&()),
        "kind": RateLimitPolicy::kind(&()),
        "name": name,
        "status": {
            "observedGeneration": generation,
            "conditions": conditions,
        },
    });
    k8s::Patch::Merge(value)
}

/// Builds a merge patch that replaces the limiter's counters.
pub fn make_limiter_patch(name: &str, limits: Vec<LimiterLimit>) -> k8s::Patch<serde_json::Value> {
    let value = serde_json::json!({
        "apiVersion": Limiter::api_version(&()),
        "kind": Limiter::kind(&()),
        "name": name,
        "spec": { "limits": limits },
    });
    k8s::Patch::Merge(value)
}
