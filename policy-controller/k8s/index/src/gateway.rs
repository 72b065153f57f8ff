use gateway_policy_controller_core::{Gateway, Listener, ObjectKey};
use gateway_policy_controller_k8s_api::{gateway as api, Condition};

/// Condition types that indicate a gateway has been configured by its implementation. `Ready` is
/// reported by implementations that predate `Programmed`.
const READY_CONDITIONS: [&str; 2] = ["Programmed", "Ready"];

pub(crate) fn gateway(key: ObjectKey, gateway: api::Gateway) -> Gateway {
    let ready = gateway
        .status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .into_iter()
        .flatten()
        .any(is_ready);

    let listeners = gateway
        .spec
        .listeners
        .into_iter()
        .map(|l| Listener {
            name: l.name,
            hostname: l.hostname.filter(|h| !h.is_empty()),
        })
        .collect();

    Gateway {
        key,
        class_name: gateway.spec.gateway_class_name,
        ready,
        listeners,
    }
}

fn is_ready(condition: &Condition) -> bool {
    READY_CONDITIONS.contains(&condition.type_.as_str()) && condition.status == "True"
}
