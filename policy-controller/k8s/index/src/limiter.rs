use gateway_policy_controller_core::{CounterDefinition, LimitIndex};
use gateway_policy_controller_k8s_api::policy::{Limiter, LimiterLimit};

/// Reads the counters currently deployed to the limiter.
pub(crate) fn deployed(limiter: &Limiter) -> LimitIndex {
    LimitIndex::from_deployed(
        limiter
            .spec
            .limits
            .iter()
            .flatten()
            .cloned()
            .map(counter_definition),
    )
}

/// Renders a limit index as the limiter's `spec.limits`.
pub fn limiter_limits(limits: &LimitIndex) -> Vec<LimiterLimit> {
    limits.flatten().into_iter().map(limiter_limit).collect()
}

fn counter_definition(limit: LimiterLimit) -> CounterDefinition {
    CounterDefinition {
        namespace: limit.namespace,
        max_value: limit.max_value,
        seconds: limit.seconds,
        conditions: limit.conditions.unwrap_or_default(),
        variables: limit.variables.unwrap_or_default(),
    }
}

fn limiter_limit(def: CounterDefinition) -> LimiterLimit {
    LimiterLimit {
        namespace: def.namespace,
        max_value: def.max_value,
        seconds: def.seconds,
        conditions: Some(def.conditions),
        variables: Some(def.variables),
    }
}
