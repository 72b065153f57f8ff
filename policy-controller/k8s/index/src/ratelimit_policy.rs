use anyhow::{bail, Context, Result};
use gateway_policy_controller_core::{
    Limit, MergeStrategy, ObjectKey, PatternExpression, Policy, PolicySpec, Rate, RateUnit,
    Strategy, TargetRef,
};
use gateway_policy_controller_k8s_api::{
    gateway,
    policy::{self as api, RateLimitPolicy},
    ResourceExt,
};
use std::collections::BTreeMap;

/// Converts a `RateLimitPolicy` resource into a core policy.
pub(crate) fn policy(resource: RateLimitPolicy) -> Result<Policy> {
    let namespace = resource.namespace().context("policy must have a namespace")?;
    let name = resource.name_unchecked();
    let key = ObjectKey::new(namespace, name);

    let target_ref = target_ref(resource.spec.target_ref)?;

    let api::RateLimitPolicySpec {
        defaults,
        overrides,
        when,
        limits,
        ..
    } = resource.spec;

    let implicit = when.is_some() || limits.is_some();
    let (strategy, when, limits) = match (defaults, overrides) {
        (Some(_), Some(_)) => bail!("policy must not set both defaults and overrides"),
        (Some(_), None) | (None, Some(_)) if implicit => {
            bail!("policy must not mix top-level limits with defaults or overrides")
        }
        (Some(rules), None) => (
            MergeStrategy::Defaults(strategy(rules.strategy.as_deref())?),
            rules.when,
            rules.limits,
        ),
        (None, Some(rules)) => (
            MergeStrategy::Overrides(strategy(rules.strategy.as_deref())?),
            rules.when,
            rules.limits,
        ),
        (None, None) => (MergeStrategy::Defaults(Strategy::Atomic), when, limits),
    };

    let rules = limits
        .into_iter()
        .flatten()
        .map(|(name, l)| {
            let limit = limit(l).with_context(|| format!("invalid limit {name:?}"))?;
            Ok((name, limit))
        })
        .collect::<Result<BTreeMap<_, _>>>()?;

    Ok(Policy::RateLimit(PolicySpec {
        key,
        target_refs: vec![target_ref],
        strategy,
        when: predicates(when)?,
        rules,
    }))
}

fn target_ref(target_ref: api::PolicyTargetReference) -> Result<TargetRef> {
    let targets_gateway = target_ref.targets_kind::<gateway::Gateway>();
    let targets_route = target_ref.targets_kind::<gateway::HttpRoute>();
    if !targets_gateway && !targets_route {
        bail!("unsupported target kind: {}", target_ref.canonical_kind());
    }

    let target = if targets_gateway {
        TargetRef::gateway(target_ref.name)
    } else {
        TargetRef::http_route(target_ref.name)
    };

    Ok(match target_ref.section_name {
        Some(section) => target.with_section(section),
        None => target,
    })
}

fn strategy(strategy: Option<&str>) -> Result<Strategy> {
    match strategy {
        None | Some("atomic") => Ok(Strategy::Atomic),
        Some("merge") => Ok(Strategy::Merge),
        Some(s) => bail!("unknown merge strategy: {s}"),
    }
}

fn limit(limit: api::Limit) -> Result<Limit> {
    let rates = limit
        .rates
        .into_iter()
        .map(|api::Rate { limit, duration, unit }| Rate {
            limit,
            duration,
            unit: RateUnit::from(unit.as_str()),
        })
        .collect();

    Ok(Limit {
        rates,
        counters: limit.counters.unwrap_or_default(),
        when: predicates(limit.when)?,
    })
}

fn predicates(when: Option<Vec<api::WhenCondition>>) -> Result<Vec<PatternExpression>> {
    when.into_iter()
        .flatten()
        .map(|api::WhenCondition { selector, operator, value }| {
            let operator = operator.parse()?;
            Ok(PatternExpression::new(selector, operator, value))
        })
        .collect()
}
