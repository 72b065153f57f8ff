//! Compiles effective rate limits into proxy filter rules and limiter counters.

use crate::{
    filter::{CompiledRule, Condition, DataItem, FilterConfig, FilterPolicy, Operator, PatternExpression},
    limits::{CounterDefinition, LimitIndex, LimitScope},
    merge::{self, EffectivePolicies},
    policy::{Limit, PolicyKind, Rate, RateUnit, Rule},
    routes::{HeaderMatch, HttpRouteMatch, PathMatch},
    topology::{RouteRule, Topology},
    Config, ObjectKey,
};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// Prefixes every limit identifier.
pub const IDENTIFIER_PREFIX: &str = "limit.";

/// The descriptor value that marks a limit as active for a request.
const ACTIVE: &str = "1";

/// The output of one compilation pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Compiled {
    /// Proxy filter configuration by gateway. Gateways without effective limits are absent.
    pub filters: BTreeMap<ObjectKey, FilterConfig>,

    /// Limiter counters by scope.
    pub limits: LimitIndex,

    /// The effective rate limit rules that were compiled.
    pub effective: EffectivePolicies,
}

/// Runs the full pipeline over a topology: resolves effective rate limits for every path and
/// compiles them.
pub fn compile(config: &Config, topology: &Topology) -> Compiled {
    let effective = merge::resolve(topology, PolicyKind::RateLimit);

    let mut policies = BTreeMap::<ObjectKey, BTreeMap<String, FilterPolicy>>::new();
    let mut limits = LimitIndex::default();
    let mut counted = BTreeSet::<(LimitScope, String)>::new();

    for (path, rules) in effective.iter() {
        let Some(route_rule) = topology.route_rule(&path.route, &path.rule) else {
            continue;
        };

        for (name, effective_rule) in rules {
            let Rule::Limit(limit) = &effective_rule.rule else {
                continue;
            };
            if limit.rates.is_empty() {
                tracing::debug!(policy = %effective_rule.source, limit = %name, "Skipping limit without rates");
                continue;
            }

            let id = identifier(&effective_rule.source, name);
            let scope = LimitScope::new(&path.gateway, effective_rule.source.to_string());
            let namespace = scope.to_string();

            let when = effective_rule
                .when
                .iter()
                .chain(&limit.when)
                .cloned()
                .collect::<Vec<_>>();
            let rule = CompiledRule {
                conditions: conditions(route_rule, &when),
                data: data(&id, limit),
            };

            let policy = policies
                .entry(path.gateway.clone())
                .or_default()
                .entry(namespace.clone())
                .or_insert_with(|| FilterPolicy {
                    name: effective_rule.source.to_string(),
                    domain: namespace.clone(),
                    service: config.service.clone(),
                    hostnames: vec![],
                    rules: vec![],
                });
            add_hostnames(&mut policy.hostnames, &path.hostnames);
            if !policy.rules.contains(&rule) {
                policy.rules.push(rule);
            }

            if counted.insert((scope.clone(), id.clone())) {
                for counter in counter_definitions(&namespace, &id, limit) {
                    limits.insert(scope.clone(), counter);
                }
            }
        }
    }

    let filters = policies
        .into_iter()
        .map(|(gateway, policies)| {
            let filter = FilterConfig {
                failure_mode_deny: config.failure_mode_deny,
                policies: policies.into_values().collect(),
            };
            tracing::debug!(%gateway, rules = filter.rules_len(), "Compiled filter configuration");
            (gateway, filter)
        })
        .collect();

    Compiled {
        filters,
        limits,
        effective,
    }
}

/// Derives a limiter-safe identifier for a policy's named limit.
///
/// The rule name is reduced to `[A-Za-z0-9_]` and suffixed with a digest of the policy locator and
/// rule name, so that names that sanitize identically, or that are shared by different policies,
/// don't collide.
pub fn identifier(policy: &ObjectKey, rule_name: &str) -> String {
    let sanitized = format!("{IDENTIFIER_PREFIX}{rule_name}")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect::<String>();

    let digest = Sha256::digest(format!("{policy}/{rule_name}").as_bytes());
    format!("{sanitized}__{}", hex::encode(&digest[..4]))
}

/// Builds the conditions under which a limit applies to a route rule: one block per match
/// alternative, each extended with the limit's predicates.
pub fn conditions(rule: &RouteRule, when: &[PatternExpression]) -> Vec<Condition> {
    if rule.matches.is_empty() {
        if when.is_empty() {
            return vec![];
        }
        return vec![Condition {
            all_of: when.to_vec(),
        }];
    }

    rule.matches
        .iter()
        .map(|m| {
            let mut all_of = match_patterns(m);
            all_of.extend(when.iter().cloned());
            Condition { all_of }
        })
        .collect()
}

/// Builds the descriptor entries for a limit: the activation marker, then one entry per counter.
pub fn data(identifier: &str, limit: &Limit) -> Vec<DataItem> {
    let mut data = vec![DataItem::Static {
        key: identifier.to_string(),
        value: ACTIVE.to_string(),
    }];
    data.extend(limit.counters.iter().map(|counter| DataItem::Selector {
        selector: selector_reference(counter),
        key: Some(counter.clone()),
        default: None,
    }));
    data
}

/// Builds one limiter counter per rate of the limit.
pub fn counter_definitions(namespace: &str, identifier: &str, limit: &Limit) -> Vec<CounterDefinition> {
    let conditions = vec![format!(
        "{} == \"{ACTIVE}\"",
        descriptor_reference(identifier)
    )];
    let variables = limit
        .counters
        .iter()
        .map(|c| descriptor_reference(c))
        .collect::<Vec<_>>();

    limit
        .rates
        .iter()
        .map(|rate| CounterDefinition {
            namespace: namespace.to_string(),
            max_value: rate.max_value(),
            seconds: rate.seconds(),
            conditions: conditions.clone(),
            variables: variables.clone(),
        })
        .collect()
}

/// Rewrites a dotted attribute path so that array indices and keys containing dots are
/// addressed with brackets, e.g. `auth.identity.groups.0` becomes `auth.identity.groups[0]` and
/// `metadata.filter_metadata.envoy\.filters\.http\.ext_authz.identity` becomes
/// `metadata.filter_metadata["envoy.filters.http.ext_authz"].identity`.
pub fn selector_reference(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for (i, segment) in split_path(path).iter().enumerate() {
        if segment.contains('.') {
            out.push_str(&format!("[\"{segment}\"]"));
        } else if i > 0 && !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
            out.push_str(&format!("[{segment}]"));
        } else {
            if i > 0 {
                out.push('.');
            }
            out.push_str(segment);
        }
    }
    out
}

/// Splits a dotted path on unescaped dots.
fn split_path(path: &str) -> Vec<String> {
    let mut segments = vec![];
    let mut current = String::new();
    let mut chars = path.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'.') => {
                chars.next();
                current.push('.');
            }
            '.' => segments.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    segments.push(current);
    segments
}

fn descriptor_reference(key: &str) -> String {
    let key = key.replace('\\', "\\\\").replace('"', "\\\"");
    format!("descriptors[0][\"{key}\"]")
}

fn match_patterns(m: &HttpRouteMatch) -> Vec<PatternExpression> {
    let mut patterns = Vec::with_capacity(2 + m.headers.len());

    patterns.push(match &m.path {
        Some(PathMatch::Exact(p)) => PatternExpression::new("request.url_path", Operator::Eq, p),
        Some(PathMatch::Prefix(p)) => {
            PatternExpression::new("request.url_path", Operator::StartsWith, p)
        }
        Some(PathMatch::Regex(r)) => {
            PatternExpression::new("request.url_path", Operator::Matches, r.as_str())
        }
        None => PatternExpression::new("request.url_path", Operator::StartsWith, "/"),
    });

    if let Some(method) = &m.method {
        patterns.push(PatternExpression::new(
            "request.method",
            Operator::Eq,
            method.as_str(),
        ));
    }

    for header in &m.headers {
        let selector = format!("request.headers.{}", header.name().to_ascii_lowercase());
        patterns.push(match header {
            HeaderMatch::Exact(_, value) => PatternExpression::new(selector, Operator::Eq, value),
            HeaderMatch::Regex(_, r) => PatternExpression::new(selector, Operator::Matches, r.as_str()),
        });
    }

    patterns
}

fn add_hostnames(hostnames: &mut Vec<String>, path: &[String]) {
    let path = if path.is_empty() {
        vec!["*".to_string()]
    } else {
        path.to_vec()
    };
    hostnames.extend(path);
    hostnames.sort();
    hostnames.dedup();
}

// === impl Rate ===

impl Rate {
    /// The counter's ceiling. Negative limits are treated as zero.
    pub fn max_value(&self) -> u64 {
        u64::try_from(self.limit).unwrap_or(0)
    }

    /// The counter's window. Non-positive durations and unknown units yield zero.
    pub fn seconds(&self) -> u64 {
        if self.duration <= 0 {
            return 0;
        }
        let Some(unit) = self.unit.seconds() else {
            return 0;
        };
        u64::try_from(self.duration)
            .unwrap_or(0)
            .saturating_mul(unit)
    }
}

// === impl RateUnit ===

impl RateUnit {
    pub fn seconds(&self) -> Option<u64> {
        match self {
            Self::Second => Some(1),
            Self::Minute => Some(60),
            Self::Hour => Some(60 * 60),
            Self::Day => Some(24 * 60 * 60),
            Self::Unknown => None,
        }
    }
}

#[cfg(test)]
mod tests;
