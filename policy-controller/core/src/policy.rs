use crate::{filter::PatternExpression, ObjectKey};
use std::collections::BTreeMap;

pub const GATEWAY_API_GROUP: &str = "gateway.networking.k8s.io";

/// The policy kinds known to the controller.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PolicyKind {
    RateLimit,
    Auth,
    Dns,
    Tls,
}

/// References the resource a policy attaches to.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TargetRef {
    pub group: String,
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
    pub section_name: Option<String>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// The policy's rules are applied as a whole, replacing whatever was accumulated.
    #[default]
    Atomic,

    /// The policy's rules are applied one rule name at a time.
    Merge,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MergeStrategy {
    Defaults(Strategy),
    Overrides(Strategy),
}

/// The fields shared by every policy kind.
#[derive(Clone, Debug, PartialEq)]
pub struct PolicySpec<R> {
    pub key: ObjectKey,
    pub target_refs: Vec<TargetRef>,
    pub strategy: MergeStrategy,

    /// Predicates that gate every rule of the policy.
    pub when: Vec<PatternExpression>,

    pub rules: BTreeMap<String, R>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Policy {
    RateLimit(PolicySpec<Limit>),
    Auth(PolicySpec<serde_json::Value>),
    Dns(PolicySpec<serde_json::Value>),
    Tls(PolicySpec<serde_json::Value>),
}

/// A policy rule, independent of the policy kind that declared it.
#[derive(Clone, Debug, PartialEq)]
pub enum Rule {
    Limit(Limit),
    Opaque(serde_json::Value),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Limit {
    pub rates: Vec<Rate>,

    /// Request attributes that qualify the counter, e.g. `auth.identity.username`.
    pub counters: Vec<String>,

    pub when: Vec<PatternExpression>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rate {
    pub limit: i64,
    pub duration: i64,
    pub unit: RateUnit,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RateUnit {
    Second,
    Minute,
    Hour,
    Day,
    Unknown,
}

// === impl PolicyKind ===

impl PolicyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimit => "RateLimitPolicy",
            Self::Auth => "AuthPolicy",
            Self::Dns => "DNSPolicy",
            Self::Tls => "TLSPolicy",
        }
    }

    /// DNS and TLS policies configure listeners and can't target routes.
    pub fn targets_routes(&self) -> bool {
        matches!(self, Self::RateLimit | Self::Auth)
    }
}

impl std::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl TargetRef ===

impl TargetRef {
    pub fn gateway(name: impl ToString) -> Self {
        Self {
            group: GATEWAY_API_GROUP.to_string(),
            kind: "Gateway".to_string(),
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn http_route(name: impl ToString) -> Self {
        Self {
            group: GATEWAY_API_GROUP.to_string(),
            kind: "HTTPRoute".to_string(),
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_section(mut self, section: impl ToString) -> Self {
        self.section_name = Some(section.to_string());
        self
    }

    pub fn targets_gateway(&self) -> bool {
        self.group == GATEWAY_API_GROUP && self.kind == "Gateway"
    }

    pub fn targets_http_route(&self) -> bool {
        self.group == GATEWAY_API_GROUP && self.kind == "HTTPRoute"
    }

    /// Resolves the key of the targeted resource; an unset namespace is the policy's own.
    pub fn object_key(&self, policy_ns: &str) -> ObjectKey {
        ObjectKey {
            namespace: self.namespace.as_deref().unwrap_or(policy_ns).to_string(),
            name: self.name.clone(),
        }
    }
}

// === impl MergeStrategy ===

/// A policy without an explicit `defaults` or `overrides` block.
impl Default for MergeStrategy {
    fn default() -> Self {
        Self::Defaults(Strategy::Atomic)
    }
}

impl MergeStrategy {
    pub fn is_override(&self) -> bool {
        matches!(self, Self::Overrides(_))
    }

    pub fn strategy(&self) -> Strategy {
        match self {
            Self::Defaults(s) | Self::Overrides(s) => *s,
        }
    }
}

// === impl Policy ===

impl Policy {
    pub fn kind(&self) -> PolicyKind {
        match self {
            Self::RateLimit(_) => PolicyKind::RateLimit,
            Self::Auth(_) => PolicyKind::Auth,
            Self::Dns(_) => PolicyKind::Dns,
            Self::Tls(_) => PolicyKind::Tls,
        }
    }

    pub fn key(&self) -> &ObjectKey {
        match self {
            Self::RateLimit(spec) => &spec.key,
            Self::Auth(spec) | Self::Dns(spec) | Self::Tls(spec) => &spec.key,
        }
    }

    pub fn target_refs(&self) -> &[TargetRef] {
        match self {
            Self::RateLimit(spec) => &spec.target_refs,
            Self::Auth(spec) | Self::Dns(spec) | Self::Tls(spec) => &spec.target_refs,
        }
    }

    pub fn merge_strategy(&self) -> MergeStrategy {
        match self {
            Self::RateLimit(spec) => spec.strategy,
            Self::Auth(spec) | Self::Dns(spec) | Self::Tls(spec) => spec.strategy,
        }
    }

    pub fn when(&self) -> &[PatternExpression] {
        match self {
            Self::RateLimit(spec) => &spec.when,
            Self::Auth(spec) | Self::Dns(spec) | Self::Tls(spec) => &spec.when,
        }
    }

    pub fn rules(&self) -> BTreeMap<String, Rule> {
        match self {
            Self::RateLimit(spec) => spec
                .rules
                .iter()
                .map(|(name, limit)| (name.clone(), Rule::Limit(limit.clone())))
                .collect(),
            Self::Auth(spec) | Self::Dns(spec) | Self::Tls(spec) => spec
                .rules
                .iter()
                .map(|(name, body)| (name.clone(), Rule::Opaque(body.clone())))
                .collect(),
        }
    }

    pub fn rules_len(&self) -> usize {
        match self {
            Self::RateLimit(spec) => spec.rules.len(),
            Self::Auth(spec) | Self::Dns(spec) | Self::Tls(spec) => spec.rules.len(),
        }
    }

    /// Replaces the policy's rules. Rules that don't belong to this policy kind are dropped.
    pub fn set_rules(&mut self, rules: BTreeMap<String, Rule>) {
        match self {
            Self::RateLimit(spec) => {
                spec.rules = rules
                    .into_iter()
                    .filter_map(|(name, rule)| match rule {
                        Rule::Limit(limit) => Some((name, limit)),
                        Rule::Opaque(_) => None,
                    })
                    .collect();
            }
            Self::Auth(spec) | Self::Dns(spec) | Self::Tls(spec) => {
                spec.rules = rules
                    .into_iter()
                    .filter_map(|(name, rule)| match rule {
                        Rule::Opaque(body) => Some((name, body)),
                        Rule::Limit(_) => None,
                    })
                    .collect();
            }
        }
    }
}

// === impl RateUnit ===

impl From<&str> for RateUnit {
    fn from(unit: &str) -> Self {
        match unit {
            "second" => Self::Second,
            "minute" => Self::Minute,
            "hour" => Self::Hour,
            "day" => Self::Day,
            _ => Self::Unknown,
        }
    }
}
