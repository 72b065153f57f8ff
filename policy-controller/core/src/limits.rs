//! Limiter counter definitions, grouped by the gateway and policy they were compiled for.
//!
//! The index is the controller's view of what the limiter should be counting. It's compared to
//! what's deployed without regard to ordering, so that reordering alone never causes a write.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ObjectKey;

/// Separates the gateway from the domain in a serialized scope.
const SCOPE_SEPARATOR: char = '#';

#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterDefinition {
    /// The limiter namespace, which matches the filter domain of the rules that feed the counter.
    pub namespace: String,
    pub max_value: u64,
    pub seconds: u64,
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub variables: Vec<String>,
}

/// Identifies the counters contributed by one policy through one gateway.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LimitScope {
    pub gateway: String,
    pub domain: String,
}

#[derive(Clone, Debug, Default)]
pub struct LimitIndex(BTreeMap<LimitScope, Vec<CounterDefinition>>);

// === impl LimitScope ===

impl LimitScope {
    pub fn new(gateway: &ObjectKey, domain: impl ToString) -> Self {
        Self {
            gateway: gateway.to_string(),
            domain: domain.to_string(),
        }
    }

    /// Parses a serialized scope. A value without a separator is a bare gateway.
    pub fn parse(s: &str) -> Self {
        match s.split_once(SCOPE_SEPARATOR) {
            Some((gateway, domain)) => Self {
                gateway: gateway.to_string(),
                domain: domain.to_string(),
            },
            None => Self {
                gateway: s.to_string(),
                domain: String::new(),
            },
        }
    }
}

impl std::fmt::Display for LimitScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{SCOPE_SEPARATOR}{}", self.gateway, self.domain)
    }
}

// === impl LimitIndex ===

impl LimitIndex {
    /// Groups deployed counter definitions by the scope encoded in their namespaces.
    pub fn from_deployed(defs: impl IntoIterator<Item = CounterDefinition>) -> Self {
        let mut index = Self::default();
        index.extend_deployed(defs);
        index
    }

    pub fn extend_deployed(&mut self, defs: impl IntoIterator<Item = CounterDefinition>) {
        for def in defs {
            let scope = LimitScope::parse(&def.namespace);
            self.insert(scope, def);
        }
    }

    pub fn insert(&mut self, scope: LimitScope, def: CounterDefinition) {
        self.0.entry(scope).or_default().push(def);
    }

    pub fn get(&self, scope: &LimitScope) -> Option<&[CounterDefinition]> {
        self.0.get(scope).map(Vec::as_slice)
    }

    pub fn scopes(&self) -> impl Iterator<Item = &LimitScope> {
        self.0.keys()
    }

    pub fn remove_scope(&mut self, scope: &LimitScope) -> Option<Vec<CounterDefinition>> {
        self.0.remove(scope)
    }

    /// Removes every scope compiled for a gateway.
    pub fn remove_gateway(&mut self, gateway: &ObjectKey) {
        let gateway = gateway.to_string();
        self.0.retain(|scope, _| scope.gateway != gateway);
    }

    /// All definitions, in canonical order.
    pub fn flatten(&self) -> Vec<CounterDefinition> {
        let mut defs = self.0.values().flatten().cloned().collect::<Vec<_>>();
        canonicalize(&mut defs);
        defs
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(Vec::is_empty)
    }

    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    /// Indicates whether `deployed` differs from this index in content.
    pub fn changed(&self, deployed: &[CounterDefinition]) -> bool {
        let mut deployed = deployed.to_vec();
        canonicalize(&mut deployed);
        self.flatten() != deployed
    }
}

/// Two indexes are equal when each scope holds the same definitions, in any order.
impl PartialEq for LimitIndex {
    fn eq(&self, other: &Self) -> bool {
        let scopes = |index: &Self| {
            index
                .0
                .iter()
                .filter(|(_, defs)| !defs.is_empty())
                .map(|(scope, defs)| {
                    let mut defs = defs.clone();
                    canonicalize(&mut defs);
                    (scope.clone(), defs)
                })
                .collect::<BTreeMap<_, _>>()
        };
        scopes(self) == scopes(other)
    }
}

/// Sorts each definition's conditions and variables, then the definitions themselves, widest
/// ceiling and window first.
fn canonicalize(defs: &mut [CounterDefinition]) {
    for def in defs.iter_mut() {
        def.conditions.sort();
        def.variables.sort();
    }
    defs.sort_by(|a, b| {
        b.max_value
            .cmp(&a.max_value)
            .then_with(|| b.seconds.cmp(&a.seconds))
            .then_with(|| a.conditions.cmp(&b.conditions))
            .then_with(|| a.variables.cmp(&b.variables))
            .then_with(|| a.namespace.cmp(&b.namespace))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mk_def(namespace: &str, max_value: u64, seconds: u64) -> CounterDefinition {
        CounterDefinition {
            namespace: namespace.to_string(),
            max_value,
            seconds,
            conditions: vec!["a == \"1\"".to_string(), "b == \"1\"".to_string()],
            variables: vec!["x".to_string(), "y".to_string()],
        }
    }

    #[test]
    fn scopes_round_trip() {
        let scope = LimitScope::new(&ObjectKey::new("ns-0", "gw-0"), "ns-0/rlp-0");
        assert_eq!(scope.to_string(), "ns-0/gw-0#ns-0/rlp-0");
        assert_eq!(LimitScope::parse(&scope.to_string()), scope);
        assert_eq!(
            LimitScope::parse("ns-0/gw-0"),
            LimitScope {
                gateway: "ns-0/gw-0".to_string(),
                domain: String::new(),
            }
        );
    }

    #[test]
    fn equality_ignores_ordering() {
        let scope = LimitScope::new(&ObjectKey::new("ns-0", "gw-0"), "ns-0/rlp-0");
        let ns = scope.to_string();

        let mut a = LimitIndex::default();
        a.insert(scope.clone(), mk_def(&ns, 10, 1));
        a.insert(scope.clone(), mk_def(&ns, 100, 60));

        let mut reordered = mk_def(&ns, 10, 1);
        reordered.conditions.reverse();
        reordered.variables.reverse();
        let mut b = LimitIndex::default();
        b.insert(scope.clone(), mk_def(&ns, 100, 60));
        b.insert(scope, reordered);

        assert_eq!(a, b);
        assert!(!a.changed(&b.flatten()));
    }

    #[test]
    fn extra_or_missing_definitions_differ() {
        let scope = LimitScope::new(&ObjectKey::new("ns-0", "gw-0"), "ns-0/rlp-0");
        let ns = scope.to_string();

        let mut a = LimitIndex::default();
        a.insert(scope.clone(), mk_def(&ns, 10, 1));

        let mut b = a.clone();
        b.insert(scope, mk_def(&ns, 5, 1));

        assert_ne!(a, b);
        assert!(a.changed(&b.flatten()));
        assert!(b.changed(&a.flatten()));
    }

    #[test]
    fn groups_deployed_definitions_by_namespace() {
        let index = LimitIndex::from_deployed(vec![
            mk_def("ns-0/gw-0#ns-0/rlp-0", 10, 1),
            mk_def("ns-0/gw-0#ns-0/rlp-1", 10, 1),
            mk_def("ns-0/gw-1#ns-0/rlp-0", 10, 1),
        ]);
        assert_eq!(index.scopes().count(), 3);
        assert_eq!(index.len(), 3);

        let mut index = index;
        index.remove_gateway(&ObjectKey::new("ns-0", "gw-0"));
        assert_eq!(index.len(), 1);
        assert!(index
            .get(&LimitScope::parse("ns-0/gw-1#ns-0/rlp-0"))
            .is_some());
    }

    #[test]
    fn empty_scopes_are_ignored() {
        let mut a = LimitIndex::default();
        a.insert(LimitScope::parse("ns-0/gw-0#x"), mk_def("ns-0/gw-0#x", 1, 1));
        a.remove_scope(&LimitScope::parse("ns-0/gw-0#x"));
        assert!(a.is_empty());
        assert_eq!(a, LimitIndex::default());
    }
}
