//! Resolves the effective rules of every gateway-to-rule path.
//!
//! Policies attached along a path are applied in two passes over the path's attachment points,
//! gateway first:
//!
//! 1. `defaults`, so that a more specific policy replaces (atomic) or overlays (merge) what a
//!    less specific one provided;
//! 2. `overrides`, so that any override wins over every default and the closest override wins over
//!    farther ones.
//!
//! Within a single attachment point policies are applied in key order, so the policy with the
//! greatest key wins a conflicting rule name.

use crate::{
    filter::PatternExpression,
    policy::{MergeStrategy, Policy, PolicyKind, Rule, Strategy},
    topology::{Path, Topology},
    ObjectKey,
};
use std::collections::{btree_map, BTreeMap, BTreeSet};

/// A rule along with the policy it came from.
#[derive(Clone, Debug, PartialEq)]
pub struct EffectiveRule {
    pub rule: Rule,

    /// The policy that contributed the rule.
    pub source: ObjectKey,

    /// The contributing policy's top-level predicates.
    pub when: Vec<PatternExpression>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EffectiveRuleSet {
    rules: BTreeMap<String, EffectiveRule>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EffectivePolicies {
    kind: Option<PolicyKind>,
    by_path: BTreeMap<Path, EffectiveRuleSet>,
}

/// Computes the effective rule set of every path in the topology for one policy kind.
pub fn resolve(topology: &Topology, kind: PolicyKind) -> EffectivePolicies {
    let mut by_path = BTreeMap::new();

    for path in topology.paths() {
        let levels = path
            .attachment_points()
            .iter()
            .map(|node| topology.policies_at(node, kind).collect::<Vec<_>>())
            .collect::<Vec<_>>();

        let mut rules = EffectiveRuleSet::default();
        for policy in levels.iter().flatten() {
            if let MergeStrategy::Defaults(strategy) = policy.merge_strategy() {
                rules.apply(policy, strategy);
            }
        }
        for policy in levels.iter().flatten() {
            if let MergeStrategy::Overrides(strategy) = policy.merge_strategy() {
                rules.apply(policy, strategy);
            }
        }

        tracing::trace!(
            gateway = %path.gateway,
            listener = %path.listener,
            route = %path.route,
            rule = %path.rule,
            rules = rules.len(),
            "Resolved effective rules"
        );
        by_path.insert(path, rules);
    }

    EffectivePolicies {
        kind: Some(kind),
        by_path,
    }
}

// === impl EffectiveRuleSet ===

impl EffectiveRuleSet {
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn get(&self, name: &str) -> Option<&EffectiveRule> {
        self.rules.get(name)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, EffectiveRule> {
        self.rules.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    fn apply(&mut self, policy: &Policy, strategy: Strategy) {
        let rules = policy.rules();
        let entries = rules.into_iter().map(|(name, rule)| {
            let rule = EffectiveRule {
                rule,
                source: policy.key().clone(),
                when: policy.when().to_vec(),
            };
            (name, rule)
        });

        match strategy {
            Strategy::Atomic => {
                if policy.rules_len() > 0 {
                    self.rules = entries.collect();
                }
            }
            Strategy::Merge => self.rules.extend(entries),
        }
    }
}

impl<'a> IntoIterator for &'a EffectiveRuleSet {
    type Item = (&'a String, &'a EffectiveRule);
    type IntoIter = btree_map::Iter<'a, String, EffectiveRule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

// === impl EffectivePolicies ===

impl EffectivePolicies {
    pub fn kind(&self) -> Option<PolicyKind> {
        self.kind
    }

    pub fn get(&self, path: &Path) -> Option<&EffectiveRuleSet> {
        self.by_path.get(path)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, Path, EffectiveRuleSet> {
        self.by_path.iter()
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    /// Finds the effective rules of a route rule as reached through a gateway listener.
    pub fn for_rule(
        &self,
        gateway: &ObjectKey,
        listener: &str,
        route: &ObjectKey,
        rule: &str,
    ) -> Option<&EffectiveRuleSet> {
        self.by_path
            .iter()
            .find(|(p, _)| {
                p.gateway == *gateway && p.listener == listener && p.route == *route && p.rule == rule
            })
            .map(|(_, rules)| rules)
    }

    /// Policies that provide at least one effective rule on some path.
    pub fn contributors(&self) -> BTreeSet<ObjectKey> {
        self.by_path
            .values()
            .flat_map(|rules| rules.rules.values().map(|r| r.source.clone()))
            .collect()
    }
}
