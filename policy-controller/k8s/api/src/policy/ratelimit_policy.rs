use super::PolicyTargetReference;
use crate::Condition;
use std::collections::BTreeMap;

/// Attaches rate limits to a Gateway, one of its listeners, an HTTPRoute or one of its rules.
///
/// Limits are declared either at the top level, which makes them atomic defaults, or in exactly
/// one of the `defaults` or `overrides` blocks.
#[derive(
    Clone,
    Debug,
    Default,
    PartialEq,
    kube::CustomResource,
    serde::Deserialize,
    serde::Serialize,
    schemars::JsonSchema,
)]
#[kube(
    group = "policy.gateway.dev",
    version = "v1alpha1",
    kind = "RateLimitPolicy",
    status = "RateLimitPolicyStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitPolicySpec {
    pub target_ref: PolicyTargetReference,

    /// Rules that more specific policies may replace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaults: Option<MergeableRules>,

    /// Rules that replace those of more specific policies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<MergeableRules>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<Vec<WhenCondition>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<BTreeMap<String, Limit>>,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MergeableRules {
    /// Either `atomic` (the default) or `merge`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<Vec<WhenCondition>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<BTreeMap<String, Limit>>,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Limit {
    pub rates: Vec<Rate>,

    /// Request attributes whose values qualify the counter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counters: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<Vec<WhenCondition>>,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Rate {
    pub limit: i64,
    pub duration: i64,

    /// One of `second`, `minute`, `hour` or `day`.
    pub unit: String,
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WhenCondition {
    pub selector: String,
    pub operator: String,
    pub value: String,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitPolicyStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_manifest() {
        let policy = serde_yaml::from_str::<RateLimitPolicy>(
            r#"
apiVersion: policy.gateway.dev/v1alpha1
kind: RateLimitPolicy
metadata:
  namespace: ns-0
  name: toystore
spec:
  targetRef:
    group: gateway.networking.k8s.io
    kind: HTTPRoute
    name: toystore
    sectionName: rule-1
  overrides:
    strategy: merge
    when:
    - selector: request.host
      operator: eq
      value: api.example.com
    limits:
      per-user:
        rates:
        - limit: 5
          duration: 10
          unit: second
        counters:
        - auth.identity.username
"#,
        )
        .expect("manifest must parse");

        assert_eq!(policy.spec.target_ref.section_name.as_deref(), Some("rule-1"));
        assert!(policy.spec.defaults.is_none());
        assert!(policy.spec.limits.is_none());

        let overrides = policy.spec.overrides.expect("overrides must be set");
        assert_eq!(overrides.strategy.as_deref(), Some("merge"));
        let limits = overrides.limits.expect("limits must be set");
        let limit = &limits["per-user"];
        assert_eq!(
            limit.rates,
            vec![Rate {
                limit: 5,
                duration: 10,
                unit: "second".to_string(),
            }]
        );
        assert_eq!(
            limit.counters.as_deref(),
            Some(&["auth.identity.username".to_string()][..])
        );
    }
}
