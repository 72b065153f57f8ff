/// The limiter service's counter configuration.
///
/// The controller owns `spec.limits`; each entry is a counter the limiter maintains.
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
    kind = "Limiter",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct LimiterSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<Vec<LimiterLimit>>,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LimiterLimit {
    pub namespace: String,
    pub max_value: u64,
    pub seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Vec<String>>,
}
