use super::targets_kind;

/// Identifies a resource in the policy's namespace, optionally narrowed to one of its sections (a
/// gateway listener or a route rule).
#[derive(
    Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize, schemars::JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct PolicyTargetReference {
    pub group: String,
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,
}

impl PolicyTargetReference {
    /// Returns the target ref kind, qualified by its group, if necessary.
    pub fn canonical_kind(&self) -> String {
        if self.group.is_empty() {
            self.kind.clone()
        } else {
            format!("{}.{}", self.kind, self.group)
        }
    }

    /// Checks whether the target references the given resource type
    pub fn targets_kind<T>(&self) -> bool
    where
        T: kube::Resource,
        T::DynamicType: Default,
    {
        targets_kind::<T>(&self.group, &self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{Gateway, HttpRoute};

    #[test]
    fn targets_gateway() {
        let tgt = PolicyTargetReference {
            group: "gateway.networking.k8s.io".to_string(),
            kind: "Gateway".to_string(),
            name: "gw-0".to_string(),
            section_name: Some("http".to_string()),
        };
        assert!(tgt.targets_kind::<Gateway>());
        assert!(!tgt.targets_kind::<HttpRoute>());
        assert_eq!(tgt.canonical_kind(), "Gateway.gateway.networking.k8s.io");
    }

    #[test]
    fn targets_ignore_case() {
        let tgt = PolicyTargetReference {
            group: "Gateway.Networking.K8s.IO".to_string(),
            kind: "HTTPROUTE".to_string(),
            name: "route-0".to_string(),
            section_name: None,
        };
        assert!(tgt.targets_kind::<HttpRoute>());
    }

    #[test]
    fn core_kinds() {
        let tgt = PolicyTargetReference {
            group: String::new(),
            kind: "Service".to_string(),
            name: "svc-0".to_string(),
            section_name: None,
        };
        assert_eq!(tgt.canonical_kind(), "Service");
        assert!(!tgt.targets_kind::<Gateway>());
    }
}
