use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const DEFAULT_CONTROLLER_NAME: &str = "gateway.envoyproxy.io/gatewayclass-controller";

/// Configuration for a [Translator](crate::Translator).
///
/// Every field has a default, so an empty document is a valid config:
///
/// ```
/// # use switchyard_core::TranslatorConfig;
/// let config = TranslatorConfig::from_yaml_str("gatewayClassName: eg").unwrap();
/// assert_eq!(config.gateway_class_name, "eg");
/// assert!(config.endpoint_routing);
/// ```
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct TranslatorConfig {
    /// The controller name written to every status entry.
    pub controller_name: String,

    /// Only Gateways of this class are translated.
    pub gateway_class_name: String,

    /// Translate every Gateway of the class into a single IR.
    pub merge_gateways: bool,

    /// Route to the endpoints listed in EndpointSlices. When false, route
    /// to the Service's cluster IP.
    pub endpoint_routing: bool,

    pub envoy_patch_policy_enabled: bool,

    /// Unstructured kinds registered by an extension server. Documents of
    /// these kinds are read as extension server policies or as targets of
    /// ExtensionRef filters.
    pub extension_group_kinds: Vec<GroupKind>,

    /// The time written as `lastTransitionTime` on new conditions. Defaults
    /// to the wall clock at the start of a translation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition_time: Option<Time>,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            controller_name: DEFAULT_CONTROLLER_NAME.to_string(),
            gateway_class_name: String::new(),
            merge_gateways: false,
            endpoint_routing: true,
            envoy_patch_policy_enabled: false,
            extension_group_kinds: vec![],
            transition_time: None,
        }
    }
}

impl TranslatorConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        Ok(serde_yml::from_str(s)?)
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub(crate) fn is_extension_kind(&self, group: &str, kind: &str) -> bool {
        self.extension_group_kinds
            .iter()
            .any(|gk| gk.group == group && gk.kind == kind)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct GroupKind {
    pub group: String,
    pub kind: String,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TranslatorConfig::from_json_str("{}").unwrap();
        assert_eq!(config, TranslatorConfig::default());
        assert_eq!(config.controller_name, DEFAULT_CONTROLLER_NAME);
        assert!(config.endpoint_routing);
    }

    #[test]
    fn test_from_yaml() {
        let config = TranslatorConfig::from_yaml_str(
            r#"
gatewayClassName: envoy-gateway-class
mergeGateways: true
endpointRouting: false
envoyPatchPolicyEnabled: true
extensionGroupKinds:
- group: foo.example.io
  kind: Foo
transitionTime: "2024-01-01T00:00:00Z"
"#,
        )
        .unwrap();

        assert_eq!(config.gateway_class_name, "envoy-gateway-class");
        assert!(config.merge_gateways);
        assert!(!config.endpoint_routing);
        assert!(config.is_extension_kind("foo.example.io", "Foo"));
        assert!(!config.is_extension_kind("foo.example.io", "Bar"));
        assert!(config.transition_time.is_some());
    }

    #[test]
    fn test_invalid_config() {
        assert!(TranslatorConfig::from_yaml_str("mergeGateways: [1, 2]").is_err());
    }
}
