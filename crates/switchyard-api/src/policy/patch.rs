//! EnvoyPatchPolicy applies raw JSON patches to the generated proxy
//! configuration of a Gateway.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{LocalPolicyTargetReference, PolicyStatus};

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "gateway.envoyproxy.io",
    version = "v1alpha1",
    kind = "EnvoyPatchPolicy",
    status = "PolicyStatus",
    namespaced,
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct EnvoyPatchPolicySpec {
    #[serde(rename = "type")]
    pub type_: EnvoyPatchType,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub json_patches: Vec<EnvoyJsonPatchConfig>,

    /// A Gateway, or a GatewayClass when Gateways are merged.
    pub target_ref: LocalPolicyTargetReference,

    /// Lower priorities are applied first.
    #[serde(default)]
    pub priority: i32,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash, JsonSchema)]
pub enum EnvoyPatchType {
    #[default]
    JSONPatch,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnvoyJsonPatchConfig {
    /// The type URL of the resource to patch, e.g.
    /// `type.googleapis.com/envoy.config.listener.v3.Listener`.
    #[serde(rename = "type")]
    pub type_: String,

    pub name: String,

    pub operation: JsonPatchOperation,
}

/// An RFC 6902 JSON patch operation.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct JsonPatchOperation {
    pub op: JsonPatchOperationType,

    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum JsonPatchOperationType {
    #[default]
    Add,
    Remove,
    Replace,
    Move,
    Copy,
    Test,
}
