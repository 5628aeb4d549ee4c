//! EnvoyExtensionPolicy plugs external processors, Lua scripts and Wasm
//! modules into the request path of a Gateway or Route.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{PolicyStatus, PolicyTargetReferences};
use crate::shared::{BackendRef, LocalObjectReference};

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    group = "gateway.envoyproxy.io",
    version = "v1alpha1",
    kind = "EnvoyExtensionPolicy",
    status = "PolicyStatus",
    namespaced,
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct EnvoyExtensionPolicySpec {
    #[serde(flatten)]
    pub targets: PolicyTargetReferences,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ext_proc: Vec<ExtProc>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lua: Vec<Lua>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wasm: Vec<Wasm>,
}

/// An external processing service called for every request.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtProc {
    pub backend_refs: Vec<BackendRef>,

    /// When true, requests continue if the processor can't be reached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_open: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_timeout: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_mode: Option<ExtProcProcessingMode>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtProcProcessingMode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<ProcessingModeOptions>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ProcessingModeOptions>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingModeOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<ExtProcBodyProcessingMode>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, JsonSchema)]
pub enum ExtProcBodyProcessingMode {
    Streamed,
    Buffered,
    BufferedPartial,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Lua {
    #[serde(rename = "type")]
    pub type_: LuaValueType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline: Option<String>,

    /// A ConfigMap with the script under the `lua` key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_ref: Option<LocalObjectReference>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, JsonSchema)]
pub enum LuaValueType {
    Inline,
    ValueRef,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Wasm {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_id: Option<String>,

    pub code: WasmCodeSource,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_open: Option<bool>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WasmCodeSource {
    #[serde(rename = "type")]
    pub type_: WasmCodeSourceType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpWasmCodeSource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageWasmCodeSource>,
}

#[allow(clippy::upper_case_acronyms)]
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, JsonSchema)]
pub enum WasmCodeSourceType {
    HTTP,
    Image,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HttpWasmCodeSource {
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageWasmCodeSource {
    pub url: String,
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extension_policy() {
        let spec: EnvoyExtensionPolicySpec = serde_json::from_value(json!({
            "targetRef": {"group": "gateway.networking.k8s.io", "kind": "Gateway", "name": "gateway-1"},
            "extProc": [{
                "backendRefs": [{"name": "grpc-backend", "port": 9000}],
                "failOpen": true,
                "processingMode": {"request": {"body": "Buffered"}},
            }],
            "lua": [{"type": "Inline", "inline": "function envoy_on_request(h) end"}],
            "wasm": [{
                "name": "wasm-filter",
                "code": {"type": "HTTP", "http": {"url": "https://example.com/filter.wasm", "sha256": "abc"}},
                "config": {"parameter1": "value1"},
            }],
        }))
        .unwrap();

        assert_eq!(spec.ext_proc[0].fail_open, Some(true));
        assert_eq!(spec.lua[0].type_, LuaValueType::Inline);
        assert_eq!(spec.wasm[0].code.type_, WasmCodeSourceType::HTTP);
        assert_eq!(spec.wasm[0].config, Some(json!({"parameter1": "value1"})));
    }
}
