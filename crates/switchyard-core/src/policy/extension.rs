//! EnvoyExtensionPolicy translation.
//!
//! Extensions are external processors, Lua scripts and Wasm modules that run
//! in the request path. Each one says whether traffic should keep flowing
//! when it is broken. If every error in a policy comes from a fail-open
//! extension the policy is skipped and routes keep working without it.
//! Otherwise the routes it covers respond with a 500.

use kube::ResourceExt;
use switchyard_api::policy::extension::{
    EnvoyExtensionPolicy, ExtProc, ExtProcBodyProcessingMode, Lua, LuaValueType, Wasm,
    WasmCodeSourceType,
};

use super::{optional_duration, process_policies, target_http_routes, PolicyTarget, TranslationError};
use crate::ir::{self, AppProtocol};
use crate::refs::Referrer;
use crate::route::{build_destination, RouteKind};
use crate::translator::TranslateContext;

const LUA_KEY: &str = "lua";

pub(crate) fn process_envoy_extension_policies(cx: &mut TranslateContext) {
    let resources = cx.resources;
    process_policies(cx, &resources.envoy_extension_policies, |cx, policy, target| {
        let result = extension_features(cx, policy);
        let route_target = matches!(target, PolicyTarget::Route { .. });

        let routes = target_http_routes(cx, target)
            .into_iter()
            .filter(|r| route_target || r.envoy_extensions.is_none());

        match result {
            Ok(features) => {
                for route in routes {
                    route.envoy_extensions = Some(features.clone());
                }
                Ok(())
            }
            Err(e) if e.is_fail_open() => Err(e),
            Err(e) => {
                for route in routes {
                    route.fail_with(500);
                }
                Err(e)
            }
        }
    });
}

fn extension_features(
    cx: &TranslateContext,
    policy: &EnvoyExtensionPolicy,
) -> Result<ir::EnvoyExtensionFeatures, TranslationError> {
    let namespace = policy.namespace().unwrap_or_default();
    let prefix = format!("envoyextensionpolicy/{namespace}/{}", policy.name_any());
    let referrer = Referrer {
        group: switchyard_api::ENVOY_GATEWAY_GROUP,
        kind: switchyard_api::KIND_ENVOY_EXTENSION_POLICY,
        namespace: &namespace,
    };

    let mut features = ir::EnvoyExtensionFeatures::default();
    let mut errors = vec![];

    for (i, ext_proc) in policy.spec.ext_proc.iter().enumerate() {
        let name = format!("{prefix}/extproc/{i}");
        match translate_ext_proc(cx, referrer, name, ext_proc) {
            Ok(ext_proc) => features.ext_procs.push(ext_proc),
            Err(e) => errors.push(e.with_field("ExtProc")),
        }
    }

    for (i, lua) in policy.spec.lua.iter().enumerate() {
        let name = format!("{prefix}/lua/{i}");
        match translate_lua(cx, &namespace, name, lua) {
            Ok(lua) => features.luas.push(lua),
            Err(e) => errors.push(e.with_field("Lua")),
        }
    }

    for (i, wasm) in policy.spec.wasm.iter().enumerate() {
        let name = format!("{prefix}/wasm/{i}");
        match translate_wasm(name, wasm) {
            Ok(wasm) => features.wasms.push(wasm),
            Err(e) => errors.push(e.with_field("Wasm")),
        }
    }

    TranslationError::collect(errors)?;
    Ok(features)
}

fn translate_ext_proc(
    cx: &TranslateContext,
    referrer: Referrer,
    name: String,
    ext_proc: &ExtProc,
) -> Result<ir::ExtProc, TranslationError> {
    let fail_open = ext_proc.fail_open.unwrap_or(false);
    let error = |message: String| TranslationError::Extension { message, fail_open };

    let destination = build_destination(
        cx,
        referrer,
        &ext_proc.backend_refs,
        &name,
        AppProtocol::GRPC,
        RouteKind::Http.transport(),
    );
    if let Some(err) = destination.errors.into_iter().next() {
        return Err(error(err.message));
    }
    let Some(destination) = destination.destination else {
        return Err(error("no valid backend refs".to_string()));
    };

    let message_timeout = optional_duration("messageTimeout", ext_proc.message_timeout.as_ref())
        .map_err(|e| error(e.to_string()))?;

    let body_mode = |mode: Option<ExtProcBodyProcessingMode>| {
        mode.map(|m| match m {
            ExtProcBodyProcessingMode::Streamed => "Streamed".to_string(),
            ExtProcBodyProcessingMode::Buffered => "Buffered".to_string(),
            ExtProcBodyProcessingMode::BufferedPartial => "BufferedPartial".to_string(),
        })
    };
    let processing_mode = ext_proc.processing_mode.as_ref();

    Ok(ir::ExtProc {
        name,
        destination,
        fail_open,
        message_timeout,
        request_body_mode: body_mode(
            processing_mode
                .and_then(|p| p.request.as_ref())
                .and_then(|r| r.body),
        ),
        response_body_mode: body_mode(
            processing_mode
                .and_then(|p| p.response.as_ref())
                .and_then(|r| r.body),
        ),
    })
}

fn translate_lua(
    cx: &TranslateContext,
    namespace: &str,
    name: String,
    lua: &Lua,
) -> Result<ir::Lua, TranslationError> {
    let error = |message: String| TranslationError::Extension {
        message,
        fail_open: false,
    };

    let code = match lua.type_ {
        LuaValueType::Inline => lua
            .inline
            .clone()
            .ok_or_else(|| error("inline must be set for type Inline".to_string()))?,
        LuaValueType::ValueRef => {
            let Some(value_ref) = &lua.value_ref else {
                return Err(error("valueRef must be set for type ValueRef".to_string()));
            };
            if value_ref.kind != switchyard_api::KIND_CONFIG_MAP {
                return Err(error(format!(
                    "valueRef kind {} is not supported, only ConfigMap is",
                    value_ref.kind
                )));
            }

            let config_map = cx
                .resources
                .config_map(namespace, &value_ref.name)
                .ok_or_else(|| {
                    error(format!("ConfigMap {namespace}/{} does not exist", value_ref.name))
                })?;
            config_map
                .data
                .as_ref()
                .and_then(|d| d.get(LUA_KEY))
                .cloned()
                .ok_or_else(|| {
                    error(format!(
                        "ConfigMap {namespace}/{} must contain the key {LUA_KEY}",
                        value_ref.name
                    ))
                })?
        }
    };

    if code.trim().is_empty() {
        return Err(error("lua script must not be empty".to_string()));
    }
    Ok(ir::Lua { name, code })
}

fn translate_wasm(name: String, wasm: &Wasm) -> Result<ir::Wasm, TranslationError> {
    let fail_open = wasm.fail_open.unwrap_or(false);
    let error = |message: &str| TranslationError::Extension {
        message: message.to_string(),
        fail_open,
    };

    let http = match wasm.code.type_ {
        WasmCodeSourceType::HTTP => wasm
            .code
            .http
            .as_ref()
            .ok_or_else(|| error("http must be set for code source type HTTP"))?,
        WasmCodeSourceType::Image => {
            return Err(error("Image code sources are not supported"));
        }
    };

    let url: http::Uri = http
        .url
        .parse()
        .map_err(|_| error(&format!("invalid code source url {:?}", http.url)))?;
    if !matches!(url.scheme_str(), Some("http" | "https")) {
        return Err(error(&format!(
            "code source url {:?} must be an http or https URL",
            http.url
        )));
    }

    Ok(ir::Wasm {
        name,
        root_id: wasm.root_id.clone(),
        wasm_name: wasm.name.clone(),
        url: http.url.clone(),
        sha256: http.sha256.clone(),
        config: wasm.config.clone(),
        fail_open,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::status::{self, reasons, types};
    use crate::test_util::*;
    use serde_json::json;

    fn fixture(spec: serde_json::Value) -> crate::TranslateResult {
        let mut spec = spec;
        spec["targetRef"] =
            json!({"group": "gateway.networking.k8s.io", "kind": "HTTPRoute", "name": "httproute-1"});

        translate(&resources(json!([
            gateway("gateway-1", json!([{"name": "http", "protocol": "HTTP", "port": 80}])),
            service("envoy-gateway", "service-1", json!([{"port": 8080}])),
            service("envoy-gateway", "ext-proc", json!([{"port": 9000}])),
            {
                "apiVersion": "v1",
                "kind": "ConfigMap",
                "metadata": {"namespace": "envoy-gateway", "name": "lua-script"},
                "data": {"lua": "function envoy_on_request(handle) end"},
            },
            {
                "apiVersion": "gateway.networking.k8s.io/v1",
                "kind": "HTTPRoute",
                "metadata": {"namespace": "envoy-gateway", "name": "httproute-1"},
                "spec": {
                    "parentRefs": [{"name": "gateway-1"}],
                    "rules": [{"backendRefs": [{"name": "service-1", "port": 8080}]}],
                },
            },
            {
                "apiVersion": "gateway.envoyproxy.io/v1alpha1",
                "kind": "EnvoyExtensionPolicy",
                "metadata": {"namespace": "envoy-gateway", "name": "policy-1"},
                "spec": spec,
            },
        ])))
    }

    fn route(result: &crate::TranslateResult) -> &ir::HttpRoute {
        &result.xds["envoy-gateway/gateway-1"].http[0].routes[0]
    }

    fn accepted(result: &crate::TranslateResult) -> (String, String, String) {
        let status = result.resources.envoy_extension_policies[0].status.as_ref().unwrap();
        let c = status::find_condition(&status.ancestors[0].conditions, types::ACCEPTED).unwrap();
        (c.status.clone(), c.reason.clone(), c.message.clone())
    }

    #[test]
    fn test_extensions() {
        let result = fixture(json!({
            "extProc": [{
                "backendRefs": [{"name": "ext-proc", "port": 9000}],
                "messageTimeout": "500ms",
                "processingMode": {"request": {"body": "Buffered"}},
            }],
            "lua": [
                {"type": "Inline", "inline": "function envoy_on_response(handle) end"},
                {"type": "ValueRef", "valueRef": {"group": "", "kind": "ConfigMap", "name": "lua-script"}},
            ],
            "wasm": [{
                "name": "wasm-filter",
                "code": {"type": "HTTP", "http": {"url": "https://www.example.com/filter.wasm", "sha256": "abc"}},
            }],
        }));
        assert_eq!(accepted(&result).0, "True");

        let extensions = route(&result).envoy_extensions.as_ref().unwrap();
        let ext_proc = &extensions.ext_procs[0];
        assert_eq!(ext_proc.name, "envoyextensionpolicy/envoy-gateway/policy-1/extproc/0");
        assert_eq!(ext_proc.destination.settings[0].protocol, AppProtocol::GRPC);
        assert_eq!(ext_proc.request_body_mode.as_deref(), Some("Buffered"));
        assert_eq!(ext_proc.response_body_mode, None);

        assert_eq!(extensions.luas.len(), 2);
        assert_eq!(extensions.luas[1].code, "function envoy_on_request(handle) end");

        assert_eq!(extensions.wasms[0].wasm_name.as_deref(), Some("wasm-filter"));
        assert_eq!(extensions.wasms[0].name, "envoyextensionpolicy/envoy-gateway/policy-1/wasm/0");
    }

    #[test]
    fn test_fail_open() {
        let result = fixture(json!({
            "extProc": [{"backendRefs": [{"name": "missing", "port": 9000}], "failOpen": true}],
        }));

        let (status, reason, message) = accepted(&result);
        assert_eq!(status, "False");
        assert_eq!(reason, reasons::INVALID);
        assert!(message.starts_with("ExtProc: "), "{message}");

        // the route keeps working without the extension
        let route = route(&result);
        assert_eq!(route.envoy_extensions, None);
        assert_eq!(route.direct_response, None);
    }

    #[test]
    fn test_fail_closed() {
        let result = fixture(json!({
            "extProc": [{"backendRefs": [{"name": "missing", "port": 9000}], "failOpen": true}],
            "wasm": [{"code": {"type": "Image", "image": {"url": "oci://example.com/filter:v1"}}}],
        }));

        assert_eq!(accepted(&result).0, "False");
        let route = route(&result);
        assert_eq!(route.envoy_extensions, None);
        assert_eq!(route.direct_response.as_ref().unwrap().status_code, 500);
    }

    #[test]
    fn test_lua_value_ref() {
        let result = fixture(json!({
            "lua": [{"type": "ValueRef", "valueRef": {"group": "", "kind": "ConfigMap", "name": "missing"}}],
        }));

        assert_eq!(
            accepted(&result).2,
            "Lua: ConfigMap envoy-gateway/missing does not exist"
        );
        assert_eq!(route(&result).direct_response.as_ref().unwrap().status_code, 500);
    }
}
