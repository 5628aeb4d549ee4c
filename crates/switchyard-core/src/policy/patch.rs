//! EnvoyPatchPolicy translation.
//!
//! Patch policies don't take part in target resolution. Each one names a
//! single Gateway, or the GatewayClass when Gateways are merged, and its
//! patches are appended to that IR in priority order.

use kube::ResourceExt;
use switchyard_api::policy::patch::{EnvoyJsonPatchConfig, EnvoyPatchPolicy, JsonPatchOperationType};
use switchyard_api::ParentReference;

use crate::ir;
use crate::status::{reasons, types, AncestorStatusWriter};
use crate::translator::TranslateContext;

pub(crate) fn process_envoy_patch_policies(cx: &mut TranslateContext) {
    let config = cx.config;
    let now = cx.now.clone();

    let resources = cx.resources;

    let mut policies: Vec<_> = resources.envoy_patch_policies.iter().collect();
    policies.sort_by(|a, b| {
        let a_time = a.creation_timestamp().map(|t| t.0);
        let b_time = b.creation_timestamp().map(|t| t.0);
        a.spec
            .priority
            .cmp(&b.spec.priority)
            .then_with(|| a_time.cmp(&b_time))
            .then_with(|| a.namespace().cmp(&b.namespace()))
            .then_with(|| a.name_any().cmp(&b.name_any()))
    });

    for policy in policies {
        let mut policy = policy.clone();
        let namespace = policy.namespace().unwrap_or_default();
        let name = policy.name_any();

        let status = policy.status.get_or_insert_with(Default::default);
        status
            .ancestors
            .retain(|a| a.controller_name != config.controller_name);

        let writer = AncestorStatusWriter {
            controller_name: &config.controller_name,
            generation: policy.metadata.generation,
            now: &now,
        };

        let Some((ir_key, ancestor)) = patch_target(cx, &namespace, &policy) else {
            tracing::debug!(policy = %format!("{namespace}/{name}"), "patch policy target not found");
            cx.output.envoy_patch_policies.push(policy);
            continue;
        };
        let ancestors = [ancestor];
        let status = policy.status.get_or_insert_with(Default::default);

        if !config.envoy_patch_policy_enabled {
            writer.set_all(
                status,
                &ancestors,
                types::ACCEPTED,
                false,
                reasons::DISABLED,
                "EnvoyPatchPolicy is disabled in the EnvoyGateway configuration",
            );
            cx.output.envoy_patch_policies.push(policy);
            continue;
        }

        let patches: Result<Vec<_>, _> = policy
            .spec
            .json_patches
            .iter()
            .enumerate()
            .map(|(i, patch)| translate_patch(patch).map_err(|e| format!("jsonPatches[{i}]: {e}")))
            .collect();

        match patches {
            Ok(json_patches) => {
                if let Some(xds) = cx.xds.get_mut(&ir_key) {
                    xds.envoy_patch_policies.push(ir::EnvoyPatchPolicy {
                        name: name.clone(),
                        namespace: namespace.clone(),
                        priority: policy.spec.priority,
                        json_patches,
                    });
                }
                writer.accept(status, &ancestors);
            }
            Err(message) => writer.translation_error(status, &ancestors, &message),
        }

        cx.output.envoy_patch_policies.push(policy);
    }
}

/// The IR key and ancestor ref of a patch policy's target.
fn patch_target(
    cx: &TranslateContext,
    namespace: &str,
    policy: &EnvoyPatchPolicy,
) -> Option<(String, ParentReference)> {
    let target = &policy.spec.target_ref;
    if target.group != switchyard_api::GATEWAY_GROUP {
        return None;
    }

    if cx.config.merge_gateways {
        if target.kind != switchyard_api::KIND_GATEWAY_CLASS
            || target.name != cx.config.gateway_class_name
        {
            return None;
        }
        let ancestor = ParentReference {
            group: Some(switchyard_api::GATEWAY_GROUP.to_string()),
            kind: Some(switchyard_api::KIND_GATEWAY_CLASS.to_string()),
            name: target.name.clone(),
            ..Default::default()
        };
        return Some((cx.config.gateway_class_name.clone(), ancestor));
    }

    if target.kind != switchyard_api::KIND_GATEWAY {
        return None;
    }
    let gateway = &cx.gateways[cx.gateway_idx(namespace, &target.name)?];
    Some((gateway.ir_key.clone(), gateway.parent_ref(None)))
}

fn translate_patch(patch: &EnvoyJsonPatchConfig) -> Result<ir::JsonPatchConfig, String> {
    let op = &patch.operation;
    match op.op {
        JsonPatchOperationType::Add | JsonPatchOperationType::Replace | JsonPatchOperationType::Test
            if op.value.is_none() =>
        {
            return Err(format!("the value field must be set for op {}", op_str(op.op)));
        }
        JsonPatchOperationType::Move | JsonPatchOperationType::Copy if op.from.is_none() => {
            return Err(format!("the from field must be set for op {}", op_str(op.op)));
        }
        _ => (),
    }

    Ok(ir::JsonPatchConfig {
        type_url: patch.type_.clone(),
        name: patch.name.clone(),
        op: op.op,
        path: op.path.clone(),
        from: op.from.clone(),
        value: op.value.clone(),
    })
}

fn op_str(op: JsonPatchOperationType) -> &'static str {
    match op {
        JsonPatchOperationType::Add => "add",
        JsonPatchOperationType::Remove => "remove",
        JsonPatchOperationType::Replace => "replace",
        JsonPatchOperationType::Move => "move",
        JsonPatchOperationType::Copy => "copy",
        JsonPatchOperationType::Test => "test",
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::resources::Resources;
    use crate::status;
    use crate::test_util::*;
    use crate::{TranslateResult, Translator, TranslatorConfig};
    use serde_json::json;

    fn patch_policy(name: &str, priority: i32, target: serde_json::Value, op: serde_json::Value) -> serde_json::Value {
        json!({
            "apiVersion": "gateway.envoyproxy.io/v1alpha1",
            "kind": "EnvoyPatchPolicy",
            "metadata": {"namespace": "envoy-gateway", "name": name},
            "spec": {
                "type": "JSONPatch",
                "targetRef": target,
                "priority": priority,
                "jsonPatches": [{
                    "type": "type.googleapis.com/envoy.config.listener.v3.Listener",
                    "name": "envoy-gateway/gateway-1/http",
                    "operation": op,
                }],
            },
        })
    }

    fn gateway_target() -> serde_json::Value {
        json!({"group": "gateway.networking.k8s.io", "kind": "Gateway", "name": "gateway-1"})
    }

    fn fixture(policies: Vec<serde_json::Value>) -> Resources {
        let mut objs = vec![gateway(
            "gateway-1",
            json!([{"name": "http", "protocol": "HTTP", "port": 80}]),
        )];
        objs.extend(policies);
        resources(serde_json::Value::Array(objs))
    }

    fn translate_enabled(resources: &Resources) -> TranslateResult {
        let config = TranslatorConfig {
            envoy_patch_policy_enabled: true,
            ..config()
        };
        Translator::new(config).translate(resources)
    }

    fn accepted<'a>(result: &'a TranslateResult, name: &str) -> &'a k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition {
        let policy = result
            .resources
            .envoy_patch_policies
            .iter()
            .find(|p| p.name_any() == name)
            .unwrap();
        let status = policy.status.as_ref().unwrap();
        status::find_condition(&status.ancestors[0].conditions, types::ACCEPTED).unwrap()
    }

    #[test]
    fn test_priority_order() {
        let op = json!({"op": "replace", "path": "/per_connection_buffer_limit_bytes", "value": 1024});
        let resources = fixture(vec![
            patch_policy("patch-b", 10, gateway_target(), op.clone()),
            patch_policy("patch-a", 10, gateway_target(), op.clone()),
            patch_policy("patch-c", -1, gateway_target(), op),
        ]);
        let result = translate_enabled(&resources);

        let names: Vec<_> = result.xds["envoy-gateway/gateway-1"]
            .envoy_patch_policies
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["patch-c", "patch-a", "patch-b"]);

        let patch = &result.xds["envoy-gateway/gateway-1"].envoy_patch_policies[0].json_patches[0];
        assert_eq!(patch.op, JsonPatchOperationType::Replace);
        assert_eq!(patch.value, Some(json!(1024)));
        assert_eq!(accepted(&result, "patch-a").status, "True");
    }

    #[test]
    fn test_disabled() {
        let resources = fixture(vec![patch_policy(
            "patch-1",
            0,
            gateway_target(),
            json!({"op": "remove", "path": "/foo"}),
        )]);
        let result = translate(&resources);

        assert!(result.xds["envoy-gateway/gateway-1"].envoy_patch_policies.is_empty());
        let accepted = accepted(&result, "patch-1");
        assert_eq!(accepted.status, "False");
        assert_eq!(accepted.reason, reasons::DISABLED);
    }

    #[test]
    fn test_invalid_operation() {
        let resources = fixture(vec![
            patch_policy("patch-1", 0, gateway_target(), json!({"op": "add", "path": "/foo"})),
            patch_policy("patch-2", 0, gateway_target(), json!({"op": "copy", "path": "/foo"})),
        ]);
        let result = translate_enabled(&resources);

        assert!(result.xds["envoy-gateway/gateway-1"].envoy_patch_policies.is_empty());

        let accepted_1 = accepted(&result, "patch-1");
        assert_eq!(accepted_1.reason, reasons::INVALID);
        assert_eq!(
            accepted_1.message,
            "jsonPatches[0]: the value field must be set for op add"
        );
        assert_eq!(
            accepted(&result, "patch-2").message,
            "jsonPatches[0]: the from field must be set for op copy"
        );
    }

    #[test]
    fn test_merged_gateways() {
        let config = TranslatorConfig {
            envoy_patch_policy_enabled: true,
            merge_gateways: true,
            ..config()
        };
        let op = json!({"op": "remove", "path": "/foo"});
        let resources = fixture(vec![
            patch_policy("patch-1", 0, gateway_target(), op.clone()),
            patch_policy(
                "patch-2",
                0,
                json!({"group": "gateway.networking.k8s.io", "kind": "GatewayClass", "name": GATEWAY_CLASS}),
                op,
            ),
        ]);
        let result = Translator::new(config).translate(&resources);

        let xds = &result.xds[GATEWAY_CLASS];
        assert_eq!(xds.envoy_patch_policies.len(), 1);
        assert_eq!(xds.envoy_patch_policies[0].name, "patch-2");

        // a Gateway target doesn't resolve when Gateways are merged
        let unresolved = &result.resources.envoy_patch_policies[0];
        assert_eq!(unresolved.name_any(), "patch-1");
        assert!(unresolved.status.as_ref().unwrap().ancestors.is_empty());
    }
}
