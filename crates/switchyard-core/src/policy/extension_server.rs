//! Extension server policies.
//!
//! These are documents of kinds registered by an extension server. The
//! translator doesn't understand them. It finds the Gateway Listeners they
//! target and hands the whole document to the IR of those Listeners.

use serde_json::Value;
use switchyard_api::policy::{unstructured_target_refs, PolicyStatus};

use crate::error::Error;
use crate::ir;
use crate::status::AncestorStatusWriter;
use crate::translator::TranslateContext;

pub(crate) fn process_extension_server_policies(cx: &mut TranslateContext) {
    let config = cx.config;
    let now = cx.now.clone();

    let resources = cx.resources;

    let mut policies: Vec<_> = resources.extension_server_policies.iter().collect();
    policies.sort_by(|a, b| creation_timestamp(a).cmp(&creation_timestamp(b)));

    for policy in policies {
        let namespace = metadata_str(policy, "namespace");
        let name = metadata_str(policy, "name");

        let targets = match unstructured_target_refs(policy) {
            Ok(targets) => targets,
            Err(source) => {
                cx.errors.push(Error::InvalidPolicy {
                    policy: format!("{namespace}/{name}"),
                    source,
                });
                continue;
            }
        };

        let mut ancestors = vec![];
        for target in targets {
            if target.group != switchyard_api::GATEWAY_GROUP
                || target.kind != switchyard_api::KIND_GATEWAY
            {
                cx.errors.push(Error::InvalidPolicy {
                    policy: format!("{namespace}/{name}"),
                    source: switchyard_api::Error::new(format!(
                        "extension policy {name} doesn't target a Gateway"
                    )),
                });
                continue;
            }

            let Some(gateway_idx) = cx.gateway_idx(namespace, &target.name) else {
                continue;
            };
            let section = target.section_name.as_deref();
            if attach_policy(cx, gateway_idx, section, policy) {
                let ancestor = cx.gateways[gateway_idx].parent_ref(section);
                if !ancestors.contains(&ancestor) {
                    ancestors.push(ancestor);
                }
            }
        }

        if ancestors.is_empty() {
            tracing::debug!(policy = %format!("{namespace}/{name}"), "extension policy matched no listeners");
            continue;
        }

        let mut status: PolicyStatus = policy
            .get("status")
            .and_then(|s| serde_json::from_value(s.clone()).ok())
            .unwrap_or_default();
        status
            .ancestors
            .retain(|a| a.controller_name != config.controller_name);

        let writer = AncestorStatusWriter {
            controller_name: &config.controller_name,
            generation: policy
                .get("metadata")
                .and_then(|m| m.get("generation"))
                .and_then(Value::as_i64),
            now: &now,
        };
        writer.accept(&mut status, &ancestors);
        writer.truncate(&mut status);

        let mut output = policy.clone();
        if let (Some(obj), Ok(status)) = (output.as_object_mut(), serde_json::to_value(status)) {
            obj.insert("status".to_string(), status);
        }
        cx.output.extension_server_policies.push(output);
    }
}

/// Add a policy to every Listener of a Gateway that `section` selects.
/// Returns true if any Listener took it.
fn attach_policy(
    cx: &mut TranslateContext,
    gateway_idx: usize,
    section: Option<&str>,
    policy: &Value,
) -> bool {
    let gateway = &cx.gateways[gateway_idx];
    let names: Vec<_> = gateway
        .listeners
        .iter()
        .filter(|l| section.map_or(true, |s| s == l.name))
        .map(|l| l.ir_name.clone())
        .collect();

    let Some(xds) = cx.xds.get_mut(&gateway.ir_key) else {
        return false;
    };

    let extension_ref = || ir::UnstructuredRef {
        object: policy.clone(),
    };
    let mut found = false;
    for listener in xds.http.iter_mut().filter(|l| names.contains(&l.name)) {
        listener.extension_refs.push(extension_ref());
        found = true;
    }
    for listener in xds.tcp.iter_mut().filter(|l| names.contains(&l.name)) {
        listener.extension_refs.push(extension_ref());
        found = true;
    }
    for listener in xds.udp.iter_mut().filter(|l| names.contains(&l.name)) {
        listener.extension_refs.push(extension_ref());
        found = true;
    }

    if found && !xds.extension_server_policies.contains(policy) {
        xds.extension_server_policies.push(policy.clone());
    }
    found
}

fn metadata_str<'a>(obj: &'a Value, field: &str) -> &'a str {
    obj.get("metadata")
        .and_then(|m| m.get(field))
        .and_then(Value::as_str)
        .unwrap_or_default()
}

// RFC 3339 timestamps in UTC sort lexically
fn creation_timestamp(obj: &Value) -> &str {
    metadata_str(obj, "creationTimestamp")
}
