//! The translation pass.
//!
//! A [Translator] turns a [Resources] snapshot into IR. Every pass starts from
//! scratch: the output objects are fresh copies of the input with this
//! controller's status rebuilt, and the IR is built up over a fixed sequence of
//! stages.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::ResourceExt;

use crate::config::TranslatorConfig;
use crate::contexts::{is_ip_address_type, GatewayContext};
use crate::error::Error;
use crate::ir::{self, InfraIrMap, XdsIrMap};
use crate::listener;
use crate::policy;
use crate::resources::Resources;
use crate::route::{self, RouteContext};
use crate::sort;
use crate::status::{self, reasons, types};

/// Compiles Gateway API resources into IR.
///
/// A Translator holds only configuration and can be shared freely between
/// threads.
#[derive(Clone, Debug, Default)]
pub struct Translator {
    config: TranslatorConfig,
}

/// Everything a translation produces.
#[derive(Debug, Default)]
pub struct TranslateResult {
    /// The input objects this controller manages, with status rewritten.
    pub resources: Resources,

    pub xds: XdsIrMap,
    pub infra: InfraIrMap,

    /// Problems that couldn't be reported as a status condition, including
    /// IR that failed validation.
    pub errors: Vec<Error>,
}

impl Translator {
    pub fn new(config: TranslatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TranslatorConfig {
        &self.config
    }

    /// Translate a snapshot.
    ///
    /// User configuration errors never fail a translation. They're reported
    /// as conditions on the object that caused them, and the IR is built
    /// without the broken parts.
    ///
    /// # Panics
    ///
    /// Panics if a Gateway or Route in the snapshot has no name.
    pub fn translate(&self, resources: &Resources) -> TranslateResult {
        let mut cx = TranslateContext::new(&self.config, resources);

        listener::process_listeners(&mut cx);
        policy::patch::process_envoy_patch_policies(&mut cx);
        process_addresses(&mut cx);

        route::http::process_http_routes(&mut cx);
        route::grpc::process_grpc_routes(&mut cx);
        route::l4::process_tls_routes(&mut cx);
        route::l4::process_tcp_routes(&mut cx);
        route::l4::process_udp_routes(&mut cx);

        sort::sort_xds_routes(&mut cx.xds);

        policy::client_traffic::process_client_traffic_policies(&mut cx);
        policy::backend_traffic::process_backend_traffic_policies(&mut cx);
        policy::security::process_security_policies(&mut cx);
        policy::extension::process_envoy_extension_policies(&mut cx);
        policy::extension_server::process_extension_server_policies(&mut cx);

        cx.finish()
    }
}

/// The state of a single translation.
pub(crate) struct TranslateContext<'a> {
    pub(crate) config: &'a TranslatorConfig,
    pub(crate) resources: &'a Resources,
    pub(crate) now: Time,

    pub(crate) gateways: Vec<GatewayContext>,
    pub(crate) routes: Vec<RouteContext>,

    pub(crate) xds: XdsIrMap,
    pub(crate) infra: InfraIrMap,

    /// Routes and policies with their new status. Gateways are added when
    /// the translation finishes.
    pub(crate) output: Resources,
    pub(crate) errors: Vec<Error>,
}

impl<'a> TranslateContext<'a> {
    /// Select the Gateways of the configured class and create empty IR for
    /// each of them.
    pub(crate) fn new(config: &'a TranslatorConfig, resources: &'a Resources) -> Self {
        let now = config.transition_time.clone().unwrap_or_else(status::now);

        let mut cx = Self {
            config,
            resources,
            now,
            gateways: vec![],
            routes: vec![],
            xds: BTreeMap::new(),
            infra: BTreeMap::new(),
            output: Resources::default(),
            errors: vec![],
        };

        for gateway in &resources.gateways {
            if gateway.metadata.name.is_none() {
                panic!("found a Gateway with no name in the snapshot");
            }

            let key = format!(
                "{}/{}",
                gateway.namespace().unwrap_or_default(),
                gateway.name_any()
            );
            if gateway.spec.gateway_class_name != config.gateway_class_name {
                tracing::debug!(
                    gateway = %key,
                    class = %gateway.spec.gateway_class_name,
                    "skipping gateway for other class",
                );
                continue;
            }

            let ir_key = if config.merge_gateways {
                config.gateway_class_name.clone()
            } else {
                key
            };

            cx.xds.entry(ir_key.clone()).or_insert_with(|| ir::Xds {
                access_log: Some(ir::AccessLog::stdout()),
                ..Default::default()
            });
            cx.infra
                .entry(ir_key.clone())
                .or_insert_with(|| ir::Infra::new(ir_key.clone(), owner_labels(config, gateway)));

            cx.gateways
                .push(GatewayContext::new(gateway, ir_key, cx.now.clone()));
        }

        cx
    }

    pub(crate) fn gateway_idx(&self, namespace: &str, name: &str) -> Option<usize> {
        self.gateways
            .iter()
            .position(|g| g.namespace() == namespace && g.name() == name)
    }

    /// Set Gateway level conditions, validate the IR and hand everything
    /// back.
    fn finish(mut self) -> TranslateResult {
        for gateway in &mut self.gateways {
            if status::find_condition(gateway.conditions(), types::ACCEPTED).is_none() {
                gateway.set_condition(
                    types::ACCEPTED,
                    true,
                    reasons::ACCEPTED,
                    "The Gateway has been scheduled by the controller.",
                );
            }

            if gateway.any_listener_ready() {
                gateway.set_condition(
                    types::PROGRAMMED,
                    true,
                    reasons::PROGRAMMED,
                    "The Gateway has been programmed.",
                );
            } else {
                gateway.set_condition(
                    types::PROGRAMMED,
                    false,
                    reasons::INVALID,
                    "No listeners are ready for this Gateway.",
                );
            }
        }

        for (key, xds) in &self.xds {
            if let Err(errs) = xds.validate() {
                self.errors.extend(errs.into_iter().map(|source| Error::Ir {
                    key: key.clone(),
                    source,
                }));
            }
        }
        for (key, infra) in &self.infra {
            if let Err(errs) = infra.validate() {
                self.errors.extend(errs.into_iter().map(|source| Error::Ir {
                    key: key.clone(),
                    source,
                }));
            }
        }

        let mut resources = self.output;
        resources.gateways = self
            .gateways
            .into_iter()
            .map(GatewayContext::into_gateway)
            .collect();

        TranslateResult {
            resources,
            xds: self.xds,
            infra: self.infra,
            errors: self.errors,
        }
    }
}

fn owner_labels(
    config: &TranslatorConfig,
    gateway: &switchyard_api::gateway::Gateway,
) -> BTreeMap<String, String> {
    if config.merge_gateways {
        return BTreeMap::from([(
            ir::OWNING_GATEWAY_CLASS_LABEL.to_string(),
            config.gateway_class_name.clone(),
        )]);
    }

    BTreeMap::from([
        (
            ir::OWNING_GATEWAY_NAMESPACE_LABEL.to_string(),
            gateway.namespace().unwrap_or_default(),
        ),
        (
            ir::OWNING_GATEWAY_NAME_LABEL.to_string(),
            gateway.name_any(),
        ),
    ])
}

/// Copy Gateway addresses into the Infra IR. Only IP addresses are
/// supported.
fn process_addresses(cx: &mut TranslateContext) {
    for gateway in &mut cx.gateways {
        let mut unsupported = None;
        let mut addresses = vec![];

        for address in gateway.gateway.spec.addresses.iter().flatten() {
            if is_ip_address_type(address.r#type.as_deref()) {
                addresses.push(address.value.clone());
            } else {
                unsupported = address.r#type.clone();
            }
        }

        if let Some(infra) = cx.infra.get_mut(&gateway.ir_key) {
            for address in addresses {
                if !infra.proxy.addresses.contains(&address) {
                    infra.proxy.addresses.push(address);
                }
            }
        }

        if let Some(type_) = unsupported {
            gateway.set_condition(
                types::ACCEPTED,
                false,
                reasons::UNSUPPORTED_ADDRESS,
                &format!("Address type {type_} is not supported, only IPAddress is supported."),
            );
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util::{
        config, gateway_conditions, listener_status, resources, translate, GATEWAY_CLASS,
    };
    use serde_json::json;

    fn gateway(name: &str, class: &str) -> serde_json::Value {
        json!({
            "apiVersion": "gateway.networking.k8s.io/v1",
            "kind": "Gateway",
            "metadata": {"namespace": "envoy-gateway", "name": name},
            "spec": {
                "gatewayClassName": class,
                "listeners": [{"name": "http", "protocol": "HTTP", "port": 80}],
                "addresses": [
                    {"value": "1.2.3.4"},
                    {"type": "Hostname", "value": "foo.example.com"},
                ],
            },
        })
    }

    #[test]
    fn test_skips_other_classes() {
        let resources = resources(json!([
            gateway("gateway-1", GATEWAY_CLASS),
            gateway("gateway-2", "other-class"),
        ]));
        let result = translate(&resources);

        assert_eq!(result.resources.gateways.len(), 1);
        assert_eq!(
            result.xds.keys().collect::<Vec<_>>(),
            vec!["envoy-gateway/gateway-1"]
        );
        assert_eq!(
            result.xds["envoy-gateway/gateway-1"].access_log,
            Some(ir::AccessLog::stdout())
        );
    }

    #[test]
    fn test_gateway_addresses() {
        let resources = resources(json!([gateway("gateway-1", GATEWAY_CLASS)]));
        let result = translate(&resources);

        let infra = &result.infra["envoy-gateway/gateway-1"];
        assert_eq!(infra.proxy.addresses, vec!["1.2.3.4"]);
        assert_eq!(
            infra.proxy.metadata.labels[ir::OWNING_GATEWAY_NAME_LABEL],
            "gateway-1"
        );

        let conditions = gateway_conditions(&result, 0);
        let accepted = status::find_condition(conditions, types::ACCEPTED).unwrap();
        assert_eq!(accepted.status, "False");
        assert_eq!(accepted.reason, reasons::UNSUPPORTED_ADDRESS);
        assert!(status::has_condition(conditions, types::PROGRAMMED, true));

        let status = result.resources.gateways[0].status.as_ref().unwrap();
        let addresses: Vec<_> = status
            .addresses
            .iter()
            .flatten()
            .map(|a| a.value.as_str())
            .collect();
        assert_eq!(addresses, vec!["1.2.3.4"]);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
    }

    #[test]
    fn test_merged_gateways() {
        let config = TranslatorConfig {
            merge_gateways: true,
            ..config()
        };
        let resources = resources(json!([
            gateway("gateway-1", GATEWAY_CLASS),
            gateway("gateway-2", GATEWAY_CLASS),
        ]));
        let result = Translator::new(config).translate(&resources);

        assert_eq!(result.xds.len(), 1);
        assert_eq!(
            result.infra[GATEWAY_CLASS].proxy.metadata.labels[ir::OWNING_GATEWAY_CLASS_LABEL],
            GATEWAY_CLASS
        );

        // the second listener on the same port, protocol and hostname
        // conflicts with the first, so only one makes it into the IR
        let xds = &result.xds[GATEWAY_CLASS];
        assert_eq!(xds.http.len(), 1);
        assert_eq!(xds.http[0].name, "envoy-gateway/gateway-1/http");

        assert!(status::has_condition(
            &listener_status(&result, 1, 0).unwrap().conditions,
            types::CONFLICTED,
            true
        ));
    }

    #[test]
    #[should_panic]
    fn test_unnamed_gateway() {
        let mut resources = resources(json!([gateway("gateway-1", GATEWAY_CLASS)]));
        resources.gateways[0].metadata.name = None;
        translate(&resources);
    }
}
