//! Fixtures shared by unit tests.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use k8s_openapi::ByteString;
use serde_json::json;
use switchyard_api::gateway::GatewayStatusListeners;

use crate::{Resources, TranslateResult, Translator, TranslatorConfig};

pub(crate) const RSA_CERT: &str = include_str!("../testdata/tls/rsa.crt");
pub(crate) const RSA_KEY: &str = include_str!("../testdata/tls/rsa-pkcs8.key");
pub(crate) const EC_CERT: &str = include_str!("../testdata/tls/ec.crt");
pub(crate) const EC_KEY: &str = include_str!("../testdata/tls/ec.key");

pub(crate) const GATEWAY_CLASS: &str = "envoy-gateway-class";

/// A config with a fixed transition time, so status output is stable.
pub(crate) fn config() -> TranslatorConfig {
    TranslatorConfig {
        gateway_class_name: GATEWAY_CLASS.to_string(),
        transition_time: Some(Time(
            k8s_openapi::chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        )),
        ..Default::default()
    }
}

/// Build a snapshot out of a JSON array of objects.
pub(crate) fn resources(objs: serde_json::Value) -> Resources {
    resources_with_config(objs, &config())
}

pub(crate) fn resources_with_config(objs: serde_json::Value, config: &TranslatorConfig) -> Resources {
    let yaml = objs
        .as_array()
        .unwrap()
        .iter()
        .map(|o| serde_yml::to_string(o).unwrap())
        .collect::<Vec<_>>()
        .join("---\n");
    Resources::from_yaml_str(&yaml, config).unwrap()
}

pub(crate) fn translate(resources: &Resources) -> TranslateResult {
    Translator::new(config()).translate(resources)
}

pub(crate) fn tls_secret(namespace: &str, name: &str, cert: &str, key: &str) -> Secret {
    let mut secret = Secret {
        type_: Some("kubernetes.io/tls".to_string()),
        data: Some(BTreeMap::from([
            ("tls.crt".to_string(), ByteString(cert.as_bytes().to_vec())),
            ("tls.key".to_string(), ByteString(key.as_bytes().to_vec())),
        ])),
        ..Default::default()
    };
    secret.metadata.namespace = Some(namespace.to_string());
    secret.metadata.name = Some(name.to_string());
    secret
}

pub(crate) fn gateway(name: &str, listeners: serde_json::Value) -> serde_json::Value {
    json!({
        "apiVersion": "gateway.networking.k8s.io/v1",
        "kind": "Gateway",
        "metadata": {"namespace": "envoy-gateway", "name": name},
        "spec": {
            "gatewayClassName": GATEWAY_CLASS,
            "listeners": listeners,
        },
    })
}

pub(crate) fn service(namespace: &str, name: &str, ports: serde_json::Value) -> serde_json::Value {
    json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": {"namespace": namespace, "name": name},
        "spec": {"clusterIP": "10.11.12.13", "ports": ports},
    })
}

pub(crate) fn listener_condition<'a>(
    result: &'a TranslateResult,
    gateway: usize,
    listener: usize,
    type_: &str,
) -> Option<&'a Condition> {
    let status = listener_status(result, gateway, listener)?;
    crate::status::find_condition(&status.conditions, type_)
}

pub(crate) fn listener_status(
    result: &TranslateResult,
    gateway: usize,
    listener: usize,
) -> Option<&GatewayStatusListeners> {
    let status = result.resources.gateways[gateway].status.as_ref()?;
    status.listeners.as_ref()?.get(listener)
}

pub(crate) fn gateway_conditions(result: &TranslateResult, gateway: usize) -> &[Condition] {
    result.resources.gateways[gateway]
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_deref())
        .unwrap_or_default()
}
