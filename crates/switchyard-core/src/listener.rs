//! Listener validation.
//!
//! Every Listener of every selected Gateway is checked for conflicts with the
//! other Listeners on its port, then on its own. Checks record conditions
//! instead of stopping, so a Listener can report more than one problem. Only
//! Listeners that pass every check are marked ready and get IR.

use std::collections::{BTreeMap, BTreeSet};

use kube::ResourceExt;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use switchyard_api::gateway::{
    GatewayListenersAllowedRoutesNamespacesFrom, GatewayListenersTls, GatewayListenersTlsMode,
    GatewayStatusListenersSupportedKinds, ProtocolType,
};
use switchyard_api::{SecretObjectReference, GATEWAY_GROUP, KIND_GATEWAY, KIND_SECRET};

use crate::contexts::{
    protocol_route_kinds, validate_selector, AllowedNamespaces, GatewayContext, ListenerContext,
};
use crate::hostname::{validate_hostname, WILDCARD};
use crate::ir::{self, InfraProtocol, ListenerPort};
use crate::refs::{self, Referrer};
use crate::resources::Resources;
use crate::status::{reasons, types};
use crate::tls;
use crate::translator::TranslateContext;

/// Listeners can't bind privileged ports, so ports below this are shifted
/// up by [PRIVILEGED_PORT_OFFSET].
const MIN_UNPRIVILEGED_PORT: u32 = 1024;
const PRIVILEGED_PORT_OFFSET: u32 = 10000;

const ANY_ADDRESS: &str = "0.0.0.0";

/// A failed Listener check. Always recorded as a False condition.
#[derive(Debug, PartialEq, Eq)]
struct ListenerError {
    type_: &'static str,
    reason: &'static str,
    message: String,
}

impl ListenerError {
    fn invalid(message: impl Into<String>) -> Self {
        Self {
            type_: types::READY,
            reason: reasons::INVALID,
            message: message.into(),
        }
    }

    fn certificate_ref(message: impl Into<String>) -> Self {
        Self {
            type_: types::RESOLVED_REFS,
            reason: reasons::INVALID_CERTIFICATE_REF,
            message: message.into(),
        }
    }

    fn route_kinds(message: impl Into<String>) -> Self {
        Self {
            type_: types::RESOLVED_REFS,
            reason: reasons::INVALID_ROUTE_KINDS,
            message: message.into(),
        }
    }
}

fn record(gateway: &mut GatewayContext, idx: usize, err: ListenerError) {
    gateway.set_listener_condition(idx, err.type_, false, err.reason, err.message);
}

pub(crate) fn process_listeners(cx: &mut TranslateContext) {
    for gateway in &mut cx.gateways {
        check_l7_conflicts(gateway);
        check_l4_conflicts(gateway, &[ProtocolType::TCP, ProtocolType::TLS]);
        check_l4_conflicts(gateway, &[ProtocolType::UDP]);
    }
    if cx.config.merge_gateways {
        check_merged_conflicts(&mut cx.gateways);
    }

    let resources = cx.resources;
    for gateway in &mut cx.gateways {
        let namespace = gateway.namespace();

        for idx in 0..gateway.listeners.len() {
            if let Err(err) = check_port(&gateway.listeners[idx]) {
                record(gateway, idx, err);
            }
            check_route_kinds(gateway, idx);

            let (allowed, result) = check_allowed_namespaces(&gateway.listeners[idx]);
            gateway.listeners[idx].allowed_namespaces = allowed;
            if let Err(err) = result {
                record(gateway, idx, err);
            }

            match listener_certificates(&namespace, &gateway.listeners[idx], resources) {
                Ok(certificates) => gateway.listeners[idx].certificates = certificates,
                Err(err) => record(gateway, idx, err),
            }

            if let Err(err) = check_hostname(&gateway.listeners[idx]) {
                record(gateway, idx, err);
            }

            if !finish_listener(gateway, idx) {
                tracing::debug!(
                    gateway = %gateway.key(),
                    listener = %gateway.listeners[idx].name,
                    "listener is not ready",
                );
                continue;
            }
            gateway.listeners[idx].ready = true;

            let ir_key = &gateway.ir_key;
            if let (Some(xds), Some(infra)) = (cx.xds.get_mut(ir_key), cx.infra.get_mut(ir_key)) {
                add_listener_ir(&gateway.listeners[idx], xds, infra);
            }
        }
    }
}

/// HTTPS and TLS Listeners can share a port, since both are routed by SNI.
fn l7_protocol_group(protocol: &ProtocolType) -> &str {
    match protocol {
        ProtocolType::HTTPS | ProtocolType::TLS => "https/tls",
        other => other.as_str(),
    }
}

#[derive(Default)]
struct PortListeners<'a> {
    listeners: Vec<usize>,
    protocols: BTreeSet<&'a str>,
    hostnames: BTreeMap<&'a str, usize>,
}

fn check_l7_conflicts(gateway: &mut GatewayContext) {
    let mut ports: BTreeMap<i32, PortListeners> = BTreeMap::new();
    for listener in &gateway.listeners {
        if matches!(listener.protocol, ProtocolType::TCP | ProtocolType::UDP) {
            continue;
        }

        let info = ports.entry(listener.port).or_default();
        info.listeners.push(listener.idx);
        info.protocols.insert(l7_protocol_group(&listener.protocol));
        *info
            .hostnames
            .entry(listener.hostname.as_deref().unwrap_or_default())
            .or_default() += 1;
    }

    let mut conflicts = vec![];
    for info in ports.values() {
        for &idx in &info.listeners {
            if info.protocols.len() > 1 {
                conflicts.push((
                    idx,
                    reasons::PROTOCOL_CONFLICT,
                    "All listeners for a given port must use a compatible protocol",
                ));
            }

            let hostname = gateway.listeners[idx].hostname.as_deref().unwrap_or_default();
            if info.hostnames.get(hostname).copied().unwrap_or_default() > 1 {
                conflicts.push((
                    idx,
                    reasons::HOSTNAME_CONFLICT,
                    "All listeners for a given port must use a unique hostname",
                ));
            }
        }
    }

    for (idx, reason, message) in conflicts {
        gateway.set_listener_condition(idx, types::CONFLICTED, true, reason, message);
    }
}

/// Only the first Listener of one of `protocols` on a port is kept. Every
/// later one conflicts with it.
fn check_l4_conflicts(gateway: &mut GatewayContext, protocols: &[ProtocolType]) {
    let mut ports: BTreeMap<i32, Vec<usize>> = BTreeMap::new();
    for listener in &gateway.listeners {
        if protocols.contains(&listener.protocol) {
            ports.entry(listener.port).or_default().push(listener.idx);
        }
    }

    let names: Vec<_> = protocols.iter().map(ProtocolType::as_str).collect();
    let message = format!(
        "Only one {} listener is allowed in a given port",
        names.join("/")
    );

    for listeners in ports.values() {
        for &idx in listeners.iter().skip(1) {
            gateway.set_listener_condition(
                idx,
                types::CONFLICTED,
                true,
                reasons::PROTOCOL_CONFLICT,
                message.clone(),
            );
        }
    }
}

/// Merged Gateways share a proxy, so no two Listeners across all of them can
/// share a port, protocol and hostname.
fn check_merged_conflicts(gateways: &mut [GatewayContext]) {
    let mut seen = BTreeSet::new();

    for gateway in gateways {
        for idx in 0..gateway.listeners.len() {
            let listener = &gateway.listeners[idx];
            let key = format!(
                "{}:{}:{}",
                listener.protocol,
                listener.hostname.as_deref().unwrap_or_default(),
                listener.port
            );

            if !seen.insert(key) {
                gateway.set_listener_condition(
                    idx,
                    types::CONFLICTED,
                    true,
                    reasons::HOSTNAME_CONFLICT,
                    "Port, protocol and hostname tuple must be unique for every listener",
                );
            }
        }
    }
}

/// Work out which Route kinds a Listener supports and record them in its
/// status.
fn check_route_kinds(gateway: &mut GatewayContext, idx: usize) {
    let listener = &gateway.listeners[idx];

    let Some(allowed) = protocol_route_kinds(listener) else {
        let message = format!(
            "Protocol {} is unsupported, must be HTTP, HTTPS, TCP or UDP.",
            listener.protocol
        );
        gateway.set_listener_condition(
            idx,
            types::ACCEPTED,
            false,
            reasons::UNSUPPORTED_PROTOCOL,
            message,
        );
        return;
    };

    let requested = listener
        .spec
        .allowed_routes
        .as_ref()
        .and_then(|routes| routes.kinds.clone())
        .unwrap_or_default();
    if requested.is_empty() {
        gateway.listener_status_mut(idx).supported_kinds = allowed;
        return;
    }

    let mut errors = vec![];
    let mut supported = vec![];
    let mut unsupported = vec![];
    for kind in requested {
        if kind.group.as_deref().is_some_and(|g| g != GATEWAY_GROUP) {
            errors.push(ListenerError::route_kinds(format!(
                "Group is not supported, group must be {GATEWAY_GROUP}"
            )));
            continue;
        }

        if allowed.iter().any(|k| k.kind == kind.kind) {
            supported.push(GatewayStatusListenersSupportedKinds::from(&kind));
        } else {
            unsupported.push(kind.kind);
        }
    }

    let valid_kinds: Vec<&str> = if supported.is_empty() {
        allowed.iter().map(|k| k.kind.as_str()).collect()
    } else {
        supported.iter().map(|k| k.kind.as_str()).collect()
    };
    for kind in unsupported {
        errors.push(ListenerError::route_kinds(format!(
            "{kind} is not supported, kind must be one of [{}]",
            valid_kinds.join(" ")
        )));
    }

    gateway.listener_status_mut(idx).supported_kinds = supported;
    for err in errors {
        record(gateway, idx, err);
    }
}

fn check_allowed_namespaces(
    listener: &ListenerContext,
) -> (AllowedNamespaces, Result<(), ListenerError>) {
    let allowed = AllowedNamespaces::from_listener(&listener.spec);

    let namespaces = listener
        .spec
        .allowed_routes
        .as_ref()
        .and_then(|r| r.namespaces.as_ref());
    let Some(namespaces) = namespaces else {
        return (allowed, Ok(()));
    };
    if !matches!(
        namespaces.from,
        Some(GatewayListenersAllowedRoutesNamespacesFrom::Selector)
    ) {
        return (allowed, Ok(()));
    }

    let result = match &namespaces.selector {
        None => Err(ListenerError::invalid(
            "The allowedRoutes.namespaces.selector field must be specified when allowedRoutes.namespaces.from is set to \"Selector\".",
        )),
        Some(selector) => validate_selector(&LabelSelector::from(selector)).map_err(|e| {
            ListenerError::invalid(format!(
                "The allowedRoutes.namespaces.selector could not be parsed: {e}."
            ))
        }),
    };
    (allowed, result)
}

/// Check a Listener's TLS settings against its protocol and load its
/// serving certificates.
fn listener_certificates(
    gateway_namespace: &str,
    listener: &ListenerContext,
    resources: &Resources,
) -> Result<Vec<ir::TlsCertificate>, ListenerError> {
    let protocol = &listener.protocol;
    let tls = listener.spec.tls.as_ref();

    match protocol {
        ProtocolType::HTTP | ProtocolType::TCP | ProtocolType::UDP => match tls {
            Some(_) => Err(ListenerError::invalid(format!(
                "Listener must not have TLS set when protocol is {protocol}."
            ))),
            None => Ok(vec![]),
        },
        ProtocolType::HTTPS => {
            let Some(tls) = tls else {
                return Err(ListenerError::invalid(format!(
                    "Listener must have TLS set when protocol is {protocol}."
                )));
            };
            if let Some(mode) = tls
                .mode
                .as_ref()
                .filter(|m| **m != GatewayListenersTlsMode::Terminate)
            {
                return Err(ListenerError {
                    type_: types::ACCEPTED,
                    reason: reasons::UNSUPPORTED_TLS_MODE,
                    message: format!(
                        "TLS {mode:?} mode is not supported, TLS mode must be Terminate."
                    ),
                });
            }
            serving_certificates(gateway_namespace, tls, resources)
        }
        ProtocolType::TLS => {
            let Some(tls) = tls else {
                return Err(ListenerError::invalid(format!(
                    "Listener must have TLS set when protocol is {protocol}."
                )));
            };
            let has_refs = !tls.certificate_refs.as_deref().unwrap_or_default().is_empty();
            match tls.mode {
                Some(GatewayListenersTlsMode::Passthrough) if has_refs => {
                    Err(ListenerError::invalid(
                        "Listener must not have TLS certificate refs set for TLS mode Passthrough.",
                    ))
                }
                Some(GatewayListenersTlsMode::Terminate) if !has_refs => {
                    Err(ListenerError::invalid(
                        "Listener must have TLS certificate refs set for TLS mode Terminate.",
                    ))
                }
                Some(GatewayListenersTlsMode::Terminate) => {
                    serving_certificates(gateway_namespace, tls, resources)
                }
                _ => Ok(vec![]),
            }
        }
        // already reported as an unsupported protocol
        ProtocolType::Other(_) => Ok(vec![]),
    }
}

/// Resolve and validate every certificate ref. Stops at the first bad ref.
///
/// Certificates must be unique by public key algorithm and domain, so a
/// Listener can serve one RSA and one ECDSA certificate for the same host
/// but not two of either.
fn serving_certificates(
    gateway_namespace: &str,
    tls: &GatewayListenersTls,
    resources: &Resources,
) -> Result<Vec<ir::TlsCertificate>, ListenerError> {
    let cert_refs = tls.certificate_refs.as_deref().unwrap_or_default();
    if cert_refs.is_empty() {
        return Err(ListenerError::certificate_ref(
            "Listener must have at least 1 TLS certificate ref",
        ));
    }

    let from = Referrer {
        group: GATEWAY_GROUP,
        kind: KIND_GATEWAY,
        namespace: gateway_namespace,
    };

    let mut domains = BTreeSet::new();
    let mut certificates = Vec::with_capacity(cert_refs.len());
    for cert_ref in cert_refs.iter().map(SecretObjectReference::from) {
        if cert_ref.group.as_deref().is_some_and(|g| !g.is_empty()) {
            return Err(ListenerError::certificate_ref(
                "Listener's TLS certificate ref group must be unspecified/empty.",
            ));
        }
        if cert_ref.kind.as_deref().is_some_and(|k| k != KIND_SECRET) {
            return Err(ListenerError::certificate_ref(format!(
                "Listener's TLS certificate ref kind must be {KIND_SECRET}."
            )));
        }

        let secret = refs::resolve_secret(resources, from, &cert_ref)
            .map_err(ListenerError::certificate_ref)?;
        let serving = tls::serving_certificate(secret).map_err(ListenerError::certificate_ref)?;

        for domain in &serving.domains {
            if !domains.insert((serving.key_algorithm, domain.clone())) {
                return Err(ListenerError::certificate_ref(format!(
                    "Secret {}/{} public key algorithm must be unique, certificate domain {domain} has a conflicting algorithm [{}].",
                    secret.namespace().unwrap_or_default(),
                    secret.name_any(),
                    serving.key_algorithm,
                )));
            }
        }

        certificates.push(serving.certificate);
    }

    Ok(certificates)
}

fn check_port(listener: &ListenerContext) -> Result<(), ListenerError> {
    match u16::try_from(listener.port) {
        Ok(port) if port > 0 => Ok(()),
        _ => Err(ListenerError::invalid(format!(
            "Listener port {} is invalid, must be between 1 and 65535.",
            listener.port
        ))),
    }
}

fn check_hostname(listener: &ListenerContext) -> Result<(), ListenerError> {
    let Some(hostname) = &listener.hostname else {
        return Ok(());
    };

    match listener.protocol {
        ProtocolType::TCP | ProtocolType::UDP => Err(ListenerError::invalid(format!(
            "Listener must not have hostname set when protocol is {}.",
            listener.protocol
        ))),
        _ => validate_hostname(hostname)
            .map_err(|e| ListenerError::invalid(format!("Listener hostname is invalid, {e}."))),
    }
}

/// Set the final conditions on a Listener. Returns true if the Listener is
/// ready.
///
/// A Listener with no conditions recorded by now has passed every check.
fn finish_listener(gateway: &mut GatewayContext, idx: usize) -> bool {
    if gateway.listener_status(idx).conditions.is_empty() {
        gateway.set_listener_condition(idx, types::READY, true, reasons::READY, "Listener is ready");
        gateway.set_listener_condition(
            idx,
            types::ACCEPTED,
            true,
            reasons::ACCEPTED,
            "Listener has been successfully translated",
        );
        gateway.set_listener_condition(
            idx,
            types::RESOLVED_REFS,
            true,
            reasons::RESOLVED_REFS,
            "Listener references have been resolved",
        );
        return true;
    }

    if !gateway.listener_has_condition(idx, types::READY) {
        gateway.set_listener_condition(
            idx,
            types::READY,
            false,
            reasons::INVALID,
            "Listener is invalid, see other Conditions for details.",
        );
    }
    if !gateway.listener_has_condition(idx, types::RESOLVED_REFS) {
        gateway.set_listener_condition(
            idx,
            types::RESOLVED_REFS,
            true,
            reasons::RESOLVED_REFS,
            "Listener references have been resolved",
        );
    }
    false
}

pub(crate) fn container_port(port: u32) -> u32 {
    if port < MIN_UNPRIVILEGED_PORT {
        port + PRIVILEGED_PORT_OFFSET
    } else {
        port
    }
}

fn add_listener_ir(listener: &ListenerContext, xds: &mut ir::Xds, infra: &mut ir::Infra) {
    let Ok(external_port) = u32::try_from(listener.port) else {
        return;
    };
    let port = container_port(external_port);
    let name = listener.ir_name.clone();

    let protocol = match listener.protocol {
        ProtocolType::HTTP | ProtocolType::HTTPS => {
            let hostname = listener.hostname.as_deref().unwrap_or(WILDCARD);
            xds.http.push(ir::HttpListener {
                name,
                address: ANY_ADDRESS.to_string(),
                port,
                external_port,
                hostnames: vec![hostname.to_string()],
                tls: listener.ir_tls(),
                ..Default::default()
            });

            if listener.protocol == ProtocolType::HTTPS {
                InfraProtocol::HTTPS
            } else {
                InfraProtocol::HTTP
            }
        }
        ProtocolType::TLS | ProtocolType::TCP => {
            xds.tcp.push(ir::TcpListener {
                name,
                address: ANY_ADDRESS.to_string(),
                port,
                external_port,
                ..Default::default()
            });

            if listener.protocol == ProtocolType::TLS {
                InfraProtocol::TLS
            } else {
                InfraProtocol::TCP
            }
        }
        ProtocolType::UDP => {
            xds.udp.push(ir::UdpListener {
                name,
                address: ANY_ADDRESS.to_string(),
                port,
                external_port,
                ..Default::default()
            });
            InfraProtocol::UDP
        }
        ProtocolType::Other(_) => return,
    };

    infra.add_port(ListenerPort::new(protocol, external_port, port));
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util::*;
    use serde_json::json;

    fn condition(
        result: &crate::TranslateResult,
        listener: usize,
        type_: &str,
    ) -> (String, String, String) {
        let c = listener_condition(result, 0, listener, type_)
            .unwrap_or_else(|| panic!("missing {type_} condition on listener {listener}"));
        (c.status.clone(), c.reason.clone(), c.message.clone())
    }

    #[test]
    fn test_ready_listeners() {
        let resources = resources(json!([gateway(
            "gateway-1",
            json!([
                {"name": "http", "protocol": "HTTP", "port": 80, "hostname": "foo.example.com"},
                {"name": "tcp", "protocol": "TCP", "port": 5432},
                {"name": "udp", "protocol": "UDP", "port": 53},
            ])
        )]));
        let result = translate(&resources);

        for idx in 0..3 {
            assert_eq!(condition(&result, idx, types::READY).0, "True");
            assert_eq!(condition(&result, idx, types::ACCEPTED).0, "True");
            assert_eq!(condition(&result, idx, types::RESOLVED_REFS).0, "True");
        }

        let xds = &result.xds["envoy-gateway/gateway-1"];
        assert_eq!(xds.http[0].name, "envoy-gateway/gateway-1/http");
        assert_eq!(xds.http[0].port, 10080);
        assert_eq!(xds.http[0].external_port, 80);
        assert_eq!(xds.http[0].hostnames, vec!["foo.example.com"]);
        assert_eq!(xds.tcp[0].port, 5432);
        assert_eq!(xds.udp[0].port, 10053);

        let ports: Vec<_> = result.infra["envoy-gateway/gateway-1"].proxy.listeners[0]
            .ports
            .iter()
            .map(|p| (p.name.as_str(), p.protocol, p.service_port, p.container_port))
            .collect();
        assert_eq!(
            ports,
            vec![
                ("http-80", InfraProtocol::HTTP, 80, 10080),
                ("tcp-5432", InfraProtocol::TCP, 5432, 5432),
                ("udp-53", InfraProtocol::UDP, 53, 10053),
            ]
        );

        let kinds: Vec<_> = listener_status(&result, 0, 0)
            .unwrap()
            .supported_kinds
            .iter()
            .map(|k| k.kind.as_str())
            .collect();
        assert_eq!(kinds, vec!["HTTPRoute", "GRPCRoute"]);
    }

    #[test]
    fn test_l7_conflicts() {
        let resources = resources(json!([gateway(
            "gateway-1",
            json!([
                {"name": "http-1", "protocol": "HTTP", "port": 80},
                {"name": "http-2", "protocol": "HTTP", "port": 80},
                {"name": "https", "protocol": "HTTPS", "port": 8443, "hostname": "foo.example.com"},
                {"name": "http-3", "protocol": "HTTP", "port": 8443, "hostname": "bar.example.com"},
            ])
        )]));
        let result = translate(&resources);

        for idx in [0, 1] {
            let (status, reason, _) = condition(&result, idx, types::CONFLICTED);
            assert_eq!(status, "True");
            assert_eq!(reason, reasons::HOSTNAME_CONFLICT);
            assert_eq!(
                condition(&result, idx, types::READY),
                (
                    "False".to_string(),
                    reasons::INVALID.to_string(),
                    "Listener is invalid, see other Conditions for details.".to_string()
                )
            );
            assert_eq!(condition(&result, idx, types::RESOLVED_REFS).0, "True");
        }
        for idx in [2, 3] {
            let (_, reason, message) = condition(&result, idx, types::CONFLICTED);
            assert_eq!(reason, reasons::PROTOCOL_CONFLICT);
            assert_eq!(
                message,
                "All listeners for a given port must use a compatible protocol"
            );
        }

        assert!(result.xds["envoy-gateway/gateway-1"].http.is_empty());
        assert!(crate::status::has_condition(
            gateway_conditions(&result, 0),
            types::PROGRAMMED,
            false
        ));
    }

    #[test]
    fn test_l4_conflicts() {
        let resources = resources(json!([gateway(
            "gateway-1",
            json!([
                {"name": "tcp-1", "protocol": "TCP", "port": 5432},
                {"name": "tcp-2", "protocol": "TCP", "port": 5432},
                {"name": "udp", "protocol": "UDP", "port": 5432},
            ])
        )]));
        let result = translate(&resources);

        assert_eq!(condition(&result, 0, types::READY).0, "True");
        assert_eq!(
            condition(&result, 1, types::CONFLICTED).2,
            "Only one TCP/TLS listener is allowed in a given port"
        );
        assert_eq!(condition(&result, 2, types::READY).0, "True");

        // TCP and UDP share a container port but not an L4 protocol
        let ports = &result.infra["envoy-gateway/gateway-1"].proxy.listeners[0].ports;
        assert_eq!(ports.len(), 2);
    }

    #[test]
    fn test_unsupported_protocol() {
        let resources = resources(json!([gateway(
            "gateway-1",
            json!([{"name": "sctp", "protocol": "SCTP", "port": 9000}])
        )]));
        let result = translate(&resources);

        assert_eq!(
            condition(&result, 0, types::ACCEPTED),
            (
                "False".to_string(),
                reasons::UNSUPPORTED_PROTOCOL.to_string(),
                "Protocol SCTP is unsupported, must be HTTP, HTTPS, TCP or UDP.".to_string()
            )
        );
        assert_eq!(condition(&result, 0, types::READY).0, "False");
    }

    #[test]
    fn test_allowed_route_kinds() {
        let resources = resources(json!([gateway(
            "gateway-1",
            json!([
                {
                    "name": "http",
                    "protocol": "HTTP",
                    "port": 80,
                    "allowedRoutes": {"kinds": [{"kind": "HTTPRoute"}, {"kind": "TCPRoute"}]},
                },
                {
                    "name": "tcp",
                    "protocol": "TCP",
                    "port": 5432,
                    "allowedRoutes": {"kinds": [{"group": "example.com", "kind": "TCPRoute"}]},
                },
            ])
        )]));
        let result = translate(&resources);

        assert_eq!(
            condition(&result, 0, types::RESOLVED_REFS),
            (
                "False".to_string(),
                reasons::INVALID_ROUTE_KINDS.to_string(),
                "TCPRoute is not supported, kind must be one of [HTTPRoute]".to_string()
            )
        );
        assert_eq!(
            condition(&result, 1, types::RESOLVED_REFS).2,
            "Group is not supported, group must be gateway.networking.k8s.io"
        );

        assert_eq!(listener_status(&result, 0, 0).unwrap().supported_kinds.len(), 1);
        assert!(listener_status(&result, 0, 1).unwrap().supported_kinds.is_empty());
    }

    #[test]
    fn test_namespace_selector() {
        let resources = resources(json!([gateway(
            "gateway-1",
            json!([
                {
                    "name": "missing",
                    "protocol": "HTTP",
                    "port": 80,
                    "hostname": "a.example.com",
                    "allowedRoutes": {"namespaces": {"from": "Selector"}},
                },
                {
                    "name": "invalid",
                    "protocol": "HTTP",
                    "port": 80,
                    "hostname": "b.example.com",
                    "allowedRoutes": {"namespaces": {
                        "from": "Selector",
                        "selector": {"matchExpressions": [{"key": "team", "operator": "In"}]},
                    }},
                },
            ])
        )]));
        let result = translate(&resources);

        let (status, reason, message) = condition(&result, 0, types::READY);
        assert_eq!((status.as_str(), reason.as_str()), ("False", reasons::INVALID));
        assert!(message.starts_with("The allowedRoutes.namespaces.selector field must be specified"));

        let (_, _, message) = condition(&result, 1, types::READY);
        assert!(message.starts_with("The allowedRoutes.namespaces.selector could not be parsed"));
    }

    #[test]
    fn test_tls_settings() {
        let resources = resources(json!([gateway(
            "gateway-1",
            json!([
                {"name": "http", "protocol": "HTTP", "port": 80, "tls": {"mode": "Terminate"}},
                {"name": "https", "protocol": "HTTPS", "port": 443},
                {"name": "https-passthrough", "protocol": "HTTPS", "port": 8443, "tls": {"mode": "Passthrough"}},
                {
                    "name": "tls-passthrough",
                    "protocol": "TLS",
                    "port": 9443,
                    "tls": {"mode": "Passthrough", "certificateRefs": [{"name": "tls-secret-1"}]},
                },
                {"name": "tls-terminate", "protocol": "TLS", "port": 9444, "tls": {"mode": "Terminate"}},
            ])
        )]));
        let result = translate(&resources);

        assert_eq!(
            condition(&result, 0, types::READY).2,
            "Listener must not have TLS set when protocol is HTTP."
        );
        assert_eq!(
            condition(&result, 1, types::READY).2,
            "Listener must have TLS set when protocol is HTTPS."
        );
        assert_eq!(
            condition(&result, 2, types::ACCEPTED),
            (
                "False".to_string(),
                reasons::UNSUPPORTED_TLS_MODE.to_string(),
                "TLS Passthrough mode is not supported, TLS mode must be Terminate.".to_string()
            )
        );
        assert_eq!(
            condition(&result, 3, types::READY).2,
            "Listener must not have TLS certificate refs set for TLS mode Passthrough."
        );
        assert_eq!(
            condition(&result, 4, types::READY).2,
            "Listener must have TLS certificate refs set for TLS mode Terminate."
        );
    }

    #[test]
    fn test_certificate_refs() {
        let https = |name: &str, port: i32, refs: serde_json::Value| {
            json!({
                "name": name,
                "protocol": "HTTPS",
                "port": port,
                "tls": {"mode": "Terminate", "certificateRefs": refs},
            })
        };

        let mut resources = resources(json!([gateway(
            "gateway-1",
            json!([
                https("valid", 443, json!([{"name": "rsa"}, {"name": "ec"}])),
                https("group", 444, json!([{"group": "example.com", "name": "rsa"}])),
                https("kind", 445, json!([{"kind": "ConfigMap", "name": "rsa"}])),
                https("missing", 446, json!([{"name": "nope"}])),
                https("other-namespace", 447, json!([{"namespace": "other", "name": "rsa"}])),
                https("duplicate", 448, json!([{"name": "rsa"}, {"name": "rsa-2"}])),
            ])
        )]));
        resources.secrets = vec![
            tls_secret("envoy-gateway", "rsa", RSA_CERT, RSA_KEY),
            tls_secret("envoy-gateway", "rsa-2", RSA_CERT, RSA_KEY),
            tls_secret("envoy-gateway", "ec", EC_CERT, EC_KEY),
            tls_secret("other", "rsa", RSA_CERT, RSA_KEY),
        ];
        let result = translate(&resources);

        assert_eq!(condition(&result, 0, types::READY).0, "True");
        let listener = &result.xds["envoy-gateway/gateway-1"].http[0];
        let tls = listener.tls.as_ref().unwrap();
        assert_eq!(
            tls.certificates.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            vec!["envoy-gateway-rsa", "envoy-gateway-ec"]
        );

        let messages: Vec<_> = (1..6)
            .map(|idx| {
                let (status, reason, message) = condition(&result, idx, types::RESOLVED_REFS);
                assert_eq!(status, "False");
                assert_eq!(reason, reasons::INVALID_CERTIFICATE_REF);
                message
            })
            .collect();
        assert_eq!(
            messages,
            vec![
                "Listener's TLS certificate ref group must be unspecified/empty.",
                "Listener's TLS certificate ref kind must be Secret.",
                "Secret envoy-gateway/nope does not exist.",
                "Certificate ref to secret other/rsa not permitted by any ReferenceGrant.",
                "Secret envoy-gateway/rsa-2 public key algorithm must be unique, certificate domain foo.envoyproxy.io has a conflicting algorithm [RSA].",
            ]
        );
    }

    #[test]
    fn test_hostnames() {
        let resources = resources(json!([gateway(
            "gateway-1",
            json!([
                {"name": "tcp", "protocol": "TCP", "port": 5432, "hostname": "foo.example.com"},
                {"name": "ip", "protocol": "HTTP", "port": 80, "hostname": "10.0.0.1"},
                {"name": "wildcard", "protocol": "HTTP", "port": 8080, "hostname": "*.example.com"},
            ])
        )]));
        let result = translate(&resources);

        assert_eq!(
            condition(&result, 0, types::READY).2,
            "Listener must not have hostname set when protocol is TCP."
        );
        assert_eq!(condition(&result, 1, types::READY).0, "False");
        assert_eq!(condition(&result, 2, types::READY).0, "True");
    }

    #[test]
    fn test_invalid_ports() {
        let resources = resources(json!([gateway(
            "gateway-1",
            json!([
                {"name": "zero", "protocol": "HTTP", "port": 0},
                {"name": "too-big", "protocol": "TCP", "port": 70000},
                {"name": "negative", "protocol": "UDP", "port": -53},
                {"name": "max", "protocol": "HTTP", "port": 65535},
            ])
        )]));
        let result = translate(&resources);

        assert_eq!(
            condition(&result, 1, types::READY),
            (
                "False".to_string(),
                reasons::INVALID.to_string(),
                "Listener port 70000 is invalid, must be between 1 and 65535.".to_string()
            )
        );
        assert_eq!(condition(&result, 0, types::READY).0, "False");
        assert_eq!(condition(&result, 2, types::READY).0, "False");
        assert_eq!(condition(&result, 3, types::READY).0, "True");

        // only the valid listener gets IR
        let xds = &result.xds["envoy-gateway/gateway-1"];
        assert_eq!(xds.http.len(), 1);
        assert_eq!(xds.http[0].external_port, 65535);
        assert!(xds.tcp.is_empty());
        assert!(xds.udp.is_empty());
    }

    #[test]
    fn test_container_port() {
        assert_eq!(container_port(80), 10080);
        assert_eq!(container_port(1023), 11023);
        assert_eq!(container_port(1024), 1024);
        assert_eq!(container_port(8443), 8443);
    }
}
