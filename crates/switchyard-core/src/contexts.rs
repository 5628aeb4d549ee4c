//! Per-translation views of Gateways and their Listeners.
//!
//! A [GatewayContext] owns the output copy of a Gateway, so every status
//! write for the Gateway and its Listeners goes through it. Listeners are
//! addressed by their index in the Gateway spec, which is also the index of
//! their status entry.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, LabelSelector, Time};
use kube::ResourceExt;
use switchyard_api::gateway::{
    supported_kind, Gateway, GatewayListeners, GatewayListenersAllowedRoutesNamespacesFrom,
    GatewayListenersTlsMode, GatewayStatus, GatewayStatusAddresses, GatewayStatusListeners,
    GatewayStatusListenersSupportedKinds, ProtocolType,
};
use switchyard_api::ParentReference;

use crate::ir;
use crate::resources::Resources;
use crate::status;

pub(crate) struct GatewayContext {
    pub(crate) gateway: Gateway,
    pub(crate) ir_key: String,
    pub(crate) listeners: Vec<ListenerContext>,
    conditions: Vec<Condition>,
    listener_statuses: Vec<GatewayStatusListeners>,
    now: Time,
}

impl GatewayContext {
    /// Start an empty status for a Gateway and every one of its Listeners.
    pub(crate) fn new(gateway: &Gateway, ir_key: String, now: Time) -> Self {
        let namespace = gateway.namespace().unwrap_or_default();
        let name = gateway.name_any();

        let listeners: Vec<_> = gateway
            .spec
            .listeners
            .iter()
            .enumerate()
            .map(|(idx, listener)| ListenerContext::new(idx, &namespace, &name, listener))
            .collect();

        let listener_statuses = listeners
            .iter()
            .map(|l| GatewayStatusListeners {
                name: l.name.clone(),
                supported_kinds: vec![],
                attached_routes: 0,
                conditions: vec![],
            })
            .collect();

        Self {
            gateway: gateway.clone(),
            ir_key,
            listeners,
            conditions: vec![],
            listener_statuses,
            now,
        }
    }

    /// The output copy of the Gateway, with its new status.
    pub(crate) fn into_gateway(self) -> Gateway {
        let mut gateway = self.gateway;
        let addresses = gateway
            .spec
            .addresses
            .iter()
            .flatten()
            .filter(|a| is_ip_address_type(a.r#type.as_deref()))
            .map(|a| GatewayStatusAddresses {
                r#type: a.r#type.clone(),
                value: a.value.clone(),
            })
            .collect();

        gateway.status = Some(GatewayStatus {
            addresses: Some(addresses),
            conditions: Some(self.conditions),
            listeners: Some(self.listener_statuses),
        });
        gateway
    }

    pub(crate) fn namespace(&self) -> String {
        self.gateway.namespace().unwrap_or_default()
    }

    pub(crate) fn name(&self) -> String {
        self.gateway.name_any()
    }

    /// `<namespace>/<name>`
    pub(crate) fn key(&self) -> String {
        format!("{}/{}", self.namespace(), self.name())
    }

    fn generation(&self) -> Option<i64> {
        self.gateway.metadata.generation
    }

    /// A reference to this Gateway, as written in policy ancestor status.
    pub(crate) fn parent_ref(&self, section_name: Option<&str>) -> ParentReference {
        ParentReference {
            group: Some(switchyard_api::GATEWAY_GROUP.to_string()),
            kind: Some(switchyard_api::KIND_GATEWAY.to_string()),
            namespace: Some(self.namespace()),
            name: self.name(),
            section_name: section_name.map(str::to_string),
            port: None,
        }
    }

    pub(crate) fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub(crate) fn set_condition(&mut self, type_: &str, value: bool, reason: &str, message: &str) {
        let condition =
            status::new_condition(type_, value, reason, message, self.generation(), &self.now);
        status::set_condition(&mut self.conditions, condition);
    }

    pub(crate) fn listener_status(&self, idx: usize) -> &GatewayStatusListeners {
        &self.listener_statuses[idx]
    }

    pub(crate) fn listener_status_mut(&mut self, idx: usize) -> &mut GatewayStatusListeners {
        &mut self.listener_statuses[idx]
    }

    pub(crate) fn set_listener_condition(
        &mut self,
        idx: usize,
        type_: &str,
        value: bool,
        reason: &str,
        message: impl Into<String>,
    ) {
        let condition =
            status::new_condition(type_, value, reason, message, self.generation(), &self.now);
        status::set_condition(&mut self.listener_statuses[idx].conditions, condition);
    }

    pub(crate) fn listener_has_condition(&self, idx: usize, type_: &str) -> bool {
        status::find_condition(&self.listener_status(idx).conditions, type_).is_some()
    }

    pub(crate) fn supports_kind(&self, idx: usize, kind: &str) -> bool {
        self.listener_status(idx)
            .supported_kinds
            .iter()
            .any(|k| k.kind == kind)
    }

    pub(crate) fn add_attached_route(&mut self, idx: usize) {
        self.listener_status_mut(idx).attached_routes += 1;
    }

    pub(crate) fn listener_by_section(&self, section_name: &str) -> Option<&ListenerContext> {
        self.listeners.iter().find(|l| l.name == section_name)
    }

    /// True when at least one Listener is ready.
    pub(crate) fn any_listener_ready(&self) -> bool {
        self.listeners.iter().any(|l| l.ready)
    }
}

pub(crate) struct ListenerContext {
    pub(crate) idx: usize,
    pub(crate) name: String,
    pub(crate) protocol: ProtocolType,
    pub(crate) port: i32,
    pub(crate) hostname: Option<String>,

    /// `<gateway namespace>/<gateway name>/<listener name>`
    pub(crate) ir_name: String,

    pub(crate) spec: GatewayListeners,
    pub(crate) allowed_namespaces: AllowedNamespaces,

    /// Serving certificates resolved for HTTPS and terminating TLS Listeners.
    pub(crate) certificates: Vec<ir::TlsCertificate>,

    /// Set once every Listener check has passed. Only ready Listeners get IR.
    pub(crate) ready: bool,
}

impl ListenerContext {
    fn new(
        idx: usize,
        gateway_namespace: &str,
        gateway_name: &str,
        listener: &GatewayListeners,
    ) -> Self {
        Self {
            idx,
            name: listener.name.clone(),
            protocol: ProtocolType::from(listener.protocol.as_str()),
            port: listener.port,
            hostname: listener.hostname.clone().filter(|h| !h.is_empty()),
            ir_name: format!("{gateway_namespace}/{gateway_name}/{}", listener.name),
            spec: listener.clone(),
            allowed_namespaces: AllowedNamespaces::Same,
            certificates: vec![],
            ready: false,
        }
    }

    pub(crate) fn ir_tls(&self) -> Option<ir::TlsConfig> {
        (!self.certificates.is_empty()).then(|| ir::TlsConfig {
            certificates: self.certificates.clone(),
            ..Default::default()
        })
    }
}

/// The namespaces a Listener accepts Routes from.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum AllowedNamespaces {
    All,
    Same,
    Selector(LabelSelector),
}

impl AllowedNamespaces {
    /// An unset `from` means `Same`.
    pub(crate) fn from_listener(listener: &GatewayListeners) -> Self {
        let namespaces = listener.allowed_routes.as_ref().and_then(|a| a.namespaces.as_ref());

        match namespaces.and_then(|n| n.from.as_ref()) {
            Some(GatewayListenersAllowedRoutesNamespacesFrom::All) => AllowedNamespaces::All,
            Some(GatewayListenersAllowedRoutesNamespacesFrom::Same) | None => {
                AllowedNamespaces::Same
            }
            Some(GatewayListenersAllowedRoutesNamespacesFrom::Selector) => {
                AllowedNamespaces::Selector(
                    namespaces
                        .and_then(|n| n.selector.as_ref())
                        .map(LabelSelector::from)
                        .unwrap_or_default(),
                )
            }
        }
    }

    /// Returns true if a Route in `route_namespace` may attach to a Listener
    /// on a Gateway in `gateway_namespace`.
    pub(crate) fn allows(
        &self,
        resources: &Resources,
        gateway_namespace: &str,
        route_namespace: &str,
    ) -> bool {
        match self {
            AllowedNamespaces::All => true,
            AllowedNamespaces::Same => gateway_namespace == route_namespace,
            AllowedNamespaces::Selector(selector) => match resources.namespace(route_namespace) {
                Some(ns) => selector_matches(selector, ns.labels()),
                None => false,
            },
        }
    }
}

const OP_IN: &str = "In";
const OP_NOT_IN: &str = "NotIn";
const OP_EXISTS: &str = "Exists";
const OP_DOES_NOT_EXIST: &str = "DoesNotExist";

/// Check that a label selector can be evaluated.
pub(crate) fn validate_selector(selector: &LabelSelector) -> Result<(), String> {
    for req in selector.match_expressions.iter().flatten() {
        let values = req.values.as_deref().unwrap_or_default();
        match req.operator.as_str() {
            OP_IN | OP_NOT_IN => {
                if values.is_empty() {
                    return Err(format!(
                        "values: Invalid value: []: for '{}', '{}' operator, values set can't be empty",
                        OP_IN, OP_NOT_IN
                    ));
                }
            }
            OP_EXISTS | OP_DOES_NOT_EXIST => {
                if !values.is_empty() {
                    return Err(format!(
                        "values: Invalid value: {values:?}: values set must be empty for {}, {}",
                        OP_EXISTS, OP_DOES_NOT_EXIST
                    ));
                }
            }
            other => return Err(format!("{other:?} is not a valid label selector operator")),
        }
    }
    Ok(())
}

/// Evaluate a label selector. An empty selector matches everything.
pub(crate) fn selector_matches(selector: &LabelSelector, labels: &BTreeMap<String, String>) -> bool {
    let labels_match = selector
        .match_labels
        .iter()
        .flatten()
        .all(|(k, v)| labels.get(k) == Some(v));

    let expressions_match = selector.match_expressions.iter().flatten().all(|req| {
        let values = req.values.as_deref().unwrap_or_default();
        let value = labels.get(&req.key);
        match req.operator.as_str() {
            OP_IN => value.is_some_and(|v| values.contains(v)),
            OP_NOT_IN => value.map_or(true, |v| !values.contains(v)),
            OP_EXISTS => value.is_some(),
            OP_DOES_NOT_EXIST => value.is_none(),
            _ => false,
        }
    });

    labels_match && expressions_match
}

/// The route kinds a Listener can serve, by protocol and TLS mode. Returns
/// `None` for unknown protocols.
pub(crate) fn protocol_route_kinds(
    listener: &ListenerContext,
) -> Option<Vec<GatewayStatusListenersSupportedKinds>> {
    use switchyard_api::{
        KIND_GRPC_ROUTE, KIND_HTTP_ROUTE, KIND_TCP_ROUTE, KIND_TLS_ROUTE, KIND_UDP_ROUTE,
    };

    let kinds: &[&str] = match listener.protocol {
        ProtocolType::HTTP | ProtocolType::HTTPS => &[KIND_HTTP_ROUTE, KIND_GRPC_ROUTE],
        ProtocolType::TCP => &[KIND_TCP_ROUTE],
        ProtocolType::UDP => &[KIND_UDP_ROUTE],
        ProtocolType::TLS => match listener.spec.tls.as_ref().and_then(|tls| tls.mode.as_ref()) {
            Some(GatewayListenersTlsMode::Passthrough) => &[KIND_TLS_ROUTE],
            Some(GatewayListenersTlsMode::Terminate) => &[KIND_TCP_ROUTE],
            None => &[KIND_TCP_ROUTE, KIND_TLS_ROUTE],
        },
        ProtocolType::Other(_) => return None,
    };

    Some(kinds.iter().map(|k| supported_kind(k)).collect())
}

/// Gateway addresses are IP addresses when their type is unset.
pub(crate) fn is_ip_address_type(type_: Option<&str>) -> bool {
    matches!(type_, None | Some("") | Some("IPAddress"))
}

#[cfg(test)]
mod test {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelectorRequirement;

    fn requirement(key: &str, operator: &str, values: &[&str]) -> LabelSelectorRequirement {
        LabelSelectorRequirement {
            key: key.to_string(),
            operator: operator.to_string(),
            values: (!values.is_empty()).then(|| values.iter().map(|s| s.to_string()).collect()),
        }
    }

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_selector_matches() {
        let selector = LabelSelector {
            match_labels: Some(labels(&[("team", "infra")])),
            match_expressions: Some(vec![
                requirement("env", OP_IN, &["prod", "staging"]),
                requirement("deprecated", OP_DOES_NOT_EXIST, &[]),
            ]),
        };

        assert!(selector_matches(
            &selector,
            &labels(&[("team", "infra"), ("env", "prod")])
        ));
        assert!(!selector_matches(
            &selector,
            &labels(&[("team", "infra"), ("env", "dev")])
        ));
        assert!(!selector_matches(
            &selector,
            &labels(&[("team", "infra"), ("env", "prod"), ("deprecated", "yes")])
        ));
        assert!(!selector_matches(&selector, &labels(&[("env", "prod")])));

        assert!(selector_matches(&LabelSelector::default(), &labels(&[])));
    }

    #[test]
    fn test_validate_selector() {
        let selector = |req| LabelSelector {
            match_labels: None,
            match_expressions: Some(vec![req]),
        };

        assert!(validate_selector(&selector(requirement("a", OP_IN, &["b"]))).is_ok());
        assert!(validate_selector(&selector(requirement("a", OP_EXISTS, &[]))).is_ok());
        assert!(validate_selector(&selector(requirement("a", OP_NOT_IN, &[]))).is_err());
        assert!(validate_selector(&selector(requirement("a", OP_DOES_NOT_EXIST, &["b"]))).is_err());
        assert!(validate_selector(&selector(requirement("a", "Matches", &["b"]))).is_err());
    }
}
