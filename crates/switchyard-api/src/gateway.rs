//! Gateways and their Listeners.
//!
//! A [Gateway] is a request for a proxy that accepts traffic on a set of
//! Listeners. Routes attach to Listeners through their parent refs.
//!
//! The resource types are the upstream Gateway API CRDs. Listener protocols
//! are plain strings there, so they're parsed into a [ProtocolType] here.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};

pub use gateway_api::apis::standard::gatewayclasses::{GatewayClass, GatewayClassSpec};
pub use gateway_api::apis::standard::gateways::{
    Gateway, GatewayAddresses, GatewayListeners, GatewayListenersAllowedRoutes,
    GatewayListenersAllowedRoutesKinds, GatewayListenersAllowedRoutesNamespaces,
    GatewayListenersAllowedRoutesNamespacesFrom, GatewayListenersAllowedRoutesNamespacesSelector,
    GatewayListenersTls, GatewayListenersTlsCertificateRefs, GatewayListenersTlsMode, GatewaySpec,
    GatewayStatus, GatewayStatusAddresses, GatewayStatusListeners,
    GatewayStatusListenersSupportedKinds,
};

use crate::shared::SecretObjectReference;

/// The network protocol a Listener expects to receive.
///
/// Unknown protocols are kept around so they can be reported in status
/// instead of failing to parse the whole Gateway.
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ProtocolType {
    HTTP,
    HTTPS,
    TLS,
    TCP,
    UDP,
    Other(String),
}

impl ProtocolType {
    pub fn as_str(&self) -> &str {
        match self {
            ProtocolType::HTTP => "HTTP",
            ProtocolType::HTTPS => "HTTPS",
            ProtocolType::TLS => "TLS",
            ProtocolType::TCP => "TCP",
            ProtocolType::UDP => "UDP",
            ProtocolType::Other(p) => p,
        }
    }
}

impl From<&str> for ProtocolType {
    fn from(s: &str) -> Self {
        match s {
            "HTTP" => ProtocolType::HTTP,
            "HTTPS" => ProtocolType::HTTPS,
            "TLS" => ProtocolType::TLS,
            "TCP" => ProtocolType::TCP,
            "UDP" => ProtocolType::UDP,
            other => ProtocolType::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for ProtocolType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A Gateway API route kind, as reported in a Listener's supported kinds.
pub fn supported_kind(kind: &str) -> GatewayStatusListenersSupportedKinds {
    GatewayStatusListenersSupportedKinds {
        group: Some(crate::GATEWAY_GROUP.to_string()),
        kind: kind.to_string(),
    }
}

impl From<&GatewayListenersAllowedRoutesKinds> for GatewayStatusListenersSupportedKinds {
    fn from(kind: &GatewayListenersAllowedRoutesKinds) -> Self {
        GatewayStatusListenersSupportedKinds {
            group: kind.group.clone(),
            kind: kind.kind.clone(),
        }
    }
}

impl From<&GatewayListenersTlsCertificateRefs> for SecretObjectReference {
    fn from(r: &GatewayListenersTlsCertificateRefs) -> Self {
        SecretObjectReference {
            group: r.group.clone(),
            kind: r.kind.clone(),
            name: r.name.clone(),
            namespace: r.namespace.clone(),
        }
    }
}

impl From<&GatewayListenersAllowedRoutesNamespacesSelector> for LabelSelector {
    fn from(selector: &GatewayListenersAllowedRoutesNamespacesSelector) -> Self {
        let match_expressions = selector.match_expressions.as_ref().map(|exprs| {
            exprs
                .iter()
                .map(|e| LabelSelectorRequirement {
                    key: e.key.clone(),
                    operator: e.operator.clone(),
                    values: e.values.clone(),
                })
                .collect()
        });

        LabelSelector {
            match_expressions,
            match_labels: selector.match_labels.clone(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_listener_protocols() {
        let listeners: Vec<GatewayListeners> = serde_json::from_value(json!([
            {"name": "http", "port": 80, "protocol": "HTTP"},
            {"name": "sctp", "port": 90, "protocol": "SCTP"},
        ]))
        .unwrap();

        let protocols: Vec<_> = listeners
            .iter()
            .map(|l| ProtocolType::from(l.protocol.as_str()))
            .collect();
        assert_eq!(
            protocols,
            vec![ProtocolType::HTTP, ProtocolType::Other("SCTP".to_string())]
        );
        assert_eq!(protocols[1].to_string(), "SCTP");
    }

    #[test]
    fn test_gateway_yaml() {
        let gateway: Gateway = serde_yml::from_str(
            r#"
apiVersion: gateway.networking.k8s.io/v1
kind: Gateway
metadata:
  namespace: envoy-gateway
  name: gateway-1
spec:
  gatewayClassName: envoy-gateway-class
  listeners:
  - name: tls
    protocol: HTTPS
    port: 443
    hostname: "*.envoyproxy.io"
    tls:
      mode: Terminate
      certificateRefs:
      - name: tls-secret-1
    allowedRoutes:
      namespaces:
        from: Selector
        selector:
          matchLabels:
            team: infra
          matchExpressions:
          - key: env
            operator: In
            values: [prod]
"#,
        )
        .unwrap();

        assert_eq!(gateway.spec.gateway_class_name, "envoy-gateway-class");
        let listener = &gateway.spec.listeners[0];
        assert_eq!(ProtocolType::from(listener.protocol.as_str()), ProtocolType::HTTPS);
        assert_eq!(listener.hostname.as_deref(), Some("*.envoyproxy.io"));

        let tls = listener.tls.as_ref().unwrap();
        assert_eq!(tls.mode, Some(GatewayListenersTlsMode::Terminate));
        let cert_refs: Vec<_> = tls
            .certificate_refs
            .iter()
            .flatten()
            .map(SecretObjectReference::from)
            .collect();
        assert_eq!(cert_refs[0].name, "tls-secret-1");
        assert_eq!(cert_refs[0].namespace, None);

        let namespaces = listener
            .allowed_routes
            .as_ref()
            .and_then(|a| a.namespaces.as_ref())
            .unwrap();
        assert_eq!(
            namespaces.from,
            Some(GatewayListenersAllowedRoutesNamespacesFrom::Selector)
        );

        let selector = LabelSelector::from(namespaces.selector.as_ref().unwrap());
        assert_eq!(selector.match_labels.unwrap()["team"], "infra");
        assert_eq!(
            selector.match_expressions.unwrap()[0].values,
            Some(vec!["prod".to_string()])
        );
        assert!(gateway.status.is_none());
    }
}
