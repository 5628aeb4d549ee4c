//! Resolving references from Routes, Gateways and policies to the objects
//! they point at.
//!
//! A reference to an object in another namespace is only allowed when a
//! ReferenceGrant in the target namespace permits it.

use k8s_openapi::api::core::v1::{Secret, Service, ServicePort};
use kube::ResourceExt;
use switchyard_api::{BackendObjectReference, SecretObjectReference, KIND_SECRET, KIND_SERVICE};

use crate::config::TranslatorConfig;
use crate::ir::{AppProtocol, DestinationAddressType, DestinationEndpoint, DestinationSetting};
use crate::resources::Resources;
use crate::status::{reasons, RouteStatusError};
use crate::tls;

const H2C_APP_PROTOCOL: &str = "kubernetes.io/h2c";

/// The object a reference is made from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Referrer<'a> {
    pub(crate) group: &'a str,
    pub(crate) kind: &'a str,
    pub(crate) namespace: &'a str,
}

/// The object a reference points to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Referent<'a> {
    pub(crate) group: &'a str,
    pub(crate) kind: &'a str,
    pub(crate) namespace: &'a str,
    pub(crate) name: &'a str,
}

impl Resources {
    /// Returns true if `from` may refer to `to`. References within a
    /// namespace are always allowed.
    pub(crate) fn reference_allowed(&self, from: Referrer, to: Referent) -> bool {
        if from.namespace == to.namespace {
            return true;
        }

        self.reference_grants
            .iter()
            .filter(|grant| grant.namespace().as_deref() == Some(to.namespace))
            .any(|grant| {
                let from_ok = grant.spec.from.iter().any(|f| {
                    f.group == from.group && f.kind == from.kind && f.namespace == from.namespace
                });
                let to_ok = grant.spec.to.iter().any(|t| {
                    t.group == to.group
                        && t.kind == to.kind
                        && t.name.as_deref().map_or(true, |n| n.is_empty() || n == to.name)
                });
                from_ok && to_ok
            })
    }
}

/// A backend ref that points at an existing Service port.
#[derive(Clone, Debug)]
pub(crate) struct ResolvedBackend<'a> {
    pub(crate) namespace: String,
    pub(crate) service: &'a Service,
    pub(crate) port: &'a ServicePort,
    port_number: u32,
}

/// Validate a backend ref and find the Service port it points at.
///
/// `protocol` is the transport the Route needs, `TCP` for everything but
/// UDPRoutes.
pub(crate) fn resolve_backend<'a>(
    resources: &'a Resources,
    from: Referrer,
    backend: &BackendObjectReference,
    protocol: &str,
) -> Result<ResolvedBackend<'a>, RouteStatusError> {
    let group = backend.group.as_deref().unwrap_or_default();
    if !group.is_empty() {
        return Err(RouteStatusError::resolved_refs(
            reasons::INVALID_KIND,
            format!("Group is invalid, only the core API group (specified by omitting the group field or setting it to an empty string) is supported, got {group}"),
        ));
    }
    let kind = backend.kind.as_deref().unwrap_or(KIND_SERVICE);
    if kind != KIND_SERVICE {
        return Err(RouteStatusError::resolved_refs(
            reasons::INVALID_KIND,
            format!("Kind is invalid, only Service is supported, got {kind}"),
        ));
    }

    let namespace = backend.namespace.as_deref().unwrap_or(from.namespace);
    let referent = Referent {
        group: "",
        kind: KIND_SERVICE,
        namespace,
        name: &backend.name,
    };
    if !resources.reference_allowed(from, referent) {
        return Err(RouteStatusError::resolved_refs(
            reasons::REF_NOT_PERMITTED,
            format!(
                "Backend ref to Service {namespace}/{} not permitted by any ReferenceGrant",
                backend.name
            ),
        ));
    }

    let Some(port_number) = backend.port else {
        return Err(RouteStatusError::resolved_refs(
            reasons::PORT_NOT_SPECIFIED,
            "A valid port number corresponding to a port on the Service must be specified",
        ));
    };

    let service_port = match u16::try_from(port_number) {
        Ok(port) if port > 0 => u32::from(port),
        _ => {
            return Err(RouteStatusError::resolved_refs(
                reasons::UNSUPPORTED_VALUE,
                format!("Port {port_number} is invalid, must be between 1 and 65535"),
            ))
        }
    };

    let Some(service) = resources.service(namespace, &backend.name) else {
        return Err(RouteStatusError::resolved_refs(
            reasons::BACKEND_NOT_FOUND,
            format!("Service {namespace}/{} not found", backend.name),
        ));
    };

    let port = service
        .spec
        .as_ref()
        .and_then(|spec| spec.ports.as_ref())
        .and_then(|ports| {
            ports
                .iter()
                .find(|p| p.port == port_number && port_protocol(p) == protocol)
        });
    let Some(port) = port else {
        return Err(RouteStatusError::resolved_refs(
            reasons::PORT_NOT_FOUND,
            format!(
                "{protocol} Port {port_number} not found on Service {namespace}/{}",
                backend.name
            ),
        ));
    };

    Ok(ResolvedBackend {
        namespace: namespace.to_string(),
        service,
        port,
        port_number: service_port,
    })
}

fn port_protocol(port: &ServicePort) -> &str {
    port.protocol.as_deref().unwrap_or("TCP")
}

impl ResolvedBackend<'_> {
    /// The application protocol to use for this backend, upgrading HTTP to
    /// HTTP/2 when the Service port asks for h2c.
    pub(crate) fn app_protocol(&self, route_protocol: AppProtocol) -> AppProtocol {
        match (route_protocol, self.port.app_protocol.as_deref()) {
            (AppProtocol::HTTP, Some(H2C_APP_PROTOCOL)) => AppProtocol::HTTP2,
            (protocol, _) => protocol,
        }
    }

    /// Build a weighted destination setting for this backend.
    ///
    /// With endpoint routing enabled, endpoints come from the Service's
    /// EndpointSlices. Otherwise the Service's cluster IP is the only
    /// endpoint.
    pub(crate) fn destination_setting(
        &self,
        resources: &Resources,
        config: &TranslatorConfig,
        name: String,
        weight: u32,
        protocol: AppProtocol,
    ) -> DestinationSetting {
        let (endpoints, address_type) = if config.endpoint_routing {
            self.slice_endpoints(resources)
        } else {
            self.cluster_ip_endpoint()
        };

        DestinationSetting {
            name,
            weight,
            protocol: self.app_protocol(protocol),
            endpoints,
            address_type,
        }
    }

    fn slice_endpoints(
        &self,
        resources: &Resources,
    ) -> (Vec<DestinationEndpoint>, Option<DestinationAddressType>) {
        let service_name = self.service.name_any();
        let mut endpoints = Vec::new();
        let mut address_type = None;

        for slice in resources.endpoint_slices_for_service(&self.namespace, &service_name) {
            let slice_port = slice.ports.iter().flatten().find(|p| {
                p.name.as_deref().unwrap_or_default() == self.port.name.as_deref().unwrap_or_default()
                    && p.protocol.as_deref().unwrap_or("TCP") == port_protocol(self.port)
            });
            let Some(port) = slice_port.and_then(|p| p.port) else {
                continue;
            };
            let Ok(port) = u32::try_from(port) else {
                tracing::warn!(
                    slice = %slice.name_any(),
                    port,
                    "skipping EndpointSlice with an invalid port",
                );
                continue;
            };

            let slice_type = match slice.address_type.as_str() {
                "FQDN" => DestinationAddressType::FQDN,
                _ => DestinationAddressType::IP,
            };
            let mut added = false;

            for endpoint in &slice.endpoints {
                let draining = endpoint_draining(endpoint);
                for address in &endpoint.addresses {
                    let endpoint = DestinationEndpoint {
                        host: address.clone(),
                        port,
                        draining,
                    };
                    if !endpoints.contains(&endpoint) {
                        endpoints.push(endpoint);
                        added = true;
                    }
                }
            }

            if added {
                address_type = match address_type {
                    None => Some(slice_type),
                    Some(t) if t == slice_type => Some(t),
                    Some(_) => Some(DestinationAddressType::Mixed),
                };
            }
        }

        (endpoints, address_type)
    }

    fn cluster_ip_endpoint(&self) -> (Vec<DestinationEndpoint>, Option<DestinationAddressType>) {
        let cluster_ip = self
            .service
            .spec
            .as_ref()
            .and_then(|spec| spec.cluster_ip.as_deref())
            .filter(|ip| !ip.is_empty() && *ip != "None");

        match cluster_ip {
            Some(ip) => (
                vec![DestinationEndpoint {
                    host: ip.to_string(),
                    port: self.port_number,
                    draining: false,
                }],
                Some(DestinationAddressType::IP),
            ),
            None => (vec![], None),
        }
    }
}

/// An endpoint drains when it reports serving and terminating conditions and
/// is either terminating or not serving. Without those it drains only when
/// explicitly not ready.
fn endpoint_draining(endpoint: &k8s_openapi::api::discovery::v1::Endpoint) -> bool {
    let Some(conditions) = &endpoint.conditions else {
        return false;
    };

    match (conditions.serving, conditions.terminating) {
        (Some(serving), Some(terminating)) => terminating || !serving,
        _ => conditions.ready == Some(false),
    }
}

/// Find the Secret a certificate ref points to.
///
/// Error messages are formatted for use as a condition message.
pub(crate) fn resolve_secret<'a>(
    resources: &'a Resources,
    from: Referrer,
    secret_ref: &SecretObjectReference,
) -> Result<&'a Secret, String> {
    let group = secret_ref.group.as_deref().unwrap_or_default();
    let kind = secret_ref.kind.as_deref().unwrap_or(KIND_SECRET);
    if !group.is_empty() || kind != KIND_SECRET {
        return Err(format!(
            "Unsupported reference to {kind} {}, only core Secrets are supported.",
            secret_ref.name
        ));
    }

    let namespace = secret_ref.namespace.as_deref().unwrap_or(from.namespace);
    let referent = Referent {
        group: "",
        kind: KIND_SECRET,
        namespace,
        name: &secret_ref.name,
    };
    if !resources.reference_allowed(from, referent) {
        return Err(format!(
            "Certificate ref to secret {namespace}/{} not permitted by any ReferenceGrant.",
            secret_ref.name
        ));
    }

    resources
        .secret(namespace, &secret_ref.name)
        .ok_or_else(|| format!("Secret {namespace}/{} does not exist.", secret_ref.name))
}

/// Find and validate the CA bundle a client validation ref points to. CA
/// certificates can live in a ConfigMap or Secret under `ca.crt`, or in a
/// ClusterTrustBundle.
pub(crate) fn resolve_ca_certificate(
    resources: &Resources,
    from: Referrer,
    ca_ref: &SecretObjectReference,
) -> Result<String, String> {
    use switchyard_api::{KIND_CLUSTER_TRUST_BUNDLE, KIND_CONFIG_MAP};

    let kind = ca_ref.kind.as_deref().unwrap_or(KIND_SECRET);
    let namespace = ca_ref.namespace.as_deref().unwrap_or(from.namespace);
    let name = ca_ref.name.as_str();

    let (group, data) = match kind {
        KIND_SECRET | KIND_CONFIG_MAP => ("", None),
        KIND_CLUSTER_TRUST_BUNDLE => {
            let bundle = resources
                .cluster_trust_bundle(name)
                .ok_or_else(|| format!("ClusterTrustBundle {name} does not exist."))?;
            ("certificates.k8s.io", Some(bundle.spec.trust_bundle.clone()))
        }
        other => return Err(format!("Unsupported reference kind {other} for CA certificate {name}.")),
    };

    if kind != KIND_CLUSTER_TRUST_BUNDLE {
        let referent = Referent {
            group,
            kind,
            namespace,
            name,
        };
        if !resources.reference_allowed(from, referent) {
            return Err(format!(
                "CA certificate ref to {kind} {namespace}/{name} not permitted by any ReferenceGrant."
            ));
        }
    }

    let data = match (kind, data) {
        (_, Some(data)) => data,
        (KIND_CONFIG_MAP, _) => {
            let config_map = resources
                .config_map(namespace, name)
                .ok_or_else(|| format!("ConfigMap {namespace}/{name} does not exist."))?;
            config_map
                .data
                .as_ref()
                .and_then(|d| d.get(tls::CA_CERT_KEY))
                .cloned()
                .ok_or_else(|| {
                    format!("ConfigMap {namespace}/{name} must contain {}.", tls::CA_CERT_KEY)
                })?
        }
        _ => {
            let secret = resources
                .secret(namespace, name)
                .ok_or_else(|| format!("Secret {namespace}/{name} does not exist."))?;
            let data = tls::secret_value(secret, tls::CA_CERT_KEY).ok_or_else(|| {
                format!("Secret {namespace}/{name} must contain {}.", tls::CA_CERT_KEY)
            })?;
            String::from_utf8_lossy(data).into_owned()
        }
    };

    tls::validate_ca_bundle(data.as_bytes(), tls::CA_CERT_KEY)
        .map_err(|e| format!("{kind} {namespace}/{name} must contain a valid CA certificate, {e}."))?;

    Ok(data)
}
