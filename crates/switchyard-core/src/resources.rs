//! The input snapshot for a translation.

use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret, Service};
use k8s_openapi::api::discovery::v1::EndpointSlice;
use kube::{Resource, ResourceExt};
use serde::Deserialize;
use serde_json::Value;
use switchyard_api::gateway::Gateway;
use switchyard_api::grpc::GRPCRoute;
use switchyard_api::http::HTTPRoute;
use switchyard_api::policy::backend_traffic::BackendTrafficPolicy;
use switchyard_api::policy::client_traffic::ClientTrafficPolicy;
use switchyard_api::policy::extension::EnvoyExtensionPolicy;
use switchyard_api::policy::patch::EnvoyPatchPolicy;
use switchyard_api::policy::security::SecurityPolicy;
use switchyard_api::reference_grant::{ClusterTrustBundle, ReferenceGrant};
use switchyard_api::route::{TCPRoute, TLSRoute, UDPRoute};

use crate::config::TranslatorConfig;
use crate::error::{Error, Result};

/// The label that ties an EndpointSlice to its Service.
pub const SERVICE_NAME_LABEL: &str = "kubernetes.io/service-name";

/// Every object a translation reads.
///
/// A translation never modifies its input. The objects that get status
/// written back are cloned into the output.
#[derive(Clone, Debug, Default)]
pub struct Resources {
    pub gateways: Vec<Gateway>,
    pub http_routes: Vec<HTTPRoute>,
    pub grpc_routes: Vec<GRPCRoute>,
    pub tls_routes: Vec<TLSRoute>,
    pub tcp_routes: Vec<TCPRoute>,
    pub udp_routes: Vec<UDPRoute>,

    pub reference_grants: Vec<ReferenceGrant>,
    pub namespaces: Vec<Namespace>,
    pub services: Vec<Service>,
    pub endpoint_slices: Vec<EndpointSlice>,
    pub secrets: Vec<Secret>,
    pub config_maps: Vec<ConfigMap>,
    pub cluster_trust_bundles: Vec<ClusterTrustBundle>,

    pub client_traffic_policies: Vec<ClientTrafficPolicy>,
    pub backend_traffic_policies: Vec<BackendTrafficPolicy>,
    pub security_policies: Vec<SecurityPolicy>,
    pub envoy_extension_policies: Vec<EnvoyExtensionPolicy>,
    pub envoy_patch_policies: Vec<EnvoyPatchPolicy>,

    /// Policies owned by an extension server. These are never interpreted,
    /// only attached to the listeners they target.
    pub extension_server_policies: Vec<Value>,

    /// Objects owned by an extension server that Routes reference through
    /// ExtensionRef filters or as custom backends.
    pub extension_resources: Vec<Value>,
}

macro_rules! find_named {
    ($objs:expr, $namespace:expr, $name:expr) => {
        $objs
            .iter()
            .find(|o| o.namespace().as_deref() == Some($namespace) && o.name_any() == $name)
    };
}

impl Resources {
    /// Read a multi-document YAML bundle.
    ///
    /// Documents are dispatched on their `kind`. Documents of an extension
    /// kind registered in `config` are kept as unstructured values. Empty
    /// documents are skipped and don't count towards a document's index.
    pub fn from_yaml_str(yaml: &str, config: &TranslatorConfig) -> Result<Self> {
        let mut resources = Resources::default();

        let mut index = 0;
        for doc in serde_yml::Deserializer::from_str(yaml) {
            let value = Value::deserialize(doc)?;
            if value.is_null() {
                continue;
            }
            resources.push_value(index, value, config)?;
            index += 1;
        }

        Ok(resources)
    }

    fn push_value(&mut self, index: usize, value: Value, config: &TranslatorConfig) -> Result<()> {
        let kind = match value.get("kind") {
            Some(Value::String(kind)) => kind.clone(),
            _ => {
                return Err(switchyard_api::Error::new("field is required")
                    .with_field("kind")
                    .with_index(index)
                    .into())
            }
        };

        macro_rules! push {
            ($objs:expr) => {
                $objs.push(
                    serde_json::from_value(value).map_err(|source| Error::InvalidResource {
                        index,
                        kind: kind.clone(),
                        source,
                    })?,
                )
            };
        }

        match kind.as_str() {
            "Gateway" => push!(self.gateways),
            "HTTPRoute" => push!(self.http_routes),
            "GRPCRoute" => push!(self.grpc_routes),
            "TLSRoute" => push!(self.tls_routes),
            "TCPRoute" => push!(self.tcp_routes),
            "UDPRoute" => push!(self.udp_routes),
            "ReferenceGrant" => push!(self.reference_grants),
            "Namespace" => push!(self.namespaces),
            "Service" => push!(self.services),
            "EndpointSlice" => push!(self.endpoint_slices),
            "Secret" => push!(self.secrets),
            "ConfigMap" => push!(self.config_maps),
            "ClusterTrustBundle" => push!(self.cluster_trust_bundles),
            "ClientTrafficPolicy" => push!(self.client_traffic_policies),
            "BackendTrafficPolicy" => push!(self.backend_traffic_policies),
            "SecurityPolicy" => push!(self.security_policies),
            "EnvoyExtensionPolicy" => push!(self.envoy_extension_policies),
            "EnvoyPatchPolicy" => push!(self.envoy_patch_policies),
            // GatewayClasses are selected by name in config
            "GatewayClass" => (),
            _ => {
                let group = api_group(&value);
                if !config.is_extension_kind(group, &kind) {
                    return Err(switchyard_api::Error::new(format!("unknown kind {kind}"))
                        .with_field("kind")
                        .with_index(index)
                        .into());
                }

                if has_target_refs(&value) {
                    self.extension_server_policies.push(value);
                } else {
                    self.extension_resources.push(value);
                }
            }
        }

        Ok(())
    }

    pub fn namespace(&self, name: &str) -> Option<&Namespace> {
        self.namespaces.iter().find(|ns| ns.name_any() == name)
    }

    pub fn service(&self, namespace: &str, name: &str) -> Option<&Service> {
        find_named!(self.services, namespace, name)
    }

    pub fn secret(&self, namespace: &str, name: &str) -> Option<&Secret> {
        find_named!(self.secrets, namespace, name)
    }

    pub fn config_map(&self, namespace: &str, name: &str) -> Option<&ConfigMap> {
        find_named!(self.config_maps, namespace, name)
    }

    pub fn cluster_trust_bundle(&self, name: &str) -> Option<&ClusterTrustBundle> {
        self.cluster_trust_bundles
            .iter()
            .find(|ctb| ctb.name_any() == name)
    }

    /// The EndpointSlices that belong to a Service.
    pub fn endpoint_slices_for_service<'a>(
        &'a self,
        namespace: &'a str,
        service: &'a str,
    ) -> impl Iterator<Item = &'a EndpointSlice> + 'a {
        self.endpoint_slices.iter().filter(move |slice| {
            slice.namespace().as_deref() == Some(namespace)
                && slice.labels().get(SERVICE_NAME_LABEL).map(String::as_str) == Some(service)
        })
    }

    /// Find an extension owned object by group, kind and name.
    pub fn extension_resource(
        &self,
        namespace: &str,
        group: &str,
        kind: &str,
        name: &str,
    ) -> Option<&Value> {
        self.extension_resources.iter().find(|obj| {
            api_group(obj) == group
                && obj.get("kind").and_then(Value::as_str) == Some(kind)
                && obj.pointer("/metadata/name").and_then(Value::as_str) == Some(name)
                && obj.pointer("/metadata/namespace").and_then(Value::as_str) == Some(namespace)
        })
    }

    /// Compare two sets of resources, ignoring the order objects appear in.
    pub fn equivalent(&self, other: &Resources) -> bool {
        same_objects(&self.gateways, &other.gateways)
            && same_objects(&self.http_routes, &other.http_routes)
            && same_objects(&self.grpc_routes, &other.grpc_routes)
            && same_objects(&self.tls_routes, &other.tls_routes)
            && same_objects(&self.tcp_routes, &other.tcp_routes)
            && same_objects(&self.udp_routes, &other.udp_routes)
            && same_objects(&self.reference_grants, &other.reference_grants)
            && same_objects(&self.namespaces, &other.namespaces)
            && same_objects(&self.services, &other.services)
            && same_objects(&self.endpoint_slices, &other.endpoint_slices)
            && same_objects(&self.secrets, &other.secrets)
            && same_objects(&self.config_maps, &other.config_maps)
            && same_objects(&self.cluster_trust_bundles, &other.cluster_trust_bundles)
            && same_objects(&self.client_traffic_policies, &other.client_traffic_policies)
            && same_objects(&self.backend_traffic_policies, &other.backend_traffic_policies)
            && same_objects(&self.security_policies, &other.security_policies)
            && same_objects(&self.envoy_extension_policies, &other.envoy_extension_policies)
            && same_objects(&self.envoy_patch_policies, &other.envoy_patch_policies)
            && same_values(&self.extension_server_policies, &other.extension_server_policies)
            && same_values(&self.extension_resources, &other.extension_resources)
    }
}

fn same_objects<K: Resource + PartialEq>(a: &[K], b: &[K]) -> bool {
    a.len() == b.len()
        && a.iter().all(|obj| {
            b.iter()
                .find(|o| o.meta().namespace == obj.meta().namespace && o.meta().name == obj.meta().name)
                .is_some_and(|o| o == obj)
        })
}

fn same_values(a: &[Value], b: &[Value]) -> bool {
    a.len() == b.len() && a.iter().all(|v| b.contains(v))
}

/// The API group of an unstructured object, taken from its apiVersion. The
/// core group is the empty string.
pub(crate) fn api_group(obj: &Value) -> &str {
    let api_version = obj.get("apiVersion").and_then(Value::as_str).unwrap_or_default();
    match api_version.rsplit_once('/') {
        Some((group, _version)) => group,
        None => "",
    }
}

fn has_target_refs(obj: &Value) -> bool {
    obj.get("spec")
        .and_then(Value::as_object)
        .is_some_and(|spec| spec.contains_key("targetRef") || spec.contains_key("targetRefs"))
}
