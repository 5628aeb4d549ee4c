//! Switchyard API resources.
//!
//! These are the typed Kubernetes objects the translator consumes. The Gateway
//! API kinds (Gateways and their Routes, ReferenceGrants) are re-exported from
//! the [gateway_api] crate, along with conversions into the kind-independent
//! views in this crate. The Envoy Gateway policy kinds that attach to them are
//! defined in [policy]. Every kind is a [kube::CustomResource], so the usual
//! [kube::ResourceExt] accessors work on all of them.
//!
//! Status types are written back by the translator. Conditions use the
//! upstream [Condition] type.

mod error;
pub use error::{Error, ErrorContext};

pub use gateway_api;

pub mod gateway;
pub mod grpc;
pub mod http;
pub mod policy;
pub mod reference_grant;
pub mod route;

mod shared;
pub use shared::{
    BackendObjectReference, BackendRef, Duration, LocalObjectReference, NamespacedName,
    ParentReference, SecretObjectReference,
};

pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;

/// The Gateway API group.
pub const GATEWAY_GROUP: &str = "gateway.networking.k8s.io";

/// The group of the policy kinds.
pub const ENVOY_GATEWAY_GROUP: &str = "gateway.envoyproxy.io";

pub const KIND_GATEWAY: &str = "Gateway";
pub const KIND_GATEWAY_CLASS: &str = "GatewayClass";
pub const KIND_HTTP_ROUTE: &str = "HTTPRoute";
pub const KIND_GRPC_ROUTE: &str = "GRPCRoute";
pub const KIND_TLS_ROUTE: &str = "TLSRoute";
pub const KIND_TCP_ROUTE: &str = "TCPRoute";
pub const KIND_UDP_ROUTE: &str = "UDPRoute";
pub const KIND_SERVICE: &str = "Service";
pub const KIND_SECRET: &str = "Secret";
pub const KIND_CONFIG_MAP: &str = "ConfigMap";
pub const KIND_CLUSTER_TRUST_BUNDLE: &str = "ClusterTrustBundle";
pub const KIND_CLIENT_TRAFFIC_POLICY: &str = "ClientTrafficPolicy";
pub const KIND_BACKEND_TRAFFIC_POLICY: &str = "BackendTrafficPolicy";
pub const KIND_SECURITY_POLICY: &str = "SecurityPolicy";
pub const KIND_ENVOY_EXTENSION_POLICY: &str = "EnvoyExtensionPolicy";
pub const KIND_ENVOY_PATCH_POLICY: &str = "EnvoyPatchPolicy";
