//! Route status and the layer 4 route kinds.
//!
//! Every Route kind is generated from the upstream Gateway API CRDs, so every
//! kind gets its own copy of the parent ref, backend ref and status types.
//! This module converts those into the kind-independent [ParentReference],
//! [BackendRef] and [RouteStatus] views the translator works with.
//!
//! TLSRoute, TCPRoute and UDPRoute share a rule shape: a list of backends and
//! nothing else.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;

pub use gateway_api::apis::experimental::tcproutes::{
    TCPRoute, TCPRouteParentRefs, TCPRouteRules, TCPRouteRulesBackendRefs, TCPRouteSpec,
    TCPRouteStatus,
};
pub use gateway_api::apis::experimental::tlsroutes::{
    TLSRoute, TLSRouteParentRefs, TLSRouteRules, TLSRouteRulesBackendRefs, TLSRouteSpec,
    TLSRouteStatus,
};
pub use gateway_api::apis::experimental::udproutes::{
    UDPRoute, UDPRouteParentRefs, UDPRouteRules, UDPRouteRulesBackendRefs, UDPRouteSpec,
    UDPRouteStatus,
};

use gateway_api::apis::experimental::grpcroutes::{
    GRPCRouteParentRefs, GRPCRouteRulesBackendRefs, GRPCRouteStatus, GRPCRouteStatusParents,
    GRPCRouteStatusParentsParentRef,
};
use gateway_api::apis::experimental::httproutes::{
    HTTPRouteParentRefs, HTTPRouteRulesBackendRefs, HTTPRouteStatus, HTTPRouteStatusParents,
    HTTPRouteStatusParentsParentRef,
};
use gateway_api::apis::experimental::tcproutes::{
    TCPRouteStatusParents, TCPRouteStatusParentsParentRef,
};
use gateway_api::apis::experimental::tlsroutes::{
    TLSRouteStatusParents, TLSRouteStatusParentsParentRef,
};
use gateway_api::apis::experimental::udproutes::{
    UDPRouteStatusParents, UDPRouteStatusParentsParentRef,
};

use crate::shared::{BackendRef, ParentReference};

/// The status of a Route, one entry per parent, independent of the Route's
/// kind.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RouteStatus {
    pub parents: Vec<RouteParentStatus>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RouteParentStatus {
    pub parent_ref: ParentReference,
    pub controller_name: String,
    pub conditions: Vec<Condition>,
}

/// A layer 4 route rule. Traffic is forwarded to the listed backends.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct L4RouteRule {
    pub name: Option<String>,
    pub backend_refs: Vec<BackendRef>,
}

// generated ref and status types for every route kind have the same fields,
// so the conversions are all the same code.
macro_rules! route_views {
    (
        parent_ref: $parent_ref:ident,
        backend_ref: $backend_ref:ident,
        status: $status:ident,
        status_parent: $status_parent:ident,
        status_parent_ref: $status_parent_ref:ident $(,)?
    ) => {
        impl From<&$parent_ref> for ParentReference {
            fn from(r: &$parent_ref) -> Self {
                ParentReference {
                    group: r.group.clone(),
                    kind: r.kind.clone(),
                    namespace: r.namespace.clone(),
                    name: r.name.clone(),
                    section_name: r.section_name.clone(),
                    port: r.port,
                }
            }
        }

        impl From<&$backend_ref> for BackendRef {
            fn from(r: &$backend_ref) -> Self {
                BackendRef {
                    group: r.group.clone(),
                    kind: r.kind.clone(),
                    name: r.name.clone(),
                    namespace: r.namespace.clone(),
                    port: r.port,
                    weight: r.weight,
                }
            }
        }

        impl From<$status> for RouteStatus {
            fn from(status: $status) -> Self {
                let parents = status
                    .parents
                    .into_iter()
                    .map(|p| RouteParentStatus {
                        parent_ref: ParentReference {
                            group: p.parent_ref.group,
                            kind: p.parent_ref.kind,
                            namespace: p.parent_ref.namespace,
                            name: p.parent_ref.name,
                            section_name: p.parent_ref.section_name,
                            port: p.parent_ref.port,
                        },
                        controller_name: p.controller_name,
                        conditions: p.conditions.unwrap_or_default(),
                    })
                    .collect();

                RouteStatus { parents }
            }
        }

        impl From<RouteStatus> for $status {
            fn from(status: RouteStatus) -> Self {
                let parents = status
                    .parents
                    .into_iter()
                    .map(|p| $status_parent {
                        parent_ref: $status_parent_ref {
                            group: p.parent_ref.group,
                            kind: p.parent_ref.kind,
                            namespace: p.parent_ref.namespace,
                            name: p.parent_ref.name,
                            section_name: p.parent_ref.section_name,
                            port: p.parent_ref.port,
                        },
                        controller_name: p.controller_name,
                        conditions: Some(p.conditions),
                    })
                    .collect();

                $status { parents }
            }
        }
    };
}

route_views! {
    parent_ref: HTTPRouteParentRefs,
    backend_ref: HTTPRouteRulesBackendRefs,
    status: HTTPRouteStatus,
    status_parent: HTTPRouteStatusParents,
    status_parent_ref: HTTPRouteStatusParentsParentRef,
}

route_views! {
    parent_ref: GRPCRouteParentRefs,
    backend_ref: GRPCRouteRulesBackendRefs,
    status: GRPCRouteStatus,
    status_parent: GRPCRouteStatusParents,
    status_parent_ref: GRPCRouteStatusParentsParentRef,
}

route_views! {
    parent_ref: TLSRouteParentRefs,
    backend_ref: TLSRouteRulesBackendRefs,
    status: TLSRouteStatus,
    status_parent: TLSRouteStatusParents,
    status_parent_ref: TLSRouteStatusParentsParentRef,
}

route_views! {
    parent_ref: TCPRouteParentRefs,
    backend_ref: TCPRouteRulesBackendRefs,
    status: TCPRouteStatus,
    status_parent: TCPRouteStatusParents,
    status_parent_ref: TCPRouteStatusParentsParentRef,
}

route_views! {
    parent_ref: UDPRouteParentRefs,
    backend_ref: UDPRouteRulesBackendRefs,
    status: UDPRouteStatus,
    status_parent: UDPRouteStatusParents,
    status_parent_ref: UDPRouteStatusParentsParentRef,
}

macro_rules! l4_rule_view {
    ($rule:ident) => {
        impl From<&$rule> for L4RouteRule {
            fn from(rule: &$rule) -> Self {
                L4RouteRule {
                    name: rule.name.clone(),
                    backend_refs: rule.backend_refs.iter().flatten().map(BackendRef::from).collect(),
                }
            }
        }
    };
}

l4_rule_view!(TLSRouteRules);
l4_rule_view!(TCPRouteRules);
l4_rule_view!(UDPRouteRules);
