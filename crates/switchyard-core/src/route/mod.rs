//! Route attachment.
//!
//! Every Route kind goes through the same steps: find the Gateways it names
//! as parents, pick the Listeners that will take it, build IR for its rules
//! and write one status entry per parent. The kind specific parts live in
//! [http], [grpc] and [l4].

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::ResourceExt;
use switchyard_api::grpc::GRPCRoute;
use switchyard_api::http::HTTPRoute;
use switchyard_api::route::{RouteStatus, TCPRoute, TLSRoute, UDPRoute};
use switchyard_api::{
    BackendRef, ParentReference, GATEWAY_GROUP, KIND_GATEWAY, KIND_GRPC_ROUTE, KIND_HTTP_ROUTE,
    KIND_TCP_ROUTE, KIND_TLS_ROUTE, KIND_UDP_ROUTE,
};

use crate::contexts::ListenerContext;
use crate::hostname::{compute_hosts_for_listener, WILDCARD};
use crate::ir::{self, AppProtocol, StringMatch};
use crate::refs::{resolve_backend, Referrer};
use crate::resources::Resources;
use crate::status::{self, reasons, types, RouteStatusError};
use crate::translator::TranslateContext;

pub(crate) mod grpc;
pub(crate) mod http;
pub(crate) mod l4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum RouteKind {
    Http,
    Grpc,
    Tls,
    Tcp,
    Udp,
}

impl RouteKind {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            RouteKind::Http => KIND_HTTP_ROUTE,
            RouteKind::Grpc => KIND_GRPC_ROUTE,
            RouteKind::Tls => KIND_TLS_ROUTE,
            RouteKind::Tcp => KIND_TCP_ROUTE,
            RouteKind::Udp => KIND_UDP_ROUTE,
        }
    }

    pub(crate) fn from_kind(kind: &str) -> Option<Self> {
        match kind {
            KIND_HTTP_ROUTE => Some(RouteKind::Http),
            KIND_GRPC_ROUTE => Some(RouteKind::Grpc),
            KIND_TLS_ROUTE => Some(RouteKind::Tls),
            KIND_TCP_ROUTE => Some(RouteKind::Tcp),
            KIND_UDP_ROUTE => Some(RouteKind::Udp),
            _ => None,
        }
    }

    /// The first segment of every IR name built from a Route of this kind.
    fn ir_kind(&self) -> &'static str {
        match self {
            RouteKind::Http => "httproute",
            RouteKind::Grpc => "grpcroute",
            RouteKind::Tls => "tlsroute",
            RouteKind::Tcp => "tcproute",
            RouteKind::Udp => "udproute",
        }
    }

    /// The Service port protocol backends of this kind must use.
    pub(crate) fn transport(&self) -> &'static str {
        match self {
            RouteKind::Udp => "UDP",
            _ => "TCP",
        }
    }
}

impl std::fmt::Display for RouteKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The parts of a Route object that attachment needs, independent of kind.
///
/// Every Route kind has its own generated parent ref and status types, so
/// refs and status are read and written through the shared views.
pub(crate) trait RouteResource: kube::Resource<DynamicType = ()> + Clone {
    const KIND: RouteKind;

    fn parent_refs(&self) -> Vec<ParentReference>;

    fn hostnames(&self) -> &[String] {
        &[]
    }

    fn route_status(&self) -> RouteStatus;

    fn set_route_status(&mut self, status: RouteStatus);

    /// Add a translated copy of this Route to the output snapshot.
    fn push_output(self, output: &mut Resources);
}

macro_rules! impl_route_resource {
    ($route:ty, $kind:expr, $output:ident $(, $hostnames:ident)?) => {
        impl RouteResource for $route {
            const KIND: RouteKind = $kind;

            fn parent_refs(&self) -> Vec<ParentReference> {
                self.spec
                    .parent_refs
                    .iter()
                    .flatten()
                    .map(ParentReference::from)
                    .collect()
            }

            $(
                fn hostnames(&self) -> &[String] {
                    self.spec.$hostnames.as_deref().unwrap_or_default()
                }
            )?

            fn route_status(&self) -> RouteStatus {
                self.status.clone().map(RouteStatus::from).unwrap_or_default()
            }

            fn set_route_status(&mut self, status: RouteStatus) {
                self.status = Some(status.into());
            }

            fn push_output(self, output: &mut Resources) {
                output.$output.push(self);
            }
        }
    };
}

impl_route_resource!(HTTPRoute, RouteKind::Http, http_routes, hostnames);
impl_route_resource!(GRPCRoute, RouteKind::Grpc, grpc_routes, hostnames);
impl_route_resource!(TLSRoute, RouteKind::Tls, tls_routes, hostnames);
impl_route_resource!(TCPRoute, RouteKind::Tcp, tcp_routes);
impl_route_resource!(UDPRoute, RouteKind::Udp, udp_routes);

/// A translated Route, kept around so policies can find the IR it produced.
#[derive(Clone, Debug)]
pub(crate) struct RouteContext {
    pub(crate) kind: RouteKind,
    pub(crate) namespace: String,
    pub(crate) name: String,

    /// The parents this Route attached to. Parents that rejected the Route
    /// aren't included.
    pub(crate) parents: Vec<RouteParentContext>,
}

impl RouteContext {
    /// The prefix of every IR route name built from this Route.
    pub(crate) fn ir_prefix(&self) -> String {
        format!("{}/{}/{}/", self.kind.ir_kind(), self.namespace, self.name)
    }

    /// Returns true if an IR route with this name was built from this Route.
    ///
    /// L7 route names extend the prefix with a rule and match index. L4
    /// routes are named with the prefix alone.
    pub(crate) fn owns_ir_route(&self, name: &str) -> bool {
        let prefix = self.ir_prefix();
        name.starts_with(&prefix) || name == prefix.trim_end_matches('/')
    }

    pub(crate) fn is(&self, kind: RouteKind, namespace: &str, name: &str) -> bool {
        self.kind == kind && self.namespace == namespace && self.name == name
    }
}

#[derive(Clone, Debug)]
pub(crate) struct RouteParentContext {
    pub(crate) parent_ref: ParentReference,
    pub(crate) gateway_idx: usize,

    /// Before attachment, the Listeners that allow this Route. After, the
    /// Listeners that actually got IR.
    pub(crate) listener_idxs: Vec<usize>,
}

/// Writes this controller's conditions to a Route's status.
struct RouteStatusWriter<'a> {
    controller_name: &'a str,
    generation: Option<i64>,
    now: &'a Time,
}

impl RouteStatusWriter<'_> {
    fn set(
        &self,
        status: &mut RouteStatus,
        parent_ref: &ParentReference,
        type_: &str,
        value: bool,
        reason: &str,
        message: &str,
    ) {
        let condition =
            status::new_condition(type_, value, reason, message, self.generation, self.now);
        let parent = status::route_parent_status_mut(status, parent_ref, self.controller_name);
        status::set_condition(&mut parent.conditions, condition);
    }

    fn error(&self, status: &mut RouteStatus, parent_ref: &ParentReference, err: &RouteStatusError) {
        self.set(status, parent_ref, err.type_, false, err.reason, &err.message);
    }

    fn has(&self, status: &mut RouteStatus, parent_ref: &ParentReference, type_: &str) -> bool {
        let parent = status::route_parent_status_mut(status, parent_ref, self.controller_name);
        status::find_condition(&parent.conditions, type_).is_some()
    }
}

/// A Route in the middle of being translated.
pub(crate) struct PendingRoute<R> {
    /// The output copy of the Route.
    pub(crate) route: R,
    pub(crate) context: RouteContext,

    /// The Route's new status, rewritten as translation goes and copied into
    /// the output Route when it's finished.
    status: RouteStatus,

    /// Every parent ref naming a Gateway this translation owns, whether or
    /// not the Route could attach to it.
    parent_refs: Vec<ParentReference>,
}

impl<R: RouteResource> PendingRoute<R> {
    /// Start translating a Route by resolving its parents.
    ///
    /// Returns `None` if none of the Route's parents are Gateways of this
    /// translation, in which case the Route is left alone entirely.
    ///
    /// # Panics
    ///
    /// Panics if the Route has no name.
    pub(crate) fn new(cx: &TranslateContext, route: &R) -> Option<Self> {
        if route.meta().name.is_none() {
            panic!("found a {} with no name in the snapshot", R::KIND);
        }
        let namespace = route.namespace().unwrap_or_default();
        let name = route.name_any();

        let mut status = route.route_status();
        status
            .parents
            .retain(|p| p.controller_name != cx.config.controller_name);

        let mut pending = Self {
            route: route.clone(),
            context: RouteContext {
                kind: R::KIND,
                namespace,
                name,
                parents: vec![],
            },
            parent_refs: vec![],
            status,
        };

        for parent_ref in route.parent_refs() {
            if pending.parent_refs.contains(&parent_ref) {
                continue;
            }
            let Some(resolved) =
                resolve_parent(cx, R::KIND, &pending.context.namespace, &parent_ref)
            else {
                continue;
            };

            match resolved {
                Ok(parent) => pending.context.parents.push(parent),
                Err(err) => pending.set_error(cx, &parent_ref, &err),
            }
            pending.parent_refs.push(parent_ref);
        }

        if pending.parent_refs.is_empty() {
            tracing::trace!(
                kind = %R::KIND,
                route = %format!("{}/{}", pending.context.namespace, pending.context.name),
                "no parents managed by this translation",
            );
            return None;
        }
        Some(pending)
    }

    fn writer<'a>(&self, cx: &'a TranslateContext) -> RouteStatusWriter<'a> {
        RouteStatusWriter {
            controller_name: &cx.config.controller_name,
            generation: self.route.meta().generation,
            now: &cx.now,
        }
    }

    pub(crate) fn referrer(&self) -> Referrer<'_> {
        Referrer {
            group: GATEWAY_GROUP,
            kind: R::KIND.as_str(),
            namespace: &self.context.namespace,
        }
    }

    pub(crate) fn set_error(
        &mut self,
        cx: &TranslateContext,
        parent_ref: &ParentReference,
        err: &RouteStatusError,
    ) {
        let writer = self.writer(cx);
        writer.error(&mut self.status, parent_ref, err);
    }

    /// Report errors found while translating the Route's rules.
    ///
    /// Unresolved refs are reported on every parent. Everything else is only
    /// reported on parents the Route could attach to, so the reason a parent
    /// rejected the Route isn't replaced.
    pub(crate) fn set_rule_errors(&mut self, cx: &TranslateContext, errors: &[RouteStatusError]) {
        let writer = self.writer(cx);
        let status = &mut self.status;

        for err in errors {
            if err.type_ == types::RESOLVED_REFS {
                for parent_ref in &self.parent_refs {
                    writer.error(status, parent_ref, err);
                }
            } else {
                for parent in &self.context.parents {
                    writer.error(status, &parent.parent_ref, err);
                }
            }
        }
    }

    /// Fill in the conditions nothing went wrong with and add the Route to
    /// the output.
    pub(crate) fn finish(mut self, cx: &mut TranslateContext) {
        let writer = self.writer(cx);
        let status = &mut self.status;

        for parent_ref in &self.parent_refs {
            if !writer.has(status, parent_ref, types::ACCEPTED) {
                writer.set(
                    status,
                    parent_ref,
                    types::ACCEPTED,
                    true,
                    reasons::ACCEPTED,
                    "Route is accepted",
                );
            }
            if !writer.has(status, parent_ref, types::RESOLVED_REFS) {
                writer.set(
                    status,
                    parent_ref,
                    types::RESOLVED_REFS,
                    true,
                    reasons::RESOLVED_REFS,
                    "Resolved all the Object references for the Route",
                );
            }
        }

        self.route.set_route_status(self.status);
        self.route.push_output(&mut cx.output);
        cx.routes.push(self.context);
    }
}

/// Resolve a parent ref to the Listeners on one of this translation's
/// Gateways that will accept the Route.
///
/// Returns `None` when the ref doesn't name a Gateway this translation
/// owns. Those refs belong to some other controller.
fn resolve_parent(
    cx: &TranslateContext,
    kind: RouteKind,
    route_namespace: &str,
    parent_ref: &ParentReference,
) -> Option<Result<RouteParentContext, RouteStatusError>> {
    let group = parent_ref.group.as_deref().unwrap_or(GATEWAY_GROUP);
    let parent_kind = parent_ref.kind.as_deref().unwrap_or(KIND_GATEWAY);
    if group != GATEWAY_GROUP || parent_kind != KIND_GATEWAY {
        return None;
    }

    let gateway_namespace = parent_ref.namespace.as_deref().unwrap_or(route_namespace);
    let gateway_idx = cx.gateway_idx(gateway_namespace, &parent_ref.name)?;
    let gateway = &cx.gateways[gateway_idx];

    let selected: Vec<&ListenerContext> = gateway
        .listeners
        .iter()
        .filter(|l| parent_ref.section_name.as_ref().map_or(true, |s| s == &l.name))
        .filter(|l| parent_ref.port.map_or(true, |p| p == l.port))
        .collect();
    if selected.is_empty() {
        return Some(Err(RouteStatusError::accepted(
            reasons::NO_MATCHING_PARENT,
            "No listeners match this parent ref",
        )));
    }

    let ready: Vec<&ListenerContext> = selected.into_iter().filter(|l| l.ready).collect();
    if ready.is_empty() {
        return Some(Err(RouteStatusError::accepted(
            reasons::NO_READY_LISTENERS,
            "There are no ready listeners for this parent ref",
        )));
    }

    let listener_idxs: Vec<usize> = ready
        .into_iter()
        .filter(|l| gateway.supports_kind(l.idx, kind.as_str()))
        .filter(|l| {
            l.allowed_namespaces
                .allows(cx.resources, gateway_namespace, route_namespace)
        })
        .map(|l| l.idx)
        .collect();
    if listener_idxs.is_empty() {
        return Some(Err(RouteStatusError::accepted(
            reasons::NOT_ALLOWED_BY_LISTENERS,
            "No listeners included by this parent ref allowed this attachment.",
        )));
    }

    Some(Ok(RouteParentContext {
        parent_ref: parent_ref.clone(),
        gateway_idx,
        listener_idxs,
    }))
}

/// A rule's destination and the errors found building it.
#[derive(Debug, Default)]
pub(crate) struct Destination {
    pub(crate) destination: Option<ir::RouteDestination>,
    pub(crate) weights: ir::BackendWeights,
    pub(crate) errors: Vec<RouteStatusError>,
}

/// Resolve a rule's backend refs into a weighted destination named `name`.
///
/// Backends default to a weight of 1. Backends with a weight of zero are
/// validated but get no traffic. Backends that fail to resolve are left out
/// of the destination and their weight is counted as invalid.
pub(crate) fn build_destination(
    cx: &TranslateContext,
    referrer: Referrer,
    backend_refs: &[BackendRef],
    name: &str,
    protocol: AppProtocol,
    transport: &str,
) -> Destination {
    let mut settings = Vec::with_capacity(backend_refs.len());
    let mut weights = ir::BackendWeights::default();
    let mut errors = vec![];

    for (k, backend_ref) in backend_refs.iter().enumerate() {
        let weight = backend_ref.weight.unwrap_or(1).max(0) as u32;

        match resolve_backend(cx.resources, referrer, &backend_ref.object_ref(), transport) {
            Ok(resolved) => {
                if weight == 0 {
                    continue;
                }
                weights.valid += weight;
                settings.push(resolved.destination_setting(
                    cx.resources,
                    cx.config,
                    format!("{name}/backend/{k}"),
                    weight,
                    protocol,
                ));
            }
            Err(err) => {
                weights.invalid += weight;
                errors.push(err);
            }
        }
    }

    let destination = (!settings.is_empty()).then(|| ir::RouteDestination {
        name: name.to_string(),
        settings,
    });
    Destination {
        destination,
        weights,
        errors,
    }
}

/// Attach translated HTTP routes to every Listener that allows them.
///
/// Routes are copied once per host the Route serves on each Listener. A
/// parent where no Listener shares a hostname with the Route doesn't accept
/// it.
pub(crate) fn attach_http_routes<R: RouteResource>(
    cx: &mut TranslateContext,
    pending: &mut PendingRoute<R>,
    routes: &[ir::HttpRoute],
) {
    let hostnames = pending.route.hostnames().to_vec();
    let is_http2 = R::KIND == RouteKind::Grpc;
    let mut unmatched = vec![];

    for parent in &mut pending.context.parents {
        let gateway = &cx.gateways[parent.gateway_idx];
        let mut attached = vec![];

        for &idx in &parent.listener_idxs {
            let listener = &gateway.listeners[idx];
            let siblings = gateway
                .listeners
                .iter()
                .filter(|l| l.idx != idx && l.port == listener.port)
                .filter_map(|l| l.hostname.as_deref());

            let hosts = compute_hosts_for_listener(&hostnames, listener.hostname.as_deref(), siblings);
            if hosts.is_empty() {
                continue;
            }

            let Some(ir_listener) = cx
                .xds
                .get_mut(&gateway.ir_key)
                .and_then(|xds| xds.http_listener_mut(&listener.ir_name))
            else {
                continue;
            };
            if is_http2 {
                ir_listener.is_http2 = true;
            }
            for host in &hosts {
                for route in routes {
                    ir_listener.routes.push(route_for_host(route, host, listener));
                }
            }
            attached.push(idx);
        }

        if attached.is_empty() {
            unmatched.push(parent.parent_ref.clone());
        }
        parent.listener_idxs = attached;
    }

    for parent in &pending.context.parents {
        for &idx in &parent.listener_idxs {
            cx.gateways[parent.gateway_idx].add_attached_route(idx);
        }
    }

    let err = RouteStatusError::accepted(
        reasons::NO_MATCHING_LISTENER_HOSTNAME,
        format!(
            "There were no hostname intersections between the {} and this parent ref's Listener(s).",
            R::KIND
        ),
    );
    for parent_ref in &unmatched {
        pending.set_error(cx, parent_ref, &err);
    }
    pending.context.parents.retain(|p| !p.listener_idxs.is_empty());
}

/// Copy an IR route for a single host on a Listener.
fn route_for_host(route: &ir::HttpRoute, host: &str, listener: &ListenerContext) -> ir::HttpRoute {
    let mut route = route.clone();
    route.name = format!("{}/{}", route.name, host.replace('.', "_"));
    route.hostname = host.to_string();

    // the listener already filters on its own hostname
    if host != WILDCARD && Some(host) != listener.hostname.as_deref() {
        let authority = match host.strip_prefix('*') {
            Some(suffix) => StringMatch::suffix(suffix),
            None => StringMatch::exact(host),
        };
        route.header_matches.insert(0, authority.named(":authority"));
    }

    if let Some(redirect) = &mut route.redirect {
        if redirect.port.is_none() {
            redirect.port = match redirect.scheme.as_deref() {
                Some("http") => Some(80),
                Some("https") => Some(443),
                _ => u32::try_from(listener.port).ok(),
            };
        }
    }

    route
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util::*;
    use serde_json::json;

    pub(super) fn http_route(name: &str, spec: serde_json::Value) -> serde_json::Value {
        json!({
            "apiVersion": "gateway.networking.k8s.io/v1",
            "kind": "HTTPRoute",
            "metadata": {"namespace": "default", "name": name},
            "spec": spec,
        })
    }

    fn parent_condition(
        result: &crate::TranslateResult,
        route: usize,
        parent: usize,
        type_: &str,
    ) -> (String, String) {
        let status = result.resources.http_routes[route].route_status();
        status::find_condition(&status.parents[parent].conditions, type_)
            .map(|c| (c.status.clone(), c.reason.clone()))
            .unwrap_or_else(|| panic!("missing {type_} condition"))
    }

    fn all_namespaces() -> serde_json::Value {
        json!({"namespaces": {"from": "All"}})
    }

    #[test]
    fn test_route_kind() {
        for kind in [
            RouteKind::Http,
            RouteKind::Grpc,
            RouteKind::Tls,
            RouteKind::Tcp,
            RouteKind::Udp,
        ] {
            assert_eq!(RouteKind::from_kind(kind.as_str()), Some(kind));
        }
        assert_eq!(RouteKind::from_kind("Gateway"), None);
        assert_eq!(RouteKind::Udp.transport(), "UDP");
        assert_eq!(RouteKind::Tls.transport(), "TCP");
    }

    #[test]
    fn test_owns_ir_route() {
        let route = RouteContext {
            kind: RouteKind::Http,
            namespace: "default".to_string(),
            name: "foo".to_string(),
            parents: vec![],
        };
        assert!(route.owns_ir_route("httproute/default/foo/rule/0/match/0/*"));
        assert!(!route.owns_ir_route("httproute/default/foo-bar/rule/0/match/0/*"));
        assert!(!route.owns_ir_route("grpcroute/default/foo/rule/0/match/0/*"));

        let route = RouteContext {
            kind: RouteKind::Tcp,
            ..route
        };
        assert!(route.owns_ir_route("tcproute/default/foo"));
        assert!(!route.owns_ir_route("tcproute/default/foobar"));
    }

    #[test]
    fn test_parent_resolution() {
        let resources = resources(json!([
            gateway(
                "gateway-1",
                json!([
                    {"name": "http", "protocol": "HTTP", "port": 80, "allowedRoutes": all_namespaces()},
                    {"name": "tcp", "protocol": "TCP", "port": 5432, "allowedRoutes": all_namespaces()},
                    {"name": "bad", "protocol": "HTTP", "port": 8080, "hostname": "not a hostname"},
                ])
            ),
            http_route(
                "route-1",
                json!({
                    "parentRefs": [
                        {"namespace": "envoy-gateway", "name": "gateway-1", "sectionName": "missing"},
                        {"namespace": "envoy-gateway", "name": "gateway-1", "sectionName": "bad"},
                        {"namespace": "envoy-gateway", "name": "gateway-1", "sectionName": "tcp"},
                        {"namespace": "envoy-gateway", "name": "gateway-1", "port": 80},
                        {"namespace": "envoy-gateway", "name": "some-other-gateway"},
                    ],
                }),
            ),
        ]));
        let result = translate(&resources);

        let status = result.resources.http_routes[0].route_status();
        assert_eq!(status.parents.len(), 4, "refs to unknown gateways are ignored");

        assert_eq!(
            parent_condition(&result, 0, 0, types::ACCEPTED),
            ("False".to_string(), reasons::NO_MATCHING_PARENT.to_string())
        );
        assert_eq!(
            parent_condition(&result, 0, 1, types::ACCEPTED),
            ("False".to_string(), reasons::NO_READY_LISTENERS.to_string())
        );
        assert_eq!(
            parent_condition(&result, 0, 2, types::ACCEPTED),
            ("False".to_string(), reasons::NOT_ALLOWED_BY_LISTENERS.to_string())
        );
        assert_eq!(
            parent_condition(&result, 0, 3, types::ACCEPTED),
            ("True".to_string(), reasons::ACCEPTED.to_string())
        );
        for parent in 0..4 {
            assert_eq!(parent_condition(&result, 0, parent, types::RESOLVED_REFS).0, "True");
        }

        assert_eq!(listener_status(&result, 0, 0).unwrap().attached_routes, 1);
        assert_eq!(listener_status(&result, 0, 1).unwrap().attached_routes, 0);
    }

    #[test]
    fn test_same_namespace_by_default() {
        let resources = resources(json!([
            gateway("gateway-1", json!([{"name": "http", "protocol": "HTTP", "port": 80}])),
            http_route(
                "route-1",
                json!({"parentRefs": [{"namespace": "envoy-gateway", "name": "gateway-1"}]}),
            ),
        ]));
        let result = translate(&resources);

        assert_eq!(
            parent_condition(&result, 0, 0, types::ACCEPTED),
            ("False".to_string(), reasons::NOT_ALLOWED_BY_LISTENERS.to_string())
        );
        assert!(result.xds["envoy-gateway/gateway-1"].http[0].routes.is_empty());
    }

    #[test]
    fn test_unrelated_routes_are_skipped() {
        let resources = resources(json!([
            gateway("gateway-1", json!([{"name": "http", "protocol": "HTTP", "port": 80}])),
            http_route("route-1", json!({"parentRefs": [{"name": "some-other-gateway"}]})),
        ]));
        let result = translate(&resources);
        assert!(result.resources.http_routes.is_empty());
    }

    #[test]
    fn test_hostname_intersection() {
        let resources = resources(json!([
            gateway(
                "gateway-1",
                json!([
                    {"name": "foo", "protocol": "HTTP", "port": 80, "hostname": "foo.example.com", "allowedRoutes": all_namespaces()},
                    {"name": "wildcard", "protocol": "HTTP", "port": 80, "hostname": "*.example.com", "allowedRoutes": all_namespaces()},
                ])
            ),
            http_route(
                "route-1",
                json!({
                    "parentRefs": [{"namespace": "envoy-gateway", "name": "gateway-1"}],
                    "hostnames": ["foo.example.com", "bar.example.com"],
                    "rules": [{}],
                }),
            ),
            http_route(
                "route-2",
                json!({
                    "parentRefs": [{"namespace": "envoy-gateway", "name": "gateway-1"}],
                    "hostnames": ["foo.other.com"],
                }),
            ),
        ]));
        let result = translate(&resources);
        let xds = &result.xds["envoy-gateway/gateway-1"];

        // foo.example.com belongs to the more specific listener
        let foo: Vec<_> = xds.http[0].routes.iter().map(|r| r.hostname.as_str()).collect();
        assert_eq!(foo, vec!["foo.example.com"]);
        assert!(xds.http[0].routes[0].header_matches.is_empty());

        let wildcard: Vec<_> = xds.http[1].routes.iter().map(|r| r.hostname.as_str()).collect();
        assert_eq!(wildcard, vec!["bar.example.com"]);
        assert_eq!(
            xds.http[1].routes[0].header_matches,
            vec![StringMatch::exact("bar.example.com").named(":authority")]
        );
        assert_eq!(
            xds.http[1].routes[0].name,
            "httproute/default/route-1/rule/0/match/0/bar_example_com"
        );

        assert_eq!(
            parent_condition(&result, 1, 0, types::ACCEPTED),
            (
                "False".to_string(),
                reasons::NO_MATCHING_LISTENER_HOSTNAME.to_string()
            )
        );

        assert_eq!(listener_status(&result, 0, 0).unwrap().attached_routes, 1);
        assert_eq!(listener_status(&result, 0, 1).unwrap().attached_routes, 1);
    }

    #[test]
    fn test_hostname_owned_by_unready_listener() {
        let resources = resources(json!([
            gateway(
                "gateway-1",
                json!([
                    {"name": "wildcard", "protocol": "HTTP", "port": 80, "hostname": "*.example.com", "allowedRoutes": all_namespaces()},
                    {
                        "name": "foo",
                        "protocol": "HTTP",
                        "port": 80,
                        "hostname": "foo.example.com",
                        "allowedRoutes": {"namespaces": {"from": "Selector"}},
                    },
                ])
            ),
            http_route(
                "route-1",
                json!({
                    "parentRefs": [{"namespace": "envoy-gateway", "name": "gateway-1"}],
                    "hostnames": ["foo.example.com", "bar.example.com"],
                    "rules": [{}],
                }),
            ),
        ]));
        let result = translate(&resources);

        assert_eq!(
            listener_condition(&result, 0, 1, types::READY).unwrap().status,
            "False"
        );

        // foo.example.com still belongs to its own listener, even though that
        // listener isn't serving anything
        let xds = &result.xds["envoy-gateway/gateway-1"];
        assert_eq!(xds.http.len(), 1);
        let hosts: Vec<_> = xds.http[0].routes.iter().map(|r| r.hostname.as_str()).collect();
        assert_eq!(hosts, vec!["bar.example.com"]);

        assert_eq!(
            parent_condition(&result, 0, 0, types::ACCEPTED),
            ("True".to_string(), reasons::ACCEPTED.to_string())
        );
    }

    #[test]
    fn test_wildcard_route_hostname() {
        let listener = ListenerContext {
            idx: 0,
            name: "http".to_string(),
            protocol: switchyard_api::gateway::ProtocolType::HTTP,
            port: 8080,
            hostname: None,
            ir_name: "envoy-gateway/gateway-1/http".to_string(),
            spec: Default::default(),
            allowed_namespaces: crate::contexts::AllowedNamespaces::All,
            certificates: vec![],
            ready: true,
        };
        let route = ir::HttpRoute {
            name: "httproute/default/route-1/rule/0/match/0".to_string(),
            redirect: Some(ir::Redirect::default()),
            ..Default::default()
        };

        let for_host = route_for_host(&route, "*.example.com", &listener);
        assert_eq!(
            for_host.name,
            "httproute/default/route-1/rule/0/match/0/*_example_com"
        );
        assert_eq!(
            for_host.header_matches,
            vec![StringMatch::suffix(".example.com").named(":authority")]
        );
        assert_eq!(for_host.redirect.unwrap().port, Some(8080));

        let mut https = route.clone();
        https.redirect = Some(ir::Redirect {
            scheme: Some("https".to_string()),
            ..Default::default()
        });
        let for_host = route_for_host(&https, WILDCARD, &listener);
        assert!(for_host.header_matches.is_empty());
        assert_eq!(for_host.redirect.unwrap().port, Some(443));
    }

    #[test]
    fn test_status_is_rebuilt() {
        let mut route = http_route(
            "route-1",
            json!({"parentRefs": [{"namespace": "envoy-gateway", "name": "gateway-1"}]}),
        );
        route["status"] = json!({
            "parents": [
                {
                    "parentRef": {"name": "stale"},
                    "controllerName": crate::config::DEFAULT_CONTROLLER_NAME,
                    "conditions": [],
                },
                {
                    "parentRef": {"name": "someone-elses"},
                    "controllerName": "example.com/other-controller",
                    "conditions": [],
                },
            ],
        });
        let resources = resources(json!([
            gateway(
                "gateway-1",
                json!([{"name": "http", "protocol": "HTTP", "port": 80, "allowedRoutes": all_namespaces()}])
            ),
            route,
        ]));
        let result = translate(&resources);

        let status = result.resources.http_routes[0].route_status();
        let parents: Vec<_> = status
            .parents
            .iter()
            .map(|p| p.parent_ref.name.as_str())
            .collect();
        assert_eq!(parents, vec!["someone-elses", "gateway-1"]);
    }

    #[test]
    #[should_panic]
    fn test_unnamed_route() {
        let mut resources = resources(json!([
            gateway("gateway-1", json!([{"name": "http", "protocol": "HTTP", "port": 80}])),
            http_route("route-1", json!({"parentRefs": [{"name": "gateway-1"}]})),
        ]));
        resources.http_routes[0].metadata.name = None;
        translate(&resources);
    }
}
