//! TLSRoute, TCPRoute and UDPRoute translation.
//!
//! Layer 4 routes have no matches. A TCP or UDP Listener forwards every
//! connection to a single Route, so the first Route to attach wins. TLS
//! passthrough Listeners pick a Route by SNI and can take many.

use switchyard_api::route::{L4RouteRule, TCPRoute, TLSRoute, UDPRoute};

use super::{build_destination, PendingRoute, RouteKind, RouteResource};
use crate::contexts::ListenerContext;
use crate::hostname::compute_hosts;
use crate::ir::{self, AppProtocol};
use crate::status::{reasons, RouteStatusError};
use crate::translator::TranslateContext;

trait L4Route: RouteResource {
    fn rules(&self) -> Vec<L4RouteRule>;
}

macro_rules! impl_l4_route {
    ($($route:ty),* $(,)?) => {
        $(
            impl L4Route for $route {
                fn rules(&self) -> Vec<L4RouteRule> {
                    self.spec.rules.iter().map(L4RouteRule::from).collect()
                }
            }
        )*
    };
}

impl_l4_route!(TLSRoute, TCPRoute, UDPRoute);

pub(crate) fn process_tls_routes(cx: &mut TranslateContext) {
    let resources = cx.resources;
    process_l4_routes(cx, &resources.tls_routes);
}

pub(crate) fn process_tcp_routes(cx: &mut TranslateContext) {
    let resources = cx.resources;
    process_l4_routes(cx, &resources.tcp_routes);
}

pub(crate) fn process_udp_routes(cx: &mut TranslateContext) {
    let resources = cx.resources;
    process_l4_routes(cx, &resources.udp_routes);
}

fn process_l4_routes<R: L4Route>(cx: &mut TranslateContext, routes: &[R]) {
    for route in routes {
        let Some(mut pending) = PendingRoute::new(cx, route) else {
            continue;
        };

        let rules = route.rules();
        let rule = match single_rule(&rules) {
            Ok(rule) => rule,
            Err(e) => {
                pending.set_rule_errors(cx, &[e]);
                pending.context.parents.clear();
                pending.finish(cx);
                continue;
            }
        };

        let name = pending.context.ir_prefix().trim_end_matches('/').to_string();
        let protocol = match R::KIND {
            RouteKind::Udp => AppProtocol::UDP,
            _ => AppProtocol::TCP,
        };
        let mut destination = build_destination(
            cx,
            pending.referrer(),
            &rule.backend_refs,
            &name,
            protocol,
            R::KIND.transport(),
        );
        let errors = std::mem::take(&mut destination.errors);
        pending.set_rule_errors(cx, &errors);

        attach_l4_route(cx, &mut pending, &name, destination.destination);
        pending.finish(cx);
    }
}

fn single_rule(rules: &[L4RouteRule]) -> Result<&L4RouteRule, RouteStatusError> {
    let [rule] = rules else {
        return Err(RouteStatusError::resolved_refs(
            reasons::UNSUPPORTED_VALUE,
            "One and only one rule is supported",
        ));
    };
    if rule.backend_refs.len() != 1 {
        return Err(RouteStatusError::resolved_refs(
            reasons::UNSUPPORTED_VALUE,
            "One and only one backend ref is supported",
        ));
    }
    Ok(rule)
}

fn attach_l4_route<R: RouteResource>(
    cx: &mut TranslateContext,
    pending: &mut PendingRoute<R>,
    name: &str,
    destination: Option<ir::RouteDestination>,
) {
    let hostnames = pending.route.hostnames().to_vec();
    let mut rejected = vec![];

    for parent in &mut pending.context.parents {
        let gateway = &mut cx.gateways[parent.gateway_idx];
        let mut attached = vec![];

        for &idx in &parent.listener_idxs {
            if R::KIND != RouteKind::Tls && gateway.listener_status(idx).attached_routes > 0 {
                continue;
            }
            let listener = &gateway.listeners[idx];
            let Some(xds) = cx.xds.get_mut(&gateway.ir_key) else {
                continue;
            };

            if R::KIND == RouteKind::Udp {
                let Some(ir_listener) = xds.udp_listener_mut(&listener.ir_name) else {
                    continue;
                };
                ir_listener.route = Some(ir::UdpRoute {
                    name: name.to_string(),
                    destination: destination.clone(),
                });
            } else {
                let Some(tls) = route_tls(R::KIND, &hostnames, listener) else {
                    continue;
                };
                let Some(ir_listener) = xds.tcp_listener_mut(&listener.ir_name) else {
                    continue;
                };
                ir_listener.routes.push(ir::TcpRoute {
                    name: name.to_string(),
                    tls,
                    destination: destination.clone(),
                    traffic: None,
                });
            }
            attached.push(idx);
        }

        for &idx in &attached {
            gateway.add_attached_route(idx);
        }
        if attached.is_empty() {
            rejected.push(parent.parent_ref.clone());
        }
        parent.listener_idxs = attached;
    }

    let err = match R::KIND {
        RouteKind::Tls => RouteStatusError::accepted(
            reasons::NO_MATCHING_LISTENER_HOSTNAME,
            "There were no hostname intersections between the TLSRoute and this parent ref's Listener(s).",
        ),
        kind => RouteStatusError::unsupported_value(format!(
            "Multiple routes on the same {} listener",
            kind.transport()
        )),
    };
    for parent_ref in &rejected {
        pending.set_error(cx, parent_ref, &err);
    }
    pending.context.parents.retain(|p| !p.listener_idxs.is_empty());
}

/// The TLS settings for a route on a Listener.
///
/// Returns `None` when a TLSRoute shares no hostnames with the Listener and
/// can't attach to it. The inner `Option` is the route's TLS config, which
/// plain TCP routes don't have.
fn route_tls(
    kind: RouteKind,
    hostnames: &[String],
    listener: &ListenerContext,
) -> Option<Option<ir::TlsRouteConfig>> {
    if kind == RouteKind::Tls {
        let snis = compute_hosts(hostnames, listener.hostname.as_deref());
        if snis.is_empty() {
            return None;
        }
        return Some(Some(ir::TlsRouteConfig {
            inspector: Some(ir::TlsInspectorConfig { snis }),
            terminate: None,
        }));
    }

    // TCPRoutes on a terminating TLS listener
    Some(listener.ir_tls().map(|terminate| ir::TlsRouteConfig {
        inspector: listener
            .hostname
            .clone()
            .map(|sni| ir::TlsInspectorConfig { snis: vec![sni] }),
        terminate: Some(terminate),
    }))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::route::RouteResource;
    use crate::status::{self, types};
    use crate::test_util::*;
    use serde_json::json;

    fn l4_route(kind: &str, name: &str, spec: serde_json::Value) -> serde_json::Value {
        json!({
            "apiVersion": "gateway.networking.k8s.io/v1alpha2",
            "kind": kind,
            "metadata": {"namespace": "envoy-gateway", "name": name},
            "spec": spec,
        })
    }

    fn single_backend(name: &str, port: i32) -> serde_json::Value {
        json!([{"backendRefs": [{"name": name, "port": port}]}])
    }

    fn condition(status: &switchyard_api::route::RouteStatus, type_: &str) -> (String, String) {
        let c = status::find_condition(&status.parents[0].conditions, type_).unwrap();
        (c.status.clone(), c.reason.clone())
    }

    #[test]
    fn test_tcp_route() {
        let resources = resources(json!([
            gateway("gateway-1", json!([{"name": "tcp", "protocol": "TCP", "port": 5432}])),
            service("envoy-gateway", "postgres", json!([{"port": 5432}])),
            l4_route("TCPRoute", "tcp-1", json!({
                "parentRefs": [{"name": "gateway-1"}],
                "rules": single_backend("postgres", 5432),
            })),
            l4_route("TCPRoute", "tcp-2", json!({
                "parentRefs": [{"name": "gateway-1"}],
                "rules": single_backend("postgres", 5432),
            })),
        ]));
        let result = translate(&resources);

        let listener = &result.xds["envoy-gateway/gateway-1"].tcp[0];
        assert_eq!(listener.routes.len(), 1);
        assert_eq!(listener.routes[0].name, "tcproute/envoy-gateway/tcp-1");
        assert_eq!(listener.routes[0].tls, None);
        let destination = listener.routes[0].destination.as_ref().unwrap();
        assert_eq!(destination.name, "tcproute/envoy-gateway/tcp-1");
        assert_eq!(destination.settings[0].protocol, AppProtocol::TCP);

        let tcp_routes = &result.resources.tcp_routes;
        assert_eq!(
            condition(&tcp_routes[0].route_status(), types::ACCEPTED),
            ("True".to_string(), reasons::ACCEPTED.to_string())
        );
        assert_eq!(
            condition(&tcp_routes[1].route_status(), types::ACCEPTED),
            ("False".to_string(), reasons::UNSUPPORTED_VALUE.to_string())
        );

        assert_eq!(listener_status(&result, 0, 0).unwrap().attached_routes, 1);
    }

    #[test]
    fn test_rule_count() {
        let resources = resources(json!([
            gateway("gateway-1", json!([{"name": "tcp", "protocol": "TCP", "port": 5432}])),
            service("envoy-gateway", "postgres", json!([{"port": 5432}])),
            l4_route("TCPRoute", "tcp-1", json!({
                "parentRefs": [{"name": "gateway-1"}],
                "rules": [
                    {"backendRefs": [{"name": "postgres", "port": 5432}]},
                    {"backendRefs": [{"name": "postgres", "port": 5432}]},
                ],
            })),
        ]));
        let result = translate(&resources);

        assert!(result.xds["envoy-gateway/gateway-1"].tcp[0].routes.is_empty());
        let status = &result.resources.tcp_routes[0].route_status();
        assert_eq!(
            condition(status, types::RESOLVED_REFS),
            ("False".to_string(), reasons::UNSUPPORTED_VALUE.to_string())
        );
        assert_eq!(listener_status(&result, 0, 0).unwrap().attached_routes, 0);
    }

    #[test]
    fn test_tls_passthrough() {
        let resources = resources(json!([
            gateway(
                "gateway-1",
                json!([{
                    "name": "tls",
                    "protocol": "TLS",
                    "port": 443,
                    "hostname": "*.example.com",
                    "tls": {"mode": "Passthrough"},
                }])
            ),
            service("envoy-gateway", "backend", json!([{"port": 8443}])),
            l4_route("TLSRoute", "tls-1", json!({
                "parentRefs": [{"name": "gateway-1"}],
                "hostnames": ["foo.example.com", "foo.other.com"],
                "rules": single_backend("backend", 8443),
            })),
            l4_route("TLSRoute", "tls-2", json!({
                "parentRefs": [{"name": "gateway-1"}],
                "hostnames": ["bar.example.com"],
                "rules": single_backend("backend", 8443),
            })),
            l4_route("TLSRoute", "tls-3", json!({
                "parentRefs": [{"name": "gateway-1"}],
                "hostnames": ["bar.other.com"],
                "rules": single_backend("backend", 8443),
            })),
        ]));
        let result = translate(&resources);

        let routes = &result.xds["envoy-gateway/gateway-1"].tcp[0].routes;
        let snis: Vec<_> = routes
            .iter()
            .map(|r| r.tls.as_ref().unwrap().inspector.as_ref().unwrap().snis.clone())
            .collect();
        assert_eq!(
            snis,
            vec![vec!["foo.example.com".to_string()], vec!["bar.example.com".to_string()]]
        );

        let status = &result.resources.tls_routes[2].route_status();
        assert_eq!(
            condition(status, types::ACCEPTED),
            (
                "False".to_string(),
                reasons::NO_MATCHING_LISTENER_HOSTNAME.to_string()
            )
        );
        assert_eq!(listener_status(&result, 0, 0).unwrap().attached_routes, 2);
    }

    #[test]
    fn test_tcp_route_tls_terminate() {
        let mut resources = resources(json!([
            gateway(
                "gateway-1",
                json!([{
                    "name": "tls",
                    "protocol": "TLS",
                    "port": 443,
                    "hostname": "foo.envoyproxy.io",
                    "tls": {"mode": "Terminate", "certificateRefs": [{"name": "tls-secret"}]},
                }])
            ),
            service("envoy-gateway", "backend", json!([{"port": 8080}])),
            l4_route("TCPRoute", "tcp-1", json!({
                "parentRefs": [{"name": "gateway-1"}],
                "rules": single_backend("backend", 8080),
            })),
        ]));
        resources
            .secrets
            .push(tls_secret("envoy-gateway", "tls-secret", RSA_CERT, RSA_KEY));
        let result = translate(&resources);

        let route = &result.xds["envoy-gateway/gateway-1"].tcp[0].routes[0];
        let tls = route.tls.as_ref().unwrap();
        assert_eq!(
            tls.inspector,
            Some(ir::TlsInspectorConfig {
                snis: vec!["foo.envoyproxy.io".to_string()]
            })
        );
        let terminate = tls.terminate.as_ref().unwrap();
        assert_eq!(terminate.certificates[0].name, "envoy-gateway-tls-secret");
    }

    #[test]
    fn test_udp_route() {
        let resources = resources(json!([
            gateway("gateway-1", json!([{"name": "dns", "protocol": "UDP", "port": 53}])),
            service("envoy-gateway", "dns", json!([{"port": 53, "protocol": "UDP"}])),
            service("envoy-gateway", "tcp-only", json!([{"port": 53}])),
            l4_route("UDPRoute", "udp-1", json!({
                "parentRefs": [{"name": "gateway-1"}],
                "rules": single_backend("dns", 53),
            })),
            l4_route("UDPRoute", "udp-2", json!({
                "parentRefs": [{"name": "gateway-1"}],
                "rules": single_backend("tcp-only", 53),
            })),
        ]));
        let result = translate(&resources);

        let route = result.xds["envoy-gateway/gateway-1"].udp[0].route.as_ref().unwrap();
        assert_eq!(route.name, "udproute/envoy-gateway/udp-1");
        let destination = route.destination.as_ref().unwrap();
        assert_eq!(destination.settings[0].protocol, AppProtocol::UDP);

        // the second route is rejected for its backend and for the listener
        // already having a route
        let status = &result.resources.udp_routes[1].route_status();
        assert_eq!(
            condition(status, types::RESOLVED_REFS),
            ("False".to_string(), reasons::PORT_NOT_FOUND.to_string())
        );
        assert_eq!(
            condition(status, types::ACCEPTED),
            ("False".to_string(), reasons::UNSUPPORTED_VALUE.to_string())
        );
    }
}
