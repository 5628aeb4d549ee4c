//! GRPCRoute translation.
//!
//! gRPC requests are HTTP/2 requests with a `/<service>/<method>` path, so
//! GRPCRoutes become HTTP routes with path matches built from their method
//! matches.

use switchyard_api::grpc::{
    GRPCRouteRules, GRPCRouteRulesMatches, GRPCRouteRulesMatchesMethod,
    GRPCRouteRulesMatchesMethodType,
};
use switchyard_api::http::{HTTPRouteRulesFilters, ValueMatchType};
use switchyard_api::BackendRef;

use super::http::{check_regex, finish_rule_route, http_filters, value_match};
use super::{attach_http_routes, build_destination, PendingRoute, RouteKind};
use crate::ir::{self, AppProtocol, StringMatch};
use crate::refs::Referrer;
use crate::status::RouteStatusError;
use crate::translator::TranslateContext;

const VALID_SERVICE_NAME: &str = r"(?i)\.?[a-z_][a-z_0-9]*(\.[a-z_][a-z_0-9]*)*";
const VALID_METHOD_NAME: &str = r"[A-Za-z_][A-Za-z_0-9]*";

pub(crate) fn process_grpc_routes(cx: &mut TranslateContext) {
    let resources = cx.resources;

    for route in &resources.grpc_routes {
        let Some(mut pending) = PendingRoute::new(cx, route) else {
            continue;
        };

        let prefix = pending.context.ir_prefix();
        let rules = route.spec.rules.as_deref().unwrap_or_default();
        let (routes, errors) = translate_rules(cx, pending.referrer(), &prefix, rules);
        pending.set_rule_errors(cx, &errors);

        attach_http_routes(cx, &mut pending, &routes);
        pending.finish(cx);
    }
}

fn translate_rules(
    cx: &TranslateContext,
    referrer: Referrer,
    prefix: &str,
    rules: &[GRPCRouteRules],
) -> (Vec<ir::HttpRoute>, Vec<RouteStatusError>) {
    let mut routes = vec![];
    let mut errors = vec![];

    for (i, rule) in rules.iter().enumerate() {
        let rule_name = format!("{prefix}rule/{i}");

        let filters: Vec<HTTPRouteRulesFilters> = rule
            .filters
            .iter()
            .flatten()
            .map(HTTPRouteRulesFilters::from)
            .collect();
        let filters = http_filters(cx, referrer, &filters, false, &rule_name, &mut errors);

        let backend_refs: Vec<_> = rule.backend_refs.iter().flatten().map(BackendRef::from).collect();
        let mut destination = build_destination(
            cx,
            referrer,
            &backend_refs,
            &rule_name,
            AppProtocol::GRPC,
            RouteKind::Grpc.transport(),
        );
        errors.append(&mut destination.errors);

        let default_match = [GRPCRouteRulesMatches::default()];
        let matches = match rule.matches.as_deref() {
            Some(matches) if !matches.is_empty() => matches,
            _ => &default_match[..],
        };

        for (j, m) in matches.iter().enumerate() {
            let mut route = match route_match(m) {
                Ok(route) => route,
                Err(e) => {
                    errors.push(e);
                    continue;
                }
            };
            route.is_http2 = true;

            routes.push(finish_rule_route(
                route,
                format!("{rule_name}/match/{j}"),
                filters.as_ref(),
                &destination,
                None,
            ));
        }
    }

    (routes, errors)
}

fn route_match(m: &GRPCRouteRulesMatches) -> Result<ir::HttpRoute, RouteStatusError> {
    let path_match = m.method.as_ref().map(method_match).transpose()?;

    let mut header_matches = vec![];
    for header in m.headers.iter().flatten() {
        let type_ = header.r#type.as_ref().map(ValueMatchType::from);
        header_matches.push(value_match(type_, &header.name, &header.value)?);
    }

    Ok(ir::HttpRoute {
        path_match,
        header_matches,
        ..Default::default()
    })
}

/// Turn a method match into a path match.
fn method_match(m: &GRPCRouteRulesMatchesMethod) -> Result<StringMatch, RouteStatusError> {
    let service = m.service.as_deref().filter(|s| !s.is_empty());
    let method = m.method.as_deref().filter(|s| !s.is_empty());

    let regex = matches!(m.r#type, Some(GRPCRouteRulesMatchesMethodType::RegularExpression));
    let path_match = match (regex, service, method) {
        (_, None, None) => {
            return Err(RouteStatusError::unsupported_value(
                "One or both of service and method must be specified in a GRPCMethodMatch",
            ))
        }
        (false, Some(service), Some(method)) => {
            StringMatch::exact(format!("/{service}/{method}"))
        }
        (false, Some(service), None) => {
            StringMatch::prefix(format!("/{service}/"))
        }
        (false, None, Some(method)) => StringMatch::regex(format!(
            "/{VALID_SERVICE_NAME}/{}",
            regex::escape(method)
        )),
        (true, service, method) => StringMatch::regex(format!(
            "/{}/{}",
            service.unwrap_or(VALID_SERVICE_NAME),
            method.unwrap_or(VALID_METHOD_NAME),
        )),
    };

    if path_match.match_type == ir::MatchType::SafeRegex {
        check_regex(&path_match.value)?;
    }
    Ok(path_match)
}
