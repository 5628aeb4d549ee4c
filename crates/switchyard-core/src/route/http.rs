//! HTTPRoute translation.
//!
//! Every match of every rule becomes one IR route. Filters, backends and
//! timeouts are shared by all of a rule's matches.

use switchyard_api::http::{
    filter_type_name, HTTPHeaderFilter, HTTPRouteRules, HTTPRouteRulesFilters,
    HTTPRouteRulesFiltersRequestRedirect, HTTPRouteRulesFiltersRequestRedirectPathType,
    HTTPRouteRulesFiltersRequestRedirectScheme, HTTPRouteRulesFiltersType,
    HTTPRouteRulesFiltersUrlRewrite, HTTPRouteRulesFiltersUrlRewritePathType,
    HTTPRouteRulesMatches, HTTPRouteRulesMatchesMethod, HTTPRouteRulesMatchesPathType,
    HTTPRouteRulesTimeouts, ValueMatchType,
};
use switchyard_api::{BackendObjectReference, BackendRef, Duration, LocalObjectReference};

use super::{attach_http_routes, build_destination, Destination, PendingRoute, RouteKind};
use crate::hostname::validate_hostname;
use crate::ir::{self, AppProtocol, StringMatch};
use crate::refs::{resolve_backend, Referrer};
use crate::status::RouteStatusError;
use crate::translator::TranslateContext;

const VALID_REDIRECT_CODES: &[i64] = &[301, 302, 303, 307, 308];

pub(crate) fn process_http_routes(cx: &mut TranslateContext) {
    let resources = cx.resources;

    for route in &resources.http_routes {
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
    rules: &[HTTPRouteRules],
) -> (Vec<ir::HttpRoute>, Vec<RouteStatusError>) {
    let mut routes = vec![];
    let mut errors = vec![];

    for (i, rule) in rules.iter().enumerate() {
        let rule_name = format!("{prefix}rule/{i}");

        let default_match = [HTTPRouteRulesMatches::default()];
        let matches = match rule.matches.as_deref() {
            Some(matches) if !matches.is_empty() => matches,
            _ => &default_match[..],
        };

        let prefix_matches_only = matches.iter().all(|m| {
            matches!(
                m.path.as_ref().and_then(|p| p.r#type.as_ref()),
                None | Some(HTTPRouteRulesMatchesPathType::PathPrefix)
            )
        });
        let filters = http_filters(
            cx,
            referrer,
            rule.filters.as_deref().unwrap_or_default(),
            prefix_matches_only,
            &rule_name,
            &mut errors,
        );

        let backend_refs: Vec<_> = rule.backend_refs.iter().flatten().map(BackendRef::from).collect();
        let mut destination = build_destination(
            cx,
            referrer,
            &backend_refs,
            &rule_name,
            AppProtocol::HTTP,
            RouteKind::Http.transport(),
        );
        errors.append(&mut destination.errors);

        let timeout = match route_timeout(rule.timeouts.as_ref()) {
            Ok(timeout) => timeout,
            Err(e) => {
                errors.push(e);
                None
            }
        };

        for (j, m) in matches.iter().enumerate() {
            let route = match route_match(m) {
                Ok(route) => route,
                Err(e) => {
                    errors.push(e);
                    continue;
                }
            };
            routes.push(finish_rule_route(
                route,
                format!("{rule_name}/match/{j}"),
                filters.as_ref(),
                &destination,
                timeout.as_ref(),
            ));
        }
    }

    (routes, errors)
}

/// Fill in the parts of an IR route that every match of a rule shares.
///
/// A rule whose filters couldn't be translated, or that has nowhere to send
/// traffic, responds with a 500.
pub(super) fn finish_rule_route(
    mut route: ir::HttpRoute,
    name: String,
    filters: Option<&HttpFilters>,
    destination: &Destination,
    timeout: Option<&ir::RouteTimeout>,
) -> ir::HttpRoute {
    route.name = name;
    route.destination = destination.destination.clone();
    route.backend_weights = destination.weights;
    route.timeout = timeout.cloned();

    match filters {
        Some(filters) => filters.apply(&mut route),
        None => route.fail_with(500),
    }
    if route.destination.is_none() && route.redirect.is_none() {
        route.fail_with(500);
    }

    route
}

fn route_match(m: &HTTPRouteRulesMatches) -> Result<ir::HttpRoute, RouteStatusError> {
    let path = m.path.as_ref();
    let value = path
        .and_then(|p| p.value.clone())
        .unwrap_or_else(|| "/".to_string());
    let path_match = match path.and_then(|p| p.r#type.as_ref()) {
        Some(HTTPRouteRulesMatchesPathType::Exact) => StringMatch::exact(value),
        Some(HTTPRouteRulesMatchesPathType::PathPrefix) | None => StringMatch::prefix(value),
        Some(HTTPRouteRulesMatchesPathType::RegularExpression) => {
            check_regex(&value)?;
            StringMatch::regex(value)
        }
    };

    let mut header_matches = vec![];
    for header in m.headers.iter().flatten() {
        let type_ = header.r#type.as_ref().map(ValueMatchType::from);
        header_matches.push(value_match(type_, &header.name, &header.value)?);
    }
    if let Some(method) = &m.method {
        header_matches.push(StringMatch::exact(method_name(method)).named(":method"));
    }

    let mut query_param_matches = vec![];
    for param in m.query_params.iter().flatten() {
        let type_ = param.r#type.as_ref().map(ValueMatchType::from);
        query_param_matches.push(value_match(type_, &param.name, &param.value)?);
    }

    Ok(ir::HttpRoute {
        path_match: Some(path_match),
        header_matches,
        query_param_matches,
        ..Default::default()
    })
}

fn method_name(method: &HTTPRouteRulesMatchesMethod) -> &'static str {
    match method {
        HTTPRouteRulesMatchesMethod::Get => "GET",
        HTTPRouteRulesMatchesMethod::Head => "HEAD",
        HTTPRouteRulesMatchesMethod::Post => "POST",
        HTTPRouteRulesMatchesMethod::Put => "PUT",
        HTTPRouteRulesMatchesMethod::Delete => "DELETE",
        HTTPRouteRulesMatchesMethod::Connect => "CONNECT",
        HTTPRouteRulesMatchesMethod::Options => "OPTIONS",
        HTTPRouteRulesMatchesMethod::Trace => "TRACE",
        HTTPRouteRulesMatchesMethod::Patch => "PATCH",
    }
}

pub(crate) fn value_match(
    type_: Option<ValueMatchType>,
    name: &str,
    value: &str,
) -> Result<StringMatch, RouteStatusError> {
    let m = match type_.unwrap_or_default() {
        ValueMatchType::Exact => StringMatch::exact(value),
        ValueMatchType::RegularExpression => {
            check_regex(value)?;
            StringMatch::regex(value)
        }
    };
    Ok(m.named(name))
}

pub(crate) fn check_regex(regex: &str) -> Result<(), RouteStatusError> {
    match regex::Regex::new(regex) {
        Ok(_) => Ok(()),
        Err(_) => Err(RouteStatusError::unsupported_value(format!(
            "Regex {regex:?} is invalid"
        ))),
    }
}

fn route_timeout(
    timeouts: Option<&HTTPRouteRulesTimeouts>,
) -> Result<Option<ir::RouteTimeout>, RouteStatusError> {
    let Some(timeouts) = timeouts else {
        return Ok(None);
    };

    let parse = |d: &Option<String>| -> Result<Option<Duration>, RouteStatusError> {
        d.as_deref()
            .map(Duration::from_gateway)
            .transpose()
            .map_err(|e| RouteStatusError::unsupported_value(e.to_string()))
    };
    let request = parse(&timeouts.request)?;
    let backend_request = parse(&timeouts.backend_request)?;

    if let (Some(request), Some(backend_request)) = (&request, &backend_request) {
        if backend_request.as_nanos() > request.as_nanos() {
            return Err(RouteStatusError::unsupported_value(
                "backendRequest timeout cannot be longer than request timeout",
            ));
        }
    }

    Ok(Some(ir::RouteTimeout {
        request,
        backend_request,
    }))
}

/// The translated filters of a rule.
#[derive(Clone, Debug, Default, PartialEq)]
pub(super) struct HttpFilters {
    add_request_headers: Vec<ir::AddHeader>,
    remove_request_headers: Vec<String>,
    add_response_headers: Vec<ir::AddHeader>,
    remove_response_headers: Vec<String>,
    redirect: Option<ir::Redirect>,
    url_rewrite: Option<ir::UrlRewrite>,
    mirrors: Vec<ir::MirrorPolicy>,
    extension_refs: Vec<ir::UnstructuredRef>,
}

impl HttpFilters {
    fn apply(&self, route: &mut ir::HttpRoute) {
        route.add_request_headers = self.add_request_headers.clone();
        route.remove_request_headers = self.remove_request_headers.clone();
        route.add_response_headers = self.add_response_headers.clone();
        route.remove_response_headers = self.remove_response_headers.clone();
        route.redirect = self.redirect.clone();
        route.url_rewrite = self.url_rewrite.clone();
        route.mirrors = self.mirrors.clone();
        route.extension_refs = self.extension_refs.clone();
    }
}

/// A filter's config field must be set for its type.
fn filter_config<'a, T>(type_: &str, config: Option<&'a T>) -> Result<&'a T, String> {
    config.ok_or_else(|| format!("{type_} Filter is missing its configuration"))
}

/// Translate a rule's filters.
///
/// Returns `None` when a filter is invalid. The error is pushed onto
/// `errors` and the rule should respond with a 500. A mirror whose backend
/// doesn't resolve is reported but only the mirror is dropped.
pub(super) fn http_filters(
    cx: &TranslateContext,
    referrer: Referrer,
    filters: &[HTTPRouteRulesFilters],
    prefix_matches_only: bool,
    rule_name: &str,
    errors: &mut Vec<RouteStatusError>,
) -> Option<HttpFilters> {
    let mut out = HttpFilters::default();
    let mut seen = Vec::with_capacity(filters.len());

    for filter in filters {
        let type_ = filter_type_name(&filter.r#type);
        let repeatable = matches!(
            filter.r#type,
            HTTPRouteRulesFiltersType::RequestMirror | HTTPRouteRulesFiltersType::ExtensionRef
        );
        if !repeatable {
            if seen.contains(&type_) {
                errors.push(RouteStatusError::unsupported_value(format!(
                    "Cannot configure multiple {type_} filters for a single HTTPRouteRule"
                )));
                return None;
            }
            seen.push(type_);
        }

        let result = match filter.r#type {
            HTTPRouteRulesFiltersType::RequestHeaderModifier => {
                filter_config(type_, filter.request_header_modifier.as_ref())
                    .and_then(|m| header_modifier(type_, m))
                    .map(|(add, remove)| {
                        out.add_request_headers = add;
                        out.remove_request_headers = remove;
                    })
            }
            HTTPRouteRulesFiltersType::ResponseHeaderModifier => {
                filter_config(type_, filter.response_header_modifier.as_ref())
                    .and_then(|m| header_modifier(type_, &HTTPHeaderFilter::from(m)))
                    .map(|(add, remove)| {
                        out.add_response_headers = add;
                        out.remove_response_headers = remove;
                    })
            }
            HTTPRouteRulesFiltersType::RequestRedirect => {
                filter_config(type_, filter.request_redirect.as_ref())
                    .and_then(|r| redirect(r, prefix_matches_only))
                    .map(|r| out.redirect = Some(r))
            }
            HTTPRouteRulesFiltersType::UrlRewrite => {
                filter_config(type_, filter.url_rewrite.as_ref())
                    .and_then(|r| rewrite(r, prefix_matches_only))
                    .map(|r| out.url_rewrite = Some(r))
            }
            HTTPRouteRulesFiltersType::ExtensionRef => {
                filter_config(type_, filter.extension_ref.as_ref())
                    .and_then(|r| extension(cx, referrer, &LocalObjectReference::from(r)))
                    .map(|r| out.extension_refs.push(r))
            }
            HTTPRouteRulesFiltersType::RequestMirror => {
                filter_config(type_, filter.request_mirror.as_ref()).map(|request_mirror| {
                    let name = format!("{rule_name}/mirror/{}", out.mirrors.len());
                    let backend = BackendObjectReference::from(&request_mirror.backend_ref);
                    match mirror(cx, referrer, &backend, name) {
                        Ok(m) => out.mirrors.push(m),
                        Err(e) => errors.push(e),
                    }
                })
            }
        };

        if let Err(message) = result {
            errors.push(RouteStatusError::unsupported_value(message));
            return None;
        }
    }

    if out.redirect.is_some() && out.url_rewrite.is_some() {
        errors.push(RouteStatusError::unsupported_value(
            "Cannot configure both RequestRedirect and URLRewrite filters on the same rule",
        ));
        return None;
    }

    Some(out)
}

pub(crate) fn header_modifier(
    type_: &str,
    filter: &HTTPHeaderFilter,
) -> Result<(Vec<ir::AddHeader>, Vec<String>), String> {
    let to_add = filter.add.as_deref().unwrap_or_default();
    let to_set = filter.set.as_deref().unwrap_or_default();
    let to_remove = filter.remove.as_deref().unwrap_or_default();
    if to_add.is_empty() && to_set.is_empty() && to_remove.is_empty() {
        return Err(format!(
            "{type_} Filter did not provide valid configuration to add/set/remove any headers"
        ));
    }

    let mut seen: Vec<String> = vec![];
    let mut add = Vec::with_capacity(to_add.len() + to_set.len());
    let headers = to_add
        .iter()
        .map(|h| (h.name.as_str(), h.value.as_str(), true))
        .chain(to_set.iter().map(|h| (h.name.as_str(), h.value.as_str(), false)));
    for (name, value, append) in headers {
        check_header_name(type_, name)?;

        let lower = name.to_ascii_lowercase();
        if seen.contains(&lower) {
            return Err(format!("{type_} Filter already configures header {name}"));
        }
        seen.push(lower);

        add.push(ir::AddHeader {
            name: name.to_string(),
            value: value.to_string(),
            append,
        });
    }

    let mut remove: Vec<String> = Vec::with_capacity(to_remove.len());
    for name in to_remove {
        check_header_name(type_, name)?;
        if remove.iter().any(|r| r.eq_ignore_ascii_case(name)) {
            return Err(format!("{type_} Filter already removes header {name}"));
        }
        remove.push(name.clone());
    }

    Ok((add, remove))
}

fn check_header_name(type_: &str, name: &str) -> Result<(), String> {
    match http::HeaderName::from_bytes(name.as_bytes()) {
        Ok(_) => Ok(()),
        Err(_) => Err(format!("{type_} Filter header name {name:?} is invalid")),
    }
}

fn redirect(
    filter: &HTTPRouteRulesFiltersRequestRedirect,
    prefix_matches_only: bool,
) -> Result<ir::Redirect, String> {
    let scheme = filter.scheme.as_ref().map(|scheme| match scheme {
        HTTPRouteRulesFiltersRequestRedirectScheme::Http => "http".to_string(),
        HTTPRouteRulesFiltersRequestRedirectScheme::Https => "https".to_string(),
    });

    if let Some(hostname) = &filter.hostname {
        validate_hostname(hostname)?;
    }

    let status_code = match filter.status_code {
        Some(code) => match u32::try_from(code) {
            Ok(valid) if VALID_REDIRECT_CODES.contains(&code) => Some(valid),
            _ => {
                return Err(format!(
                    "Status code {code} is invalid, only {VALID_REDIRECT_CODES:?} are supported"
                ))
            }
        },
        None => None,
    };

    let port = match filter.port {
        Some(port) => match u16::try_from(port) {
            Ok(valid) if valid > 0 => Some(u32::from(valid)),
            _ => return Err(format!("Port {port} is not a valid port number")),
        },
        None => None,
    };

    let path = match &filter.path {
        Some(p) => Some(path_modifier(
            p.r#type == HTTPRouteRulesFiltersRequestRedirectPathType::ReplaceFullPath,
            p.replace_full_path.as_deref(),
            p.replace_prefix_match.as_deref(),
            prefix_matches_only,
        )?),
        None => None,
    };

    Ok(ir::Redirect {
        scheme,
        hostname: filter.hostname.clone(),
        path,
        port,
        status_code,
    })
}

fn rewrite(
    filter: &HTTPRouteRulesFiltersUrlRewrite,
    prefix_matches_only: bool,
) -> Result<ir::UrlRewrite, String> {
    if let Some(hostname) = &filter.hostname {
        validate_hostname(hostname)?;
    }

    let path = match &filter.path {
        Some(p) => Some(path_modifier(
            p.r#type == HTTPRouteRulesFiltersUrlRewritePathType::ReplaceFullPath,
            p.replace_full_path.as_deref(),
            p.replace_prefix_match.as_deref(),
            prefix_matches_only,
        )?),
        None => None,
    };

    Ok(ir::UrlRewrite {
        path,
        hostname: filter.hostname.clone(),
    })
}

/// Redirects and rewrites modify the path the same way, but each has its own
/// generated path type.
fn path_modifier(
    full_path: bool,
    replace_full_path: Option<&str>,
    replace_prefix_match: Option<&str>,
    prefix_matches_only: bool,
) -> Result<ir::PathModifier, String> {
    if full_path {
        return match replace_full_path {
            Some(path) => Ok(ir::PathModifier::FullReplace(path.to_string())),
            None => Err("replaceFullPath must be set for a ReplaceFullPath modifier".to_string()),
        };
    }

    let Some(prefix) = replace_prefix_match else {
        return Err("replacePrefixMatch must be set for a ReplacePrefixMatch modifier".to_string());
    };
    if !prefix_matches_only {
        return Err("ReplacePrefixMatch must be used with a PathPrefix path match".to_string());
    }
    Ok(ir::PathModifier::PrefixMatchReplace(prefix.to_string()))
}

fn mirror(
    cx: &TranslateContext,
    referrer: Referrer,
    backend: &BackendObjectReference,
    name: String,
) -> Result<ir::MirrorPolicy, RouteStatusError> {
    let resolved = resolve_backend(cx.resources, referrer, backend, "TCP")?;
    let setting = resolved.destination_setting(
        cx.resources,
        cx.config,
        format!("{name}/backend/0"),
        1,
        AppProtocol::HTTP,
    );

    Ok(ir::MirrorPolicy {
        destination: ir::RouteDestination {
            name,
            settings: vec![setting],
        },
    })
}

/// Find the extension owned object an ExtensionRef filter points to.
fn extension(
    cx: &TranslateContext,
    referrer: Referrer,
    extension_ref: &LocalObjectReference,
) -> Result<ir::UnstructuredRef, String> {
    let LocalObjectReference { group, kind, name } = extension_ref;
    if !cx.config.is_extension_kind(group, kind) {
        return Err(format!(
            "Unknown custom filter from the extension: {group}/{kind}"
        ));
    }

    match cx
        .resources
        .extension_resource(referrer.namespace, group, kind, name)
    {
        Some(object) => Ok(ir::UnstructuredRef {
            object: object.clone(),
        }),
        None => Err(format!(
            "Unable to find {kind} {}/{name} referenced by an ExtensionRef filter",
            referrer.namespace
        )),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::route::RouteResource;
    use crate::config::{GroupKind, TranslatorConfig};
    use crate::error::Error;
    use crate::resources::Resources;
    use crate::status::{self, reasons, types};
    use crate::test_util::*;
    use crate::Translator;
    use serde_json::json;

    fn listeners() -> serde_json::Value {
        json!([{"name": "http", "protocol": "HTTP", "port": 80, "allowedRoutes": {"namespaces": {"from": "All"}}}])
    }

    fn http_route(rules: serde_json::Value) -> serde_json::Value {
        json!({
            "apiVersion": "gateway.networking.k8s.io/v1",
            "kind": "HTTPRoute",
            "metadata": {"namespace": "default", "name": "route-1"},
            "spec": {
                "parentRefs": [{"namespace": "envoy-gateway", "name": "gateway-1"}],
                "rules": rules,
            },
        })
    }

    fn translate_rules(rules: serde_json::Value) -> crate::TranslateResult {
        let resources = resources(json!([
            gateway("gateway-1", listeners()),
            service("default", "backend", json!([{"port": 8080}])),
            service("default", "mirror", json!([{"port": 9090}])),
            http_route(rules),
        ]));
        translate(&resources)
    }

    fn ir_routes(result: &crate::TranslateResult) -> &[ir::HttpRoute] {
        &result.xds["envoy-gateway/gateway-1"].http[0].routes
    }

    fn route_condition(result: &crate::TranslateResult, type_: &str) -> (String, String, String) {
        let status = result.resources.http_routes[0].route_status();
        let c = status::find_condition(&status.parents[0].conditions, type_).unwrap();
        (c.status.clone(), c.reason.clone(), c.message.clone())
    }

    fn backend(port: i32) -> serde_json::Value {
        json!({"name": "backend", "port": port})
    }

    #[test]
    fn test_default_match() {
        let result = translate_rules(json!([{"backendRefs": [backend(8080)]}]));
        let routes = ir_routes(&result);

        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].name, "httproute/default/route-1/rule/0/match/0/*");
        assert_eq!(routes[0].hostname, "*");
        assert_eq!(routes[0].path_match, Some(StringMatch::prefix("/")));
        assert_eq!(routes[0].direct_response, None);

        let destination = routes[0].destination.as_ref().unwrap();
        assert_eq!(destination.name, "httproute/default/route-1/rule/0");
        assert_eq!(
            destination.settings[0].name,
            "httproute/default/route-1/rule/0/backend/0"
        );
        assert_eq!(route_condition(&result, types::ACCEPTED).0, "True");
        assert_eq!(route_condition(&result, types::RESOLVED_REFS).0, "True");
        assert!(result.errors.is_empty(), "{:?}", result.errors);
    }

    #[test]
    fn test_matches() {
        let result = translate_rules(json!([{
            "matches": [
                {
                    "path": {"type": "Exact", "value": "/exact"},
                    "headers": [{"type": "RegularExpression", "name": "x-version", "value": "v[0-9]+"}],
                    "queryParams": [{"name": "debug", "value": "true"}],
                    "method": "POST",
                },
                {"path": {"type": "RegularExpression", "value": "/(unclosed"}},
            ],
            "backendRefs": [backend(8080)],
        }]));
        let routes = ir_routes(&result);

        assert_eq!(routes.len(), 1, "the invalid match is dropped");
        assert_eq!(routes[0].path_match, Some(StringMatch::exact("/exact")));
        assert_eq!(
            routes[0].header_matches,
            vec![
                StringMatch::regex("v[0-9]+").named("x-version"),
                StringMatch::exact("POST").named(":method"),
            ]
        );
        assert_eq!(
            routes[0].query_param_matches,
            vec![StringMatch::exact("true").named("debug")]
        );

        let (status, reason, _) = route_condition(&result, types::ACCEPTED);
        assert_eq!((status.as_str(), reason.as_str()), ("False", reasons::UNSUPPORTED_VALUE));
    }

    #[test]
    fn test_backend_weights() {
        let result = translate_rules(json!([{
            "backendRefs": [
                {"name": "backend", "port": 8080, "weight": 3},
                {"name": "missing", "port": 8080},
                {"name": "backend", "port": 8080, "weight": 0},
            ],
        }]));
        let routes = ir_routes(&result);

        let destination = routes[0].destination.as_ref().unwrap();
        assert_eq!(destination.settings.len(), 1);
        assert_eq!(destination.total_weight(), 3);
        assert_eq!(routes[0].backend_weights, ir::BackendWeights { valid: 3, invalid: 1 });
        assert_eq!(routes[0].direct_response, None);

        let (status, reason, message) = route_condition(&result, types::RESOLVED_REFS);
        assert_eq!(status, "False");
        assert_eq!(reason, reasons::BACKEND_NOT_FOUND);
        assert_eq!(message, "Service default/missing not found");
        assert_eq!(route_condition(&result, types::ACCEPTED).0, "True");
    }

    #[test]
    fn test_no_valid_backends() {
        let result = translate_rules(json!([
            {"backendRefs": [backend(1234)]},
            {},
        ]));
        let routes = ir_routes(&result);

        assert_eq!(routes.len(), 2);
        for route in routes {
            assert_eq!(route.destination, None);
            assert_eq!(route.direct_response.as_ref().unwrap().status_code, 500);
        }
        assert_eq!(routes[0].backend_weights, ir::BackendWeights { valid: 0, invalid: 1 });
        assert_eq!(
            route_condition(&result, types::RESOLVED_REFS).1,
            reasons::PORT_NOT_FOUND
        );
    }

    #[test]
    fn test_header_filters() {
        let result = translate_rules(json!([{
            "filters": [
                {
                    "type": "RequestHeaderModifier",
                    "requestHeaderModifier": {
                        "add": [{"name": "x-add", "value": "1"}],
                        "set": [{"name": "x-set", "value": "2"}],
                        "remove": ["x-remove"],
                    },
                },
                {
                    "type": "ResponseHeaderModifier",
                    "responseHeaderModifier": {"remove": ["server"]},
                },
            ],
            "backendRefs": [backend(8080)],
        }]));
        let route = &ir_routes(&result)[0];

        assert_eq!(
            route.add_request_headers,
            vec![
                ir::AddHeader {
                    name: "x-add".to_string(),
                    value: "1".to_string(),
                    append: true
                },
                ir::AddHeader {
                    name: "x-set".to_string(),
                    value: "2".to_string(),
                    append: false
                },
            ]
        );
        assert_eq!(route.remove_request_headers, vec!["x-remove"]);
        assert_eq!(route.remove_response_headers, vec!["server"]);
    }

    #[test]
    fn test_invalid_filters() {
        let cases = [
            json!([{
                "type": "RequestHeaderModifier",
                "requestHeaderModifier": {"add": [{"name": "x-dup", "value": "1"}], "set": [{"name": "X-Dup", "value": "2"}]},
            }]),
            json!([{
                "type": "RequestHeaderModifier",
                "requestHeaderModifier": {"remove": ["bad header"]},
            }]),
            json!([{"type": "RequestHeaderModifier", "requestHeaderModifier": {}}]),
            json!([
                {"type": "RequestRedirect", "requestRedirect": {"scheme": "https"}},
                {"type": "RequestRedirect", "requestRedirect": {"scheme": "http"}},
            ]),
            json!([{"type": "RequestRedirect", "requestRedirect": {"port": 0}}]),
            json!([{"type": "RequestRedirect", "requestRedirect": {"port": 65536}}]),
            json!([{"type": "RequestRedirect", "requestRedirect": {"statusCode": -301}}]),
            json!([{"type": "RequestRedirect"}]),
            json!([{"type": "RequestRedirect", "requestRedirect": {"statusCode": 404}}]),
            json!([
                {"type": "RequestRedirect", "requestRedirect": {"scheme": "https"}},
                {"type": "URLRewrite", "urlRewrite": {"hostname": "example.com"}},
            ]),
            json!([{"type": "ExtensionRef", "extensionRef": {"group": "example.io", "kind": "Foo", "name": "foo"}}]),
        ];

        for filters in cases {
            let result = translate_rules(json!([{"filters": filters, "backendRefs": [backend(8080)]}]));
            let route = &ir_routes(&result)[0];

            assert_eq!(
                route.direct_response.as_ref().map(|d| d.status_code),
                Some(500),
                "filters: {filters}"
            );
            let (status, reason, _) = route_condition(&result, types::ACCEPTED);
            assert_eq!(
                (status.as_str(), reason.as_str()),
                ("False", reasons::UNSUPPORTED_VALUE),
                "filters: {filters}"
            );
        }
    }

    #[test]
    fn test_redirect() {
        let result = translate_rules(json!([{
            "filters": [{
                "type": "RequestRedirect",
                "requestRedirect": {
                    "scheme": "https",
                    "statusCode": 301,
                    "path": {"type": "ReplacePrefixMatch", "replacePrefixMatch": "/new"},
                },
            }],
        }]));
        let route = &ir_routes(&result)[0];

        assert_eq!(route.direct_response, None, "redirects don't need backends");
        assert_eq!(
            route.redirect,
            Some(ir::Redirect {
                scheme: Some("https".to_string()),
                hostname: None,
                path: Some(ir::PathModifier::PrefixMatchReplace("/new".to_string())),
                port: Some(443),
                status_code: Some(301),
            })
        );
    }

    #[test]
    fn test_rewrite_needs_prefix_match() {
        let result = translate_rules(json!([{
            "matches": [{"path": {"type": "Exact", "value": "/foo"}}],
            "filters": [{
                "type": "URLRewrite",
                "urlRewrite": {"path": {"type": "ReplacePrefixMatch", "replacePrefixMatch": "/bar"}},
            }],
            "backendRefs": [backend(8080)],
        }]));
        let route = &ir_routes(&result)[0];

        assert_eq!(route.url_rewrite, None);
        assert_eq!(route.direct_response.as_ref().unwrap().status_code, 500);
        assert_eq!(
            route_condition(&result, types::ACCEPTED).2,
            "ReplacePrefixMatch must be used with a PathPrefix path match"
        );
    }

    #[test]
    fn test_mirror() {
        let result = translate_rules(json!([{
            "filters": [
                {"type": "RequestMirror", "requestMirror": {"backendRef": {"name": "mirror", "port": 9090}}},
                {"type": "RequestMirror", "requestMirror": {"backendRef": {"name": "missing", "port": 9090}}},
            ],
            "backendRefs": [backend(8080)],
        }]));
        let route = &ir_routes(&result)[0];

        assert_eq!(route.direct_response, None);
        assert_eq!(route.mirrors.len(), 1);
        assert_eq!(
            route.mirrors[0].destination.name,
            "httproute/default/route-1/rule/0/mirror/0"
        );
        assert_eq!(route_condition(&result, types::RESOLVED_REFS).0, "False");
    }

    #[test]
    fn test_extension_ref() {
        let config = TranslatorConfig {
            extension_group_kinds: vec![GroupKind {
                group: "example.io".to_string(),
                kind: "Foo".to_string(),
            }],
            ..config()
        };
        let foo = json!({
            "apiVersion": "example.io/v1",
            "kind": "Foo",
            "metadata": {"namespace": "default", "name": "foo"},
            "spec": {"bar": "baz"},
        });
        let resources = resources_with_config(
            json!([
                gateway("gateway-1", listeners()),
                service("default", "backend", json!([{"port": 8080}])),
                foo.clone(),
                http_route(json!([{
                    "filters": [{"type": "ExtensionRef", "extensionRef": {"group": "example.io", "kind": "Foo", "name": "foo"}}],
                    "backendRefs": [backend(8080)],
                }])),
            ]),
            &config,
        );
        let result = Translator::new(config).translate(&resources);
        let route = &ir_routes(&result)[0];

        assert_eq!(route.direct_response, None);
        assert_eq!(route.extension_refs, vec![ir::UnstructuredRef { object: foo }]);
    }

    #[test]
    fn test_timeouts() {
        let result = translate_rules(json!([
            {"timeouts": {"request": "10s", "backendRequest": "2s"}, "backendRefs": [backend(8080)]},
            {"timeouts": {"request": "1s", "backendRequest": "2s"}, "backendRefs": [backend(8080)]},
        ]));
        let routes = ir_routes(&result);

        assert_eq!(
            routes[0].timeout,
            Some(ir::RouteTimeout {
                request: Some(Duration::from_secs(10)),
                backend_request: Some(Duration::from_secs(2)),
            })
        );
        assert_eq!(routes[1].timeout, None);
        assert_eq!(route_condition(&result, types::ACCEPTED).0, "False");
    }

    #[test]
    fn test_redirect_port() {
        let result = translate_rules(json!([{
            "filters": [{
                "type": "RequestRedirect",
                "requestRedirect": {"hostname": "example.com", "port": 8443},
            }],
        }]));
        let route = &ir_routes(&result)[0];

        let redirect = route.redirect.as_ref().unwrap();
        assert_eq!(redirect.port, Some(8443));
        assert_eq!(redirect.hostname.as_deref(), Some("example.com"));
        assert_eq!(route_condition(&result, types::ACCEPTED).0, "True");
    }

    #[test]
    fn test_redirect_port_out_of_range() {
        let result = translate_rules(json!([{
            "filters": [{"type": "RequestRedirect", "requestRedirect": {"port": 70000}}],
        }]));
        let route = &ir_routes(&result)[0];

        assert_eq!(route.redirect, None);
        assert_eq!(route.direct_response.as_ref().unwrap().status_code, 500);
        assert_eq!(
            route_condition(&result, types::ACCEPTED).2,
            "Port 70000 is not a valid port number"
        );
    }

    #[test]
    fn test_unknown_redirect_scheme() {
        let objs = json!([http_route(json!([{
            "filters": [{"type": "RequestRedirect", "requestRedirect": {"scheme": "ftp"}}],
        }]))]);
        let yaml = serde_yml::to_string(&objs[0]).unwrap();

        let err = Resources::from_yaml_str(&yaml, &config()).unwrap_err();
        assert!(
            matches!(err, Error::InvalidResource { index: 0, ref kind, .. } if kind == "HTTPRoute"),
            "unexpected error: {err}"
        );
    }
}
