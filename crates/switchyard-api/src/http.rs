//! HTTPRoute configuration.
//!
//! An [HTTPRoute] attaches to one or more Gateway Listeners and describes how
//! matching HTTP requests are filtered and forwarded to backends. The resource
//! types are the upstream experimental channel CRDs, which carry rule names
//! and request mirror fractions.

pub use gateway_api::apis::experimental::httproutes::*;

use gateway_api::apis::experimental::grpcroutes::GRPCRouteRulesMatchesHeadersType;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::shared::{BackendObjectReference, LocalObjectReference};

/// Adds, sets and removes headers. The request and response header modifier
/// filters have separate generated types with the same fields. Response
/// modifiers convert into this one.
pub type HTTPHeaderFilter = HTTPRouteRulesFiltersRequestHeaderModifier;

/// A header added or set by an [HTTPHeaderFilter].
pub type HTTPHeader = HTTPRouteRulesFiltersRequestHeaderModifierAdd;

impl From<&HTTPRouteRulesFiltersResponseHeaderModifier> for HTTPHeaderFilter {
    fn from(m: &HTTPRouteRulesFiltersResponseHeaderModifier) -> Self {
        HTTPHeaderFilter {
            add: m.add.as_ref().map(|headers| {
                headers
                    .iter()
                    .map(|h| HTTPHeader {
                        name: h.name.clone(),
                        value: h.value.clone(),
                    })
                    .collect()
            }),
            remove: m.remove.clone(),
            set: m.set.as_ref().map(|headers| {
                headers
                    .iter()
                    .map(|h| HTTPRouteRulesFiltersRequestHeaderModifierSet {
                        name: h.name.clone(),
                        value: h.value.clone(),
                    })
                    .collect()
            }),
        }
    }
}

/// The match semantics for a header or query parameter value. Every match
/// kind has its own generated type enum, all with the same two values.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash, JsonSchema)]
pub enum ValueMatchType {
    #[default]
    Exact,
    RegularExpression,
}

macro_rules! value_match_type {
    ($($generated:ident),* $(,)?) => {
        $(
            impl From<&$generated> for ValueMatchType {
                fn from(t: &$generated) -> Self {
                    match t {
                        $generated::Exact => ValueMatchType::Exact,
                        $generated::RegularExpression => ValueMatchType::RegularExpression,
                    }
                }
            }
        )*
    };
}

value_match_type!(
    HTTPRouteRulesMatchesHeadersType,
    HTTPRouteRulesMatchesQueryParamsType,
    GRPCRouteRulesMatchesHeadersType,
);

impl From<&HTTPRouteRulesFiltersRequestMirrorBackendRef> for BackendObjectReference {
    fn from(r: &HTTPRouteRulesFiltersRequestMirrorBackendRef) -> Self {
        BackendObjectReference {
            group: r.group.clone(),
            kind: r.kind.clone(),
            name: r.name.clone(),
            namespace: r.namespace.clone(),
            port: r.port,
        }
    }
}

impl From<&HTTPRouteRulesFiltersExtensionRef> for LocalObjectReference {
    fn from(r: &HTTPRouteRulesFiltersExtensionRef) -> Self {
        LocalObjectReference {
            group: r.group.clone(),
            kind: r.kind.clone(),
            name: r.name.clone(),
        }
    }
}

/// The name a filter type is written with in a Route.
pub fn filter_type_name(type_: &HTTPRouteRulesFiltersType) -> &'static str {
    match type_ {
        HTTPRouteRulesFiltersType::RequestHeaderModifier => "RequestHeaderModifier",
        HTTPRouteRulesFiltersType::ResponseHeaderModifier => "ResponseHeaderModifier",
        HTTPRouteRulesFiltersType::RequestMirror => "RequestMirror",
        HTTPRouteRulesFiltersType::RequestRedirect => "RequestRedirect",
        HTTPRouteRulesFiltersType::UrlRewrite => "URLRewrite",
        HTTPRouteRulesFiltersType::ExtensionRef => "ExtensionRef",
    }
}
