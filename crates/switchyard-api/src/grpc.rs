//! GRPCRoute configuration.
//!
//! GRPCRoutes only exist in the experimental channel of the upstream CRDs.
//! Their filters are a subset of the HTTPRoute filters: header modifiers,
//! mirrors and extension refs. Redirects and rewrites can't be written at all.

pub use gateway_api::apis::experimental::grpcroutes::*;

use crate::http::{
    HTTPRouteRulesFilters, HTTPRouteRulesFiltersExtensionRef,
    HTTPRouteRulesFiltersRequestHeaderModifier, HTTPRouteRulesFiltersRequestHeaderModifierAdd,
    HTTPRouteRulesFiltersRequestHeaderModifierSet, HTTPRouteRulesFiltersRequestMirror,
    HTTPRouteRulesFiltersRequestMirrorBackendRef, HTTPRouteRulesFiltersRequestMirrorFraction,
    HTTPRouteRulesFiltersResponseHeaderModifier, HTTPRouteRulesFiltersResponseHeaderModifierAdd,
    HTTPRouteRulesFiltersResponseHeaderModifierSet, HTTPRouteRulesFiltersType,
};

macro_rules! header_modifier {
    ($m:expr, $out:ident, $add:ident, $set:ident) => {
        $out {
            add: $m.add.as_ref().map(|headers| {
                headers
                    .iter()
                    .map(|h| $add {
                        name: h.name.clone(),
                        value: h.value.clone(),
                    })
                    .collect()
            }),
            remove: $m.remove.clone(),
            set: $m.set.as_ref().map(|headers| {
                headers
                    .iter()
                    .map(|h| $set {
                        name: h.name.clone(),
                        value: h.value.clone(),
                    })
                    .collect()
            }),
        }
    };
}

/// Every GRPCRoute filter has an HTTPRoute filter with the same meaning, so
/// both kinds share filter translation.
impl From<&GRPCRouteRulesFilters> for HTTPRouteRulesFilters {
    fn from(filter: &GRPCRouteRulesFilters) -> Self {
        let r#type = match filter.r#type {
            GRPCRouteRulesFiltersType::RequestHeaderModifier => {
                HTTPRouteRulesFiltersType::RequestHeaderModifier
            }
            GRPCRouteRulesFiltersType::ResponseHeaderModifier => {
                HTTPRouteRulesFiltersType::ResponseHeaderModifier
            }
            GRPCRouteRulesFiltersType::RequestMirror => HTTPRouteRulesFiltersType::RequestMirror,
            GRPCRouteRulesFiltersType::ExtensionRef => HTTPRouteRulesFiltersType::ExtensionRef,
        };

        let request_header_modifier = filter.request_header_modifier.as_ref().map(|m| {
            header_modifier!(
                m,
                HTTPRouteRulesFiltersRequestHeaderModifier,
                HTTPRouteRulesFiltersRequestHeaderModifierAdd,
                HTTPRouteRulesFiltersRequestHeaderModifierSet
            )
        });
        let response_header_modifier = filter.response_header_modifier.as_ref().map(|m| {
            header_modifier!(
                m,
                HTTPRouteRulesFiltersResponseHeaderModifier,
                HTTPRouteRulesFiltersResponseHeaderModifierAdd,
                HTTPRouteRulesFiltersResponseHeaderModifierSet
            )
        });

        let request_mirror = filter
            .request_mirror
            .as_ref()
            .map(|m| HTTPRouteRulesFiltersRequestMirror {
                backend_ref: HTTPRouteRulesFiltersRequestMirrorBackendRef {
                    group: m.backend_ref.group.clone(),
                    kind: m.backend_ref.kind.clone(),
                    name: m.backend_ref.name.clone(),
                    namespace: m.backend_ref.namespace.clone(),
                    port: m.backend_ref.port,
                },
                fraction: m
                    .fraction
                    .as_ref()
                    .map(|f| HTTPRouteRulesFiltersRequestMirrorFraction {
                        denominator: f.denominator,
                        numerator: f.numerator,
                    }),
                percent: m.percent,
            });

        let extension_ref = filter
            .extension_ref
            .as_ref()
            .map(|e| HTTPRouteRulesFiltersExtensionRef {
                group: e.group.clone(),
                kind: e.kind.clone(),
                name: e.name.clone(),
            });

        HTTPRouteRulesFilters {
            r#type,
            request_header_modifier,
            response_header_modifier,
            request_mirror,
            extension_ref,
            request_redirect: None,
            url_rewrite: None,
        }
    }
}
