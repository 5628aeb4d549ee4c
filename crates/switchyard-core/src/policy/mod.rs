//! Policy attachment.
//!
//! Every policy kind that targets Gateways and Routes goes through
//! [process_policies], which decides which policy wins each target and
//! writes ancestor status. The kind specific modules only translate a
//! policy onto the IR of one target.
//!
//! Targets are resolved in a fixed order. Policies targeting Routes go first,
//! then policies targeting a single Listener of a Gateway, then policies
//! targeting a whole Gateway. Within a pass, older policies win conflicts.
//! A whole-Gateway policy only applies to the Listeners no section policy
//! has claimed, and at runtime it is overridden by Route policies on the
//! Routes attached to it.

use std::collections::{BTreeMap, BTreeSet};

use kube::{Resource, ResourceExt};
use switchyard_api::policy::backend_traffic::BackendTrafficPolicy;
use switchyard_api::policy::client_traffic::ClientTrafficPolicy;
use switchyard_api::policy::extension::EnvoyExtensionPolicy;
use switchyard_api::policy::security::SecurityPolicy;
use switchyard_api::policy::{LocalPolicyTargetReferenceWithSectionName, PolicyStatus};
use switchyard_api::{Duration, ParentReference};

use crate::ir;
use crate::resources::Resources;
use crate::route::RouteKind;
use crate::status::{reasons, types, AncestorStatusWriter, PolicyResolveError};
use crate::translator::TranslateContext;

pub(crate) mod backend_traffic;
pub(crate) mod client_traffic;
pub(crate) mod extension;
pub(crate) mod extension_server;
pub(crate) mod patch;
pub(crate) mod security;

/// An error translating a policy onto a target.
///
/// Extension errors carry whether the proxy should keep serving traffic
/// when the extension is unavailable.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TranslationError {
    #[error("{0}")]
    Invalid(String),

    #[error("{message}")]
    Extension { message: String, fail_open: bool },

    #[error("{}", join_errors(.0))]
    Multi(Vec<TranslationError>),
}

fn join_errors(errs: &[TranslationError]) -> String {
    errs.iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl TranslationError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }

    /// True when every error in this error is a fail-open extension error.
    pub fn is_fail_open(&self) -> bool {
        match self {
            TranslationError::Invalid(_) => false,
            TranslationError::Extension { fail_open, .. } => *fail_open,
            TranslationError::Multi(errs) => {
                !errs.is_empty() && errs.iter().all(TranslationError::is_fail_open)
            }
        }
    }

    /// Prefix the message with the name of the field that caused it.
    pub(crate) fn with_field(self, field: &str) -> Self {
        match self {
            TranslationError::Invalid(message) => {
                TranslationError::Invalid(format!("{field}: {message}"))
            }
            TranslationError::Extension { message, fail_open } => TranslationError::Extension {
                message: format!("{field}: {message}"),
                fail_open,
            },
            TranslationError::Multi(errs) => {
                TranslationError::Multi(errs.into_iter().map(|e| e.with_field(field)).collect())
            }
        }
    }

    /// Combine a list of errors. A single error is returned as is.
    pub(crate) fn collect(mut errs: Vec<TranslationError>) -> Result<(), TranslationError> {
        match errs.len() {
            0 => Ok(()),
            1 => Err(errs.remove(0)),
            _ => Err(TranslationError::Multi(errs)),
        }
    }
}

/// The parts of a policy object that attachment needs, independent of kind.
pub(crate) trait PolicyResource: Resource<DynamicType = ()> + Clone {
    const KIND: &'static str;

    /// The plural kind, as used in status messages.
    const PLURAL: &'static str;

    const TARGETS_ROUTES: bool;

    fn target_refs(&self) -> Vec<LocalPolicyTargetReferenceWithSectionName>;

    fn policy_status_mut(&mut self) -> &mut PolicyStatus;

    fn push_output(self, output: &mut Resources);
}

macro_rules! impl_policy_resource {
    ($policy:ty, $kind:expr, $plural:literal, $targets_routes:literal, $output:ident) => {
        impl PolicyResource for $policy {
            const KIND: &'static str = $kind;
            const PLURAL: &'static str = $plural;
            const TARGETS_ROUTES: bool = $targets_routes;

            fn target_refs(&self) -> Vec<LocalPolicyTargetReferenceWithSectionName> {
                self.spec.targets.all().cloned().collect()
            }

            fn policy_status_mut(&mut self) -> &mut PolicyStatus {
                self.status.get_or_insert_with(Default::default)
            }

            fn push_output(self, output: &mut Resources) {
                output.$output.push(self);
            }
        }
    };
}

impl_policy_resource!(
    ClientTrafficPolicy,
    switchyard_api::KIND_CLIENT_TRAFFIC_POLICY,
    "ClientTrafficPolicies",
    false,
    client_traffic_policies
);
impl_policy_resource!(
    BackendTrafficPolicy,
    switchyard_api::KIND_BACKEND_TRAFFIC_POLICY,
    "BackendTrafficPolicies",
    true,
    backend_traffic_policies
);
impl_policy_resource!(
    SecurityPolicy,
    switchyard_api::KIND_SECURITY_POLICY,
    "SecurityPolicies",
    true,
    security_policies
);
impl_policy_resource!(
    EnvoyExtensionPolicy,
    switchyard_api::KIND_ENVOY_EXTENSION_POLICY,
    "EnvoyExtensionPolicies",
    true,
    envoy_extension_policies
);

/// A resolved policy target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum PolicyTarget {
    /// A Route, by index into the translated Routes.
    Route { route_idx: usize },

    /// Some or all of a Gateway's Listeners. `section` is set when the
    /// policy named a single Listener.
    Gateway {
        gateway_idx: usize,
        listener_idxs: Vec<usize>,
        section: Option<String>,
    },
}

/// The sections of a Gateway that policies have already claimed.
#[derive(Debug, Default)]
struct GatewayClaims {
    all: bool,
    sections: BTreeSet<String>,
}

struct PendingPolicy<P> {
    policy: P,
    namespace: String,
    name: String,
    targets: Vec<LocalPolicyTargetReferenceWithSectionName>,
}

impl<P: PolicyResource> PendingPolicy<P> {
    /// Copy a policy for output, dropping this controller's old status.
    fn new(controller_name: &str, policy: &P) -> Self {
        let mut policy = policy.clone();
        let namespace = policy.namespace().unwrap_or_default();
        let name = policy.name_any();
        let targets = policy.target_refs();

        policy
            .policy_status_mut()
            .ancestors
            .retain(|a| a.controller_name != controller_name);

        Self {
            policy,
            namespace,
            name,
            targets,
        }
    }
}

/// Resolve every policy of a kind to its targets and translate it onto the
/// IR of each target it wins.
///
/// Every policy is returned in the output snapshot, including policies that
/// didn't resolve to any target.
pub(crate) fn process_policies<P, F>(cx: &mut TranslateContext, policies: &[P], mut translate: F)
where
    P: PolicyResource,
    F: FnMut(&mut TranslateContext, &P, &PolicyTarget) -> Result<(), TranslationError>,
{
    let config = cx.config;
    let now = cx.now.clone();

    let mut sorted: Vec<_> = policies.iter().collect();
    sorted.sort_by(|a, b| {
        let a_time = a.meta().creation_timestamp.as_ref().map(|t| t.0);
        let b_time = b.meta().creation_timestamp.as_ref().map(|t| t.0);
        a_time
            .cmp(&b_time)
            .then_with(|| a.namespace().cmp(&b.namespace()))
            .then_with(|| a.name_any().cmp(&b.name_any()))
    });

    let mut pending: Vec<_> = sorted
        .into_iter()
        .map(|p| PendingPolicy::new(&config.controller_name, p))
        .collect();

    // routes that already have a policy, and the routes on each gateway
    // that have one
    let mut attached_routes = BTreeSet::new();
    let mut gateway_routes: BTreeMap<usize, BTreeSet<String>> = BTreeMap::new();
    let mut claims: BTreeMap<usize, GatewayClaims> = BTreeMap::new();

    if P::TARGETS_ROUTES {
        for pending in &mut pending {
            let writer = AncestorStatusWriter {
                controller_name: &config.controller_name,
                generation: pending.policy.meta().generation,
                now: &now,
            };

            for target in &pending.targets {
                if target.group != switchyard_api::GATEWAY_GROUP {
                    continue;
                }
                let Some(kind) = RouteKind::from_kind(&target.kind) else {
                    continue;
                };
                let Some(route_idx) = cx
                    .routes
                    .iter()
                    .position(|r| r.is(kind, &pending.namespace, &target.name))
                else {
                    continue;
                };

                let route = &cx.routes[route_idx];
                let mut ancestors: Vec<ParentReference> = vec![];
                for parent in &route.parents {
                    let ancestor = cx.gateways[parent.gateway_idx]
                        .parent_ref(parent.parent_ref.section_name.as_deref());
                    if !ancestors.contains(&ancestor) {
                        ancestors.push(ancestor);
                    }
                    gateway_routes
                        .entry(parent.gateway_idx)
                        .or_default()
                        .insert(format!("{}/{}", route.namespace, route.name));
                }

                let status = pending.policy.policy_status_mut();
                if !attached_routes.insert(route_idx) {
                    let err = PolicyResolveError::new(
                        reasons::CONFLICTED,
                        format!(
                            "Unable to target {} {}, another {} has already attached to it",
                            target.kind,
                            target.name,
                            P::KIND
                        ),
                    );
                    writer.resolve_error(status, &ancestors, &err);
                    continue;
                }

                let result = translate(cx, &pending.policy, &PolicyTarget::Route { route_idx });
                let status = pending.policy.policy_status_mut();
                if let Err(e) = result {
                    tracing::debug!(
                        kind = P::KIND,
                        policy = %format!("{}/{}", pending.namespace, pending.name),
                        error = %e,
                        "policy translation failed",
                    );
                    writer.translation_error(status, &ancestors, &e.to_string());
                }
                writer.accept(status, &ancestors);
            }
        }
    }

    // gateway targets with a section name
    for pending in &mut pending {
        let writer = AncestorStatusWriter {
            controller_name: &config.controller_name,
            generation: pending.policy.meta().generation,
            now: &now,
        };

        for target in &pending.targets {
            let Some(section) = target.section_name.as_deref() else {
                continue;
            };
            let Some(gateway_idx) = gateway_target(cx, &pending.namespace, target) else {
                continue;
            };

            let gateway = &cx.gateways[gateway_idx];
            let ancestors = [gateway.parent_ref(Some(section))];
            let status = pending.policy.policy_status_mut();

            let Some(listener) = gateway.listener_by_section(section) else {
                let err = PolicyResolveError::new(
                    reasons::TARGET_NOT_FOUND,
                    format!("No section name {section} found for {}", gateway.key()),
                );
                writer.resolve_error(status, &ancestors, &err);
                continue;
            };
            let listener_idx = listener.idx;

            let claimed = claims.entry(gateway_idx).or_default();
            if !claimed.sections.insert(section.to_string()) {
                let err = PolicyResolveError::new(
                    reasons::CONFLICTED,
                    format!(
                        "Unable to target section of {}, another {} has already attached to it",
                        target.name,
                        P::KIND
                    ),
                );
                writer.resolve_error(status, &ancestors, &err);
                continue;
            }

            let policy_target = PolicyTarget::Gateway {
                gateway_idx,
                listener_idxs: vec![listener_idx],
                section: Some(section.to_string()),
            };
            let result = translate(cx, &pending.policy, &policy_target);
            let status = pending.policy.policy_status_mut();
            if let Err(e) = result {
                writer.translation_error(status, &ancestors, &e.to_string());
            }
            writer.accept(status, &ancestors);
        }
    }

    // whole gateway targets
    for pending in &mut pending {
        let writer = AncestorStatusWriter {
            controller_name: &config.controller_name,
            generation: pending.policy.meta().generation,
            now: &now,
        };

        for target in &pending.targets {
            if target.section_name.is_some() {
                continue;
            }
            let Some(gateway_idx) = gateway_target(cx, &pending.namespace, target) else {
                continue;
            };

            let gateway = &cx.gateways[gateway_idx];
            let ancestors = [gateway.parent_ref(None)];
            let status = pending.policy.policy_status_mut();

            let claimed = claims.entry(gateway_idx).or_default();
            if claimed.all {
                let err = PolicyResolveError::new(
                    reasons::CONFLICTED,
                    format!(
                        "Unable to target Gateway {}, another {} has already attached to it",
                        target.name,
                        P::KIND
                    ),
                );
                writer.resolve_error(status, &ancestors, &err);
                continue;
            }
            claimed.all = true;

            if !claimed.sections.is_empty() {
                let sections: Vec<_> = claimed.sections.iter().map(String::as_str).collect();
                writer.set_all(
                    status,
                    &ancestors,
                    types::OVERRIDDEN,
                    true,
                    reasons::OVERRIDDEN,
                    &format!(
                        "There are existing {} that are overriding these sections [{}]",
                        P::PLURAL,
                        sections.join(" ")
                    ),
                );
            }

            let listener_idxs = gateway
                .listeners
                .iter()
                .filter(|l| !claimed.sections.contains(&l.name))
                .map(|l| l.idx)
                .collect();
            let policy_target = PolicyTarget::Gateway {
                gateway_idx,
                listener_idxs,
                section: None,
            };

            let result = translate(cx, &pending.policy, &policy_target);
            let status = pending.policy.policy_status_mut();
            if let Err(e) = result {
                writer.translation_error(status, &ancestors, &e.to_string());
            }
            writer.accept(status, &ancestors);

            if let Some(routes) = gateway_routes.get(&gateway_idx) {
                let routes: Vec<_> = routes.iter().map(String::as_str).collect();
                writer.set_all(
                    status,
                    &ancestors,
                    types::OVERRIDDEN,
                    true,
                    reasons::OVERRIDDEN,
                    &format!(
                        "This policy is being overridden by other {} for these routes: [{}]",
                        lower_first(P::PLURAL),
                        routes.join(" ")
                    ),
                );
            }
        }
    }

    for mut pending in pending {
        let writer = AncestorStatusWriter {
            controller_name: &config.controller_name,
            generation: pending.policy.meta().generation,
            now: &now,
        };
        writer.truncate(pending.policy.policy_status_mut());
        pending.policy.push_output(&mut cx.output);
    }
}

/// Find the Gateway a target ref names. Gateways are always in the
/// policy's namespace.
fn gateway_target(
    cx: &TranslateContext,
    namespace: &str,
    target: &LocalPolicyTargetReferenceWithSectionName,
) -> Option<usize> {
    if target.group != switchyard_api::GATEWAY_GROUP || target.kind != switchyard_api::KIND_GATEWAY {
        return None;
    }
    cx.gateway_idx(namespace, &target.name)
}

fn lower_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// The IR names of the Listeners a Gateway target covers.
fn target_listener_names<'a>(cx: &'a TranslateContext, gateway_idx: usize, listener_idxs: &[usize]) -> Vec<&'a str> {
    let gateway = &cx.gateways[gateway_idx];
    listener_idxs
        .iter()
        .map(|&idx| gateway.listeners[idx].ir_name.as_str())
        .collect()
}

/// Every HTTP IR route built for a target.
pub(crate) fn target_http_routes<'a>(
    cx: &'a mut TranslateContext,
    target: &PolicyTarget,
) -> Vec<&'a mut ir::HttpRoute> {
    match target {
        PolicyTarget::Route { route_idx } => {
            let route = &cx.routes[*route_idx];
            cx.xds
                .values_mut()
                .flat_map(|xds| xds.http.iter_mut())
                .flat_map(|l| l.routes.iter_mut())
                .filter(|r| route.owns_ir_route(&r.name))
                .collect()
        }
        PolicyTarget::Gateway {
            gateway_idx,
            listener_idxs,
            ..
        } => {
            let names: Vec<String> = target_listener_names(cx, *gateway_idx, listener_idxs)
                .into_iter()
                .map(str::to_string)
                .collect();
            let ir_key = &cx.gateways[*gateway_idx].ir_key;
            match cx.xds.get_mut(ir_key) {
                Some(xds) => xds
                    .http
                    .iter_mut()
                    .filter(|l| names.contains(&l.name))
                    .flat_map(|l| l.routes.iter_mut())
                    .collect(),
                None => vec![],
            }
        }
    }
}

/// Every TCP IR route built for a target.
pub(crate) fn target_tcp_routes<'a>(
    cx: &'a mut TranslateContext,
    target: &PolicyTarget,
) -> Vec<&'a mut ir::TcpRoute> {
    match target {
        PolicyTarget::Route { route_idx } => {
            let route = &cx.routes[*route_idx];
            cx.xds
                .values_mut()
                .flat_map(|xds| xds.tcp.iter_mut())
                .flat_map(|l| l.routes.iter_mut())
                .filter(|r| route.owns_ir_route(&r.name))
                .collect()
        }
        PolicyTarget::Gateway {
            gateway_idx,
            listener_idxs,
            ..
        } => {
            let names: Vec<String> = target_listener_names(cx, *gateway_idx, listener_idxs)
                .into_iter()
                .map(str::to_string)
                .collect();
            let ir_key = &cx.gateways[*gateway_idx].ir_key;
            match cx.xds.get_mut(ir_key) {
                Some(xds) => xds
                    .tcp
                    .iter_mut()
                    .filter(|l| names.contains(&l.name))
                    .flat_map(|l| l.routes.iter_mut())
                    .collect(),
                None => vec![],
            }
        }
    }
}

/// Parse a Gateway API duration string from a policy field.
pub(crate) fn duration(field: &str, value: &str) -> Result<Duration, TranslationError> {
    Duration::from_gateway(value).map_err(|e| TranslationError::invalid(format!("{field}: {e}")))
}

pub(crate) fn optional_duration(
    field: &str,
    value: Option<&String>,
) -> Result<Option<Duration>, TranslationError> {
    value.map(|v| duration(field, v)).transpose()
}

/// Convert TCP keepalive settings, shared by client and backend policies.
pub(crate) fn tcp_keepalive(
    keepalive: &switchyard_api::policy::TcpKeepalive,
) -> Result<ir::TcpKeepalive, TranslationError> {
    Ok(ir::TcpKeepalive {
        probes: keepalive.probes,
        idle_time: optional_duration("idleTime", keepalive.idle_time.as_ref())?,
        interval: optional_duration("interval", keepalive.interval.as_ref())?,
    })
}

/// Parse a CIDR block like `10.0.0.0/8` or `::1/128`.
pub(crate) fn parse_cidr(cidr: &str) -> Result<ir::CidrMatch, TranslationError> {
    let invalid = || TranslationError::invalid(format!("invalid CIDR {cidr:?}"));

    let (ip, mask_len) = cidr.split_once('/').ok_or_else(invalid)?;
    let ip: std::net::IpAddr = ip.parse().map_err(|_| invalid())?;
    let mask_len: u8 = mask_len.parse().map_err(|_| invalid())?;

    let max_len = if ip.is_ipv6() { 128 } else { 32 };
    if mask_len > max_len {
        return Err(invalid());
    }

    Ok(ir::CidrMatch {
        cidr: cidr.to_string(),
        ip,
        mask_len,
        is_ipv6: ip.is_ipv6(),
    })
}
