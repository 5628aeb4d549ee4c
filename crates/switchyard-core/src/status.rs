//! Status conditions.
//!
//! Every input object the translator touches gets its status rewritten from
//! scratch. Conditions are set with [set_condition], which replaces an
//! existing condition of the same type in place and appends new types, so the
//! order conditions were first set in is preserved.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};
use k8s_openapi::chrono::{DateTime, Utc};
use switchyard_api::policy::{PolicyAncestorStatus, PolicyStatus};
use switchyard_api::route::{RouteParentStatus, RouteStatus};
use switchyard_api::ParentReference;

pub mod types {
    pub const ACCEPTED: &str = "Accepted";
    pub const PROGRAMMED: &str = "Programmed";
    pub const READY: &str = "Ready";
    pub const RESOLVED_REFS: &str = "ResolvedRefs";
    pub const CONFLICTED: &str = "Conflicted";
    pub const OVERRIDDEN: &str = "Overridden";
    pub const AGGREGATED: &str = "Aggregated";
}

pub mod reasons {
    pub const ACCEPTED: &str = "Accepted";
    pub const PROGRAMMED: &str = "Programmed";
    pub const READY: &str = "Ready";
    pub const RESOLVED_REFS: &str = "ResolvedRefs";
    pub const NO_CONFLICTS: &str = "NoConflicts";
    pub const INVALID: &str = "Invalid";
    pub const CONFLICTED: &str = "Conflicted";
    pub const OVERRIDDEN: &str = "Overridden";
    pub const AGGREGATED: &str = "Aggregated";
    pub const DISABLED: &str = "Disabled";
    pub const TARGET_NOT_FOUND: &str = "TargetNotFound";

    // gateways and listeners
    pub const UNSUPPORTED_ADDRESS: &str = "UnsupportedAddress";
    pub const UNSUPPORTED_PROTOCOL: &str = "UnsupportedProtocol";
    pub const UNSUPPORTED_TLS_MODE: &str = "UnsupportedTLSMode";
    pub const INVALID_CERTIFICATE_REF: &str = "InvalidCertificateRef";
    pub const INVALID_ROUTE_KINDS: &str = "InvalidRouteKinds";
    pub const PROTOCOL_CONFLICT: &str = "ProtocolConflict";
    pub const HOSTNAME_CONFLICT: &str = "HostnameConflict";

    // routes
    pub const NO_MATCHING_PARENT: &str = "NoMatchingParent";
    pub const NO_READY_LISTENERS: &str = "NoReadyListeners";
    pub const NOT_ALLOWED_BY_LISTENERS: &str = "NotAllowedByListeners";
    pub const NO_MATCHING_LISTENER_HOSTNAME: &str = "NoMatchingListenerHostname";
    pub const UNSUPPORTED_VALUE: &str = "UnsupportedValue";
    pub const INVALID_KIND: &str = "InvalidKind";
    pub const REF_NOT_PERMITTED: &str = "RefNotPermitted";
    pub const PORT_NOT_SPECIFIED: &str = "PortNotSpecified";
    pub const BACKEND_NOT_FOUND: &str = "BackendNotFound";
    pub const PORT_NOT_FOUND: &str = "PortNotFound";
}

/// The maximum number of ancestors reported on a policy.
pub const MAX_POLICY_ANCESTORS: usize = 16;

/// The wall clock, as a Kubernetes timestamp.
pub(crate) fn now() -> Time {
    let since_epoch = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();

    let now = DateTime::<Utc>::from_timestamp(
        since_epoch.as_secs() as i64,
        since_epoch.subsec_nanos(),
    )
    .unwrap_or_default();

    Time(now)
}

fn status_str(status: bool) -> &'static str {
    if status {
        "True"
    } else {
        "False"
    }
}

/// Build a condition.
pub fn new_condition(
    type_: &str,
    status: bool,
    reason: &str,
    message: impl Into<String>,
    generation: Option<i64>,
    now: &Time,
) -> Condition {
    Condition {
        type_: type_.to_string(),
        status: status_str(status).to_string(),
        reason: reason.to_string(),
        message: message.into(),
        observed_generation: generation,
        last_transition_time: now.clone(),
    }
}

/// Set a condition, replacing any existing condition with the same type.
///
/// When the replaced condition had the same status, its transition time is
/// kept.
pub fn set_condition(conditions: &mut Vec<Condition>, mut condition: Condition) {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) => {
            if existing.status == condition.status {
                condition.last_transition_time = existing.last_transition_time.clone();
            }
            *existing = condition;
        }
        None => conditions.push(condition),
    }
}

pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// Returns true if a condition with the given type and status is present.
pub fn has_condition(conditions: &[Condition], type_: &str, status: bool) -> bool {
    find_condition(conditions, type_).is_some_and(|c| c.status == status_str(status))
}

/// A reason to mark a Route as not Accepted or its refs as not Resolved.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct RouteStatusError {
    pub type_: &'static str,
    pub reason: &'static str,
    pub message: String,
}

impl RouteStatusError {
    pub fn accepted(reason: &'static str, message: impl Into<String>) -> Self {
        Self {
            type_: types::ACCEPTED,
            reason,
            message: message.into(),
        }
    }

    pub fn resolved_refs(reason: &'static str, message: impl Into<String>) -> Self {
        Self {
            type_: types::RESOLVED_REFS,
            reason,
            message: message.into(),
        }
    }

    pub fn unsupported_value(message: impl Into<String>) -> Self {
        Self::accepted(reasons::UNSUPPORTED_VALUE, message)
    }
}

/// Find the status entry for a parent ref, adding an empty entry if this
/// controller hasn't written one yet.
pub fn route_parent_status_mut<'a>(
    status: &'a mut RouteStatus,
    parent_ref: &ParentReference,
    controller_name: &str,
) -> &'a mut RouteParentStatus {
    let idx = status
        .parents
        .iter()
        .position(|p| &p.parent_ref == parent_ref && p.controller_name == controller_name);

    match idx {
        Some(idx) => &mut status.parents[idx],
        None => {
            status.parents.push(RouteParentStatus {
                parent_ref: parent_ref.clone(),
                controller_name: controller_name.to_string(),
                conditions: vec![],
            });
            let last = status.parents.len() - 1;
            &mut status.parents[last]
        }
    }
}

/// A reason a policy target could not be resolved.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct PolicyResolveError {
    pub reason: &'static str,
    pub message: String,
}

impl PolicyResolveError {
    pub fn new(reason: &'static str, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

/// Writes conditions onto a policy's ancestor status list.
pub(crate) struct AncestorStatusWriter<'a> {
    pub(crate) controller_name: &'a str,
    pub(crate) generation: Option<i64>,
    pub(crate) now: &'a Time,
}

impl AncestorStatusWriter<'_> {
    pub(crate) fn set(
        &self,
        status: &mut PolicyStatus,
        ancestor: &ParentReference,
        type_: &str,
        value: bool,
        reason: &str,
        message: impl Into<String>,
    ) {
        let condition = new_condition(type_, value, reason, message, self.generation, self.now);
        let entry = policy_ancestor_mut(status, ancestor, self.controller_name);
        set_condition(&mut entry.conditions, condition);
    }

    pub(crate) fn set_all(
        &self,
        status: &mut PolicyStatus,
        ancestors: &[ParentReference],
        type_: &str,
        value: bool,
        reason: &str,
        message: &str,
    ) {
        for ancestor in ancestors {
            self.set(status, ancestor, type_, value, reason, message);
        }
    }

    pub(crate) fn resolve_error(
        &self,
        status: &mut PolicyStatus,
        ancestors: &[ParentReference],
        err: &PolicyResolveError,
    ) {
        self.set_all(status, ancestors, types::ACCEPTED, false, err.reason, &err.message);
    }

    pub(crate) fn translation_error(
        &self,
        status: &mut PolicyStatus,
        ancestors: &[ParentReference],
        message: &str,
    ) {
        self.set_all(status, ancestors, types::ACCEPTED, false, reasons::INVALID, message);
    }

    /// Mark every ancestor Accepted unless it already has an Accepted
    /// condition from this controller.
    pub(crate) fn accept(&self, status: &mut PolicyStatus, ancestors: &[ParentReference]) {
        for ancestor in ancestors {
            let already_set = status.ancestors.iter().any(|a| {
                a.controller_name == self.controller_name
                    && &a.ancestor_ref == ancestor
                    && find_condition(&a.conditions, types::ACCEPTED).is_some()
            });
            if !already_set {
                self.set(
                    status,
                    ancestor,
                    types::ACCEPTED,
                    true,
                    reasons::ACCEPTED,
                    "Policy has been accepted.",
                );
            }
        }
    }

    /// Trim the ancestor list down to [MAX_POLICY_ANCESTORS] entries.
    ///
    /// Ancestors that are not Accepted are kept first, then Overridden ones,
    /// then the rest. The last kept ancestor gets an Aggregated condition
    /// naming everything that was dropped.
    pub(crate) fn truncate(&self, status: &mut PolicyStatus) {
        if status.ancestors.len() <= MAX_POLICY_ANCESTORS {
            return;
        }

        status.ancestors.sort_by(|a, b| {
            ancestor_rank(a)
                .cmp(&ancestor_rank(b))
                .then_with(|| a.ancestor_ref.name.cmp(&b.ancestor_ref.name))
        });

        let dropped: Vec<_> = status.ancestors[MAX_POLICY_ANCESTORS..]
            .iter()
            .map(|a| a.ancestor_ref.name.as_str())
            .collect();
        let message = format!(
            "Ancestors have been aggregated because the number of policy ancestors exceeds {MAX_POLICY_ANCESTORS}. The aggregated ancestors: {}",
            dropped.join(", ")
        );

        status.ancestors.truncate(MAX_POLICY_ANCESTORS);
        let last = status.ancestors[MAX_POLICY_ANCESTORS - 1].ancestor_ref.clone();
        self.set(
            status,
            &last,
            types::AGGREGATED,
            true,
            reasons::AGGREGATED,
            message,
        );
    }
}

fn ancestor_rank(ancestor: &PolicyAncestorStatus) -> u8 {
    if has_condition(&ancestor.conditions, types::ACCEPTED, false) {
        0
    } else if has_condition(&ancestor.conditions, types::OVERRIDDEN, true) {
        1
    } else {
        2
    }
}

/// Find the status entry for an ancestor, adding an empty entry if needed.
pub fn policy_ancestor_mut<'a>(
    status: &'a mut PolicyStatus,
    ancestor: &ParentReference,
    controller_name: &str,
) -> &'a mut PolicyAncestorStatus {
    let idx = status
        .ancestors
        .iter()
        .position(|a| &a.ancestor_ref == ancestor && a.controller_name == controller_name);

    match idx {
        Some(idx) => &mut status.ancestors[idx],
        None => {
            status.ancestors.push(PolicyAncestorStatus {
                ancestor_ref: ancestor.clone(),
                controller_name: controller_name.to_string(),
                conditions: vec![],
            });
            let last = status.ancestors.len() - 1;
            &mut status.ancestors[last]
        }
    }
}
