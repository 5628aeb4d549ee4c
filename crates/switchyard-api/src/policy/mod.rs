//! Policy resources.
//!
//! Policies attach to Gateways, Gateway Listeners (through a section name) or
//! Routes with target refs, and change the behavior of the traffic flowing
//! through their target. Every policy kind reports status per ancestor: the
//! Gateway (and optionally Listener) that the target belongs to.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorContext};
use crate::shared::ParentReference;

pub mod backend_traffic;
pub mod client_traffic;
pub mod extension;
pub mod patch;
pub mod security;

/// Identifies a target object in the policy's namespace.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LocalPolicyTargetReference {
    pub group: String,
    pub kind: String,
    pub name: String,
}

/// Identifies a target object in the policy's namespace, optionally narrowed
/// to one section of it (a Gateway Listener).
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LocalPolicyTargetReferenceWithSectionName {
    pub group: String,
    pub kind: String,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,
}

/// The targets of a policy. Policies may set a single `targetRef`, a list of
/// `targetRefs` or both.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PolicyTargetReferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_ref: Option<LocalPolicyTargetReferenceWithSectionName>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_refs: Vec<LocalPolicyTargetReferenceWithSectionName>,
}

impl PolicyTargetReferences {
    /// Every target ref, singular first.
    pub fn all(&self) -> impl Iterator<Item = &LocalPolicyTargetReferenceWithSectionName> {
        self.target_ref.iter().chain(self.target_refs.iter())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PolicyStatus {
    #[serde(default)]
    pub ancestors: Vec<PolicyAncestorStatus>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PolicyAncestorStatus {
    pub ancestor_ref: ParentReference,

    pub controller_name: String,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Keepalive settings for TCP connections, shared by client and backend
/// traffic policies.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TcpKeepalive {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probes: Option<u32>,

    /// A Gateway API duration string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_time: Option<String>,

    /// A Gateway API duration string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
}

/// Read the target refs from a policy that only exists as an untyped
/// document, for example one owned by an extension server.
///
/// Both `spec.targetRef` and `spec.targetRefs` are read. Every ref must have a
/// group, kind and name.
pub fn unstructured_target_refs(
    policy: &serde_json::Value,
) -> Result<Vec<LocalPolicyTargetReferenceWithSectionName>, Error> {
    let spec = match policy.get("spec") {
        Some(serde_json::Value::Object(spec)) => spec,
        Some(_) => return Err(Error::wrong_type("spec", "an object")),
        None => return Err(Error::missing_field("spec")),
    };

    let mut refs = Vec::new();

    if let Some(target_ref) = spec.get("targetRef") {
        refs.push(read_target_ref(target_ref).with_fields("spec", "targetRef")?);
    }

    match spec.get("targetRefs") {
        Some(serde_json::Value::Array(target_refs)) => {
            for (i, target_ref) in target_refs.iter().enumerate() {
                refs.push(
                    read_target_ref(target_ref)
                        .with_field_index("targetRefs", i)
                        .with_field("spec")?,
                );
            }
        }
        Some(_) => {
            return Err(Error::wrong_type("targetRefs", "a list").with_field("spec"));
        }
        None => (),
    }

    if refs.is_empty() {
        return Err(Error::new("no targets found for the policy"));
    }

    Ok(refs)
}

fn read_target_ref(
    value: &serde_json::Value,
) -> Result<LocalPolicyTargetReferenceWithSectionName, Error> {
    let serde_json::Value::Object(obj) = value else {
        return Err(Error::new("invalid targetRef found: expected an object"));
    };

    let string_field = |name: &'static str| -> Result<String, Error> {
        match obj.get(name) {
            Some(serde_json::Value::String(s)) => Ok(s.clone()),
            Some(_) => Err(Error::wrong_type(name, "a string")),
            None => Err(Error::missing_field(name)),
        }
    };

    let section_name = match obj.get("sectionName") {
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(_) => return Err(Error::wrong_type("sectionName", "a string")),
        None => None,
    };

    Ok(LocalPolicyTargetReferenceWithSectionName {
        group: string_field("group")?,
        kind: string_field("kind")?,
        name: string_field("name")?,
        section_name,
    })
}
