//! The intermediate representation produced by a translation.
//!
//! [Xds] describes the proxy configuration and [Infra] describes the proxy
//! deployment. Both are keyed by `<namespace>/<gateway name>`, or by the
//! GatewayClass name when Gateways are merged.

mod infra;
mod xds;

pub use infra::*;
pub use xds::*;

use std::collections::BTreeMap;

pub type XdsIrMap = BTreeMap<String, Xds>;
pub type InfraIrMap = BTreeMap<String, Infra>;

/// A violated IR invariant.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum IrError {
    #[error("field Name must be specified")]
    MissingName,

    #[error("field Address must be a valid IP address: {0}")]
    InvalidAddress(String),

    #[error("field Port specified is invalid")]
    InvalidPort,

    #[error("field Hostnames must be specified with at least a single hostname entry")]
    MissingHostnames,

    #[error("route {0}: field Hostname must be specified")]
    MissingRouteHostname(String),

    #[error("route {0}: field Name must be specified on header and query param matches")]
    MissingMatchName(String),

    #[error("route {0}: one of Destination, DirectResponse or Redirect must be specified")]
    MissingAction(String),

    #[error("destination {0}: endpoint host must be specified")]
    MissingEndpointHost(String),

    #[error("invalid regex: {0}")]
    InvalidRegex(String),

    #[error("certificate {0}: field Certificate must be specified")]
    MissingCertificate(String),

    #[error("certificate {0}: field PrivateKey must be specified")]
    MissingPrivateKey(String),

    #[error("listener {0}: at least one port must be specified")]
    MissingListenerPorts(String),
}
