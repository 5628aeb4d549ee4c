//! The proxy configuration IR.
//!
//! One [Xds] value is produced per Gateway (or per GatewayClass when Gateways
//! are merged). It holds the listeners the proxy should open, the routes on
//! each of them and the destinations those routes send traffic to, with every
//! attached policy already folded in.

use std::collections::BTreeMap;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use switchyard_api::policy::client_traffic::{
    PathEscapedSlashAction, TlsVersion, WithUnderscoresAction,
};
use switchyard_api::policy::patch::JsonPatchOperationType;
use switchyard_api::policy::security::AuthorizationAction;
use switchyard_api::Duration;

use super::IrError;

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Xds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_log: Option<AccessLog>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracing: Option<Tracing>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Metrics>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub http: Vec<HttpListener>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tcp: Vec<TcpListener>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub udp: Vec<UdpListener>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub envoy_patch_policies: Vec<EnvoyPatchPolicy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_resources: Option<GlobalResources>,

    /// Extension server policies attached to this Gateway, as they were read.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension_server_policies: Vec<serde_json::Value>,
}

impl Xds {
    /// Check every IR invariant. Returns every violation found, not just the
    /// first.
    pub fn validate(&self) -> Result<(), Vec<IrError>> {
        let mut errs = Vec::new();

        for listener in &self.http {
            listener.validate(&mut errs);
        }
        for listener in &self.tcp {
            listener.validate(&mut errs);
        }
        for listener in &self.udp {
            listener.validate(&mut errs);
        }
        if let Some(metrics) = &self.metrics {
            metrics.validate(&mut errs);
        }
        for policy in &self.envoy_patch_policies {
            if policy.name.is_empty() {
                errs.push(IrError::MissingName);
            }
        }

        if errs.is_empty() {
            Ok(())
        } else {
            Err(errs)
        }
    }

    pub fn http_listener_mut(&mut self, name: &str) -> Option<&mut HttpListener> {
        self.http.iter_mut().find(|l| l.name == name)
    }

    pub fn tcp_listener_mut(&mut self, name: &str) -> Option<&mut TcpListener> {
        self.tcp.iter_mut().find(|l| l.name == name)
    }

    pub fn udp_listener_mut(&mut self, name: &str) -> Option<&mut UdpListener> {
        self.udp.iter_mut().find(|l| l.name == name)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccessLog {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub text: Vec<TextAccessLog>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub json: Vec<JsonAccessLog>,
}

impl AccessLog {
    /// Plain text access logs to stdout.
    pub fn stdout() -> Self {
        Self {
            text: vec![TextAccessLog {
                format: None,
                path: "/dev/stdout".to_string(),
            }],
            json: vec![],
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TextAccessLog {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    pub path: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JsonAccessLog {
    pub json: BTreeMap<String, String>,
    pub path: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tracing {
    pub service_name: String,
    pub host: String,
    pub port: u32,
    pub sampling_rate: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub enable_virtual_host_stats: bool,
    pub enable_per_endpoint_stats: bool,
}

impl Metrics {
    fn validate(&self, _errs: &mut Vec<IrError>) {}
}

/// Resources shared by every listener of a Gateway.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GlobalResources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_service_cluster: Option<RouteDestination>,
}

/// An opaque object owned by an extension, passed through to the code
/// generator untouched.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UnstructuredRef {
    pub object: serde_json::Value,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpListener {
    /// `<gateway namespace>/<gateway name>/<listener name>`.
    pub name: String,

    pub address: String,

    /// The port the proxy binds. May differ from the Gateway's listener port.
    pub port: u32,

    /// The port clients connect to, as written on the Gateway.
    pub external_port: u32,

    pub hostnames: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,

    #[serde(default)]
    pub is_http2: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<HttpRoute>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp_keepalive: Option<TcpKeepalive>,

    #[serde(default)]
    pub enable_proxy_protocol: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ip_detection: Option<ClientIpDetection>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HeaderSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<ClientTimeout>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<ClientConnection>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http1: Option<Http1Settings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http2: Option<Http2Settings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheckSettings>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension_refs: Vec<UnstructuredRef>,
}

impl HttpListener {
    fn validate(&self, errs: &mut Vec<IrError>) {
        validate_listener_core(&self.name, &self.address, self.port, errs);
        if self.hostnames.is_empty() {
            errs.push(IrError::MissingHostnames);
        }
        if let Some(tls) = &self.tls {
            tls.validate(errs);
        }
        for route in &self.routes {
            route.validate(errs);
        }
    }
}

fn validate_listener_core(name: &str, address: &str, port: u32, errs: &mut Vec<IrError>) {
    if name.is_empty() {
        errs.push(IrError::MissingName);
    }
    if address.parse::<IpAddr>().is_err() {
        errs.push(IrError::InvalidAddress(address.to_string()));
    }
    if port == 0 {
        errs.push(IrError::InvalidPort);
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TlsConfig {
    pub certificates: Vec<TlsCertificate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_certificate: Option<TlsCaCertificate>,

    #[serde(default)]
    pub require_client_certificate: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_version: Option<TlsVersion>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_version: Option<TlsVersion>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ciphers: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alpn_protocols: Vec<String>,
}

impl TlsConfig {
    fn validate(&self, errs: &mut Vec<IrError>) {
        for cert in &self.certificates {
            if cert.name.is_empty() {
                errs.push(IrError::MissingName);
            }
            if cert.certificate.is_empty() {
                errs.push(IrError::MissingCertificate(cert.name.clone()));
            }
            if cert.private_key.is_empty() {
                errs.push(IrError::MissingPrivateKey(cert.name.clone()));
            }
        }
    }
}

/// A certificate and private key, PEM encoded.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TlsCertificate {
    pub name: String,
    pub certificate: String,
    pub private_key: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TlsCaCertificate {
    pub name: String,
    pub certificate: String,
}

/// How a match value is compared.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MatchType {
    Exact,
    Prefix,
    Suffix,
    SafeRegex,
}

/// A string matcher on a path, a header or a query parameter. Header and
/// query parameter matchers are named.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StringMatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(rename = "type")]
    pub match_type: MatchType,

    pub value: String,
}

impl StringMatch {
    pub fn exact(value: impl Into<String>) -> Self {
        Self {
            name: None,
            match_type: MatchType::Exact,
            value: value.into(),
        }
    }

    pub fn prefix(value: impl Into<String>) -> Self {
        Self {
            name: None,
            match_type: MatchType::Prefix,
            value: value.into(),
        }
    }

    pub fn suffix(value: impl Into<String>) -> Self {
        Self {
            name: None,
            match_type: MatchType::Suffix,
            value: value.into(),
        }
    }

    pub fn regex(value: impl Into<String>) -> Self {
        Self {
            name: None,
            match_type: MatchType::SafeRegex,
            value: value.into(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpRoute {
    pub name: String,

    pub hostname: String,

    #[serde(default)]
    pub is_http2: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_match: Option<StringMatch>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub header_matches: Vec<StringMatch>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub query_param_matches: Vec<StringMatch>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add_request_headers: Vec<AddHeader>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove_request_headers: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add_response_headers: Vec<AddHeader>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove_response_headers: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct_response: Option<DirectResponse>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<Redirect>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mirrors: Vec<MirrorPolicy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<RouteDestination>,

    #[serde(default, skip_serializing_if = "BackendWeights::is_empty")]
    pub backend_weights: BackendWeights,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_rewrite: Option<UrlRewrite>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension_refs: Vec<UnstructuredRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<RouteTimeout>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic: Option<TrafficFeatures>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<SecurityFeatures>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub envoy_extensions: Option<EnvoyExtensionFeatures>,
}

impl HttpRoute {
    fn validate(&self, errs: &mut Vec<IrError>) {
        if self.name.is_empty() {
            errs.push(IrError::MissingName);
        }
        if self.hostname.is_empty() {
            errs.push(IrError::MissingRouteHostname(self.name.clone()));
        }
        if let Some(StringMatch {
            match_type: MatchType::SafeRegex,
            value,
            ..
        }) = &self.path_match
        {
            if regex::Regex::new(value).is_err() {
                errs.push(IrError::InvalidRegex(value.clone()));
            }
        }
        for m in self.header_matches.iter().chain(&self.query_param_matches) {
            if m.name.as_deref().unwrap_or_default().is_empty() {
                errs.push(IrError::MissingMatchName(self.name.clone()));
            }
        }
        if self.destination.is_none() && self.direct_response.is_none() && self.redirect.is_none()
        {
            errs.push(IrError::MissingAction(self.name.clone()));
        }
        if let Some(destination) = &self.destination {
            destination.validate(errs);
        }
        for mirror in &self.mirrors {
            mirror.destination.validate(errs);
        }
    }

    /// Replace whatever this route would do with a direct response.
    pub fn fail_with(&mut self, status_code: u32) {
        self.direct_response = Some(DirectResponse {
            status_code,
            body: None,
        });
    }
}

/// How a rule's backend weight splits between backends that resolved and
/// backends that didn't. Traffic for invalid backends gets a 500.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BackendWeights {
    pub valid: u32,
    pub invalid: u32,
}

impl BackendWeights {
    fn is_empty(&self) -> bool {
        self.valid == 0 && self.invalid == 0
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AddHeader {
    pub name: String,
    pub value: String,

    /// Append to existing values instead of replacing them.
    pub append: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DirectResponse {
    pub status_code: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Redirect {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathModifier>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u32>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PathModifier {
    FullReplace(String),
    PrefixMatchReplace(String),
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UrlRewrite {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathModifier>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MirrorPolicy {
    pub destination: RouteDestination,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RouteTimeout {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<Duration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_request: Option<Duration>,
}

/// Where a route sends traffic: a set of weighted backends.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteDestination {
    pub name: String,
    pub settings: Vec<DestinationSetting>,
}

impl RouteDestination {
    fn validate(&self, errs: &mut Vec<IrError>) {
        if self.name.is_empty() {
            errs.push(IrError::MissingName);
        }
        for setting in &self.settings {
            for endpoint in &setting.endpoints {
                if endpoint.host.is_empty() {
                    errs.push(IrError::MissingEndpointHost(self.name.clone()));
                }
                if endpoint.port == 0 {
                    errs.push(IrError::InvalidPort);
                }
            }
        }
    }

    /// The sum of all setting weights.
    pub fn total_weight(&self) -> u32 {
        self.settings.iter().map(|s| s.weight).sum()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DestinationSetting {
    pub name: String,

    pub weight: u32,

    pub protocol: AppProtocol,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<DestinationEndpoint>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_type: Option<DestinationAddressType>,
}

#[allow(clippy::upper_case_acronyms)]
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AppProtocol {
    #[default]
    HTTP,
    HTTP2,
    GRPC,
    TCP,
    UDP,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DestinationEndpoint {
    pub host: String,
    pub port: u32,

    #[serde(default)]
    pub draining: bool,
}

#[allow(clippy::upper_case_acronyms)]
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DestinationAddressType {
    IP,
    FQDN,
    Mixed,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TcpListener {
    pub name: String,
    pub address: String,
    pub port: u32,
    pub external_port: u32,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<TcpRoute>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp_keepalive: Option<TcpKeepalive>,

    #[serde(default)]
    pub enable_proxy_protocol: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<ClientTimeout>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<ClientConnection>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension_refs: Vec<UnstructuredRef>,
}

impl TcpListener {
    fn validate(&self, errs: &mut Vec<IrError>) {
        validate_listener_core(&self.name, &self.address, self.port, errs);
        for route in &self.routes {
            if route.name.is_empty() {
                errs.push(IrError::MissingName);
            }
            if let Some(tls) = route.tls.as_ref().and_then(|t| t.terminate.as_ref()) {
                tls.validate(errs);
            }
            if let Some(destination) = &route.destination {
                destination.validate(errs);
            }
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TcpRoute {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsRouteConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<RouteDestination>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic: Option<TrafficFeatures>,
}

/// TLS handling for a TCP route. Routes with an inspector only accept
/// connections with a matching SNI. Terminating routes decrypt with the
/// listener's certificates, passthrough routes don't.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TlsRouteConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inspector: Option<TlsInspectorConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminate: Option<TlsConfig>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TlsInspectorConfig {
    pub snis: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UdpListener {
    pub name: String,
    pub address: String,
    pub port: u32,
    pub external_port: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<UdpRoute>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension_refs: Vec<UnstructuredRef>,
}

impl UdpListener {
    fn validate(&self, errs: &mut Vec<IrError>) {
        validate_listener_core(&self.name, &self.address, self.port, errs);
        if let Some(route) = &self.route {
            if route.name.is_empty() {
                errs.push(IrError::MissingName);
            }
            if let Some(destination) = &route.destination {
                destination.validate(errs);
            }
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UdpRoute {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<RouteDestination>,
}

// client traffic settings

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TcpKeepalive {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probes: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_time: Option<Duration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<Duration>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClientIpDetection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xff_num_trusted_hops: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_header: Option<String>,

    #[serde(default)]
    pub custom_header_fail_closed: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PathSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escaped_slashes_action: Option<PathEscapedSlashAction>,

    #[serde(default)]
    pub merge_slashes: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HeaderSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with_underscores_action: Option<WithUnderscoresAction>,

    #[serde(default)]
    pub preserve_x_request_id: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub early_add_request_headers: Vec<AddHeader>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub early_remove_request_headers: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClientTimeout {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp_idle_timeout: Option<Duration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_request_received_timeout: Option<Duration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_idle_timeout: Option<Duration>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClientConnection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_limit: Option<ConnectionLimit>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_limit_bytes: Option<u64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionLimit {
    pub value: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close_delay: Option<Duration>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Http1Settings {
    #[serde(default)]
    pub enable_trailers: bool,

    #[serde(default)]
    pub preserve_header_case: bool,

    #[serde(default)]
    pub http10: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_host: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Http2Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_stream_window_size: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_connection_window_size: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_streams: Option<u32>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckSettings {
    pub path: String,
}

// backend traffic features

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrafficFeatures {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<LocalRateLimit>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer: Option<LoadBalancer>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_protocol: Option<ProxyProtocolVersion>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheck>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault_injection: Option<FaultInjection>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circuit_breaker: Option<CircuitBreaker>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp_keepalive: Option<TcpKeepalive>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<Retry>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<BackendTimeout>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum LoadBalancer {
    RoundRobin { slow_start: Option<Duration> },
    LeastRequest { slow_start: Option<Duration> },
    Random,
    ConsistentHash(ConsistentHash),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ConsistentHash {
    SourceIp,
    Header { name: String },
    Cookie { name: String, ttl: Option<Duration> },
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProxyProtocolVersion {
    V1,
    V2,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passive: Option<OutlierDetection>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<ActiveHealthCheck>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OutlierDetection {
    #[serde(default)]
    pub split_external_local_origin_errors: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<Duration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consecutive_local_origin_failures: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consecutive_gateway_errors: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consecutive_5xx_errors: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_ejection_time: Option<Duration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_ejection_percent: Option<u32>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveHealthCheck {
    pub timeout: Duration,
    pub interval: Duration,
    pub unhealthy_threshold: u32,
    pub healthy_threshold: u32,

    /// Set for HTTP checks. TCP checks only test connectivity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpHealthChecker>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HttpHealthChecker {
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    pub expected_statuses: Vec<u32>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FaultInjection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<FaultDelay>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort: Option<FaultAbort>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FaultDelay {
    pub fixed_delay: Duration,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f32>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FaultAbort {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grpc_status: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f32>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreaker {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pending_requests: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallel_requests: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallel_retries: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_requests_per_connection: Option<u32>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Retry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_retries: Option<u32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub http_status_codes: Vec<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_retry_timeout: Option<Duration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_interval: Option<Duration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_interval: Option<Duration>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BackendTimeout {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp_connect_timeout: Option<Duration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_connection_idle_timeout: Option<Duration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_max_connection_duration: Option<Duration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_request_timeout: Option<Duration>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LocalRateLimit {
    pub rules: Vec<RateLimitRule>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitRule {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub header_matches: Vec<StringMatch>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_cidr: Option<String>,

    pub requests: u32,

    /// The length of the rate limit window.
    pub unit: Duration,
}

// security features

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecurityFeatures {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cors: Option<Cors>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_auth: Option<BasicAuth>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_auth: Option<ApiKeyAuth>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt: Option<Jwt>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization: Option<Authorization>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Cors {
    pub allow_origins: Vec<StringMatch>,
    pub allow_methods: Vec<String>,
    pub allow_headers: Vec<String>,
    pub expose_headers: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age: Option<Duration>,

    #[serde(default)]
    pub allow_credentials: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BasicAuth {
    pub name: String,

    /// The htpasswd file contents.
    pub users: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyAuth {
    /// Client id to key.
    pub credentials: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extract_from_headers: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extract_from_params: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Jwt {
    #[serde(default)]
    pub allow_missing: bool,

    pub providers: Vec<JwtProvider>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JwtProvider {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audiences: Vec<String>,

    pub remote_jwks_uri: String,

    /// Header name to claim name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub claim_to_headers: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Authorization {
    pub default_action: AuthorizationAction,
    pub rules: Vec<AuthorizationRule>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationRule {
    pub name: String,
    pub action: AuthorizationAction,
    pub client_cidrs: Vec<CidrMatch>,
}

/// A parsed CIDR block.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CidrMatch {
    pub cidr: String,
    pub ip: IpAddr,
    pub mask_len: u8,
    pub is_ipv6: bool,
}

// extensions

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvoyExtensionFeatures {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ext_procs: Vec<ExtProc>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub luas: Vec<Lua>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wasms: Vec<Wasm>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExtProc {
    pub name: String,
    pub destination: RouteDestination,

    #[serde(default)]
    pub fail_open: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_timeout: Option<Duration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body_mode: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body_mode: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Lua {
    pub name: String,
    pub code: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Wasm {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wasm_name: Option<String>,

    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,

    #[serde(default)]
    pub fail_open: bool,
}

// patches

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvoyPatchPolicy {
    pub name: String,
    pub namespace: String,
    pub priority: i32,
    pub json_patches: Vec<JsonPatchConfig>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JsonPatchConfig {
    pub type_url: String,
    pub name: String,
    pub op: JsonPatchOperationType,
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}
