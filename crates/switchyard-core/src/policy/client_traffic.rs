//! ClientTrafficPolicy translation.
//!
//! ClientTrafficPolicies configure the downstream side of a Listener, so they
//! only ever target Gateways. Settings are written onto the HTTP or TCP
//! listener IR of every Listener the policy covers.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::ResourceExt;
use switchyard_api::policy::client_traffic::{
    ClientConnection, ClientIpDetection, ClientTimeout, ClientTlsSettings, ClientTrafficPolicy,
    HeaderSettings, HealthCheckSettings, Http1Settings, Http2Settings, PathSettings, TlsVersion,
};

use super::{optional_duration, process_policies, tcp_keepalive, PolicyTarget, TranslationError};
use crate::ir;
use crate::refs::{resolve_ca_certificate, Referrer};
use crate::resources::Resources;
use crate::route::http::header_modifier;
use crate::tls::CA_CERT_KEY;
use crate::translator::TranslateContext;

const MIN_HTTP2_WINDOW_SIZE: i64 = 65_535;
const MAX_HTTP2_WINDOW_SIZE: i64 = 2_147_483_647;

pub(crate) fn process_client_traffic_policies(cx: &mut TranslateContext) {
    let resources = cx.resources;
    process_policies(cx, &resources.client_traffic_policies, translate_policy);
}

fn translate_policy(
    cx: &mut TranslateContext,
    policy: &ClientTrafficPolicy,
    target: &PolicyTarget,
) -> Result<(), TranslationError> {
    let PolicyTarget::Gateway {
        gateway_idx,
        listener_idxs,
        section,
    } = target
    else {
        return Ok(());
    };

    let mut errors: Vec<TranslationError> = vec![];
    for &idx in listener_idxs {
        let listener = &cx.gateways[*gateway_idx].listeners[idx];
        if !listener.ready {
            continue;
        }
        let ir_name = listener.ir_name.clone();

        if let Err(e) = translate_listener(cx, policy, *gateway_idx, &ir_name, section.is_some()) {
            if !errors.contains(&e) {
                errors.push(e);
            }
        }
    }

    TranslationError::collect(errors)
}

fn translate_listener(
    cx: &mut TranslateContext,
    policy: &ClientTrafficPolicy,
    gateway_idx: usize,
    ir_name: &str,
    section_target: bool,
) -> Result<(), TranslationError> {
    let resources = cx.resources;
    let ir_key = &cx.gateways[gateway_idx].ir_key;
    let Some(xds) = cx.xds.get_mut(ir_key) else {
        return Ok(());
    };

    check_port_overlap(xds, ir_name, section_target)?;

    let spec = &policy.spec;
    let mut errors = vec![];

    let keepalive = field(&mut errors, "TCPKeepalive", spec.tcp_keepalive.as_ref().map(tcp_keepalive));
    let connection = field(&mut errors, "Connection", spec.connection.as_ref().map(connection));
    let timeout = field(&mut errors, "Timeout", spec.timeout.as_ref().map(client_timeout));
    let enable_proxy_protocol = spec.enable_proxy_protocol.unwrap_or(false);

    if let Some(http) = xds.http.iter_mut().find(|l| l.name == ir_name) {
        let client_ip_detection = field(
            &mut errors,
            "ClientIPDetection",
            spec.client_ip_detection.as_ref().map(client_ip_detection),
        );
        let headers = field(&mut errors, "Headers", spec.headers.as_ref().map(header_settings));
        let http1 = field(&mut errors, "HTTP1", spec.http1.as_ref().map(|h| http1_settings(h, http)));
        let http2 = field(&mut errors, "HTTP2", spec.http2.as_ref().map(http2_settings));
        let health_check = field(
            &mut errors,
            "HealthCheck",
            spec.health_check.as_ref().map(health_check_settings),
        );
        let tls = match tls_config(resources, policy, spec.tls.as_ref(), http.tls.as_ref()) {
            Ok(tls) => tls,
            Err(e) => {
                errors.push(e.with_field("TLS"));
                None
            }
        };

        if !errors.is_empty() {
            for route in &mut http.routes {
                route.fail_with(500);
            }
            return TranslationError::collect(errors);
        }

        http.tcp_keepalive = keepalive;
        http.connection = connection;
        http.timeout = timeout;
        http.enable_proxy_protocol = enable_proxy_protocol;
        http.client_ip_detection = client_ip_detection;
        http.headers = headers;
        http.path = spec.path.as_ref().map(path_settings);
        http.http1 = http1;
        http.http2 = http2;
        http.health_check = health_check;
        http.tls = tls;
        return Ok(());
    }

    if let Some(tcp) = xds.tcp.iter_mut().find(|l| l.name == ir_name) {
        if !errors.is_empty() {
            // the listener stays up, but has nowhere to send traffic
            tcp.routes.clear();
            return TranslationError::collect(errors);
        }

        tcp.tcp_keepalive = keepalive;
        tcp.connection = connection;
        tcp.timeout = timeout;
        tcp.enable_proxy_protocol = enable_proxy_protocol;
    }

    Ok(())
}

/// Record an error for a field and keep going.
fn field<T>(
    errors: &mut Vec<TranslationError>,
    name: &str,
    result: Option<Result<T, TranslationError>>,
) -> Option<T> {
    match result {
        Some(Ok(v)) => Some(v),
        Some(Err(e)) => {
            errors.push(e.with_field(name));
            None
        }
        None => None,
    }
}

/// Plain HTTP listeners that share a port share a filter chain on the
/// proxy, so a policy can't apply to one of them without applying to all of
/// them. A policy on a whole Gateway may cover several of them as long as
/// they all belong to that Gateway.
fn check_port_overlap(
    xds: &ir::Xds,
    ir_name: &str,
    section_target: bool,
) -> Result<(), TranslationError> {
    let Some(listener) = xds.http.iter().find(|l| l.name == ir_name) else {
        return Ok(());
    };
    if listener.tls.is_some() {
        return Ok(());
    }

    let gateway_prefix = match ir_name.rfind('/') {
        Some(idx) => &ir_name[..=idx],
        None => "",
    };
    let conflicting: Vec<&str> = xds
        .http
        .iter()
        .filter(|l| l.name != ir_name && l.tls.is_none() && l.port == listener.port)
        .filter(|l| section_target || !l.name.starts_with(gateway_prefix))
        .map(|l| l.name.as_str())
        .collect();

    if conflicting.is_empty() {
        return Ok(());
    }
    Err(TranslationError::invalid(format!(
        "ClientTrafficPolicy is being applied to multiple http (non https) listeners ({}) on the same port, which is not allowed",
        conflicting.join(", ")
    )))
}

fn connection(connection: &ClientConnection) -> Result<ir::ClientConnection, TranslationError> {
    let connection_limit = match &connection.connection_limit {
        Some(limit) => {
            let value = u64::try_from(limit.value).map_err(|_| {
                TranslationError::invalid(format!(
                    "connectionLimit value {} must not be negative",
                    limit.value
                ))
            })?;
            Some(ir::ConnectionLimit {
                value,
                close_delay: optional_duration("closeDelay", limit.close_delay.as_ref())?,
            })
        }
        None => None,
    };

    let buffer_limit_bytes = match &connection.buffer_limit {
        Some(q) => {
            let bytes = parse_quantity(q).ok_or_else(|| {
                TranslationError::invalid(format!("invalid BufferLimit value {}", q.0))
            })?;
            if !(0..=u32::MAX as i64).contains(&bytes) {
                return Err(TranslationError::invalid(format!(
                    "BufferLimit value {} is out of range, must be between 0 and {}",
                    q.0,
                    u32::MAX
                )));
            }
            Some(bytes as u64)
        }
        None => None,
    };

    Ok(ir::ClientConnection {
        connection_limit,
        buffer_limit_bytes,
    })
}

fn client_timeout(timeout: &ClientTimeout) -> Result<ir::ClientTimeout, TranslationError> {
    let tcp = timeout.tcp.as_ref();
    let http = timeout.http.as_ref();

    Ok(ir::ClientTimeout {
        tcp_idle_timeout: optional_duration(
            "tcp.idleTimeout",
            tcp.and_then(|t| t.idle_timeout.as_ref()),
        )?,
        http_request_received_timeout: optional_duration(
            "http.requestReceivedTimeout",
            http.and_then(|h| h.request_received_timeout.as_ref()),
        )?,
        http_idle_timeout: optional_duration(
            "http.idleTimeout",
            http.and_then(|h| h.idle_timeout.as_ref()),
        )?,
    })
}

fn client_ip_detection(
    detection: &ClientIpDetection,
) -> Result<ir::ClientIpDetection, TranslationError> {
    if detection.x_forwarded_for.is_some() && detection.custom_header.is_some() {
        return Err(TranslationError::invalid(
            "only one of xForwardedFor and customHeader may be set",
        ));
    }

    let custom_header = detection.custom_header.as_ref();
    Ok(ir::ClientIpDetection {
        xff_num_trusted_hops: detection
            .x_forwarded_for
            .as_ref()
            .and_then(|x| x.num_trusted_hops),
        custom_header: custom_header.map(|h| h.name.clone()),
        custom_header_fail_closed: custom_header.and_then(|h| h.fail_closed).unwrap_or(false),
    })
}

fn header_settings(headers: &HeaderSettings) -> Result<ir::HeaderSettings, TranslationError> {
    let (early_add_request_headers, early_remove_request_headers) =
        match &headers.early_request_headers {
            Some(filter) => {
                header_modifier("EarlyRequestHeaders", filter).map_err(TranslationError::Invalid)?
            }
            None => (vec![], vec![]),
        };

    Ok(ir::HeaderSettings {
        with_underscores_action: headers.with_underscores_action,
        preserve_x_request_id: headers.preserve_x_request_id.unwrap_or(false),
        early_add_request_headers,
        early_remove_request_headers,
    })
}

fn path_settings(path: &PathSettings) -> ir::PathSettings {
    ir::PathSettings {
        escaped_slashes_action: path.escaped_slashes_action,
        merge_slashes: !path.disable_merge_slashes.unwrap_or(false),
    }
}

/// HTTP/1 settings. An HTTP/1.0 default host comes from the first
/// non-wildcard Listener hostname, or failing that from the only Route on
/// the Listener with a non-wildcard hostname.
fn http1_settings(
    http1: &Http1Settings,
    listener: &ir::HttpListener,
) -> Result<ir::Http1Settings, TranslationError> {
    let mut settings = ir::Http1Settings {
        enable_trailers: http1.enable_trailers.unwrap_or(false),
        preserve_header_case: http1.preserve_header_case.unwrap_or(false),
        http10: http1.http10.is_some(),
        default_host: None,
    };

    let use_default_host = http1
        .http10
        .as_ref()
        .and_then(|h| h.use_default_host)
        .unwrap_or(false);
    if !use_default_host {
        return Ok(settings);
    }

    let listener_host = listener.hostnames.iter().find(|h| !h.contains('*'));
    settings.default_host = match listener_host {
        Some(host) => Some(host.clone()),
        None => {
            let mut route_hosts = listener
                .routes
                .iter()
                .map(|r| r.hostname.as_str())
                .filter(|h| !h.is_empty() && !h.contains('*'));

            match (route_hosts.next(), route_hosts.next()) {
                (None, _) => {
                    return Err(TranslationError::invalid(
                        "cannot set http10 default host on listener with only wildcard hostnames",
                    ))
                }
                (Some(_), Some(_)) => {
                    return Err(TranslationError::invalid(
                        "cannot set http10 default host on listener with only wildcard hostnames and more than one possible default route",
                    ))
                }
                (Some(host), None) => Some(host.to_string()),
            }
        }
    };

    Ok(settings)
}

fn http2_settings(http2: &Http2Settings) -> Result<ir::Http2Settings, TranslationError> {
    fn window_size(name: &str, q: Option<&Quantity>) -> Result<Option<u32>, TranslationError> {
        let Some(q) = q else {
            return Ok(None);
        };
        let size = parse_quantity(q)
            .ok_or_else(|| TranslationError::invalid(format!("invalid {name} value {}", q.0)))?;
        if !(MIN_HTTP2_WINDOW_SIZE..=MAX_HTTP2_WINDOW_SIZE).contains(&size) {
            return Err(TranslationError::invalid(format!(
                "{name} value {} is out of range, must be between {MIN_HTTP2_WINDOW_SIZE} and {MAX_HTTP2_WINDOW_SIZE}",
                q.0
            )));
        }
        Ok(Some(size as u32))
    }

    let stream = window_size(
        "InitialStreamWindowSize",
        http2.initial_stream_window_size.as_ref(),
    );
    let connection = window_size(
        "InitialConnectionWindowSize",
        http2.initial_connection_window_size.as_ref(),
    );

    match (stream, connection) {
        (Ok(initial_stream_window_size), Ok(initial_connection_window_size)) => {
            Ok(ir::Http2Settings {
                initial_stream_window_size,
                initial_connection_window_size,
                max_concurrent_streams: http2.max_concurrent_streams,
            })
        }
        (stream, connection) => {
            let errors = [stream.err(), connection.err()].into_iter().flatten().collect();
            TranslationError::collect(errors).map(|_| ir::Http2Settings::default())
        }
    }
}

fn health_check_settings(
    health_check: &HealthCheckSettings,
) -> Result<ir::HealthCheckSettings, TranslationError> {
    if !health_check.path.starts_with('/') {
        return Err(TranslationError::invalid(format!(
            "path {:?} must start with /",
            health_check.path
        )));
    }
    Ok(ir::HealthCheckSettings {
        path: health_check.path.clone(),
    })
}

/// Apply TLS settings to a Listener that terminates TLS. Listeners without
/// TLS are left alone.
fn tls_config(
    resources: &Resources,
    policy: &ClientTrafficPolicy,
    settings: Option<&ClientTlsSettings>,
    current: Option<&ir::TlsConfig>,
) -> Result<Option<ir::TlsConfig>, TranslationError> {
    let (Some(settings), Some(current)) = (settings, current) else {
        return Ok(current.cloned());
    };

    if let (Some(min), Some(max)) = (settings.min_version, settings.max_version) {
        if min != TlsVersion::Auto && max != TlsVersion::Auto && min > max {
            return Err(TranslationError::invalid(
                "minVersion must be smaller or equal to maxVersion",
            ));
        }
    }

    let mut config = current.clone();
    config.min_version = settings.min_version;
    config.max_version = settings.max_version;
    config.ciphers = settings.ciphers.clone();
    config.alpn_protocols = settings.alpn_protocols.clone();

    if let Some(validation) = &settings.client_validation {
        let namespace = policy.namespace().unwrap_or_default();
        let from = Referrer {
            group: switchyard_api::ENVOY_GATEWAY_GROUP,
            kind: switchyard_api::KIND_CLIENT_TRAFFIC_POLICY,
            namespace: &namespace,
        };

        let mut bundle = String::new();
        for ca_ref in &validation.ca_certificate_refs {
            let pem = resolve_ca_certificate(resources, from, ca_ref)
                .map_err(TranslationError::Invalid)?;
            bundle.push_str(&pem);
            if !bundle.ends_with('\n') {
                bundle.push('\n');
            }
        }

        if !bundle.is_empty() {
            config.ca_certificate = Some(ir::TlsCaCertificate {
                name: format!("{namespace}/{}/{CA_CERT_KEY}", policy.name_any()),
                certificate: bundle,
            });
            config.require_client_certificate = !validation.optional;
        }
    }

    Ok(Some(config))
}

/// Parse a Kubernetes quantity into an integer. Fractional quantities and
/// quantities that overflow an i64 aren't supported.
fn parse_quantity(q: &Quantity) -> Option<i64> {
    const SUFFIXES: &[(&str, i64)] = &[
        ("Ki", 1 << 10),
        ("Mi", 1 << 20),
        ("Gi", 1 << 30),
        ("Ti", 1 << 40),
        ("Pi", 1 << 50),
        ("Ei", 1 << 60),
        ("k", 1_000),
        ("M", 1_000_000),
        ("G", 1_000_000_000),
        ("T", 1_000_000_000_000),
        ("P", 1_000_000_000_000_000),
        ("E", 1_000_000_000_000_000_000),
    ];

    let s = q.0.trim();
    let (digits, multiplier) = SUFFIXES
        .iter()
        .find_map(|(suffix, m)| s.strip_suffix(suffix).map(|d| (d, *m)))
        .unwrap_or((s, 1));

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<i64>().ok()?.checked_mul(multiplier)
}
