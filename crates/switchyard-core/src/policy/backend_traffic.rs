//! BackendTrafficPolicy translation.
//!
//! A BackendTrafficPolicy sets the traffic features of the routes it
//! covers: load balancing, retries, timeouts, health checks and so on. A
//! policy on a Route always wins over a policy on its Gateway, so Gateway
//! policies only fill in routes that have no traffic features yet.

use switchyard_api::policy::backend_traffic::{
    ActiveHealthCheck, ActiveHealthCheckerType, BackendTrafficPolicySpec, CircuitBreaker,
    ConsistentHashType, FaultInjection, HealthCheck, LoadBalancer, LoadBalancerType,
    PassiveHealthCheck, ProxyProtocolVersion, RateLimitSpec, RateLimitType, RateLimitUnit, Retry,
    Timeout,
};
use switchyard_api::Duration;

use super::{
    duration, optional_duration, parse_cidr, process_policies, target_http_routes,
    target_tcp_routes, tcp_keepalive, PolicyTarget, TranslationError,
};
use crate::ir;
use crate::route::http::value_match;
use crate::translator::TranslateContext;

const DEFAULT_HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(3);
const DEFAULT_UNHEALTHY_THRESHOLD: u32 = 3;
const DEFAULT_HEALTHY_THRESHOLD: u32 = 1;

pub(crate) fn process_backend_traffic_policies(cx: &mut TranslateContext) {
    let resources = cx.resources;
    process_policies(cx, &resources.backend_traffic_policies, |cx, policy, target| {
        let features = traffic_features(&policy.spec)?;
        apply(cx, target, &features);
        Ok(())
    });
}

fn apply(cx: &mut TranslateContext, target: &PolicyTarget, features: &ir::TrafficFeatures) {
    let route_target = matches!(target, PolicyTarget::Route { .. });

    for route in target_http_routes(cx, target) {
        if route_target || route.traffic.is_none() {
            route.traffic = Some(features.clone());
        }
    }
    for route in target_tcp_routes(cx, target) {
        if route_target || route.traffic.is_none() {
            route.traffic = Some(features.clone());
        }
    }
}

/// Build every traffic feature a policy sets. Every invalid field is
/// reported, not just the first.
fn traffic_features(spec: &BackendTrafficPolicySpec) -> Result<ir::TrafficFeatures, TranslationError> {
    let mut features = ir::TrafficFeatures::default();
    let mut errors = vec![];

    macro_rules! build {
        ($field:ident, $name:literal, $build:expr) => {
            if let Some(value) = &spec.$field {
                match $build(value) {
                    Ok(v) => features.$field = Some(v),
                    Err(e) => errors.push(TranslationError::with_field(e, $name)),
                }
            }
        };
    }

    build!(rate_limit, "RateLimit", rate_limit);
    build!(load_balancer, "LoadBalancer", load_balancer);
    build!(health_check, "HealthCheck", health_check);
    build!(fault_injection, "FaultInjection", fault_injection);
    build!(circuit_breaker, "CircuitBreaker", circuit_breaker);
    build!(tcp_keepalive, "TCPKeepalive", tcp_keepalive);
    build!(retry, "Retry", retry);
    build!(timeout, "Timeout", timeout);

    if let Some(proxy_protocol) = &spec.proxy_protocol {
        features.proxy_protocol = Some(match proxy_protocol.version {
            ProxyProtocolVersion::V1 => ir::ProxyProtocolVersion::V1,
            ProxyProtocolVersion::V2 => ir::ProxyProtocolVersion::V2,
        });
    }

    TranslationError::collect(errors)?;
    Ok(features)
}

fn rate_limit(spec: &RateLimitSpec) -> Result<ir::LocalRateLimit, TranslationError> {
    if spec.type_ == RateLimitType::Global {
        return Err(TranslationError::invalid(
            "Global rate limiting is not supported, only Local rate limits can be configured",
        ));
    }
    let Some(local) = &spec.local else {
        return Err(TranslationError::invalid("local is required for Local rate limits"));
    };

    let mut rules = Vec::with_capacity(local.rules.len());
    for rule in &local.rules {
        let mut header_matches = vec![];
        let mut source_cidr = None;

        for selector in &rule.client_selectors {
            for header in &selector.headers {
                let Some(value) = &header.value else {
                    return Err(TranslationError::invalid(format!(
                        "header {} must have a value",
                        header.name
                    )));
                };
                let m = value_match(header.type_, &header.name, value)
                    .map_err(|e| TranslationError::invalid(e.message))?;
                header_matches.push(m);
            }

            if let Some(cidr) = &selector.source_cidr {
                if source_cidr.is_some() {
                    return Err(TranslationError::invalid(
                        "only one sourceCIDR may be set per rate limit rule",
                    ));
                }
                source_cidr = Some(parse_cidr(cidr)?.cidr);
            }
        }

        let unit = match rule.limit.unit {
            RateLimitUnit::Second => Duration::from_secs(1),
            RateLimitUnit::Minute => Duration::from_secs(60),
            RateLimitUnit::Hour => Duration::from_secs(60 * 60),
            RateLimitUnit::Day => Duration::from_secs(24 * 60 * 60),
        };

        rules.push(ir::RateLimitRule {
            header_matches,
            source_cidr,
            requests: rule.limit.requests,
            unit,
        });
    }

    Ok(ir::LocalRateLimit { rules })
}

fn load_balancer(lb: &LoadBalancer) -> Result<ir::LoadBalancer, TranslationError> {
    let slow_start = lb
        .slow_start
        .as_ref()
        .map(|s| duration("slowStart.window", &s.window))
        .transpose()?;

    let lb = match lb.type_ {
        LoadBalancerType::RoundRobin => ir::LoadBalancer::RoundRobin { slow_start },
        LoadBalancerType::LeastRequest => ir::LoadBalancer::LeastRequest { slow_start },
        LoadBalancerType::Random | LoadBalancerType::ConsistentHash if slow_start.is_some() => {
            return Err(TranslationError::invalid(
                "slowStart is only supported for RoundRobin and LeastRequest load balancers",
            ))
        }
        LoadBalancerType::Random => ir::LoadBalancer::Random,
        LoadBalancerType::ConsistentHash => {
            let Some(hash) = &lb.consistent_hash else {
                return Err(TranslationError::invalid(
                    "consistentHash is required for ConsistentHash load balancers",
                ));
            };

            let hash = match hash.type_ {
                ConsistentHashType::SourceIp => ir::ConsistentHash::SourceIp,
                ConsistentHashType::Header => match &hash.header {
                    Some(header) => ir::ConsistentHash::Header {
                        name: header.name.clone(),
                    },
                    None => {
                        return Err(TranslationError::invalid(
                            "header is required for Header consistent hashing",
                        ))
                    }
                },
                ConsistentHashType::Cookie => match &hash.cookie {
                    Some(cookie) => ir::ConsistentHash::Cookie {
                        name: cookie.name.clone(),
                        ttl: optional_duration("cookie.ttl", cookie.ttl.as_ref())?,
                    },
                    None => {
                        return Err(TranslationError::invalid(
                            "cookie is required for Cookie consistent hashing",
                        ))
                    }
                },
            };
            ir::LoadBalancer::ConsistentHash(hash)
        }
    };

    Ok(lb)
}

fn health_check(hc: &HealthCheck) -> Result<ir::HealthCheck, TranslationError> {
    Ok(ir::HealthCheck {
        passive: hc.passive.as_ref().map(outlier_detection).transpose()?,
        active: hc.active.as_ref().map(active_health_check).transpose()?,
    })
}

fn outlier_detection(passive: &PassiveHealthCheck) -> Result<ir::OutlierDetection, TranslationError> {
    let max_ejection_percent = match passive.max_ejection_percent {
        Some(p) => match u32::try_from(p) {
            Ok(p) if p <= 100 => Some(p),
            _ => {
                return Err(TranslationError::invalid(format!(
                    "maxEjectionPercent must be between 0 and 100, got {p}"
                )))
            }
        },
        None => None,
    };

    Ok(ir::OutlierDetection {
        split_external_local_origin_errors: passive
            .split_external_local_origin_errors
            .unwrap_or(false),
        interval: optional_duration("interval", passive.interval.as_ref())?,
        consecutive_local_origin_failures: passive.consecutive_local_origin_failures,
        consecutive_gateway_errors: passive.consecutive_gateway_errors,
        consecutive_5xx_errors: passive.consecutive_5xx_errors,
        base_ejection_time: optional_duration("baseEjectionTime", passive.base_ejection_time.as_ref())?,
        max_ejection_percent,
    })
}

fn active_health_check(active: &ActiveHealthCheck) -> Result<ir::ActiveHealthCheck, TranslationError> {
    let http = match (active.type_, &active.http) {
        (ActiveHealthCheckerType::HTTP, None) => {
            return Err(TranslationError::invalid("http is required for HTTP health checks"))
        }
        (ActiveHealthCheckerType::HTTP, Some(http)) => {
            if !http.path.starts_with('/') {
                return Err(TranslationError::invalid(format!(
                    "health check path {:?} must start with /",
                    http.path
                )));
            }

            let mut expected_statuses = Vec::with_capacity(http.expected_statuses.len());
            for &status in &http.expected_statuses {
                if !(100..=599).contains(&status) {
                    return Err(TranslationError::invalid(format!(
                        "expected status {status} is not a valid HTTP status code"
                    )));
                }
                expected_statuses.push(status as u32);
            }
            if expected_statuses.is_empty() {
                expected_statuses.push(200);
            }

            Some(ir::HttpHealthChecker {
                path: http.path.clone(),
                method: http.method.clone(),
                expected_statuses,
            })
        }
        (ActiveHealthCheckerType::TCP, _) => None,
    };

    Ok(ir::ActiveHealthCheck {
        timeout: optional_duration("timeout", active.timeout.as_ref())?
            .unwrap_or(DEFAULT_HEALTH_CHECK_TIMEOUT),
        interval: optional_duration("interval", active.interval.as_ref())?
            .unwrap_or(DEFAULT_HEALTH_CHECK_INTERVAL),
        unhealthy_threshold: active.unhealthy_threshold.unwrap_or(DEFAULT_UNHEALTHY_THRESHOLD),
        healthy_threshold: active.healthy_threshold.unwrap_or(DEFAULT_HEALTHY_THRESHOLD),
        http,
    })
}

fn fault_injection(fi: &FaultInjection) -> Result<ir::FaultInjection, TranslationError> {
    fn check_percentage(p: Option<f32>) -> Result<Option<f32>, TranslationError> {
        match p {
            Some(p) if !(0.0..=100.0).contains(&p) => Err(TranslationError::invalid(format!(
                "percentage must be between 0 and 100, got {p}"
            ))),
            p => Ok(p),
        }
    }

    let delay = match &fi.delay {
        Some(delay) => Some(ir::FaultDelay {
            fixed_delay: duration("delay.fixedDelay", &delay.fixed_delay)?,
            percentage: check_percentage(delay.percentage)?,
        }),
        None => None,
    };

    let abort = match &fi.abort {
        Some(abort) => {
            if abort.http_status.is_some() == abort.grpc_status.is_some() {
                return Err(TranslationError::invalid(
                    "exactly one of httpStatus and grpcStatus must be set for an abort",
                ));
            }
            let http_status = match abort.http_status {
                Some(status) => match u32::try_from(status) {
                    Ok(valid) if (200..600).contains(&valid) => Some(valid),
                    _ => {
                        return Err(TranslationError::invalid(format!(
                            "httpStatus {status} is not a valid HTTP status code"
                        )))
                    }
                },
                None => None,
            };
            let grpc_status = match abort.grpc_status {
                Some(status) => match u32::try_from(status) {
                    Ok(valid) => Some(valid),
                    Err(_) => {
                        return Err(TranslationError::invalid(format!(
                            "grpcStatus {status} must not be negative"
                        )))
                    }
                },
                None => None,
            };
            Some(ir::FaultAbort {
                http_status,
                grpc_status,
                percentage: check_percentage(abort.percentage)?,
            })
        }
        None => None,
    };

    if delay.is_none() && abort.is_none() {
        return Err(TranslationError::invalid("one of delay or abort must be set"));
    }

    Ok(ir::FaultInjection { delay, abort })
}

fn circuit_breaker(cb: &CircuitBreaker) -> Result<ir::CircuitBreaker, TranslationError> {
    fn threshold(name: &str, value: Option<i64>) -> Result<Option<u32>, TranslationError> {
        value
            .map(|v| {
                u32::try_from(v).map_err(|_| {
                    TranslationError::invalid(format!(
                        "{name} must be between 0 and {}, got {v}",
                        u32::MAX
                    ))
                })
            })
            .transpose()
    }

    Ok(ir::CircuitBreaker {
        max_connections: threshold("maxConnections", cb.max_connections)?,
        max_pending_requests: threshold("maxPendingRequests", cb.max_pending_requests)?,
        max_parallel_requests: threshold("maxParallelRequests", cb.max_parallel_requests)?,
        max_parallel_retries: threshold("maxParallelRetries", cb.max_parallel_retries)?,
        max_requests_per_connection: threshold(
            "maxRequestsPerConnection",
            cb.max_requests_per_connection,
        )?,
    })
}

fn retry(retry: &Retry) -> Result<ir::Retry, TranslationError> {
    let num_retries = match retry.num_retries {
        Some(n) => match u32::try_from(n) {
            Ok(n) => Some(n),
            Err(_) => {
                return Err(TranslationError::invalid(format!(
                    "numRetries must not be negative, got {n}"
                )))
            }
        },
        None => None,
    };

    let mut triggers = vec![];
    let mut http_status_codes = vec![];
    if let Some(retry_on) = &retry.retry_on {
        triggers = retry_on.triggers.clone();
        for &code in &retry_on.http_status_codes {
            if !(100..=599).contains(&code) {
                return Err(TranslationError::invalid(format!(
                    "{code} is not a valid HTTP status code"
                )));
            }
            http_status_codes.push(code as u32);
        }
    }

    let per_retry = retry.per_retry.as_ref();
    let back_off = per_retry.and_then(|p| p.back_off.as_ref());

    Ok(ir::Retry {
        num_retries,
        triggers,
        http_status_codes,
        per_retry_timeout: optional_duration("perRetry.timeout", per_retry.and_then(|p| p.timeout.as_ref()))?,
        base_interval: optional_duration(
            "perRetry.backOff.baseInterval",
            back_off.and_then(|b| b.base_interval.as_ref()),
        )?,
        max_interval: optional_duration(
            "perRetry.backOff.maxInterval",
            back_off.and_then(|b| b.max_interval.as_ref()),
        )?,
    })
}

fn timeout(timeout: &Timeout) -> Result<ir::BackendTimeout, TranslationError> {
    let tcp = timeout.tcp.as_ref();
    let http = timeout.http.as_ref();

    Ok(ir::BackendTimeout {
        tcp_connect_timeout: optional_duration(
            "tcp.connectTimeout",
            tcp.and_then(|t| t.connect_timeout.as_ref()),
        )?,
        http_connection_idle_timeout: optional_duration(
            "http.connectionIdleTimeout",
            http.and_then(|h| h.connection_idle_timeout.as_ref()),
        )?,
        http_max_connection_duration: optional_duration(
            "http.maxConnectionDuration",
            http.and_then(|h| h.max_connection_duration.as_ref()),
        )?,
        http_request_timeout: optional_duration(
            "http.requestTimeout",
            http.and_then(|h| h.request_timeout.as_ref()),
        )?,
    })
}
