//! Hostname intersection between Routes and Listeners.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

/// The hostname that matches everything.
pub const WILDCARD: &str = "*";

const DNS1123_SUBDOMAIN_PATTERN: &str =
    r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$";

static DNS1123_SUBDOMAIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(DNS1123_SUBDOMAIN_PATTERN).unwrap_or_else(|_| {
        panic!(r#"hostname regex "{DNS1123_SUBDOMAIN_PATTERN}" did not compile (this is a bug!)"#)
    })
});

/// Check that a Listener or Route hostname is an RFC 1123 subdomain. A single
/// leading `*.` label is allowed. IP addresses are not hostnames.
pub fn validate_hostname(hostname: &str) -> Result<(), String> {
    if hostname.parse::<std::net::IpAddr>().is_ok() {
        return Err(format!("hostname {hostname:?} must be a DNS name, not an IP address"));
    }

    let name = hostname.strip_prefix("*.").unwrap_or(hostname);
    if name.len() > 253 || !DNS1123_SUBDOMAIN.is_match(name) {
        return Err(format!(
            "hostname {hostname:?} must be a valid RFC 1123 subdomain"
        ));
    }

    Ok(())
}

/// Returns true if `hostname` ends with the non-wildcard part of
/// `wildcard` and has at least one more character in front of it.
pub fn matches_wildcard(hostname: &str, wildcard: &str) -> bool {
    let suffix = wildcard.strip_prefix('*').unwrap_or(wildcard);
    match hostname.strip_suffix(suffix) {
        Some(rest) => !rest.is_empty(),
        None => false,
    }
}

/// The hostnames a Route serves on a Listener.
///
/// With no route hostnames the Route gets the Listener's hostname, or every
/// hostname if the Listener doesn't set one. Otherwise every route hostname
/// is intersected with the listener hostname. When a wildcard route hostname
/// covers the listener hostname, the more specific listener hostname wins.
///
/// Hosts are returned sorted, without duplicates.
pub fn compute_hosts(route_hostnames: &[String], listener_hostname: Option<&str>) -> Vec<String> {
    let listener_hostname = listener_hostname.filter(|h| !h.is_empty());

    if route_hostnames.is_empty() {
        return vec![listener_hostname.unwrap_or(WILDCARD).to_string()];
    }

    let mut hosts = BTreeSet::new();
    let mut push = |host: &str| {
        hosts.insert(host.to_string());
    };

    for route_hostname in route_hostnames {
        match listener_hostname {
            None => push(route_hostname),
            Some(l) if l == route_hostname => push(route_hostname),
            Some(l) if l.starts_with('*') => {
                if matches_wildcard(route_hostname, l) {
                    push(route_hostname)
                }
            }
            Some(l) if route_hostname.starts_with('*') => {
                if matches_wildcard(l, route_hostname) {
                    push(l)
                }
            }
            Some(_) => (),
        }
    }

    hosts.into_iter().collect()
}

/// [compute_hosts], minus any host that a sibling Listener on the same port
/// claims as its own hostname.
///
/// This keeps a wildcard Listener from also serving a host that a more
/// specific Listener next to it was configured for.
pub fn compute_hosts_for_listener<'a>(
    route_hostnames: &[String],
    listener_hostname: Option<&str>,
    sibling_hostnames: impl IntoIterator<Item = &'a str>,
) -> Vec<String> {
    let mut hosts = compute_hosts(route_hostnames, listener_hostname);
    for sibling in sibling_hostnames {
        hosts.retain(|h| h != sibling);
    }
    hosts
}
