//! Outbound proxy selection.
//!
//! Decides whether a target URL should be reached through a configured
//! HTTP(S) proxy, honoring the NO_PROXY allow-list with its conventional
//! quirks: `*` bypasses everything, leading-dot entries match only strict
//! subdomains, and port-qualified entries apply only on an exact port
//! match. The bypass check runs before proxy selection.

use url::{Host, Url};

/// Proxy-related process environment, captured once per process.
#[derive(Debug, Clone, Default)]
pub struct ProxyEnv {
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
    pub no_proxy: Option<String>,
}

impl ProxyEnv {
    /// Capture from the process environment. `NO_PROXY` wins over the
    /// lowercase spelling when both are set.
    pub fn from_process() -> Self {
        fn non_empty(name: &str) -> Option<String> {
            std::env::var(name).ok().filter(|v| !v.trim().is_empty())
        }
        Self {
            http_proxy: non_empty("HTTP_PROXY"),
            https_proxy: non_empty("HTTPS_PROXY"),
            no_proxy: non_empty("NO_PROXY").or_else(|| non_empty("no_proxy")),
        }
    }
}

/// Hosts that always bypass the proxy, appended when the configured list
/// does not already carry them.
const DEFAULT_NO_PROXY: [&str; 3] = ["localhost", "127.0.0.1", "::1"];

/// Parse a raw NO_PROXY value into lowercased entries with the default
/// local hosts appended.
pub fn parse_no_proxy_list(raw: Option<&str>) -> Vec<String> {
    let mut entries: Vec<String> = raw
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(str::to_lowercase)
                .collect()
        })
        .unwrap_or_default();

    for default in DEFAULT_NO_PROXY {
        if !entries.iter().any(|entry| entry == default) {
            entries.push(default.to_string());
        }
    }
    entries
}

/// Whether `host[:port]` is covered by the given NO_PROXY entries.
///
/// Matching is case-insensitive. A port-qualified entry requires the
/// target to carry a port and the ports to be equal; an unqualified entry
/// ignores ports entirely.
pub fn is_no_proxy_target(host: &str, port: Option<&str>, entries: &[String]) -> bool {
    let host = host.to_lowercase();
    let host = host.trim_start_matches('[').trim_end_matches(']');

    for entry in entries {
        if entry == "*" {
            return true;
        }

        let (entry_host, entry_port) = split_entry(entry);
        match (&entry_port, port) {
            (Some(ep), Some(tp)) if ep != tp => continue,
            (Some(_), None) => continue,
            _ => {}
        }

        if host_matches(host, &entry_host) {
            return true;
        }
    }
    false
}

/// Select the proxy URL for a target, if any.
///
/// An unparseable target yields `None` (the caller's own validation is
/// expected to reject it); NO_PROXY matches yield `None`; otherwise the
/// scheme picks HTTPS_PROXY or HTTP_PROXY with cross-fallback. Schemes
/// other than http/https are never proxied.
pub fn proxy_for(target_url: &str, env: &ProxyEnv) -> Option<String> {
    let url = Url::parse(target_url).ok()?;
    let host = match url.host()? {
        Host::Domain(d) => d.to_lowercase(),
        Host::Ipv4(a) => a.to_string(),
        Host::Ipv6(a) => a.to_string(),
    };
    let port = url.port().map(|p| p.to_string());

    let entries = parse_no_proxy_list(env.no_proxy.as_deref());
    if is_no_proxy_target(&host, port.as_deref(), &entries) {
        return None;
    }

    let proxy = match url.scheme() {
        "https" => env.https_proxy.clone().or_else(|| env.http_proxy.clone()),
        "http" => env.http_proxy.clone().or_else(|| env.https_proxy.clone()),
        _ => None,
    };
    proxy.filter(|p| !p.trim().is_empty())
}

/// Split an entry into host and optional port.
///
/// Bracketed IPv6 literals are unwrapped; otherwise the colon split only
/// happens when exactly one colon is present, so a bare IPv6 entry like
/// `::1` is kept whole.
fn split_entry(entry: &str) -> (String, Option<String>) {
    if let Some(rest) = entry.strip_prefix('[')
        && let Some((host, tail)) = rest.split_once(']')
    {
        let port = tail
            .strip_prefix(':')
            .filter(|p| !p.is_empty())
            .map(str::to_string);
        return (host.to_string(), port);
    }

    if entry.bytes().filter(|&b| b == b':').count() == 1
        && let Some((host, port)) = entry.split_once(':')
        && !port.is_empty()
    {
        return (host.to_string(), Some(port.to_string()));
    }

    (entry.to_string(), None)
}

fn host_matches(host: &str, entry_host: &str) -> bool {
    if entry_host.starts_with('.') {
        // Strict subdomains only; the bare apex does not match.
        host.ends_with(entry_host)
    } else {
        host == entry_host || host.ends_with(&format!(".{entry_host}"))
    }
}
