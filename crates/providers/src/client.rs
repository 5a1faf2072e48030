use reqwest::{Client, Proxy};
use std::time::Duration;
use tracing::{info, warn};

/// Proxy decision for one backend.
#[derive(Debug, PartialEq, Eq)]
enum ProxyResolution {
    UseProxy(String),
    /// The backend's proxy is explicitly set to "".
    ForceDirectConnect,
    /// Nothing configured; reqwest reads HTTPS_PROXY / HTTP_PROXY itself.
    None,
}

/// Matches a host against `noProxy` rules: exact host, `*.suffix` (subdomains only),
/// `.suffix` (the domain and its subdomains).
fn is_no_proxy(host: &str, no_proxy_list: &[String]) -> bool {
    let host = host.to_lowercase();
    no_proxy_list.iter().any(|rule| {
        let rule = rule.trim().to_lowercase();
        if rule.is_empty() {
            false
        } else if let Some(suffix) = rule.strip_prefix("*.") {
            host.ends_with(&format!(".{}", suffix))
        } else if let Some(suffix) = rule.strip_prefix('.') {
            host == suffix || host.ends_with(&format!(".{}", suffix))
        } else {
            host == rule
        }
    })
}

fn extract_host(url: &str) -> Option<String> {
    let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let authority = without_scheme.split('/').next()?;
    let host_port = authority.rsplit('@').next()?;
    let host = if let Some(v6) = host_port.strip_prefix('[') {
        v6.split(']').next()?
    } else {
        host_port.split(':').next()?
    };
    if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    }
}

fn resolve_proxy(
    provider_proxy: Option<&str>,
    global_proxy: Option<&str>,
    no_proxy: &[String],
    api_base: &str,
) -> ProxyResolution {
    match provider_proxy {
        Some("") => return ProxyResolution::ForceDirectConnect,
        Some(p) => return ProxyResolution::UseProxy(p.to_string()),
        None => {}
    }

    match global_proxy {
        Some(global) if !global.is_empty() => {
            let bypass = extract_host(api_base)
                .map(|host| is_no_proxy(&host, no_proxy))
                .unwrap_or(false);
            if bypass {
                ProxyResolution::ForceDirectConnect
            } else {
                ProxyResolution::UseProxy(global.to_string())
            }
        }
        _ => ProxyResolution::None,
    }
}

/// Build the reqwest client used by a capability backend.
///
/// Precedence: the backend's own `proxy` setting, then `network.proxy` unless the
/// API host matches `network.noProxy`, then reqwest's environment defaults.
pub fn build_http_client(
    provider_proxy: Option<&str>,
    global_proxy: Option<&str>,
    no_proxy: &[String],
    api_base: &str,
    timeout: Duration,
) -> Client {
    let mut builder = Client::builder()
        .timeout(timeout)
        .user_agent(concat!("parley/", env!("CARGO_PKG_VERSION")));

    match resolve_proxy(provider_proxy, global_proxy, no_proxy, api_base) {
        ProxyResolution::UseProxy(proxy_url) => match Proxy::all(&proxy_url) {
            Ok(p) => {
                info!(proxy = %proxy_url, api_base = %api_base, "Capability backend using proxy");
                builder = builder.proxy(p);
            }
            Err(e) => {
                warn!(error = %e, proxy = %proxy_url, "Invalid proxy URL, falling back to direct connect");
            }
        },
        ProxyResolution::ForceDirectConnect => {
            info!(api_base = %api_base, "Capability backend forced to direct connect");
            builder = builder.no_proxy();
        }
        ProxyResolution::None => {}
    }

    builder.build().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to build HTTP client, using default");
        Client::new()
    })
}
