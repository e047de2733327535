use tokio::time::Instant;
use tracing::trace;

/// Normalizes an endpoint string by ensuring it has a proper scheme prefix.
///
/// # Examples
/// - "cfg-1.example.net" -> "https://cfg-1.example.net"
/// - "http://127.0.0.1:8080" -> "http://127.0.0.1:8080"
/// - "https://cfg-1.example.net" -> "https://cfg-1.example.net"
pub(crate) fn normalize_endpoint(endpoint: &str) -> String {
    if endpoint.starts_with("https://") || endpoint.starts_with("http://") {
        endpoint.to_string()
    } else {
        format!("https://{endpoint}")
    }
}

/// Extracts the host (without port, path, or scheme) from an endpoint
/// or resource URI. Comparison between push-notification resource URIs
/// and replica endpoints happens on this host, case-insensitively.
pub(crate) fn endpoint_host(uri: &str) -> &str {
    let rest = uri
        .strip_prefix("https://")
        .or_else(|| uri.strip_prefix("http://"))
        .unwrap_or(uri);
    let rest = rest.split('/').next().unwrap_or(rest);
    rest.split(':').next().unwrap_or(rest)
}

pub(crate) fn host_eq(a: &str, b: &str) -> bool {
    endpoint_host(a).eq_ignore_ascii_case(endpoint_host(b))
}

/// Drop guard timing one engine pass (startup or refresh).
///
/// On drop, the elapsed milliseconds are recorded into the current
/// span's `elapsed_ms` field when request tracing opened one, and a
/// `trace` event is emitted for log-only setups.
pub(crate) struct PassTimer {
    started: Instant,
    operation: &'static str,
}

impl PassTimer {
    pub(crate) fn start(operation: &'static str) -> Self {
        Self {
            started: Instant::now(),
            operation,
        }
    }
}

impl Drop for PassTimer {
    fn drop(&mut self) {
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        tracing::Span::current().record("elapsed_ms", elapsed_ms);
        trace!(operation = self.operation, elapsed_ms, "configuration pass complete");
    }
}
