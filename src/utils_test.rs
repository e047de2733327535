use crate::utils::endpoint_host;
use crate::utils::host_eq;
use crate::utils::normalize_endpoint;

#[test]
fn test_normalize_endpoint_adds_https_scheme() {
    assert_eq!(
        normalize_endpoint("cfg-1.example.net"),
        "https://cfg-1.example.net"
    );
}

#[test]
fn test_normalize_endpoint_preserves_existing_scheme() {
    assert_eq!(
        normalize_endpoint("http://127.0.0.1:8080"),
        "http://127.0.0.1:8080"
    );
    assert_eq!(
        normalize_endpoint("https://cfg-1.example.net"),
        "https://cfg-1.example.net"
    );
}

#[test]
fn test_endpoint_host_strips_scheme_port_and_path() {
    assert_eq!(endpoint_host("https://cfg-1.example.net"), "cfg-1.example.net");
    assert_eq!(endpoint_host("http://cfg-1.example.net:8080"), "cfg-1.example.net");
    assert_eq!(
        endpoint_host("https://cfg-1.example.net/kv?api-version=1"),
        "cfg-1.example.net"
    );
    assert_eq!(endpoint_host("cfg-1.example.net"), "cfg-1.example.net");
}

#[test]
fn test_host_eq_ignores_scheme_and_case() {
    assert!(host_eq("https://CFG-1.Example.NET", "http://cfg-1.example.net:8080"));
    assert!(!host_eq("https://cfg-1.example.net", "https://cfg-2.example.net"));
}
