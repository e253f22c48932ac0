use httpver_rs::normalize::{normalize_target, Scheme};

#[test]
fn bare_hostname_becomes_https_443() {
    let t = normalize_target("cloudflare.com", None).expect("valid target");
    assert_eq!(t.scheme, Scheme::Https);
    assert_eq!(t.host, "cloudflare.com");
    assert_eq!(t.port, 443);
    assert_eq!(t.url(), "https://cloudflare.com:443");
}

#[test]
fn port_resolution_order() {
    // Explicit override beats URL-embedded beats scheme default.
    assert_eq!(normalize_target("example.com", None).unwrap().port, 443);
    assert_eq!(normalize_target("http://example.com", None).unwrap().port, 80);
    assert_eq!(normalize_target("example.com:8443", None).unwrap().port, 8443);
    assert_eq!(normalize_target("example.com:8443", Some(9999)).unwrap().port, 9999);
}

#[test]
fn invalid_inputs_are_rejected() {
    assert!(normalize_target("bad host!!\">AAAA", None).is_err());
    assert!(normalize_target("localhost", None).is_err());
    assert!(normalize_target("https://localhost:8080", None).is_err());
    assert!(normalize_target("", None).is_err());
    assert!(normalize_target("https://", None).is_err());
    assert!(normalize_target("-leading.example.com", None).is_err());
}

#[test]
fn literal_ips_skip_label_validation() {
    assert!(normalize_target("127.0.0.1", None).is_ok());
    assert!(normalize_target("http://192.0.2.1:8080", None).is_ok());
    let v6 = normalize_target("[2001:db8::2]", None).unwrap();
    assert_eq!(v6.host, "2001:db8::2");
    assert_eq!(v6.url(), "https://[2001:db8::2]:443");
}
