use anyhow::{bail, Result};
use url::{Host, Url};

/// URL scheme accepted for probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            // Default HTTPS / QUIC port.
            Scheme::Https => 443,
        }
    }
}

/// A validated target with its scheme, bare host and resolved port.
///
/// `port` is always concrete: explicit override > URL-embedded > scheme
/// default. `host` is either a literal IP or a hostname that passed DNS-label
/// validation; IPv6 hosts are stored without brackets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedTarget {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
}

impl NormalizedTarget {
    /// Reconstructed absolute URL with the explicit port we are testing.
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.scheme.as_str(), self.host_for_url(), self.port)
    }

    /// Host part suitable for URL or Host-header use (brackets IPv6).
    pub fn host_for_url(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        }
    }
}

/// Turn a raw user string (hostname, host:port, or URL) into a validated
/// target. Defaults to `https` when no scheme is present. Any violation is
/// terminal for the target; no network I/O is attempted afterwards.
pub fn normalize_target(raw: &str, override_port: Option<u16>) -> Result<NormalizedTarget> {
    let raw = raw.trim();
    if raw.is_empty() {
        bail!("missing host in URL");
    }
    let with_scheme = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };

    let parsed = Url::parse(&with_scheme)?;
    let scheme = match parsed.scheme() {
        "http" => Scheme::Http,
        "https" => Scheme::Https,
        other => bail!("unsupported scheme: {other}"),
    };

    let host = match parsed.host() {
        Some(Host::Domain(domain)) => {
            let domain = domain.to_string();
            // Explicitly disallow localhost; this checker is intended for
            // network-visible hosts.
            if domain.eq_ignore_ascii_case("localhost") {
                bail!("localhost is not allowed as a scan target");
            }
            if !is_valid_hostname(&domain) {
                bail!("invalid domain name in URL");
            }
            domain
        }
        // Bare IPs (IPv4/IPv6) skip hostname-label checks.
        Some(Host::Ipv4(ip)) => ip.to_string(),
        Some(Host::Ipv6(ip)) => ip.to_string(),
        None => bail!("missing host in URL"),
    };

    let port = override_port
        .or_else(|| parsed.port())
        .unwrap_or_else(|| scheme.default_port());

    Ok(NormalizedTarget { scheme, host, port })
}

/// Conservative validation of a DNS hostname. Not intended to be exhaustive,
/// just to reject clearly invalid and potentially dangerous inputs.
pub fn is_valid_hostname(host: &str) -> bool {
    if host.is_empty() || host.len() > 253 {
        return false;
    }

    // Strip trailing dot (FQDN) if present.
    let host = host.strip_suffix('.').unwrap_or(host);
    if host.is_empty() {
        return false;
    }

    host.split('.').all(|label| {
        if label.is_empty() || label.len() > 63 {
            return false;
        }
        // Labels must not start or end with a hyphen.
        if label.starts_with('-') || label.ends_with('-') {
            return false;
        }
        label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_https_and_443() {
        let t = normalize_target("cloudflare.com", None).unwrap();
        assert_eq!(t.scheme, Scheme::Https);
        assert_eq!(t.host, "cloudflare.com");
        assert_eq!(t.port, 443);
        assert_eq!(t.url(), "https://cloudflare.com:443");
    }

    #[test]
    fn http_scheme_defaults_to_80() {
        let t = normalize_target("http://example.com", None).unwrap();
        assert_eq!(t.scheme, Scheme::Http);
        assert_eq!(t.port, 80);
        assert_eq!(t.url(), "http://example.com:80");
    }

    #[test]
    fn embedded_port_is_kept() {
        let t = normalize_target("example.com:8443", None).unwrap();
        assert_eq!(t.port, 8443);
    }

    #[test]
    fn override_beats_embedded_port() {
        let t = normalize_target("https://example.com:8443", Some(9000)).unwrap();
        assert_eq!(t.port, 9000);
    }

    #[test]
    fn localhost_is_rejected() {
        assert!(normalize_target("localhost", None).is_err());
        assert!(normalize_target("http://LOCALHOST:8080", None).is_err());
    }

    #[test]
    fn garbage_host_is_rejected() {
        assert!(normalize_target("bad host!!\">AAAA", None).is_err());
        assert!(normalize_target("", None).is_err());
        assert!(normalize_target("   ", None).is_err());
    }

    #[test]
    fn literal_ips_are_accepted() {
        let v4 = normalize_target("192.0.2.10", None).unwrap();
        assert_eq!(v4.host, "192.0.2.10");
        let v6 = normalize_target("https://[2001:db8::1]:8443", None).unwrap();
        assert_eq!(v6.host, "2001:db8::1");
        assert_eq!(v6.port, 8443);
        assert_eq!(v6.url(), "https://[2001:db8::1]:8443");
    }

    #[test]
    fn hostname_label_rules() {
        assert!(is_valid_hostname("example.com"));
        assert!(is_valid_hostname("example.com."));
        assert!(is_valid_hostname("a-b.example.com"));
        assert!(!is_valid_hostname("-bad.example.com"));
        assert!(!is_valid_hostname("bad-.example.com"));
        assert!(!is_valid_hostname("under_score.example.com"));
        assert!(!is_valid_hostname(&"a".repeat(64)));
        assert!(is_valid_hostname(&"a".repeat(63)));
        assert!(!is_valid_hostname(&format!("{}.com", "a.".repeat(130))));
    }
}
