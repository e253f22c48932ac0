//! The four HTTP version probes and the per-target engine joining them.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time;
use tracing::debug;

use crate::grade;
use crate::normalize::{self, NormalizedTarget, Scheme};
use crate::tls;
use crate::types::{CheckResult, VersionResult};

const H1_TIMEOUT: Duration = Duration::from_secs(2);
const H2_TIMEOUT: Duration = Duration::from_secs(2);
const H3_TIMEOUT: Duration = Duration::from_secs(3);

const USER_AGENT: &str = concat!("httpver-rs/", env!("CARGO_PKG_VERSION"));

const H3_HINT: &str = "not supported - enable HTTP/3 to offer a more secure option.";

/// Error-message fragments that indicate a DNS "no such host" condition.
const DNS_NOT_FOUND_HINTS: &[&str] = &[
    "failed to lookup address",
    "name or service not known",
    "no such host",
    "nodename nor servname",
    "no addresses found",
];

/// Outcome of a single probe plus the shared DNS flag it may contribute.
struct ProbeReport {
    result: VersionResult,
    unresolved: bool,
}

/// Like [`ProbeReport`] but carrying the TLS evidence only the HTTP/2 probe
/// can observe.
struct H2Report {
    result: VersionResult,
    alpn: Option<String>,
    tls_version: Option<String>,
    unresolved: bool,
}

/// Run all four version probes for one target concurrently and aggregate
/// their evidence into a graded [`CheckResult`].
///
/// Validation failures short-circuit to a single sentinel result; no network
/// I/O happens for those. Probe failures never abort sibling probes.
pub async fn check_target(target: &str, override_port: Option<u16>) -> CheckResult {
    let norm = match normalize::normalize_target(target, override_port) {
        Ok(norm) => norm,
        Err(err) => return CheckResult::invalid(target, format!("invalid URL: {err:#}")),
    };
    debug!(host = %norm.host, url = %norm.url(), "running version probes");

    let (r10, r11, r2, r3) = tokio::join!(
        probe_http10(&norm, override_port),
        probe_http11(&norm),
        probe_http2(&norm),
        probe_http3(&norm),
    );

    let unresolved = r10.unresolved || r11.unresolved || r2.unresolved || r3.unresolved;
    let has_h2 = r2.result.supported;
    let has_h3 = r3.result.supported;
    let tls_version = r2.tls_version;
    let (score, letter) = grade::grade(has_h3, has_h2, tls_version.as_deref().unwrap_or(""));

    CheckResult {
        target: target.to_string(),
        url: norm.url(),
        port: Some(norm.port),
        results: vec![r10.result, r11.result, r2.result, r3.result],
        score: Some(score),
        grade: Some(letter.to_string()),
        alpn: r2.alpn,
        tls_version,
        unresolved,
    }
}

/// HTTP/1.0 probe. Legacy HTTP/1.0 is a plaintext concern, so this always
/// dials `http://host:80` (port 80 unless overridden), bypassing TLS.
async fn probe_http10(target: &NormalizedTarget, override_port: Option<u16>) -> ProbeReport {
    let port = override_port.unwrap_or(80);
    let mut vr = VersionResult::new("HTTP/1.0");
    let mut unresolved = false;

    match time::timeout(H1_TIMEOUT, plain_exchange(&target.host, port, "HTTP/1.0")).await {
        Ok(Ok(proto)) => {
            // Any HTTP/1.x reply to a 1.0 request counts as HTTP/1.0 support.
            if proto.major == 1 {
                vr.supported = true;
                vr.detail = if proto.minor == 0 {
                    "supported".to_string()
                } else {
                    // Many servers upgrade HTTP/1.0 requests to HTTP/1.1; make
                    // that read as a positive signal instead of a warning.
                    format!("server upgraded HTTP/1.0 request to {proto} (good)")
                };
            } else {
                vr.detail = format!("server replied with {proto}");
            }
        }
        Ok(Err(err)) => {
            vr.error = true;
            vr.detail = format_http10_error(&err);
            vr.evidence = format!("{err:#}");
            unresolved = is_unresolved_error(&err);
        }
        Err(_) => {
            vr.error = true;
            vr.detail = timeout_detail(H1_TIMEOUT);
            vr.evidence = format!("no response within {}s", H1_TIMEOUT.as_secs());
        }
    }
    ProbeReport { result: vr, unresolved }
}

/// HTTP/1.1 probe over the primary scheme/port. On TLS targets the ALPN list
/// is pinned to `http/1.1` so the transport never silently negotiates
/// HTTP/2. Supported iff the wire protocol is exactly 1.1.
async fn probe_http11(target: &NormalizedTarget) -> ProbeReport {
    let mut vr = VersionResult::new("HTTP/1.1");
    let mut unresolved = false;

    let attempt = async {
        match target.scheme {
            Scheme::Http => plain_exchange(&target.host, target.port, "HTTP/1.1").await,
            Scheme::Https => tls_exchange_http11(target).await,
        }
    };
    match time::timeout(H1_TIMEOUT, attempt).await {
        Ok(Ok(proto)) => {
            if proto.major == 1 && proto.minor == 1 {
                vr.supported = true;
                vr.detail = "supported".to_string();
            } else {
                vr.detail = format!("server replied with {proto}");
            }
        }
        Ok(Err(err)) => {
            vr.error = true;
            vr.detail = format!("not supported (or probe failed): {err:#}");
            vr.evidence = format!("{err:#}");
            unresolved = is_unresolved_error(&err);
        }
        Err(_) => {
            vr.error = true;
            vr.detail = timeout_detail(H1_TIMEOUT);
            vr.evidence = format!("no response within {}s", H1_TIMEOUT.as_secs());
        }
    }
    ProbeReport { result: vr, unresolved }
}

/// HTTP/2.0 probe, offering ALPN `h2` first. Also the sole source of the TLS
/// version and ALPN evidence used by grading, recorded from the handshake
/// whether or not h2 was chosen.
async fn probe_http2(target: &NormalizedTarget) -> H2Report {
    let mut vr = VersionResult::new("HTTP/2.0");
    let mut alpn = None;
    let mut tls_version = None;
    let mut unresolved = false;

    if target.scheme == Scheme::Http {
        // No TLS, no ALPN: the best a plaintext target can do is 1.x.
        match time::timeout(H2_TIMEOUT, plain_exchange(&target.host, target.port, "HTTP/1.1")).await
        {
            Ok(Ok(proto)) => vr.detail = format!("server replied with {proto}"),
            Ok(Err(err)) => {
                vr.error = true;
                vr.detail = format!("not supported (or probe failed): {err:#}");
                vr.evidence = format!("{err:#}");
                unresolved = is_unresolved_error(&err);
            }
            Err(_) => {
                vr.error = true;
                vr.detail = timeout_detail(H2_TIMEOUT);
                vr.evidence = format!("no response within {}s", H2_TIMEOUT.as_secs());
            }
        }
        return H2Report { result: vr, alpn, tls_version, unresolved };
    }

    match time::timeout(H2_TIMEOUT, h2_handshake(target)).await {
        Ok(Ok(hs)) => {
            alpn = hs.alpn.clone();
            tls_version = hs.tls_version;
            if hs.alpn.as_deref() == Some("h2") {
                vr.supported = true;
                vr.detail = "supported".to_string();
            } else if let Some(proto) = hs.replied {
                vr.detail = format!("server replied with {proto}");
            } else {
                vr.error = true;
                let reason = hs
                    .reply_error
                    .unwrap_or_else(|| "no HTTP response after TLS handshake".to_string());
                vr.detail = format!("not supported (or probe failed): {reason}");
                vr.evidence = reason;
            }
        }
        Ok(Err(err)) => {
            vr.error = true;
            vr.detail = format!("not supported (or probe failed): {err:#}");
            vr.evidence = format!("{err:#}");
            unresolved = is_unresolved_error(&err);
        }
        Err(_) => {
            vr.error = true;
            vr.detail = timeout_detail(H2_TIMEOUT);
            vr.evidence = format!("no response within {}s", H2_TIMEOUT.as_secs());
        }
    }
    H2Report { result: vr, alpn, tls_version, unresolved }
}

/// HTTP/3.0 probe over QUIC with ALPN pinned to `h3`. A failed attempt is
/// deliberately not flagged as an error outcome: in the common case a server
/// simply lacks HTTP/3, and rendering that as a probe failure would alarm
/// users for the overwhelming majority of non-adopting servers.
async fn probe_http3(target: &NormalizedTarget) -> ProbeReport {
    let mut vr = VersionResult::new("HTTP/3.0");
    let mut unresolved = false;

    if target.scheme == Scheme::Http {
        vr.detail = H3_HINT.to_string();
        vr.evidence = "plain http target; QUIC requires TLS".to_string();
        return ProbeReport { result: vr, unresolved };
    }

    match time::timeout(H3_TIMEOUT, attempt_h3(target)).await {
        Ok(Ok(_alpn)) => {
            vr.supported = true;
            vr.detail = "supported".to_string();
        }
        Ok(Err(err)) => {
            vr.detail = H3_HINT.to_string();
            vr.evidence = format!("{err:#}");
            unresolved = is_unresolved_error(&err);
        }
        Err(_) => {
            vr.detail = H3_HINT.to_string();
            vr.evidence = format!("no QUIC handshake within {}s", H3_TIMEOUT.as_secs());
        }
    }
    ProbeReport { result: vr, unresolved }
}

/// QUIC handshake with `h3` pinned; returns the ALPN identifier the server
/// selected. Completion of this handshake is the HTTP/3 support signal.
async fn attempt_h3(target: &NormalizedTarget) -> Result<String> {
    let addr = resolve_one(&target.host, target.port).await?;
    let bind: SocketAddr = if addr.is_ipv6() {
        "[::]:0".parse()?
    } else {
        "0.0.0.0:0".parse()?
    };
    let mut endpoint = quinn::Endpoint::client(bind).context("QUIC endpoint setup failed")?;
    endpoint.set_default_client_config(tls::quic_client_config()?);

    let conn = endpoint
        .connect(addr, &target.host)
        .context("QUIC connect failed")?
        .await
        .context("QUIC handshake failed")?;
    let alpn = conn
        .handshake_data()
        .and_then(|data| data.downcast::<quinn::crypto::rustls::HandshakeData>().ok())
        .and_then(|data| data.protocol)
        .map(|proto| String::from_utf8_lossy(&proto).into_owned())
        .unwrap_or_else(|| "h3".to_string());
    conn.close(0u32.into(), b"");
    Ok(alpn)
}

/// What the HTTP/2 probe learned from one TLS handshake (and, when ALPN fell
/// back to HTTP/1.x, from asking the server what it actually speaks).
struct H2Handshake {
    alpn: Option<String>,
    tls_version: Option<String>,
    replied: Option<WireProto>,
    reply_error: Option<String>,
}

async fn h2_handshake(target: &NormalizedTarget) -> Result<H2Handshake> {
    let addr = resolve_one(&target.host, target.port).await?;
    let tcp = TcpStream::connect(addr).await.context("TCP connect failed")?;
    let connector = tls::connector(tls::ALPN_H2)?;
    let server_name = ServerName::try_from(target.host.clone())?;
    let mut stream = connector
        .connect(server_name, tcp)
        .await
        .context("TLS handshake failed")?;

    let (alpn, tls_version) = {
        let (_, conn) = stream.get_ref();
        (
            conn.alpn_protocol().map(|proto| String::from_utf8_lossy(proto).into_owned()),
            conn.protocol_version().and_then(tls::version_name).map(str::to_string),
        )
    };

    let mut hs = H2Handshake { alpn: alpn.clone(), tls_version, replied: None, reply_error: None };
    if alpn.as_deref() != Some("h2") {
        let request = build_request("HTTP/1.1", &host_header(&target.host, target.port, 443));
        match http_exchange(&mut stream, &request).await {
            Ok(proto) => hs.replied = Some(proto),
            Err(err) => hs.reply_error = Some(format!("{err:#}")),
        }
    }
    Ok(hs)
}

async fn tls_exchange_http11(target: &NormalizedTarget) -> Result<WireProto> {
    let addr = resolve_one(&target.host, target.port).await?;
    let tcp = TcpStream::connect(addr).await.context("TCP connect failed")?;
    let connector = tls::connector(tls::ALPN_HTTP11)?;
    let server_name = ServerName::try_from(target.host.clone())?;
    let mut stream = connector
        .connect(server_name, tcp)
        .await
        .context("TLS handshake failed")?;
    let request = build_request("HTTP/1.1", &host_header(&target.host, target.port, 443));
    http_exchange(&mut stream, &request).await
}

async fn plain_exchange(host: &str, port: u16, request_proto: &str) -> Result<WireProto> {
    let addr = resolve_one(host, port).await?;
    let mut stream = TcpStream::connect(addr).await.context("TCP connect failed")?;
    let request = build_request(request_proto, &host_header(host, port, 80));
    http_exchange(&mut stream, &request).await
}

/// Send a bare GET and parse the protocol token off the status line.
async fn http_exchange<S>(stream: &mut S, request: &str) -> Result<WireProto>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream
        .write_all(request.as_bytes())
        .await
        .context("request write failed")?;
    let status = read_status_line(stream).await?;
    parse_wire_proto(&status).ok_or_else(|| anyhow!("malformed status line: {status}"))
}

/// Read until the first newline (or a hard cap) and return the first line.
async fn read_status_line<S: AsyncRead + Unpin>(stream: &mut S) -> Result<String> {
    let mut buf = Vec::with_capacity(512);
    let mut chunk = [0u8; 512];
    loop {
        let n = stream.read(&mut chunk).await.context("response read failed")?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.contains(&b'\n') || buf.len() >= 8192 {
            break;
        }
    }
    if buf.is_empty() {
        bail!("empty response");
    }
    let text = String::from_utf8_lossy(&buf);
    Ok(text.lines().next().unwrap_or_default().trim().to_string())
}

async fn resolve_one(host: &str, port: u16) -> Result<SocketAddr> {
    let mut addrs = tokio::net::lookup_host((host, port))
        .await
        .with_context(|| format!("failed to resolve {host}"))?;
    addrs
        .next()
        .ok_or_else(|| anyhow!("no addresses found for {host}"))
}

fn build_request(proto: &str, host_hdr: &str) -> String {
    format!(
        "GET / {proto}\r\nHost: {host_hdr}\r\nUser-Agent: {USER_AGENT}\r\nAccept: */*\r\nConnection: close\r\n\r\n"
    )
}

/// Host header value: brackets IPv6, appends the port when non-default.
fn host_header(host: &str, port: u16, default_port: u16) -> String {
    let host = if host.contains(':') { format!("[{host}]") } else { host.to_string() };
    if port == default_port {
        host
    } else {
        format!("{host}:{port}")
    }
}

/// Protocol token from an HTTP status line, e.g. `HTTP/1.1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WireProto {
    major: u8,
    minor: u8,
}

impl fmt::Display for WireProto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP/{}.{}", self.major, self.minor)
    }
}

fn parse_wire_proto(status_line: &str) -> Option<WireProto> {
    let token = status_line.split_whitespace().next()?;
    let version = token.strip_prefix("HTTP/")?;
    let (major, minor) = match version.split_once('.') {
        Some((major, minor)) => (major.parse().ok()?, minor.parse().ok()?),
        None => (version.parse().ok()?, 0),
    };
    Some(WireProto { major, minor })
}

/// Friendlier description for HTTP/1.0 probe failures. A plain TCP
/// "connection refused" on port 80 is a good outcome for security: the
/// legacy HTTP/1.0 surface is not exposed.
fn format_http10_error(err: &anyhow::Error) -> String {
    if is_connection_refused(err) {
        "not supported (good) - TCP connection refused".to_string()
    } else {
        format!("not supported (or probe failed): {err:#}")
    }
}

fn is_connection_refused(err: &anyhow::Error) -> bool {
    if let Some(io_err) = err.downcast_ref::<std::io::Error>() {
        if io_err.kind() == std::io::ErrorKind::ConnectionRefused {
            return true;
        }
    }
    // Fallback heuristic if the platform error type is different.
    format!("{err:#}").to_ascii_lowercase().contains("connection refused")
}

fn is_unresolved_error(err: &anyhow::Error) -> bool {
    let msg = format!("{err:#}").to_ascii_lowercase();
    DNS_NOT_FOUND_HINTS.iter().any(|hint| msg.contains(hint))
}

fn timeout_detail(timeout: Duration) -> String {
    format!(
        "not supported (or probe failed): probe timed out after {}s",
        timeout.as_secs()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_proto_parsing() {
        assert_eq!(parse_wire_proto("HTTP/1.1 200 OK"), Some(WireProto { major: 1, minor: 1 }));
        assert_eq!(parse_wire_proto("HTTP/1.0 404 Not Found"), Some(WireProto { major: 1, minor: 0 }));
        assert_eq!(parse_wire_proto("HTTP/2 200"), Some(WireProto { major: 2, minor: 0 }));
        assert_eq!(parse_wire_proto("SSH-2.0-OpenSSH_9.6"), None);
        assert_eq!(parse_wire_proto(""), None);
    }

    #[test]
    fn host_header_port_handling() {
        assert_eq!(host_header("example.com", 443, 443), "example.com");
        assert_eq!(host_header("example.com", 8443, 443), "example.com:8443");
        assert_eq!(host_header("2001:db8::1", 80, 80), "[2001:db8::1]");
    }

    #[test]
    fn refused_reads_as_good() {
        let err = anyhow::Error::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "connection refused",
        ));
        assert_eq!(
            format_http10_error(&err),
            "not supported (good) - TCP connection refused"
        );
        assert!(is_connection_refused(&err));
    }

    #[test]
    fn other_errors_keep_probe_failed_wording() {
        let err = anyhow!("TLS handshake failed");
        let detail = format_http10_error(&err);
        assert!(detail.starts_with("not supported (or probe failed):"));
    }

    #[test]
    fn dns_not_found_detection() {
        let io_err = std::io::Error::new(
            std::io::ErrorKind::Other,
            "failed to lookup address information: Name or service not known",
        );
        let err = anyhow::Error::from(io_err).context("failed to resolve nope.invalid");
        assert!(is_unresolved_error(&err));
        assert!(!is_unresolved_error(&anyhow!("connection refused")));
    }
}
