/// Map aggregate probe evidence to a numeric score and letter grade.
///
/// Uses only whether HTTP/3 was negotiated, whether HTTP/2 was negotiated,
/// and the observed TLS version string from the HTTP/2 connection:
/// - A (95): HTTP/3 supported.
/// - B (90): HTTP/2 with TLS 1.3.
/// - C (80): HTTP/2 with TLS 1.2, or HTTP/2 with an unclassified TLS version.
/// - F (40): everything else (HTTP/1.x only, plain HTTP, errors).
pub fn grade(has_h3: bool, has_h2: bool, tls_version: &str) -> (u8, &'static str) {
    // Highest signal: HTTP/3 support.
    if has_h3 {
        return (95, "A");
    }

    if has_h2 {
        return match tls_version {
            "TLS 1.3" => (90, "B"),
            // TLS 1.2 and anything we could not confidently classify are
            // treated the same.
            _ => (80, "C"),
        };
    }

    (40, "F")
}
