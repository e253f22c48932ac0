use serde::{Deserialize, Serialize};

/// Outcome of a single protocol-version probe.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct VersionResult {
    pub version: String,
    pub supported: bool,
    /// Human-friendly one-liner describing the outcome.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,
    /// Low-level error or protocol details supporting the finding. Intended
    /// for tooltips / advanced users, while `detail` stays readable.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub evidence: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub error: bool,
}

impl VersionResult {
    pub fn new(version: &str) -> Self {
        Self {
            version: version.to_string(),
            supported: false,
            detail: String::new(),
            evidence: String::new(),
            error: false,
        }
    }

    /// ✅ = supported, ❌ = not supported, 🟧 = error / probe failed.
    pub fn status_emoji(&self) -> &'static str {
        if self.supported {
            "✅"
        } else if self.error {
            "🟧"
        } else {
            "❌"
        }
    }

    pub fn status_label(&self) -> &'static str {
        if self.supported {
            "supported"
        } else if self.error {
            "error / probe failed"
        } else {
            "not supported"
        }
    }
}

/// Full structured result for one target.
///
/// For a valid target `results` holds exactly four entries in fixed order
/// (HTTP/1.0, HTTP/1.1, HTTP/2.0, HTTP/3.0). For an invalid target it holds
/// a single `version: "error"` sentinel and `score`/`grade` stay unset.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub target: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    pub results: Vec<VersionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_version: Option<String>,
    /// Set when the target hostname does not resolve via DNS, so callers can
    /// show a clear "host does not resolve" message instead of four generic
    /// probe failures.
    #[serde(default, skip_serializing_if = "is_false")]
    pub unresolved: bool,
}

impl CheckResult {
    /// Sentinel result for a target that failed validation before any
    /// network activity.
    pub fn invalid(target: &str, detail: String) -> Self {
        Self {
            target: target.to_string(),
            url: String::new(),
            port: None,
            results: vec![VersionResult {
                version: "error".to_string(),
                supported: false,
                detail,
                evidence: String::new(),
                error: true,
            }],
            score: None,
            grade: None,
            alpn: None,
            tls_version: None,
            unresolved: false,
        }
    }

    /// Single-line human summary: statuses first, then grade, then host:port.
    pub fn summary_line(&self) -> String {
        let statuses = self
            .results
            .iter()
            .map(|vr| format!("{} {}", vr.version, vr.status_emoji()))
            .collect::<Vec<_>>()
            .join(" | ");
        let host = match self.port {
            Some(p) => format!("{}:{}", self.target, p),
            None => self.target.clone(),
        };
        match (&self.grade, self.score) {
            (Some(grade), Some(score)) => format!("{statuses}\tGrade: {grade} ({score})\t{host}"),
            _ => format!("{statuses}\t{host}"),
        }
    }
}

fn is_false(v: &bool) -> bool {
    !*v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emoji_mapping() {
        let mut vr = VersionResult::new("HTTP/1.1");
        assert_eq!(vr.status_emoji(), "❌");
        vr.error = true;
        assert_eq!(vr.status_emoji(), "🟧");
        vr.supported = true;
        assert_eq!(vr.status_emoji(), "✅");
    }

    #[test]
    fn sentinel_shape() {
        let res = CheckResult::invalid("bad host", "invalid URL: nope".to_string());
        assert_eq!(res.results.len(), 1);
        assert_eq!(res.results[0].version, "error");
        assert!(res.results[0].error);
        assert!(!res.results[0].supported);
        assert!(res.score.is_none());
        assert!(res.grade.is_none());
    }

    #[test]
    fn sentinel_json_omits_unset_fields() {
        let res = CheckResult::invalid("bad host", "invalid URL: nope".to_string());
        let json = serde_json::to_string(&res).unwrap();
        assert!(!json.contains("\"score\""));
        assert!(!json.contains("\"grade\""));
        assert!(!json.contains("\"url\""));
        assert!(!json.contains("\"unresolved\""));
    }

    #[test]
    fn summary_line_with_grade() {
        let mut res = CheckResult::invalid("example.com", String::new());
        res.port = Some(443);
        res.score = Some(90);
        res.grade = Some("B".to_string());
        res.results = vec![VersionResult::new("HTTP/1.0")];
        assert_eq!(
            res.summary_line(),
            "HTTP/1.0 ❌\tGrade: B (90)\texample.com:443"
        );
    }
}
