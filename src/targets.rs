use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Parse a comma-separated target list into trimmed, de-duplicated entries.
///
/// De-duplication is case-insensitive but the first-seen spelling is kept.
/// Empty segments are skipped.
pub fn parse_target_list(raw: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if seen.insert(part.to_ascii_lowercase()) {
            out.push(part.to_string());
        }
    }
    out
}

/// Parse a targets file body: one target per line, blank lines and lines
/// starting with `#` ignored.
pub fn parse_targets_file(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Load a targets list from a file path.
pub fn load_targets_from_path(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read targets file: {}", path.as_ref().display()))?;
    Ok(parse_targets_file(&content))
}

/// Gather targets from all CLI sources (file, comma-list flag, positional
/// args, in that order) and de-duplicate while preserving order.
pub fn gather_targets(
    targets_flag: Option<&str>,
    targets_file: Option<&Path>,
    positional: &[String],
) -> Result<Vec<String>> {
    let mut targets = Vec::new();
    if let Some(path) = targets_file {
        targets.extend(load_targets_from_path(path)?);
    }
    if let Some(flag) = targets_flag {
        targets.extend(parse_target_list(flag));
    }
    targets.extend(positional.iter().cloned());

    let mut seen = HashSet::new();
    Ok(targets.into_iter().filter(|t| seen.insert(t.clone())).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_parse_trims_and_dedupes() {
        let targets = parse_target_list(" a.com , b.com ,a.com,, A.COM ");
        assert_eq!(targets, vec!["a.com", "b.com"]);
    }

    #[test]
    fn file_parse_skips_comments_and_blanks() {
        let input = r#"
            # production hosts
            a.example.com
            b.example.com  # not a comment marker mid-line, kept verbatim

            c.example.com
        "#;
        let targets = parse_targets_file(input);
        assert_eq!(
            targets,
            vec![
                "a.example.com",
                "b.example.com  # not a comment marker mid-line, kept verbatim",
                "c.example.com",
            ]
        );
    }

    #[test]
    fn gather_preserves_order_and_dedupes_exact() {
        let positional = vec!["c.com".to_string(), "a.com".to_string()];
        let targets = gather_targets(Some("a.com,b.com"), None, &positional).unwrap();
        assert_eq!(targets, vec!["a.com", "b.com", "c.com"]);
    }

    #[test]
    fn gather_with_no_sources_is_empty() {
        let targets = gather_targets(None, None, &[]).unwrap();
        assert!(targets.is_empty());
    }
}
