//! Embedded web front end: scan form, JSON endpoint, recent-scans view.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use time::OffsetDateTime;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::cache::{RecentSnapshot, ResultCache};
use crate::scheduler;
use crate::targets;
use crate::types::CheckResult;

/// Per-request target cap for the web endpoint.
pub const MAX_WEB_TARGETS: usize = 5;

const RECENT_LIMIT: usize = 12;
const GRADE_LIST_LIMIT: usize = 6;

#[derive(Clone)]
pub struct AppState {
    cache: Arc<ResultCache>,
}

#[derive(Debug, Deserialize)]
pub struct ScanParams {
    /// Comma-separated target list.
    t: Option<String>,
    /// "on" / "1" keeps the scan out of the recent list.
    hide: Option<String>,
    /// `format=json` forces JSON output.
    format: Option<String>,
}

pub async fn serve(listen: &str) -> Result<()> {
    let state = AppState { cache: Arc::new(ResultCache::new()) };

    let app = Router::new()
        .route("/", get(handle_scan))
        .route("/scan", get(handle_scan))
        .route("/about", get(handle_about))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("failed to bind {listen}"))?;
    println!("httpver web UI listening on http://{listen}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn handle_scan(
    State(app): State<AppState>,
    Query(params): Query<ScanParams>,
    headers: HeaderMap,
) -> Response {
    let raw = params.t.clone().unwrap_or_default();
    let requested = targets::parse_target_list(&raw);

    if requested.is_empty() {
        // No targets: render the empty form and always show recent scans.
        return render_page(&app, &raw, false, None, &[], false, None).await;
    }
    if requested.len() > MAX_WEB_TARGETS {
        let msg = format!("Please provide between 1 and {MAX_WEB_TARGETS} targets.");
        return render_page(&app, &raw, false, Some(msg), &[], false, None).await;
    }

    let hide = matches!(params.hide.as_deref(), Some("on") | Some("1"));
    let key = ResultCache::cache_key(&requested);

    let (results, used_cache, cache_age) = match app.cache.get(&key).await {
        Some((results, scanned_at)) => {
            let age = format_age(OffsetDateTime::now_utc() - scanned_at);
            (results, true, Some(age))
        }
        None => {
            info!(targets = requested.len(), "running web scan");
            // Web mode always uses default port behavior (no override).
            let results = scheduler::check_many(&requested, None).await;
            app.cache.set(&key, results.clone(), !hide).await;
            (results, false, None)
        }
    };

    if wants_json(&headers, params.format.as_deref()) {
        return render_json(&results);
    }
    render_page(&app, &raw, hide, None, &results, used_cache, cache_age).await
}

async fn handle_about() -> Html<String> {
    Html(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>about - httpver</title></head>\
         <body><h1>About</h1>\
         <p>httpver checks which HTTP protocol revisions (1.0, 1.1, 2, 3) a server \
         negotiates and turns that into a simple security grade. Offering HTTP/2 or \
         HTTP/3 over TLS is the single high-value signal.</p>\
         <p><a href=\"/\">back to the scanner</a></p></body></html>"
            .to_string(),
    )
}

fn wants_json(headers: &HeaderMap, format: Option<&str>) -> bool {
    if format == Some("json") {
        return true;
    }
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("application/json"))
}

/// Match CLI behavior: a single target serializes as one object,
/// multi-target as an array.
fn render_json(results: &[CheckResult]) -> Response {
    let body = if results.len() == 1 {
        serde_json::to_string_pretty(&results[0])
    } else {
        serde_json::to_string_pretty(results)
    };
    match body {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "failed to encode JSON");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode JSON").into_response()
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn render_page(
    app: &AppState,
    targets_raw: &str,
    hide_checked: bool,
    error: Option<String>,
    results: &[CheckResult],
    used_cache: bool,
    cache_age: Option<String>,
) -> Response {
    let recent = app.cache.recent_snapshots(RECENT_LIMIT).await;
    let best = filter_by_grade(&recent, "A", GRADE_LIST_LIMIT);
    let worst = filter_by_grade(&recent, "F", GRADE_LIST_LIMIT);
    let now = OffsetDateTime::now_utc();

    let mut page = String::with_capacity(4096);
    page.push_str(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>httpver</title><style>\
         body{font-family:sans-serif;max-width:56rem;margin:2rem auto;padding:0 1rem}\
         input[type=text]{padding:.4rem;width:24rem}\
         .error{color:#b00020}.cache-note{color:#666;font-style:italic}\
         .grade{display:inline-block;padding:.1rem .5rem;border-radius:.3rem;color:#fff}\
         .grade.fantastic{background:#2e7d32}.grade.pass{background:#f9a825}.grade.fail{background:#c62828}\
         .meta,.age{color:#666;font-size:.9rem}ul{list-style:none;padding-left:0}\
         .result li{margin:.2rem 0}.columns{display:flex;gap:2rem}.columns>div{flex:1}\
         </style></head><body><h1>httpver</h1>\
         <p>Which HTTP versions does a server speak, and how modern is its stack?</p>",
    );

    page.push_str(&format!(
        "<form action=\"/scan\" method=\"get\">\
         <input type=\"text\" name=\"t\" value=\"{}\" placeholder=\"example.com, example.org\">\
         <label><input type=\"checkbox\" name=\"hide\" value=\"on\"{}> hide from recent scans</label>\
         <button type=\"submit\">Scan</button></form>",
        html_escape(targets_raw),
        if hide_checked { " checked" } else { "" },
    ));

    if let Some(error) = error {
        page.push_str(&format!("<p class=\"error\">{}</p>", html_escape(&error)));
    }

    if !results.is_empty() {
        if used_cache {
            let age = cache_age.unwrap_or_else(|| "just now".to_string());
            page.push_str(&format!(
                "<p class=\"cache-note\">Served from cache (scanned {}).</p>",
                html_escape(&age)
            ));
        }
        for result in results {
            page.push_str(&render_result(result));
        }
    }

    if !recent.is_empty() {
        page.push_str("<h2>Recent scans</h2><ul class=\"recent\">");
        for snap in &recent {
            page.push_str(&render_snapshot_line(snap, now));
        }
        page.push_str("</ul>");

        if !best.is_empty() || !worst.is_empty() {
            page.push_str("<div class=\"columns\">");
            for (title, list) in [("Best (grade A)", &best), ("Worst (grade F)", &worst)] {
                if !list.is_empty() {
                    page.push_str(&format!("<div><h3>{title}</h3><ul>"));
                    for snap in list.iter() {
                        page.push_str(&render_snapshot_line(snap, now));
                    }
                    page.push_str("</ul></div>");
                }
            }
            page.push_str("</div>");
        }
    }

    page.push_str("<p class=\"meta\"><a href=\"/about\">about</a></p></body></html>");
    Html(page).into_response()
}

fn render_result(result: &CheckResult) -> String {
    let mut out = String::with_capacity(1024);
    let grade_badge = match &result.grade {
        Some(grade) => format!(
            " <span class=\"grade {}\">{}{}</span>",
            grade_class(grade),
            html_escape(grade),
            result.score.map(|s| format!(" ({s})")).unwrap_or_default(),
        ),
        None => String::new(),
    };
    out.push_str(&format!(
        "<section class=\"result\"><h2>{}{}</h2>",
        html_escape(&result.target),
        grade_badge
    ));
    if !result.url.is_empty() {
        let mut meta = html_escape(&result.url);
        if let Some(alpn) = &result.alpn {
            meta.push_str(&format!(" &middot; ALPN {}", html_escape(alpn)));
        }
        if let Some(tls) = &result.tls_version {
            meta.push_str(&format!(" &middot; {}", html_escape(tls)));
        }
        out.push_str(&format!("<p class=\"meta\">{meta}</p>"));
    }
    if result.unresolved {
        out.push_str("<p class=\"error\">This host does not resolve via DNS.</p>");
    }
    out.push_str("<ul>");
    for vr in &result.results {
        out.push_str(&format!(
            "<li title=\"{}\">{} {} <span class=\"meta\">{}</span></li>",
            html_escape(&vr.evidence),
            vr.status_emoji(),
            html_escape(&vr.version),
            html_escape(&vr.detail),
        ));
    }
    out.push_str("</ul></section>");
    out
}

fn render_snapshot_line(snap: &RecentSnapshot, now: OffsetDateTime) -> String {
    let host = match snap.port {
        Some(port) => format!("{}:{}", snap.target, port),
        None => snap.target.clone(),
    };
    let stamp = snap
        .scanned_at
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default();
    let grade = match (&snap.grade, snap.score) {
        (Some(grade), Some(score)) => format!(
            "<span class=\"grade {}\">{} ({})</span> ",
            grade_class(grade),
            html_escape(grade),
            score
        ),
        _ => String::new(),
    };
    let versions = snap
        .results
        .iter()
        .map(|vr| format!("{} {}", html_escape(&vr.version), vr.status_emoji()))
        .collect::<Vec<_>>()
        .join(" | ");
    format!(
        "<li title=\"{}\">{}{} <span class=\"meta\">{}</span> <span class=\"age\">{}</span></li>",
        html_escape(&stamp),
        grade,
        html_escape(&host),
        versions,
        format_age(now - snap.scanned_at),
    )
}

fn grade_class(grade: &str) -> &'static str {
    match grade {
        "A" => "fantastic",
        "B" | "C" => "pass",
        _ => "fail",
    }
}

fn filter_by_grade(src: &[RecentSnapshot], want: &str, limit: usize) -> Vec<RecentSnapshot> {
    src.iter()
        .filter(|snap| snap.grade.as_deref() == Some(want))
        .take(limit)
        .cloned()
        .collect()
}

/// "just now", "42s ago", "3 minutes ago", ...
pub fn format_age(age: time::Duration) -> String {
    let secs = age.whole_seconds().max(0);
    if secs <= 1 {
        return "just now".to_string();
    }
    if secs < 60 {
        return format!("{secs}s ago");
    }
    let mins = secs / 60;
    if mins < 60 {
        return format!("{} minute{} ago", mins, plural(mins));
    }
    let hours = mins / 60;
    if hours < 24 {
        return format!("{} hour{} ago", hours, plural(hours));
    }
    let days = hours / 24;
    format!("{} day{} ago", days, plural(days))
}

fn plural(n: i64) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_negotiation() {
        let mut headers = HeaderMap::new();
        assert!(!wants_json(&headers, None));
        assert!(wants_json(&headers, Some("json")));
        headers.insert(header::ACCEPT, "application/json".parse().unwrap());
        assert!(wants_json(&headers, None));
        headers.insert(header::ACCEPT, "text/html".parse().unwrap());
        assert!(!wants_json(&headers, None));
    }

    #[test]
    fn age_formatting() {
        assert_eq!(format_age(time::Duration::seconds(0)), "just now");
        assert_eq!(format_age(time::Duration::seconds(42)), "42s ago");
        assert_eq!(format_age(time::Duration::minutes(1)), "1 minute ago");
        assert_eq!(format_age(time::Duration::minutes(5)), "5 minutes ago");
        assert_eq!(format_age(time::Duration::hours(3)), "3 hours ago");
        assert_eq!(format_age(time::Duration::hours(49)), "2 days ago");
    }

    #[test]
    fn escaping() {
        assert_eq!(html_escape("<b>\"&"), "&lt;b&gt;&quot;&amp;");
    }
}
