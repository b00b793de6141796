//! ETags for session polling.
//!
//! Every mutation bumps the session version, so the version alone identifies
//! a snapshot. Pollers send it back in `If-None-Match` and get a bodiless 304
//! while nothing has changed.

use axum::http::{header, HeaderMap};

/// Format: `"session-{code}-v{version}"`, quoted as HTTP requires
pub fn session_etag(code: &str, version: u64) -> String {
    format!(r#""session-{code}-v{version}""#)
}

/// Whether any `If-None-Match` candidate matches the current ETag
pub fn if_none_match_hits(headers: &HeaderMap, current: &str) -> bool {
    let Some(value) = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };

    value
        .split(',')
        .map(str::trim)
        .any(|candidate| candidate == "*" || candidate.trim_start_matches("W/") == current)
}
