//! RTSP URL parsing.
//!
//! Pulled out of the request path so SETUP/ANNOUNCE path matching and
//! mount-path extraction share one implementation.

use crate::error::{ParseErrorKind, Result, RtspError};

/// Components of an `rtsp://` (or `rtsps://`) URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlParts {
    pub scheme: String,
    pub user: Option<String>,
    pub host: String,
    pub path: String,
    pub query: Option<String>,
}

/// Splits a path-and-query string on the first `?`.
pub fn split_path_query(path_and_query: &str) -> (&str, Option<&str>) {
    match path_and_query.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (path_and_query, None),
    }
}

/// Parses an absolute RTSP request URI into its components.
///
/// Relative URIs (a bare path, as some clients send for requests after the
/// initial SETUP) are accepted too: `scheme` and `host` are left empty.
pub fn parse_rtsp_url(uri: &str) -> Result<UrlParts> {
    if let Some(rest) = uri.strip_prefix('/') {
        let (path, query) = split_path_query(rest);
        return Ok(UrlParts {
            scheme: String::new(),
            user: None,
            host: String::new(),
            path: format!("/{path}"),
            query: query.map(str::to_string),
        });
    }

    let (scheme, rest) = uri
        .split_once("://")
        .ok_or_else(|| RtspError::Parse {
            kind: ParseErrorKind::InvalidRequestLine,
        })?;

    let (authority, path_and_query) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, "/"),
    };

    let (user, host) = match authority.rsplit_once('@') {
        Some((user, host)) => (Some(user.to_string()), host.to_string()),
        None => (None, authority.to_string()),
    };

    let (path, query) = split_path_query(path_and_query);

    Ok(UrlParts {
        scheme: scheme.to_string(),
        user,
        host,
        path: path.to_string(),
        query: query.map(str::to_string),
    })
}
