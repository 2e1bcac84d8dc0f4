//! Display forms for chart paths and clone remotes that are safe to log.

use std::path::Path;

use crate::version::CHART_DESCRIPTOR;

const MASK: &str = "****";

/// Name a chart is logged under: the directory holding its descriptor.
///
/// Accepts either the descriptor path or the chart directory. The workspace
/// prefix is dropped so log lines don't expose the server's layout.
pub fn chart_label(path: &Path) -> String {
    let dir = match path.file_name() {
        Some(name) if name == CHART_DESCRIPTOR => path.parent(),
        _ => Some(path),
    };
    dir.and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "<unknown>".to_string())
}

/// Masks the token in an authenticated clone remote.
///
/// Only the userinfo of the authority is replaced, so an `@` further along
/// the path is left alone. Remotes without a scheme (scp-style) carry no
/// token and are returned as-is.
pub fn mask_remote(remote: &str) -> String {
    let Some((scheme, rest)) = remote.split_once("://") else {
        return remote.to_string();
    };
    let (authority, path) = rest.split_at(rest.find('/').unwrap_or(rest.len()));

    match authority.rsplit_once('@') {
        Some((_, host)) => format!("{}://{}@{}{}", scheme, MASK, host, path),
        None => remote.to_string(),
    }
}

/// Replaces every occurrence of `secret` in `text` with `****`.
///
/// Used on subprocess output, which may echo the authenticated remote URL.
pub fn redact_secret(text: &str, secret: &str) -> String {
    if secret.is_empty() {
        return text.to_string();
    }
    text.replace(secret, MASK)
}
