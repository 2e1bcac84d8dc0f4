//! Remote URL construction for token-authenticated git operations.

use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};

/// Builds `https://<token>@<host>/<repository>.git`.
///
/// The token travels in the URL userinfo, so the result must only be handed to
/// git and never logged; use [`crate::sanitize::mask_remote`] for display.
pub fn authenticated_url(host: &str, repository: &str, token: &SecretString) -> String {
    let repository = repository.trim_matches('/').trim_end_matches(".git");
    let token = token.expose_secret();

    if token.is_empty() {
        format!("https://{}/{}.git", host, repository)
    } else {
        format!("https://{}@{}/{}.git", token, host, repository)
    }
}

/// Directory under `working_dir` holding the working copy of `repository`.
///
/// `owner/name` maps to `owner__name`; anything outside `[A-Za-z0-9._-]`
/// becomes `_` so the identifier can never escape `working_dir`.
pub fn working_copy_dir(working_dir: &Path, repository: &str) -> PathBuf {
    let name: String = repository
        .trim_matches('/')
        .replace('/', "__")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let name = match name.as_str() {
        "" | "." | ".." => format!("_{}", name),
        _ => name,
    };

    working_dir.join(name)
}
