//! Manager password discovery.
//!
//! When running on the Asterisk host as a user that can read
//! `manager.conf`, the password does not need to be passed on the command
//! line: it is taken from the `secret` of the user's section.

use std::net::IpAddr;
use std::path::Path;

use crate::error::CredentialError;

pub const DEFAULT_MANAGER_CONF: &str = "/etc/asterisk/manager.conf";

/// True for `localhost` and any loopback IP literal.
pub fn is_loopback(host: &str) -> bool {
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    let literal = host.trim_start_matches('[').trim_end_matches(']');
    literal.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

/// Pick the password to log in with.
///
/// An explicit password always wins. Otherwise the secret is read from
/// `manager_conf`, but only for loopback hosts.
pub fn resolve_secret(
    host: &str,
    username: &str,
    password: Option<&str>,
    manager_conf: &Path,
) -> Result<String, CredentialError> {
    if username.is_empty() {
        return Err(CredentialError::MissingUsername);
    }
    if let Some(password) = password.filter(|p| !p.is_empty()) {
        return Ok(password.to_owned());
    }
    if !is_loopback(host) {
        return Err(CredentialError::RemoteHost(host.to_owned()));
    }

    let content =
        std::fs::read_to_string(manager_conf).map_err(|source| CredentialError::Unreadable {
            path: manager_conf.to_path_buf(),
            source,
        })?;

    match lookup_secret(&content, username) {
        Some(secret) => {
            tracing::debug!(
                "using manager secret for {username} from {}",
                manager_conf.display()
            );
            Ok(secret)
        }
        None => Err(CredentialError::NotFound {
            username: username.to_owned(),
            path: manager_conf.to_path_buf(),
        }),
    }
}

/// Find `secret` in the `[username]` section of a manager.conf body.
///
/// Understands `;` comments, `[name](template)` headers and both `=` and
/// `=>` assignments. The first non-empty secret in the section wins.
pub fn lookup_secret(content: &str, username: &str) -> Option<String> {
    let mut in_section = false;

    for line in content.lines() {
        let line = strip_comment(line).trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix('[') {
            in_section = rest
                .split_once(']')
                .is_some_and(|(name, _)| name.trim() == username);
            continue;
        }

        if !in_section {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.strip_prefix('>').unwrap_or(value).trim();
        if key.trim().eq_ignore_ascii_case("secret") && !value.is_empty() {
            return Some(value.to_owned());
        }
    }

    None
}

fn strip_comment(line: &str) -> &str {
    match line.find(';') {
        Some(pos) => &line[..pos],
        None => line,
    }
}
