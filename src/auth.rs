// Copyright 2024-2025 rpcclient contributors
// This file is dual-licensed as Apache-2.0 or MIT.
// see LICENSE for license details.

//! Credential resolution: either a direct user/pass pair, or a cookie file
//! that is re-read when its mtime changes, with a short cache window so we
//! don't `stat()` on every single request.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Instant, SystemTime};

use base64::Engine;

use crate::error::Error;

/// How a client should authenticate itself to the node.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// A directly-supplied username and password.
    UserPass {
        /// The username.
        user: String,
        /// The password.
        pass: String,
    },
    /// A cookie file, as written by nodes that support cookie-based auth.
    /// The file contains a single line `user:pass`.
    CookieFile(PathBuf),
}

struct CachedCookie {
    user: String,
    pass: String,
    mtime: SystemTime,
    checked_at: Instant,
}

/// How long we trust a cookie's mtime before re-`stat`-ing the file.
const COOKIE_CACHE_WINDOW: std::time::Duration = std::time::Duration::from_secs(30);

/// Resolves [`Credentials`] into a `user:pass` pair, caching cookie-file
/// reads for [`COOKIE_CACHE_WINDOW`] between stat checks.
pub struct CredentialProvider {
    credentials: Credentials,
    cached: Mutex<Option<CachedCookie>>,
}

impl CredentialProvider {
    /// Wrap a set of credentials for resolution.
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            cached: Mutex::new(None),
        }
    }

    /// Resolve the current `user:pass` pair, re-reading a cookie file if
    /// its mtime has changed since the last read and the cache window has
    /// elapsed.
    pub fn resolve(&self) -> Result<(String, String), Error> {
        match &self.credentials {
            Credentials::UserPass { user, pass } => Ok((user.clone(), pass.clone())),
            Credentials::CookieFile(path) => self.resolve_cookie(path),
        }
    }

    fn resolve_cookie(&self, path: &PathBuf) -> Result<(String, String), Error> {
        let mut cached = self.cached.lock().unwrap();

        if let Some(c) = cached.as_ref() {
            if c.checked_at.elapsed() < COOKIE_CACHE_WINDOW {
                return Ok((c.user.clone(), c.pass.clone()));
            }
        }

        let metadata = std::fs::metadata(path)
            .map_err(|e| Error::InvalidAuth(format!("cannot stat cookie file: {e}")))?;
        let mtime = metadata
            .modified()
            .map_err(|e| Error::InvalidAuth(format!("cannot read cookie mtime: {e}")))?;

        if let Some(c) = cached.as_ref() {
            if c.mtime == mtime {
                let refreshed = CachedCookie {
                    user: c.user.clone(),
                    pass: c.pass.clone(),
                    mtime,
                    checked_at: Instant::now(),
                };
                let pair = (refreshed.user.clone(), refreshed.pass.clone());
                *cached = Some(refreshed);
                return Ok(pair);
            }
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::InvalidAuth(format!("cannot read cookie file: {e}")))?;
        let (user, pass) = contents
            .trim()
            .split_once(':')
            .ok_or_else(|| Error::InvalidAuth("cookie file must contain 'user:pass'".into()))?;

        *cached = Some(CachedCookie {
            user: user.to_string(),
            pass: pass.to_string(),
            mtime,
            checked_at: Instant::now(),
        });

        Ok((user.to_string(), pass.to_string()))
    }
}

/// Build the `Authorization: Basic ...` header value for `user`/`pass`.
pub fn basic_auth_header(user: &str, pass: &str) -> String {
    let raw = format!("{user}:{pass}");
    let encoded = base64::engine::general_purpose::STANDARD.encode(raw);
    format!("Basic {encoded}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn user_pass_resolves_directly() {
        let creds = CredentialProvider::new(Credentials::UserPass {
            user: "alice".into(),
            pass: "hunter2".into(),
        });
        assert_eq!(creds.resolve().unwrap(), ("alice".into(), "hunter2".into()));
    }

    #[test]
    fn cookie_file_is_parsed_and_cached() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bob:secret").unwrap();
        let creds = CredentialProvider::new(Credentials::CookieFile(file.path().to_path_buf()));
        assert_eq!(creds.resolve().unwrap(), ("bob".into(), "secret".into()));
        // Cached read should also succeed without the file changing.
        assert_eq!(creds.resolve().unwrap(), ("bob".into(), "secret".into()));
    }

    #[test]
    fn missing_cookie_file_is_an_auth_error() {
        let creds = CredentialProvider::new(Credentials::CookieFile("/nonexistent/.cookie".into()));
        assert!(creds.resolve().is_err());
    }

    #[test]
    fn basic_auth_header_matches_rfc() {
        // "Aladdin:open sesame" is the canonical RFC 7617 example.
        assert_eq!(
            basic_auth_header("Aladdin", "open sesame"),
            "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ=="
        );
    }
}
