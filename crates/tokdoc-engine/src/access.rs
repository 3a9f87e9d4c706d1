use std::fmt;

use sha2::{Digest, Sha256};
use tokdoc_protocol::{DataMethod, Request};

/// Outcome of checking a request's credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    Allowed,
    MissingKey,
    InvalidKey,
}

/// Derives and checks per-user access keys.
///
/// A key is `hex(SHA256(secret || email))`. Nothing is stored: every check
/// recomputes the key, so keys never expire and rotating the secret revokes
/// all of them at once.
pub struct AccessController {
    secret: String,
}

impl AccessController {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn derive_key(&self, email: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update(email.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// AUTH and EXIT pass unconditionally. Every other method needs an
    /// `ACCESS_KEY` header matching the key derived from `USER`.
    pub fn authorize(&self, request: &Request) -> AuthDecision {
        let data = match request {
            Request::Auth { .. } | Request::Exit { .. } => return AuthDecision::Allowed,
            Request::Data(data) if data.method == DataMethod::Exit => return AuthDecision::Allowed,
            Request::Data(data) => data,
        };

        let Some(presented) = data.headers.access_key.as_deref() else {
            return AuthDecision::MissingKey;
        };
        match data.headers.user.as_deref() {
            Some(user) if self.derive_key(user) == presented => AuthDecision::Allowed,
            _ => AuthDecision::InvalidKey,
        }
    }
}

impl fmt::Debug for AccessController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessController")
            .field("secret", &"<redacted>")
            .finish()
    }
}
