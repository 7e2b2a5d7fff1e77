//! HTTP Basic authorization.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use headers::authorization::{Authorization, Basic};
use headers::HeaderMapExt;
use http::header::HeaderMap;
use serde::{Deserialize, Serialize};

/// Username and password accepted by the server.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Value for an `Authorization` header carrying these credentials.
    pub fn to_header_value(&self) -> String {
        let token = STANDARD.encode(format!("{}:{}", self.username, self.password));
        format!("Basic {}", token)
    }
}

/// True when the request may proceed.
///
/// With no credentials configured every request passes.
pub fn is_authorized(expected: Option<&Credentials>, headers: &HeaderMap) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    let Some(given) = headers.typed_get::<Authorization<Basic>>() else {
        return false;
    };
    // Both halves are always compared
    let user_ok = constant_time_eq(given.username().as_bytes(), expected.username.as_bytes());
    let pass_ok = constant_time_eq(given.password().as_bytes(), expected.password.as_bytes());
    user_ok & pass_ok
}

/// Byte equality whose running time depends only on the input lengths.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let len = a.len().max(b.len());
    let mut diff = (a.len() ^ b.len()) as u64;
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= u64::from(x ^ y);
    }
    std::hint::black_box(diff) == 0
}
