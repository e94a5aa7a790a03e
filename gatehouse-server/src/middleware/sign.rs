//! Request signature verification
//!
//! Clients sign four header values with a shared secret:
//!
//! ```text
//! canonical = sort_by_lowercase_name([AppKey, AppVersion, Nonce, Timestamp])
//!                 .map(|(name, value)| name + value)
//!                 .concat() + app_secret
//! Sign      = upper(hex(md5(canonical)))
//! ```
//!
//! MD5 is kept only because existing clients compute it; a stronger keyed
//! digest should replace it if compatibility is ever dropped. Nonce and
//! timestamp are signed but not checked for freshness or reuse.

use std::fmt;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

use gatehouse_core::ApiSignConfig;

use crate::http::ApiError;

pub const HEADER_TIMESTAMP: &str = "Timestamp";
pub const HEADER_NONCE: &str = "Nonce";
pub const HEADER_SIGN: &str = "Sign";
pub const HEADER_APP_VERSION: &str = "App-Version";

const REQUIRED_HEADERS: [&str; 4] = [HEADER_TIMESTAMP, HEADER_NONCE, HEADER_SIGN, HEADER_APP_VERSION];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignError {
    #[error("missing header {0}")]
    MissingHeader(&'static str),

    #[error("signature mismatch")]
    Mismatch,
}

impl From<SignError> for ApiError {
    fn from(_: SignError) -> Self {
        ApiError::BadRequest
    }
}

/// Build the canonical input: fields sorted by lowercase name, each written
/// as `name || value`, followed by `secret`. Values are raw header bytes and
/// need not be ASCII.
pub fn canonical_bytes(fields: &[(&str, &[u8])], secret: &str) -> Vec<u8> {
    let mut sorted = fields.to_vec();
    sorted.sort_by_cached_key(|(name, _)| name.to_lowercase());

    let mut out = Vec::new();
    for (name, value) in sorted {
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(value);
    }
    out.extend_from_slice(secret.as_bytes());
    out
}

/// Uppercase hex MD5 of `canonical`.
pub fn digest(canonical: &[u8]) -> String {
    format!("{:x}", md5::compute(canonical)).to_uppercase()
}

/// Holds the server-side key material
#[derive(Clone)]
pub struct Signer {
    app_key: String,
    app_secret: String,
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("app_key", &self.app_key)
            .field("app_secret", &"<redacted>")
            .finish()
    }
}

impl Signer {
    pub fn new(conf: &ApiSignConfig) -> Self {
        Self {
            app_key: conf.app_key.clone(),
            app_secret: conf.app_secret.clone(),
        }
    }

    /// Expected `Sign` value for the given header values.
    pub fn sign(&self, timestamp: &str, nonce: &str, app_version: &str) -> String {
        self.sign_bytes(timestamp.as_bytes(), nonce.as_bytes(), app_version.as_bytes())
    }

    fn sign_bytes(&self, timestamp: &[u8], nonce: &[u8], app_version: &[u8]) -> String {
        let fields = [
            ("AppKey", self.app_key.as_bytes()),
            ("Timestamp", timestamp),
            ("Nonce", nonce),
            ("AppVersion", app_version),
        ];
        digest(&canonical_bytes(&fields, &self.app_secret))
    }

    /// Check presence of all required headers, then the signature.
    pub fn verify(&self, headers: &HeaderMap) -> Result<(), SignError> {
        for name in REQUIRED_HEADERS {
            if !headers.contains_key(name) {
                return Err(SignError::MissingHeader(name));
            }
        }

        let expected = self.sign_bytes(
            header(headers, HEADER_TIMESTAMP)?,
            header(headers, HEADER_NONCE)?,
            header(headers, HEADER_APP_VERSION)?,
        );

        if header(headers, HEADER_SIGN)? != expected.as_bytes() {
            return Err(SignError::Mismatch);
        }
        Ok(())
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a [u8], SignError> {
    headers
        .get(name)
        .map(|value| value.as_bytes())
        .ok_or(SignError::MissingHeader(name))
}

/// Axum middleware: reject with 400 unless the request is correctly signed.
pub async fn sign_middleware(
    State(signer): State<Arc<Signer>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Err(e) = signer.verify(request.headers()) {
        tracing::debug!(error = %e, path = %request.uri().path(), "request signature rejected");
        return Err(e.into());
    }
    Ok(next.run(request).await)
}
