//! Session token resolution.
//!
//! A session may live under several cookie names: secure (`__Secure-`)
//! and plain variants, for both the current `authjs` and the legacy
//! `next-auth` naming. Candidates are tried in order and the first one
//! that verifies wins. A candidate that fails verification is skipped,
//! never fatal.
//!
//! Tokens that outgrow a single cookie are split into `<name>.0`,
//! `<name>.1`, ... chunks which are concatenated back in order.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use axum::http::HeaderMap;
use axum_extra::extract::CookieJar;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use thiserror::Error;

use crate::middleware::metrics;
use crate::models::session::SessionToken;

/// Upper bound on chunk cookies read for a single candidate.
const MAX_COOKIE_CHUNKS: usize = 16;

/// Default candidates, secure before plain, current before legacy.
pub const DEFAULT_SESSION_COOKIES: &[&str] = &[
    "__Secure-authjs.session-token",
    "authjs.session-token",
    "__Secure-next-auth.session-token",
    "next-auth.session-token",
];

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("malformed session token")]
    Malformed,

    #[error("session token signature mismatch")]
    InvalidSignature,

    #[error("session token expired")]
    Expired,

    #[error("session token could not be decrypted")]
    Undecryptable,

    #[error("unsupported session token: {0}")]
    Unsupported(String),

    #[error("session token rejected: {0}")]
    Jwt(jsonwebtoken::errors::Error),
}

impl From<jsonwebtoken::errors::Error> for VerifyError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::ExpiredSignature => VerifyError::Expired,
            ErrorKind::InvalidSignature => VerifyError::InvalidSignature,
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => VerifyError::Malformed,
            _ => VerifyError::Jwt(e),
        }
    }
}

/// How session cookies are protected: encrypted (`jwe`, the identity
/// layer's default) or signed with HS256 (`jws`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenFormat {
    #[default]
    Jwe,
    Jws,
}

impl std::str::FromStr for TokenFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jwe" => Ok(TokenFormat::Jwe),
            "jws" | "jwt" => Ok(TokenFormat::Jws),
            other => anyhow::bail!("unknown token format '{}', expected jwe or jws", other),
        }
    }
}

/// Turns a raw cookie value into a verified session token.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, raw: &str) -> Result<SessionToken, VerifyError>;
}

/// HS256 verifier keyed by the shared auth secret.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_aud = false;
        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify(&self, raw: &str) -> Result<SessionToken, VerifyError> {
        if raw.split('.').count() != 3 {
            return Err(VerifyError::Malformed);
        }
        let data = jsonwebtoken::decode::<SessionToken>(raw, &self.key, &self.validation)?;
        Ok(data.claims)
    }
}

/// One cookie name the resolver probes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieCandidate {
    pub name: String,
    /// Name carries the `__Secure-` prefix, so browsers only send it over https.
    pub secure: bool,
}

impl CookieCandidate {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let secure = name.starts_with("__Secure-");
        Self { name, secure }
    }

    /// Exact cookie if present, otherwise the in-order concatenation of its
    /// numbered chunks. `None` when neither exists.
    pub fn read(&self, jar: &CookieJar) -> Option<String> {
        if let Some(c) = jar.get(&self.name) {
            return Some(c.value().to_string());
        }

        let mut joined = String::new();
        for i in 0..MAX_COOKIE_CHUNKS {
            match jar.get(&format!("{}.{}", self.name, i)) {
                Some(c) => joined.push_str(c.value()),
                None => break,
            }
        }
        if joined.is_empty() {
            None
        } else {
            Some(joined)
        }
    }
}

pub fn default_candidates() -> Vec<CookieCandidate> {
    DEFAULT_SESSION_COOKIES
        .iter()
        .map(|n| CookieCandidate::new(*n))
        .collect()
}

/// Ordered candidate list plus the verifier applied to each.
#[derive(Clone)]
pub struct TokenResolver {
    candidates: Vec<CookieCandidate>,
    verifier: Arc<dyn TokenVerifier>,
}

impl TokenResolver {
    pub fn new(candidates: Vec<CookieCandidate>, verifier: Arc<dyn TokenVerifier>) -> Self {
        Self {
            candidates,
            verifier,
        }
    }

    pub fn candidates(&self) -> &[CookieCandidate] {
        &self.candidates
    }

    /// First candidate that verifies, or `None` (unauthenticated).
    pub async fn resolve(&self, headers: &HeaderMap) -> Option<SessionToken> {
        let jar = CookieJar::from_headers(headers);

        for candidate in &self.candidates {
            let Some(raw) = candidate.read(&jar) else {
                continue;
            };

            let started = Instant::now();
            let result = self.verifier.verify(&raw).await;
            metrics::observe_verify(started.elapsed());

            match result {
                Ok(token) => {
                    tracing::debug!(cookie = %candidate.name, "session token verified");
                    return Some(token);
                }
                Err(e) => {
                    tracing::debug!(cookie = %candidate.name, error = %e, "session cookie rejected, trying next");
                }
            }
        }

        None
    }
}
