//! Request gate: per-request authentication filter in front of the
//! front-end application.
//!
//! For every request the gate lands in exactly one state:
//!
//! | state             | condition                               | action              |
//! |-------------------|-----------------------------------------|---------------------|
//! | `Public`          | path is public                          | pass through        |
//! | `Unauthenticated` | protected path, no verified token       | redirect to login   |
//! | `AuthExpired`     | token carries the refresh-failure mark  | redirect to logout  |
//! | `Authenticated`   | token verified, no failure mark         | pass through        |
//!
//! Nothing is remembered between requests.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use serde::Serialize;

use crate::config::Config;
use crate::middleware::callback::{RedirectBuilder, RequestTarget};
use crate::middleware::metrics;
use crate::middleware::paths::PathClassifier;
use crate::middleware::jwe::JweVerifier;
use crate::middleware::token::{
    CookieCandidate, JwtVerifier, TokenFormat, TokenResolver, TokenVerifier,
};
use crate::models::session::SessionToken;
use crate::server::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    Public,
    Unauthenticated,
    Authenticated,
    AuthExpired,
}

impl GateState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateState::Public => "public",
            GateState::Unauthenticated => "unauthenticated",
            GateState::Authenticated => "authenticated",
            GateState::AuthExpired => "auth_expired",
        }
    }
}

/// Outcome of evaluating one request.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GateDecision {
    Public,
    Unauthenticated { location: String },
    Authenticated { session: SessionToken },
    AuthExpired { location: String },
}

impl GateDecision {
    pub fn state(&self) -> GateState {
        match self {
            GateDecision::Public => GateState::Public,
            GateDecision::Unauthenticated { .. } => GateState::Unauthenticated,
            GateDecision::Authenticated { .. } => GateState::Authenticated,
            GateDecision::AuthExpired { .. } => GateState::AuthExpired,
        }
    }

    /// Redirect target, `None` for pass-through decisions.
    pub fn location(&self) -> Option<&str> {
        match self {
            GateDecision::Unauthenticated { location } | GateDecision::AuthExpired { location } => {
                Some(location)
            }
            _ => None,
        }
    }
}

pub struct Gate {
    classifier: PathClassifier,
    resolver: TokenResolver,
    redirects: RedirectBuilder,
}

impl Gate {
    pub fn new(classifier: PathClassifier, resolver: TokenResolver, redirects: RedirectBuilder) -> Self {
        Self {
            classifier,
            resolver,
            redirects,
        }
    }

    /// Gate wired from configuration with the cookie verifier matching
    /// `cfg.token_format`.
    pub fn from_config(cfg: &Config) -> Self {
        let secret = cfg.auth_secret.as_bytes();
        let verifier: Arc<dyn TokenVerifier> = match cfg.token_format {
            TokenFormat::Jwe => Arc::new(JweVerifier::from_secret(secret)),
            TokenFormat::Jws => Arc::new(JwtVerifier::new(secret)),
        };
        Self::with_verifier(cfg, verifier)
    }

    /// Gate wired from configuration around any verifier.
    pub fn with_verifier(cfg: &Config, verifier: Arc<dyn TokenVerifier>) -> Self {
        let classifier = PathClassifier::with_extra(
            cfg.public_paths
                .iter()
                .map(String::as_str)
                .chain([cfg.login_path.as_str(), cfg.logout_path.as_str()]),
        );
        let candidates = cfg
            .session_cookies
            .iter()
            .map(CookieCandidate::new)
            .collect();
        let resolver = TokenResolver::new(candidates, verifier);
        let redirects = RedirectBuilder::new(
            cfg.public_origin.as_deref(),
            cfg.login_path.clone(),
            cfg.logout_path.clone(),
        );
        Self::new(classifier, resolver, redirects)
    }

    pub fn classifier(&self) -> &PathClassifier {
        &self.classifier
    }

    pub fn resolver(&self) -> &TokenResolver {
        &self.resolver
    }

    pub fn redirects(&self) -> &RedirectBuilder {
        &self.redirects
    }

    pub async fn evaluate(&self, target: &RequestTarget, headers: &HeaderMap) -> GateDecision {
        let decision = self.decide(target, headers).await;
        metrics::record_decision(decision.state());

        match decision.location() {
            Some(location) => tracing::info!(
                path = %target.path,
                state = decision.state().as_str(),
                location = %location,
                "gate redirect"
            ),
            None => tracing::debug!(
                path = %target.path,
                state = decision.state().as_str(),
                "gate pass"
            ),
        }
        decision
    }

    async fn decide(&self, target: &RequestTarget, headers: &HeaderMap) -> GateDecision {
        if self.classifier.is_public(&target.path) {
            return GateDecision::Public;
        }

        match self.resolver.resolve(headers).await {
            None => GateDecision::Unauthenticated {
                location: self.redirects.login_location(target, headers),
            },
            Some(session) if session.refresh_failed() => GateDecision::AuthExpired {
                location: self.redirects.logout_location(),
            },
            Some(session) => GateDecision::Authenticated { session },
        }
    }
}

/// Middleware: runs the gate on matched routes. Authenticated sessions are
/// attached to the request extensions for downstream handlers.
pub async fn enforce(State(state): State<Arc<AppState>>, mut req: Request, next: Next) -> Response {
    if !state.matcher.applies(req.uri().path()) {
        return next.run(req).await;
    }

    let target = RequestTarget::from_uri(req.uri());
    match state.gate.evaluate(&target, req.headers()).await {
        GateDecision::Public => next.run(req).await,
        GateDecision::Authenticated { session } => {
            req.extensions_mut().insert(session);
            next.run(req).await
        }
        GateDecision::Unauthenticated { location } | GateDecision::AuthExpired { location } => {
            Redirect::temporary(&location).into_response()
        }
    }
}
