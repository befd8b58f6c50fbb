//! API key gate: extract -> verify with the authority -> proceed or reject.
//!
//! Per request:
//! - no credential => 401, the authority is never called
//! - authority says valid => the wrapped handler runs, its response is untouched
//! - authority says invalid => 403
//! - authority unreachable / faulting => 403 as well (fail-closed), but logged as
//!   `authority_fault` at error level and tagged on the response for the access log
//!
//! The gate holds no state between requests and never retries; retry and timeout
//! belong to the `KeyVerifier` implementation.

use std::{fmt, sync::Arc};

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderValue, Request, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
};

use crate::error::AppError;
use crate::middleware::auth::extract_bearer;
use crate::services::auth::{KeyVerifier, VerificationRequest, VerificationResult};
use crate::state::AppState;

/// Why a request was turned away.
///
/// Inserted into the rejection response's extensions so outer layers can tell
/// an attacker-shaped rejection from an infrastructure fault. Never serialized
/// to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    MissingCredential,
    RejectedCredential,
    AuthorityFault,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingCredential => "missing_credential",
            Self::RejectedCredential => "rejected_credential",
            Self::AuthorityFault => "authority_fault",
        }
    }
}

impl From<RejectReason> for AppError {
    fn from(reason: RejectReason) -> Self {
        match reason {
            RejectReason::MissingCredential => AppError::Unauthorized,
            // Fail-closed: a faulting authority looks exactly like a rejection.
            RejectReason::RejectedCredential | RejectReason::AuthorityFault => AppError::Forbidden,
        }
    }
}

impl IntoResponse for RejectReason {
    fn into_response(self) -> Response {
        let mut res = AppError::from(self).into_response();
        res.extensions_mut().insert(self);
        res
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Proceed,
    Reject(RejectReason),
}

#[derive(Clone)]
pub struct AuthGate {
    verifier: Arc<dyn KeyVerifier>,
    // Authority scope (Unkey API id), fixed at startup.
    api_id: Arc<str>,
}

impl fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthGate")
            .field("verifier", &self.verifier.backend_name())
            .field("api_id", &self.api_id)
            .finish()
    }
}

impl AuthGate {
    pub fn new(verifier: Arc<dyn KeyVerifier>, api_id: impl Into<Arc<str>>) -> Self {
        Self {
            verifier,
            api_id: api_id.into(),
        }
    }

    /// Decide whether a request carrying `authorization` may proceed.
    pub async fn decide(&self, authorization: Option<&HeaderValue>) -> GateDecision {
        let Some(credential) = extract_bearer(authorization) else {
            tracing::debug!(outcome = "missing_credential", "request without api key");
            return GateDecision::Reject(RejectReason::MissingCredential);
        };

        let request = VerificationRequest::new(credential, self.api_id.clone());

        match VerificationResult::from(self.verifier.verify(&request).await) {
            VerificationResult::Valid => {
                tracing::debug!(
                    outcome = "valid",
                    key = %request.credential.hint(),
                    "api key accepted"
                );
                GateDecision::Proceed
            }
            VerificationResult::Invalid { code } => {
                tracing::info!(
                    outcome = RejectReason::RejectedCredential.as_str(),
                    key = %request.credential.hint(),
                    code = code.as_deref().unwrap_or("-"),
                    "api key rejected by authority"
                );
                GateDecision::Reject(RejectReason::RejectedCredential)
            }
            VerificationResult::AuthorityError(err) => {
                tracing::error!(
                    outcome = RejectReason::AuthorityFault.as_str(),
                    backend = self.verifier.backend_name(),
                    key = %request.credential.hint(),
                    error = %err,
                    "key authority unavailable, failing closed"
                );
                GateDecision::Reject(RejectReason::AuthorityFault)
            }
        }
    }
}

/// Put every route of `router` behind the API key gate.
///
/// `route_layer` so unmatched paths still 404 instead of asking for a key.
pub fn apply<S>(router: Router<S>, state: AppState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.route_layer(middleware::from_fn_with_state(state, gate_middleware))
}

async fn gate_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let authorization = req.headers().get(header::AUTHORIZATION).cloned();

    match state.gate.decide(authorization.as_ref()).await {
        GateDecision::Proceed => next.run(req).await,
        GateDecision::Reject(reason) => reason.into_response(),
    }
}
