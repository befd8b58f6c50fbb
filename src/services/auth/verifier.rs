//! Key verification contract consumed by the auth gate.
use std::{fmt, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;

/// Opaque API key as presented by the caller.
///
/// No structure is assumed. `Debug` only prints a short prefix so the key
/// cannot leak through `?` formatting in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First four characters, for log correlation.
    pub fn hint(&self) -> String {
        let prefix: String = self.0.chars().take(4).collect();
        format!("{prefix}...")
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&self.hint()).finish()
    }
}

/// One verification call: which key, checked against which namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationRequest {
    pub credential: Credential,
    pub authority_scope: Arc<str>,
}

impl VerificationRequest {
    pub fn new(credential: Credential, authority_scope: Arc<str>) -> Self {
        Self {
            credential,
            authority_scope,
        }
    }
}

/// A definitive answer from the authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    // `code` is the authority's reason (NOT_FOUND, EXPIRED, ...), for logs only.
    Invalid { code: Option<String> },
}

/// The verification call itself failed; no verdict was obtained.
///
/// Kept separate from `AppError`: the gate decides how to fail (closed).
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("authority transport error: {0}")]
    Transport(String),
    #[error("authority request timed out")]
    Timeout,
    #[error("authority returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("authority response could not be decoded: {0}")]
    Decode(String),
}

impl VerifyError {
    /// Worth another attempt: the authority may answer next time.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for VerifyError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Outcome of one verification as seen by the gate.
#[derive(Debug)]
pub enum VerificationResult {
    Valid,
    Invalid { code: Option<String> },
    AuthorityError(VerifyError),
}

impl From<Result<Verdict, VerifyError>> for VerificationResult {
    fn from(res: Result<Verdict, VerifyError>) -> Self {
        match res {
            Ok(Verdict::Valid) => Self::Valid,
            Ok(Verdict::Invalid { code }) => Self::Invalid { code },
            Err(e) => Self::AuthorityError(e),
        }
    }
}

/// Remote key authority.
///
/// Implementations own their timeout and retry policy. A well-formed
/// "this key is not valid" answer is `Ok(Verdict::Invalid)`, never `Err`.
#[async_trait]
pub trait KeyVerifier: Send + Sync + 'static {
    // Backend name (for logging).
    fn backend_name(&self) -> &'static str;

    async fn verify(&self, request: &VerificationRequest) -> Result<Verdict, VerifyError>;
}
