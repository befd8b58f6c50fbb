use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::UnkeyConfig;
use crate::services::auth::verifier::{KeyVerifier, Verdict, VerificationRequest, VerifyError};

// Base delay between retries (doubles each attempt: 100ms, 200ms, 400ms...).
const BASE_DELAY_MS: u64 = 100;
// Error bodies are only kept for logs; cap what we hold on to.
const MAX_ERROR_BODY_LEN: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum UnkeySetupError {
    #[error("UNKEY_BASE_URL cannot be used as a base url")]
    BaseUrl,
    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Debug, Serialize)]
struct VerifyKeyRequest<'a> {
    key: &'a str,
    #[serde(rename = "apiId")]
    api_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct VerifyKeyResponse {
    valid: bool,
    #[serde(default)]
    code: Option<String>,
}

/// Unkey-backed key verifier (`POST /v1/keys.verifyKey`).
///
/// Timeout and retry live here, not in the gate: every attempt is bounded by
/// the client timeout, and transient failures (transport errors, timeouts,
/// 5xx) are retried up to `max_retries` times with exponential backoff.
#[derive(Clone)]
pub struct UnkeyClient {
    http: reqwest::Client,
    verify_url: Url,
    root_key: String,
    max_retries: u32,
}

impl std::fmt::Debug for UnkeyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Do not print the root key
        f.debug_struct("UnkeyClient")
            .field("verify_url", &self.verify_url.as_str())
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl UnkeyClient {
    pub fn new(config: &UnkeyConfig) -> Result<Self, UnkeySetupError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;

        let mut verify_url = config.base_url.clone();
        verify_url
            .path_segments_mut()
            .map_err(|_| UnkeySetupError::BaseUrl)?
            .pop_if_empty()
            .extend(["v1", "keys.verifyKey"]);

        Ok(Self {
            http,
            verify_url,
            root_key: config.root_key.clone(),
            max_retries: config.max_retries,
        })
    }

    pub fn verify_url(&self) -> &Url {
        &self.verify_url
    }

    async fn verify_once(&self, body: &VerifyKeyRequest<'_>) -> Result<Verdict, VerifyError> {
        let res = self
            .http
            .post(self.verify_url.clone())
            .bearer_auth(&self.root_key)
            .json(body)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let mut body = res.text().await.unwrap_or_default();
            body.truncate(floor_char_boundary(&body, MAX_ERROR_BODY_LEN));
            return Err(VerifyError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let reply: VerifyKeyResponse = res.json().await?;

        if reply.valid {
            Ok(Verdict::Valid)
        } else {
            Ok(Verdict::Invalid { code: reply.code })
        }
    }
}

#[async_trait]
impl KeyVerifier for UnkeyClient {
    fn backend_name(&self) -> &'static str {
        "unkey"
    }

    async fn verify(&self, request: &VerificationRequest) -> Result<Verdict, VerifyError> {
        let body = VerifyKeyRequest {
            key: request.credential.as_str(),
            api_id: &request.authority_scope,
        };

        let mut attempt = 0;
        loop {
            match self.verify_once(&body).await {
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    let delay = backoff(attempt);
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        error = %err,
                        "unkey verification failed, retrying in {delay:?}"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(BASE_DELAY_MS << attempt.min(6))
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    (0..=max).rev().find(|&i| s.is_char_boundary(i)).unwrap_or(0)
}
