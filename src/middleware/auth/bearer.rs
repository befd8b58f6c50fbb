/*
 * Responsibility
 * - Pull the API key out of the `Authorization` header value
 * - Never rejects: "absent" is a distinct outcome, anything present goes to the authority
 */
use axum::http::HeaderValue;

use crate::services::auth::Credential;

const BEARER_PREFIX: &str = "Bearer ";

/// Extract the bearer credential from an `Authorization` header value.
///
/// - `None` header => `None`
/// - `"Bearer <token>"` => `<token>` verbatim (may be empty)
/// - no `"Bearer "` prefix => the whole value; the authority rejects it
/// - bytes outside visible ASCII => decoded as latin-1, still a credential
pub fn extract_bearer(value: Option<&HeaderValue>) -> Option<Credential> {
    let raw = decode_latin1(value?.as_bytes());
    let token = raw.strip_prefix(BEARER_PREFIX).unwrap_or(&raw);

    Some(Credential::new(token))
}

// Header values are bytes; obs-text (0x80..=0xFF) maps 1:1 onto U+0080..U+00FF.
fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}
