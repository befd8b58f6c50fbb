/*
 * Responsibility
 * - GET /protected
 * - Only reached after the gate has a `Valid` verdict from the authority
 */
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ProtectedResponse {
    pub message: &'static str,
}

pub async fn protected() -> Json<ProtectedResponse> {
    Json(ProtectedResponse {
        message: "This is a protected route",
    })
}
