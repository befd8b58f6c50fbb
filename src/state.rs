/*
 * Responsibility
 * - Shared context attached to the Router (AppState)
 * - Built once at startup from Config; read-only afterwards
 * - Clone is cheap (Arc inside)
 */
use crate::middleware::auth::AuthGate;

#[derive(Clone, Debug)]
pub struct AppState {
    pub gate: AuthGate,
}

impl AppState {
    pub fn new(gate: AuthGate) -> Self {
        Self { gate }
    }
}
