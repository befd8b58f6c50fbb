/*
 * Responsibility
 * - URL structure
 * - Decide which routes sit behind the API key gate (route_layer, per sub-router)
 */
use axum::{Router, routing::get};

use crate::api::handlers::{health::health, protected::protected, public::index};
use crate::middleware;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    let gated: Router<AppState> = Router::new().route("/protected", get(protected));
    let gated = middleware::auth::gate::apply(gated, state);

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .merge(gated)
}
