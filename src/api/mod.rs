/*
 * Responsibility
 * - HTTP surface: handlers + URL structure (re-export routes())
 */
pub mod handlers;
mod routes;

pub use routes::routes;
