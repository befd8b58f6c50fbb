/*
 * Responsibility
 * - middleware public interface (re-export)
 * - auth: API key gate for protected routes
 * - http: request-id / access log / limits for everything
 */
pub mod auth;
pub mod http;
