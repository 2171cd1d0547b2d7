//! HTTP routes.

mod auth;
mod email;
mod health;
mod knowledge;
mod status;
mod webhooks;

use crate::state::AppState;
use axum::routing::{get, patch, post};
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route(
            "/webhooks/inbound-email",
            get(webhooks::webhook_status).post(webhooks::receive_inbound),
        )
        .route("/api/status/database", get(status::database))
        .route("/api/auth/signup", post(auth::signup))
        .route("/api/test-email", get(email::email_status).post(email::send_test_email))
        .route(
            "/api/knowledge/test",
            get(knowledge::test_connection).post(knowledge::add_test_document),
        )
        .route("/api/knowledge/index", post(knowledge::create_index))
        .route(
            "/api/knowledge/documents",
            get(knowledge::list_documents).post(knowledge::add_document),
        )
        .route(
            "/api/knowledge/documents/:id",
            patch(knowledge::set_active).delete(knowledge::delete_document),
        )
        .route("/api/knowledge/search", post(knowledge::search))
}
