//! HTTP surface of the helpdesk: the inbound-email webhook plus operator
//! endpoints for the knowledge base, email provider and accounts.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::Config;
pub use state::AppState;

use axum::Router;
use tower_http::trace::TraceLayer;

pub fn app(state: AppState) -> Router {
    routes::router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
