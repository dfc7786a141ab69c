//! HTTP 接口层

mod error;
mod handlers;
mod health;
mod state;

use std::time::Duration;

use axum::Router;
use axum::routing::get;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use handlers::{CreatedResponse, MessageResponse};
pub use health::{
    ConnectivityResponse, ConnectivityTargets, HealthResponse, NodeReport, NodeStatus,
};
pub use state::AppState;

/// 构建路由
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route(
            "/books",
            get(handlers::list_books).post(handlers::create_book),
        )
        .route(
            "/books/{id}",
            get(handlers::get_book)
                .put(handlers::update_book)
                .delete(handlers::delete_book),
        )
        .route("/health", get(health::health_check))
        .route("/connectivity/store", get(health::store_connectivity))
        .route("/metrics", get(health::render_metrics))
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
}
