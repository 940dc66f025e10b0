//! API route definitions

use std::sync::Arc;
use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::{handlers, state::AppState, ServerConfig};

async fn handle_404() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": true,
            "message": "Not found. Visit /api/health to check API status.",
        })),
    )
}

async fn handle_405() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({
            "error": true,
            "message": "Method not allowed. Check the API documentation for supported methods.",
        })),
    )
}

/// Create the main application router
pub fn create_router(state: Arc<AppState>, config: &ServerConfig) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        // Datasets
        .route("/datasets", get(handlers::list_datasets).post(handlers::upload_dataset))
        .route("/datasets/:id", get(handlers::get_dataset))
        .route("/datasets/:id/columns", get(handlers::get_dataset_columns))
        .route("/datasets/:id/preview", get(handlers::get_dataset_preview))
        .route("/datasets/:id/invalidate-cache", post(handlers::invalidate_dataset_cache))
        // Models
        .route("/models", get(handlers::list_models))
        .route("/models/train", post(handlers::train_model))
        .route("/models/import", post(handlers::import_model_artifact))
        .route("/models/:id", get(handlers::get_model).delete(handlers::delete_model))
        .route("/models/:id/features", get(handlers::get_model_features))
        // Evaluation
        .route("/tests", get(handlers::list_tests).post(handlers::create_test))
        .route("/tests/:id", get(handlers::get_test).delete(handlers::delete_test))
        .route("/tests/:id/details", get(handlers::get_test_details))
        .route("/tests/:id/download", get(handlers::download_test))
        // Predictions
        .route("/predictions", get(handlers::list_predictions).post(handlers::create_prediction))
        .route("/predictions/manual", post(handlers::create_manual_prediction))
        .route("/predictions/:id", get(handlers::get_prediction).delete(handlers::delete_prediction))
        .route("/predictions/:id/download", get(handlers::download_prediction))
        .route("/predictions/:id/plot", get(handlers::get_prediction_plot))
        .fallback(handle_404)
        .method_not_allowed_fallback(handle_405);

    // CORS configured via CORS_ORIGIN env var (default: allow all)
    let cors = match std::env::var("CORS_ORIGIN") {
        Ok(origin) if !origin.is_empty() && origin != "*" => CorsLayer::new()
            .allow_origin(
                origin
                    .parse::<axum::http::HeaderValue>()
                    .unwrap_or_else(|_| axum::http::HeaderValue::from_static("*")),
            )
            .allow_methods(Any)
            .allow_headers(Any),
        _ => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .nest("/api", api_routes)
        .fallback(handle_404)
        .method_not_allowed_fallback(handle_405)
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.max_upload_size))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
