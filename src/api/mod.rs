pub mod error;
pub mod forecast;
pub mod health;
pub mod response;
pub mod v1;

use axum::http::{HeaderValue, Method, Uri};
use axum::Router;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::{config::Config, controller::AppState};
use error::ApiError;

pub fn router(state: AppState, cfg: &Config) -> Router {
    let mut router = Router::new()
        .nest("/api/v1", v1::router(state))
        .fallback(not_found);

    if cfg.server.enable_cors {
        match cfg.server.cors_origin.parse::<HeaderValue>() {
            Ok(origin) => {
                let cors = CorsLayer::new()
                    .allow_origin(origin)
                    .allow_methods([Method::GET, Method::POST])
                    .allow_headers([axum::http::header::CONTENT_TYPE]);
                router = router.layer(cors);
            }
            Err(e) => {
                tracing::warn!(origin = %cfg.server.cors_origin, error = %e, "invalid CORS origin, CORS disabled");
            }
        }
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(axum::extract::DefaultBodyLimit::max(64 * 1024))
                .layer(TimeoutLayer::new(Duration::from_secs(cfg.server.request_timeout_secs))),
        )
        .layer(TraceLayer::new_for_http())
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(uri.path().to_string())
}
