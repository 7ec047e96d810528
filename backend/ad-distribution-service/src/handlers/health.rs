use actix_web::{get, web, HttpResponse};
use serde_json::json;
use tracing::error;

use super::AdHandlerState;
use crate::metrics;

/// GET /health
#[get("/health")]
pub async fn health_check(state: web::Data<AdHandlerState>) -> HttpResponse {
    match state.store.ping().await {
        Ok(()) => HttpResponse::Ok().json(json!({
            "status": "healthy",
            "service": "ad-distribution-service",
        })),
        Err(e) => {
            error!(error = %e, "Store health check failed");
            HttpResponse::ServiceUnavailable().json(json!({
                "status": "unhealthy",
                "service": "ad-distribution-service",
            }))
        }
    }
}

/// GET /metrics
#[get("/metrics")]
pub async fn metrics_endpoint() -> HttpResponse {
    match metrics::render() {
        Ok((content_type, body)) => HttpResponse::Ok().content_type(content_type).body(body),
        Err(e) => {
            error!("Metrics encoding failed: {}", e);
            HttpResponse::InternalServerError().body(e.to_string())
        }
    }
}
