use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};

use crate::actors::GetSystemHealth;
use crate::error::AppError;
use super::{ApiResponse, AppState};

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health));
}

/// 200 while healthy or degraded, 503 once any component is unhealthy
async fn health(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let report = state
        .health
        .ask(GetSystemHealth)
        .await
        .map_err(|e| AppError::Internal(format!("health monitor unavailable: {e}")))?;

    let (status, message) = if report.overall_status.is_unhealthy() {
        (StatusCode::SERVICE_UNAVAILABLE, "Service unhealthy")
    } else {
        (StatusCode::OK, "Service healthy")
    };
    Ok(ApiResponse::new(message, report).respond(status))
}
