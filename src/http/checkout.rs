use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use serde_json::json;

use crate::error::AppError;
use crate::payments::{parse_event, SIGNATURE_HEADER};
use super::AppState;

// ============================================================================
// Payment Provider Callbacks
// ============================================================================
//
// The signature covers the raw body, so it is read as bytes and only parsed
// after verification. Anything acknowledged with 2xx is never redelivered:
// ignored and unresolved events get 200, processing failures 500.
//
// ============================================================================

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/checkout/webhook", web::post().to(webhook));
}

async fn webhook(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    let signature = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    if let Err(e) = state.verifier.verify(signature, &body, Utc::now()) {
        tracing::warn!(error = %e, "Rejected webhook with invalid signature");
        state.metrics.record_webhook("unverified", "rejected");
        return Err(e.into());
    }

    let event = parse_event(&body).map_err(|e| {
        tracing::warn!(error = %e, "Rejected malformed webhook payload");
        AppError::from(e)
    })?;

    match state.reconciler.handle(event).await {
        Ok(outcome) => {
            tracing::debug!(outcome = outcome.outcome(), "Webhook acknowledged");
            Ok(HttpResponse::Ok().json(json!({ "received": true })))
        }
        Err(e) => {
            tracing::error!(error = %e, kind = e.kind(), "Webhook processing failed");
            Err(AppError::Internal(format!("webhook processing failed: {e}")))
        }
    }
}
