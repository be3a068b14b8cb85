use actix_web::{web, HttpResponse};

use crate::error::AppError;
use super::{ApiResponse, AppState, Authenticated};

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/auth/logout", web::post().to(logout));
}

/// Revoke the presented token until it expires
async fn logout(state: web::Data<AppState>, caller: Authenticated) -> Result<HttpResponse, AppError> {
    state.authenticator.revoke(&caller.token).await?;
    Ok(ApiResponse::<()>::message("Logout successful"))
}
