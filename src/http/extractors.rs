use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::{web, FromRequest, HttpRequest};
use futures_util::future::LocalBoxFuture;

use crate::domain::identity::{Principal, Role};
use crate::error::AppError;
use super::AppState;

// ============================================================================
// Request Extractors
// ============================================================================

/// Raw token from `Authorization: Bearer <token>`
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

impl BearerToken {
    fn from_request(req: &HttpRequest) -> Result<Self, AppError> {
        let header = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))?;

        let token = header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AppError::Unauthorized("Invalid authorization format. Expected 'Bearer <token>'".to_string()))?;

        Ok(Self(token.to_string()))
    }
}

/// A caller whose bearer token verified and is not revoked
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub principal: Principal,
    pub token: String,
}

impl Authenticated {
    /// Forbidden unless the caller holds one of `roles`
    pub fn require(&self, roles: &[Role]) -> Result<&Principal, AppError> {
        if roles.contains(&self.principal.role) {
            return Ok(&self.principal);
        }

        let names: Vec<&str> = roles.iter().map(Role::as_str).collect();
        Err(AppError::Forbidden(format!(
            "Access denied. Required role: {}",
            names.join(" or ")
        )))
    }
}

impl FromRequest for Authenticated {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let token = BearerToken::from_request(req);
        let state = req.app_data::<web::Data<AppState>>().cloned();

        Box::pin(async move {
            let BearerToken(token) = token?;
            let state = state.ok_or_else(|| AppError::Internal("application state not configured".to_string()))?;

            let authenticated = state.authenticator.authenticate(&token).await.map_err(|e| {
                tracing::debug!(error = %e, "Rejected bearer token");
                AppError::from(e)
            })?;

            Ok(Authenticated {
                principal: authenticated.principal,
                token,
            })
        })
    }
}
