use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use serde::Serialize;

/// Success envelope shared by every route: `{success, message, data}`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn respond(self, status: StatusCode) -> HttpResponse {
        HttpResponse::build(status).json(self)
    }

    pub fn ok(message: impl Into<String>, data: T) -> HttpResponse {
        Self::new(message, data).respond(StatusCode::OK)
    }

    pub fn created(message: impl Into<String>, data: T) -> HttpResponse {
        Self::new(message, data).respond(StatusCode::CREATED)
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> HttpResponse {
        HttpResponse::Ok().json(ApiResponse::<()> {
            success: true,
            message: message.into(),
            data: None,
        })
    }
}
