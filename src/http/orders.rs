use actix_web::{web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::identity::Role;
use crate::domain::order::{OrderStatus, PaymentMethod, ShippingAddress};
use crate::error::AppError;
use crate::services::CreateOrder;
use super::{ApiResponse, AppState, Authenticated};

// ============================================================================
// Order Routes
// ============================================================================

const DEFAULT_PAGE_SIZE: u32 = 10;

pub fn routes(cfg: &mut web::ServiceConfig) {
    // my-orders must be registered before the {id} routes
    cfg.service(
        web::scope("/orders")
            .route("", web::post().to(create_order))
            .route("", web::get().to(all_orders))
            .route("/my-orders", web::get().to(my_orders))
            .route("/{id}", web::get().to(get_order))
            .route("/{id}/status", web::patch().to(update_status))
            .route("/{id}/cancel", web::patch().to(cancel_order))
            .route("/{id}/payment-status", web::get().to(payment_status))
            .route("/{id}/history", web::get().to(order_history)),
    );
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrderRequest {
    cart_id: Uuid,
    shipping_address: ShippingAddress,
    payment_method: PaymentMethod,
}

#[derive(Debug, Deserialize)]
struct UpdateStatusRequest {
    status: OrderStatus,
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    page: Option<u32>,
    limit: Option<u32>,
    status: Option<OrderStatus>,
}

impl ListQuery {
    fn page(&self) -> u32 {
        self.page.unwrap_or(1)
    }

    fn limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE)
    }
}

async fn create_order(
    state: web::Data<AppState>,
    caller: Authenticated,
    body: web::Json<CreateOrderRequest>,
) -> Result<HttpResponse, AppError> {
    let principal = caller.require(&[Role::User])?;
    let body = body.into_inner();

    let placed = state
        .orders
        .create_order(
            principal,
            CreateOrder {
                cart_id: body.cart_id,
                shipping_address: body.shipping_address,
                payment_method: body.payment_method,
            },
        )
        .await?;

    Ok(ApiResponse::created("Order created successfully", placed))
}

async fn my_orders(
    state: web::Data<AppState>,
    caller: Authenticated,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, AppError> {
    let principal = caller.require(&[Role::User, Role::Seller])?;
    let listing = state
        .orders
        .my_orders(principal, query.page(), query.limit(), query.status)
        .await?;
    Ok(ApiResponse::ok("Orders fetched successfully", listing))
}

async fn all_orders(
    state: web::Data<AppState>,
    caller: Authenticated,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, AppError> {
    let principal = caller.require(&[Role::Admin])?;
    let listing = state
        .orders
        .all_orders(principal, query.page(), query.limit(), query.status)
        .await?;
    Ok(ApiResponse::ok("Orders fetched successfully", listing))
}

async fn get_order(
    state: web::Data<AppState>,
    caller: Authenticated,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let order = state.orders.get_order(&caller.principal, path.into_inner()).await?;
    Ok(ApiResponse::ok("Order fetched successfully", order))
}

async fn update_status(
    state: web::Data<AppState>,
    caller: Authenticated,
    path: web::Path<Uuid>,
    body: web::Json<UpdateStatusRequest>,
) -> Result<HttpResponse, AppError> {
    let principal = caller.require(&[Role::Admin, Role::Seller])?;
    let order = state
        .orders
        .change_status(principal, path.into_inner(), body.status)
        .await?;
    Ok(ApiResponse::ok("Order status updated successfully", order))
}

async fn cancel_order(
    state: web::Data<AppState>,
    caller: Authenticated,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let order = state.orders.cancel(&caller.principal, path.into_inner()).await?;
    Ok(ApiResponse::ok("Order cancelled successfully", order))
}

async fn payment_status(
    state: web::Data<AppState>,
    caller: Authenticated,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let status = state.orders.payment_status(&caller.principal, path.into_inner()).await?;
    Ok(ApiResponse::ok("Payment status fetched successfully", status))
}

async fn order_history(
    state: web::Data<AppState>,
    caller: Authenticated,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let principal = caller.require(&[Role::Admin])?;
    let history = state.orders.history(principal, path.into_inner()).await?;
    Ok(ApiResponse::ok("Order history fetched successfully", history))
}
