use actix_web::{web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::identity::Role;
use crate::error::AppError;
use super::{ApiResponse, AppState, Authenticated};

// ============================================================================
// Cart Routes - only end users own carts
// ============================================================================

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/cart")
            .route("", web::get().to(get_cart))
            .route("", web::post().to(add_item))
            .route("", web::patch().to(update_item))
            .route("", web::delete().to(clear_cart))
            .route("/{product_id}", web::delete().to(remove_item)),
    );
}

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddItemRequest {
    product_id: Uuid,
    #[serde(default = "default_quantity")]
    quantity: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateItemRequest {
    product_id: Uuid,
    quantity: u32,
}

async fn get_cart(state: web::Data<AppState>, caller: Authenticated) -> Result<HttpResponse, AppError> {
    let principal = caller.require(&[Role::User])?;
    let cart = state.carts.get_cart(principal.user_id).await?;
    Ok(ApiResponse::ok("Cart fetched successfully", cart))
}

async fn add_item(
    state: web::Data<AppState>,
    caller: Authenticated,
    body: web::Json<AddItemRequest>,
) -> Result<HttpResponse, AppError> {
    let principal = caller.require(&[Role::User])?;
    let cart = state
        .carts
        .add_item(principal.user_id, body.product_id, body.quantity)
        .await?;
    Ok(ApiResponse::ok("Product added to cart", cart))
}

async fn update_item(
    state: web::Data<AppState>,
    caller: Authenticated,
    body: web::Json<UpdateItemRequest>,
) -> Result<HttpResponse, AppError> {
    let principal = caller.require(&[Role::User])?;
    let cart = state
        .carts
        .update_quantity(principal.user_id, body.product_id, body.quantity)
        .await?;
    Ok(ApiResponse::ok("Cart updated successfully", cart))
}

async fn remove_item(
    state: web::Data<AppState>,
    caller: Authenticated,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let principal = caller.require(&[Role::User])?;
    let cart = state.carts.remove_item(principal.user_id, path.into_inner()).await?;
    Ok(ApiResponse::ok("Product removed from cart", cart))
}

async fn clear_cart(state: web::Data<AppState>, caller: Authenticated) -> Result<HttpResponse, AppError> {
    let principal = caller.require(&[Role::User])?;
    let (cart, cleared) = state.carts.clear(principal.user_id).await?;
    let message = if cleared { "Cart cleared successfully" } else { "Cart is already empty" };
    Ok(ApiResponse::ok(message, cart))
}
