use anyhow::{Context, Result};
use hyper::{header, Response, StatusCode};
use shared::types::Product;
use tracing::{debug, info};

use crate::auth::Principal;
use crate::database::CatalogError;
use crate::handlers::http::routes::{path_param, PRODUCT_ID_ROUTE};
use crate::handlers::http::utils::{deliver_empty, deliver_serialized_json, full};
use crate::{ApiRequest, ApiResponse, AppState};

/// `GET /api/products/v1/youcan`, plain-text liveness check for the catalog.
pub async fn handle_youcan() -> Result<ApiResponse> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(full("yup !, you can"))
        .context("Failed to build youcan response")
}

pub async fn handle_list(state: AppState) -> Result<ApiResponse> {
    let products = state.products.list().await?;
    debug!("Listing {} products", products.len());
    deliver_serialized_json(&products, StatusCode::OK)
}

pub async fn handle_get(req: ApiRequest, state: AppState) -> Result<ApiResponse> {
    let id = product_id(&req)?;
    let product = state.products.get(id).await?;
    deliver_serialized_json(&product, StatusCode::OK)
}

pub async fn handle_create(req: ApiRequest, state: AppState, principal: Principal) -> Result<ApiResponse> {
    let product = parse_product(&req)?;
    let created = state.products.create(product).await?;

    info!(
        "Product {:?} created by user_id={}",
        created.id, principal.user_id
    );
    deliver_serialized_json(&created, StatusCode::CREATED)
}

pub async fn handle_update(req: ApiRequest, state: AppState, principal: Principal) -> Result<ApiResponse> {
    let id = product_id(&req)?;
    let product = parse_product(&req)?;
    let updated = state.products.update(id, product).await?;

    info!("Product {} updated by user_id={}", id, principal.user_id);
    deliver_serialized_json(&updated, StatusCode::OK)
}

pub async fn handle_delete(req: ApiRequest, state: AppState, principal: Principal) -> Result<ApiResponse> {
    let id = product_id(&req)?;
    state.products.delete(id).await?;

    info!("Product {} deleted by user_id={}", id, principal.user_id);
    deliver_empty(StatusCode::NO_CONTENT)
}

fn product_id(req: &ApiRequest) -> Result<i64, CatalogError> {
    path_param(PRODUCT_ID_ROUTE, req.uri().path(), "id")
        .and_then(|raw| raw.parse::<i64>().ok())
        .ok_or_else(|| CatalogError::InvalidPayload("product id must be an integer".into()))
}

fn parse_product(req: &ApiRequest) -> Result<Product, CatalogError> {
    serde_json::from_slice(req.body()).map_err(|e| CatalogError::InvalidPayload(e.to_string()))
}
