use gotcha::axum::extract::{Path, State};
use gotcha::Json;

use crate::api::error::ApiError;
use crate::models::{Item, ItemCreateRequest, ItemDoneResponse, ItemListResponse};
use crate::{Service, TallyError};

/// POST /create-item - Create a new item
#[gotcha::api]
pub async fn create_item(
    State(service): State<Service>,
    Json(payload): Json<ItemCreateRequest>,
) -> Result<Json<Item>, ApiError> {
    let item = service.create_item(payload.title).await?;
    Ok(Json(item))
}

/// GET /items - List all items, newest first
#[gotcha::api]
pub async fn get_items(State(service): State<Service>) -> Result<Json<ItemListResponse>, ApiError> {
    let items = service.list_items().await?;
    Ok(Json(ItemListResponse { items }))
}

/// PUT /items/:id/done - Mark an item as done (`item` is null for unknown ids)
#[gotcha::api]
pub async fn mark_done(
    State(service): State<Service>,
    Path(id): Path<i64>,
) -> Result<Json<ItemDoneResponse>, ApiError> {
    done_response(service.mark_item_done(id).await).map(Json)
}

/// Unknown ids answer `{item: null}`; any other failure stays an error
pub fn done_response(result: crate::Result<Item>) -> Result<ItemDoneResponse, ApiError> {
    match result {
        Ok(item) => Ok(ItemDoneResponse { item: Some(item) }),
        Err(TallyError::NotFound(_)) => Ok(ItemDoneResponse { item: None }),
        Err(e) => Err(e.into()),
    }
}
