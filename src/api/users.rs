use gotcha::axum::extract::{Path, State};
use gotcha::Json;

use crate::api::error::ApiError;
use crate::models::{User, UserCreateRequest, UserListResponse};
use crate::Service;

/// POST /user - Create a user and queue the welcome email
#[gotcha::api]
pub async fn add_user(
    State(service): State<Service>,
    Json(payload): Json<UserCreateRequest>,
) -> Result<Json<User>, ApiError> {
    let user = service.create_user(payload.name, payload.email).await?;
    Ok(Json(user))
}

/// GET /user/:id - Get user by ID
#[gotcha::api]
pub async fn get_user(
    State(service): State<Service>,
    Path(id): Path<i64>,
) -> Result<Json<User>, ApiError> {
    let user = service.get_user(id).await?;
    Ok(Json(user))
}

/// GET /users - List all users
#[gotcha::api]
pub async fn list_users(State(service): State<Service>) -> Result<Json<UserListResponse>, ApiError> {
    let users = service.list_users().await?;
    Ok(Json(UserListResponse { users }))
}
