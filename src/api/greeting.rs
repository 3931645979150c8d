use gotcha::axum::extract::{Path, Query};
use gotcha::{Json, Schematic};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;

#[derive(Debug, Serialize, Schematic)]
pub struct GreetingResponse {
    pub message: String,
}

#[derive(Debug, Deserialize, Schematic)]
pub struct GreetingQuery {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

pub fn farewell(message: Option<&str>, name: Option<&str>) -> String {
    let farewell = message.filter(|m| !m.is_empty()).unwrap_or("Goodbye");
    let name = name.filter(|n| !n.is_empty()).unwrap_or("friend");
    format!("{} {}!", farewell, name)
}

/// GET /goodbye/:name - Say goodbye
#[gotcha::api]
pub async fn goodbye(Path(name): Path<String>) -> Result<Json<GreetingResponse>, ApiError> {
    Ok(Json(GreetingResponse {
        message: farewell(None, Some(&name)),
    }))
}

/// GET /goodbye - Say goodbye with optional name and message
#[gotcha::api]
pub async fn goodbye_custom(
    Query(query): Query<GreetingQuery>,
) -> Result<Json<GreetingResponse>, ApiError> {
    Ok(Json(GreetingResponse {
        message: farewell(query.message.as_deref(), query.name.as_deref()),
    }))
}
