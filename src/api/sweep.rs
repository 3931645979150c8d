use gotcha::axum::extract::State;
use gotcha::Json;

use crate::api::error::ApiError;
use crate::models::SweepReport;
use crate::Service;

/// GET /sweep - Run the pending-items sweep on demand
#[gotcha::api]
pub async fn get_sweep(State(service): State<Service>) -> Result<Json<SweepReport>, ApiError> {
    let report = service.sweep().await?;
    Ok(Json(report))
}
