use gotcha::axum::http::StatusCode;
use gotcha::axum::response::{IntoResponse, Response};
use gotcha::{Json, Schematic};
use serde::Serialize;
use gotcha::oas;
use std::collections::BTreeMap;

#[derive(Debug, Serialize, Schematic)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

impl From<crate::TallyError> for ApiError {
    fn from(e: crate::TallyError) -> Self {
        if e.to_status_code().is_server_error() {
            tracing::error!("request failed: {}", e);
        }
        Self {
            status: e.to_status_code(),
            message: e.to_string(),
        }
    }
}

fn error_response(description: &str) -> oas::Referenceable<oas::Response> {
    oas::Referenceable::Data(oas::Response {
        description: description.to_string(),
        headers: None,
        content: Some(BTreeMap::from([(
            "application/json".to_string(),
            oas::MediaType {
                schema: Some(oas::Referenceable::Data(
                    ErrorResponse::generate_schema().schema,
                )),
                example: None,
                examples: None,
                encoding: None,
            },
        )])),
        links: None,
    })
}

impl gotcha::Responsible for ApiError {
    fn response() -> oas::Responses {
        let mut response = oas::Responses {
            default: None,
            data: BTreeMap::default(),
        };
        response
            .data
            .insert("4XX".to_string(), error_response("Invalid input or not found"));
        response.data.insert(
            "5XX".to_string(),
            error_response("Store or event bus unavailable, or partial failure"),
        );
        response
    }
}
