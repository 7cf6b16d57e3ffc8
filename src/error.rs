//! Error handling.

use arrow::error::ArrowError;
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::header,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::error::Error;
use thiserror::Error;
use tracing::{event, Level};

/// EAR service error type
///
/// This type encapsulates the various errors that may occur.
/// Each variant may result in a different API error response.
#[derive(Debug, Error)]
pub enum EarError {
    /// The requested filter combination cannot be satisfied
    #[error("{0}")]
    BadRequest(String),

    /// Error deserialising query parameters
    #[error("{}", .0.body_text())]
    QueryRejection(#[from] QueryRejection),

    /// Error deserialising a JSON request body
    #[error("{}", .0.body_text())]
    JsonRejection(#[from] JsonRejection),

    /// Error validating request parameters
    #[error("request parameters are not valid: {0}")]
    Validation(#[from] validator::ValidationErrors),

    /// The portal or a resource URL could not be reached, or kept failing after retries
    #[error("upstream unavailable at {url}: {reason}")]
    UpstreamUnavailable { url: String, reason: String },

    /// The portal responded without a success indicator
    #[error("invalid response from the open data portal: {0}")]
    InvalidResponse(String),

    /// No resource was located for any requested year
    #[error("{0}")]
    NotFound(String),

    /// Both the structured read and the download fallback failed
    #[error("failed to read parquet resource {url}: {reason}")]
    FetchError { url: String, reason: String },

    /// Error manipulating in-memory record batches
    #[error("failed to process tabular data")]
    Arrow(#[from] ArrowError),

    /// The warehouse API failed
    #[error("warehouse request failed: {0}")]
    Warehouse(String),

    /// The warehouse refused the submitted rows
    #[error("warehouse rejected the data: {0}")]
    WarehouseRejected(String),

    /// No warehouse project is configured
    #[error("warehouse is not configured")]
    WarehouseNotConfigured,
}

impl IntoResponse for EarError {
    /// Convert from an `EarError` into an [axum::response::Response].
    fn into_response(self) -> Response {
        ErrorResponse::from(self).into_response()
    }
}

/// A response to send in error cases
///
/// Implements serde (de)serialise.
#[derive(Deserialize, Serialize)]
struct ErrorResponse {
    /// HTTP status of the response
    #[serde(skip)]
    status: StatusCode,

    /// Error message
    error: String,
}

impl ErrorResponse {
    /// Return a new ErrorResponse
    ///
    /// # Arguments
    ///
    /// * `status`: HTTP status of the response
    /// * `error`: The error that occurred
    fn new<E>(status: StatusCode, error: &E) -> Self
    where
        E: std::error::Error + Send + Sync,
    {
        ErrorResponse {
            status,
            error: error.to_string(),
        }
    }
}

impl From<EarError> for ErrorResponse {
    /// Convert from an `EarError` into an `ErrorResponse`.
    fn from(error: EarError) -> Self {
        let status = match &error {
            // Bad request
            EarError::BadRequest(_)
            | EarError::QueryRejection(_)
            | EarError::JsonRejection(_)
            | EarError::Validation(_)
            | EarError::WarehouseRejected(_) => StatusCode::BAD_REQUEST,

            // Not found
            EarError::NotFound(_) => StatusCode::NOT_FOUND,

            // Service unavailable
            EarError::WarehouseNotConfigured => StatusCode::SERVICE_UNAVAILABLE,

            // Internal server error
            EarError::UpstreamUnavailable { .. }
            | EarError::InvalidResponse(_)
            | EarError::FetchError { .. }
            | EarError::Arrow(_)
            | EarError::Warehouse(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let response = Self::new(status, &error);

        // Log server errors.
        if response.status.is_server_error() {
            event!(Level::ERROR, "{}", error.to_string());
            let mut current = error.source();
            while let Some(source) = current {
                event!(Level::ERROR, "Caused by: {}", source.to_string());
                current = source.source();
            }
        }

        response
    }
}

impl IntoResponse for ErrorResponse {
    /// Convert from an `ErrorResponse` into an `axum::response::Response`.
    ///
    /// Renders the response as JSON.
    fn into_response(self) -> Response {
        let json_body = serde_json::to_string(&self);
        match json_body {
            Err(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to serialise error response: {}", err),
            )
                .into_response(),
            Ok(json_body) => (
                self.status,
                [(&header::CONTENT_TYPE, mime::APPLICATION_JSON.to_string())],
                json_body,
            )
                .into_response(),
        }
    }
}
