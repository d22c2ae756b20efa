use std::collections::HashMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::scheduling::booking::UNVERIFIED_MESSAGE;
use crate::scheduling::{BookingError, DateParseError, TimeParseError};

/// Errors from server-rendered pages.
#[derive(Debug)]
pub enum AppError {
    Database(sqlx::Error),
    Template(askama::Error),
    Session(tower_sessions::session::Error),
    NotFound,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not found").into_response(),
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
            AppError::Template(e) => {
                tracing::error!("Template error: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
            AppError::Session(e) => {
                tracing::error!("Session error: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Database(e)
    }
}

impl From<askama::Error> for AppError {
    fn from(e: askama::Error) -> Self {
        AppError::Template(e)
    }
}

impl From<tower_sessions::session::Error> for AppError {
    fn from(e: tower_sessions::session::Error) -> Self {
        AppError::Session(e)
    }
}

/// Errors from the JSON API, rendered as `{"error": ..., "fields": {...}}`.
#[derive(Debug)]
pub enum ApiError {
    Booking(BookingError),
    InvalidInput(String),
    Database(sqlx::Error),
    /// Visits could not be loaded, so no availability can be promised.
    Unverified,
    NotFound,
}

#[derive(Serialize)]
struct ApiErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<&'a HashMap<String, String>>,
}

fn json_error(status: StatusCode, error: &str, fields: Option<&HashMap<String, String>>) -> Response {
    (status, Json(ApiErrorBody { error, fields })).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound => json_error(StatusCode::NOT_FOUND, "not found", None),
            ApiError::Unverified => {
                json_error(StatusCode::SERVICE_UNAVAILABLE, UNVERIFIED_MESSAGE, None)
            }
            ApiError::InvalidInput(message) => {
                json_error(StatusCode::UNPROCESSABLE_ENTITY, &message, None)
            }
            ApiError::Booking(e) if e.is_retryable() => {
                tracing::warn!("booking lost a write race: {e}");
                json_error(StatusCode::SERVICE_UNAVAILABLE, UNVERIFIED_MESSAGE, None)
            }
            ApiError::Database(e) | ApiError::Booking(BookingError::Database(e)) => {
                tracing::error!("Database error: {e}");
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal server error", None)
            }
            ApiError::Booking(e) => {
                let status = match &e {
                    BookingError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    BookingError::PropertyNotFound | BookingError::VisitNotFound => {
                        StatusCode::NOT_FOUND
                    }
                    BookingError::PropertyUnavailable | BookingError::Conflict => StatusCode::CONFLICT,
                    BookingError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let fields = match &e {
                    BookingError::Validation(fields) => Some(fields),
                    _ => None,
                };
                json_error(status, &e.to_string(), fields)
            }
        }
    }
}

impl From<BookingError> for ApiError {
    fn from(e: BookingError) -> Self {
        ApiError::Booking(e)
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        ApiError::Database(e)
    }
}

impl From<TimeParseError> for ApiError {
    fn from(e: TimeParseError) -> Self {
        ApiError::InvalidInput(e.to_string())
    }
}

impl From<DateParseError> for ApiError {
    fn from(e: DateParseError) -> Self {
        ApiError::InvalidInput(e.to_string())
    }
}
