use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::Json;
use std::fmt;

use crate::engine::EngineError;
use crate::store::StoreError;
use crate::web::responses::ErrorResponse;

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

// Errors surfaced by the HTTP layer
#[derive(Debug)]
pub enum AppError {
    // Unexpected failures, reported and hidden from the client
    Anyhow(anyhow::Error),

    Engine(EngineError),
    // Body that is not JSON or does not match the request shape
    InvalidRequest(String),
    InvalidOptionId(String),
    NotAuthenticated,
    InvalidSession,
    RateLimited,
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Anyhow(_) => "SERVER_ERROR",
            AppError::Engine(err) => err.code(),
            AppError::InvalidRequest(_) => "INVALID_REQUEST",
            AppError::InvalidOptionId(_) => "INVALID_OPTION_ID",
            AppError::NotAuthenticated => "NOT_AUTHENTICATED",
            AppError::InvalidSession => "INVALID_SESSION",
            AppError::RateLimited => "RATE_LIMITED",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Anyhow(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Engine(err) => engine_status(err),
            AppError::InvalidRequest(_) | AppError::InvalidOptionId(_) => StatusCode::BAD_REQUEST,
            AppError::NotAuthenticated | AppError::InvalidSession => StatusCode::UNAUTHORIZED,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    fn is_internal(&self) -> bool {
        matches!(
            self,
            AppError::Anyhow(_) | AppError::Engine(EngineError::Storage(_))
        )
    }
}

fn engine_status(err: &EngineError) -> StatusCode {
    match err {
        EngineError::InvalidCategory
        | EngineError::InvalidName
        | EngineError::InvalidRoomCode
        | EngineError::InvalidOptionText => StatusCode::BAD_REQUEST,
        EngineError::RoomNotFound | EngineError::OptionNotFound => StatusCode::NOT_FOUND,
        EngineError::NotHost => StatusCode::FORBIDDEN,
        EngineError::CodeGenerationFailed => StatusCode::CONFLICT,
        EngineError::DuplicateName
        | EngineError::RoomLocked
        | EngineError::OptionLimitReached
        | EngineError::CannotVetoOwn
        | EngineError::AlreadyVetoed
        | EngineError::AlreadyUsedVeto
        | EngineError::AlreadySpun
        | EngineError::InsufficientOptions => StatusCode::BAD_REQUEST,
        EngineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// Tell axum how to convert `AppError` into a response.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = if self.is_internal() {
            tracing::error!("request failed: {}", self);
            sentry::capture_message(&self.to_string(), sentry::Level::Error);
            INTERNAL_ERROR_MESSAGE.to_string()
        } else {
            self.to_string()
        };

        (status, Json(ErrorResponse::new(self.code(), message))).into_response()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Anyhow(err) => write!(f, "{}", err),
            AppError::Engine(err) => write!(f, "{}", err),
            AppError::InvalidRequest(reason) => write!(f, "Invalid request body: {}", reason),
            AppError::InvalidOptionId(raw) => write!(f, "Invalid option ID: {}", raw),
            AppError::NotAuthenticated => write!(f, "Not authenticated"),
            AppError::InvalidSession => write!(f, "Invalid or expired session"),
            AppError::RateLimited => write!(f, "Too many requests. Please try again later."),
        }
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        AppError::Engine(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidRequest(rejection.body_text())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Engine(EngineError::Storage(err))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Anyhow(err)
    }
}
