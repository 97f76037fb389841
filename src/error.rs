use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

// ─── Config ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation failed: {0}")]
    Validation(String),
}

// ─── Oracle ──────────────────────────────────────────────────────────────────

/// Failures talking to the vision/language oracle.
///
/// None of these are fatal: every call site converts them into a degraded
/// default and a notice for the user.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("oracle returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("oracle returned no text")]
    EmptyResponse,
}

// ─── Store ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("schema migration failed: {0}")]
    Migration(String),

    #[error("image file {path}: {source}")]
    Image {
        path: String,
        #[source]
        source: image::ImageError,
    },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("database lock poisoned")]
    Poisoned,
}

// ─── HTTP surface ────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("invalid username or password")]
    Unauthorized,

    #[error("unknown user {0}")]
    UnknownUser(i64),

    #[error("username already taken")]
    UsernameTaken,

    #[error("unsupported image type {0:?}, expected image/jpeg or image/png")]
    UnsupportedMediaType(String),

    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("storage failure: {0}")]
    Store(#[from] StoreError),

    #[error("background task failed")]
    Blocking,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::Decode(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::UnknownUser(_) => StatusCode::NOT_FOUND,
            Self::UsernameTaken => StatusCode::CONFLICT,
            Self::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Store(_) | Self::Blocking => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}

impl From<actix_web::error::BlockingError> for ApiError {
    fn from(_: actix_web::error::BlockingError) -> Self {
        Self::Blocking
    }
}
