#[cfg(feature = "web")]
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
#[cfg(feature = "web")]
use serde::Serialize;
use thiserror::Error;

/// Every failure a request can end in.
///
/// Client-input problems map to 4xx, relayed external failures keep the
/// external endpoint's status, and everything on our side is a 500.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("No file uploaded")]
    MissingFile,

    #[error("Invalid file format. Only XLSX files are accepted.")]
    UnsupportedFormat,

    #[error("Invalid upload: {0}")]
    InvalidUpload(String),

    #[error("Upload exceeds the size limit of {limit} bytes")]
    UploadTooLarge { limit: usize },

    #[error("Could not read spreadsheet: {0}")]
    InvalidSpreadsheet(String),

    #[error("Not logged in")]
    Unauthorized,

    #[error("No data available. Upload a file first.")]
    NoDataAvailable,

    #[error("Dataset is empty, nothing to export")]
    EmptyDataset,

    #[error("External API unreachable: {0}")]
    ExternalUnreachable(String),

    #[error("External API returned status {status}")]
    ExternalError { status: u16, body: String },

    #[error("External API returned a malformed response: {0}")]
    MalformedExternalResponse(String),

    #[error("No external API configured")]
    ExternalNotConfigured,

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(feature = "web")]
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response: Option<String>,
}

#[cfg(feature = "web")]
impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MissingFile
            | AppError::UnsupportedFormat
            | AppError::InvalidUpload(_)
            | AppError::InvalidSpreadsheet(_) => StatusCode::BAD_REQUEST,
            AppError::UploadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NoDataAvailable => StatusCode::NOT_FOUND,
            AppError::EmptyDataset => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ExternalError { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            AppError::MalformedExternalResponse(_) => StatusCode::BAD_GATEWAY,
            AppError::ExternalNotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            AppError::ExternalUnreachable(_)
            | AppError::Auth(_)
            | AppError::Storage(_)
            | AppError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(feature = "web")]
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            log::error!("{}", self);
        } else {
            log::debug!("request rejected: {}", self);
        }

        let body = match &self {
            AppError::ExternalError {
                status: upstream,
                body: text,
            } => ErrorBody {
                error: self.to_string(),
                status: Some(*upstream),
                response: Some(text.clone()),
            },
            _ => ErrorBody {
                error: self.to_string(),
                status: None,
                response: None,
            },
        };

        (status, Json(body)).into_response()
    }
}
