use axum::body::Bytes;
use log::{info, warn};
use reqwest::{
    Client, StatusCode,
    multipart::{Form, Part},
};
use std::time::Duration;

use crate::error::AppError;
use crate::loader::{RowRecord, rows_from_json};

/// A file part taken from an incoming multipart request.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub field: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// What the external endpoint answered with on success.
#[derive(Debug)]
pub struct Forwarded {
    /// Response body exactly as received.
    pub raw: Bytes,
    /// The same body as row records.
    pub rows: Vec<RowRecord>,
}

/// Relays uploads to the configured external endpoint.
///
/// One POST per call, bounded by the client timeout, never retried.
pub struct Forwarder {
    client: Client,
    endpoint: Option<String>,
    timeout: Duration,
}

impl Forwarder {
    pub fn new(endpoint: Option<String>, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::ExternalUnreachable(e.to_string()))?;

        match &endpoint {
            Some(url) => info!("Forwarding uploads to {} (timeout {:?})", url, timeout),
            None => info!("No external API configured, forwarding disabled"),
        }

        Ok(Forwarder {
            client,
            endpoint,
            timeout,
        })
    }

    /// Send `files` as one multipart request and interpret the answer
    ///
    /// # Errors
    /// * `AppError::ExternalNotConfigured` if no endpoint is set
    /// * `AppError::ExternalUnreachable` on connect, timeout or transfer failure
    /// * `AppError::ExternalError` if the endpoint answers anything but 200
    /// * `AppError::MalformedExternalResponse` if a 200 body is not JSON
    pub async fn forward(&self, files: Vec<UploadedFile>) -> Result<Forwarded, AppError> {
        let endpoint = self.endpoint.as_deref().ok_or(AppError::ExternalNotConfigured)?;

        let mut form = Form::new();
        for file in files {
            let mut part = Part::bytes(file.bytes.to_vec()).file_name(file.file_name);
            if let Some(content_type) = &file.content_type {
                part = part
                    .mime_str(content_type)
                    .map_err(|e| AppError::InvalidUpload(e.to_string()))?;
            }
            form = form.part(file.field, part);
        }

        let response = self
            .client
            .post(endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status != StatusCode::OK {
            warn!("External API answered {}", status);
            let body = match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to read external API error body: {}", e);
                    String::new()
                }
            };
            return Err(AppError::ExternalError {
                status: status.as_u16(),
                body,
            });
        }

        let raw = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(e))?;
        let value: serde_json::Value = serde_json::from_slice(&raw)
            .map_err(|e| AppError::MalformedExternalResponse(e.to_string()))?;
        let rows = rows_from_json(value);

        info!("External API returned {} rows", rows.len());
        Ok(Forwarded { raw, rows })
    }

    fn transport_error(&self, e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            AppError::ExternalUnreachable(format!("request timed out after {:?}", self.timeout))
        } else {
            AppError::ExternalUnreachable(e.to_string())
        }
    }
}
