//! Upload negotiation (control plane) and byte transfer (data plane) handlers.

use axum::body::{Body as AxumBody, Bytes};
use axum::extract::{Extension, Path};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Json as JsonResponse, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::registry::{Registry, Slot};
use crate::storage::Storage;

/// Settings shared by the upload handlers.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub base_url: String,
    pub slot_timeout: u64,
    pub transfer_timeout: Duration,
}

/// Body of a negotiation request. Field names are capitalized on the wire,
/// lower-case spellings are accepted too.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct UploadRequest {
    #[serde(rename = "Filename", alias = "filename", default)]
    pub filename: String,
    #[serde(rename = "Mime", alias = "mime", default)]
    pub mime: String,
    #[serde(rename = "Length", alias = "length", default)]
    pub length: i64,
}

/// What the client learns about an accepted slot. The negotiated length is
/// deliberately absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotDescriptor {
    pub url: String,
    pub timeout: u64,
    pub filename: String,
}

impl From<&Slot> for SlotDescriptor {
    fn from(slot: &Slot) -> Self {
        Self {
            url: slot.url.clone(),
            timeout: slot.timeout_remaining,
            filename: slot.filename.clone(),
        }
    }
}

/// Validates `request` and registers a slot for it.
pub async fn negotiate(
    storage: &Storage,
    registry: &Registry,
    upload: &UploadConfig,
    request: UploadRequest,
) -> Result<SlotDescriptor, ApiError> {
    if request.filename.is_empty() && request.mime.is_empty() {
        return Err(ApiError::MissingIdentifier);
    }
    if request.length <= 0 {
        return Err(ApiError::InvalidLength);
    }
    if request.filename.is_empty() {
        return Err(ApiError::UnsupportedFeature);
    }
    // Slot URLs are routed as a single path segment.
    if request.filename.contains(['/', '\\']) {
        return Err(ApiError::InvalidPath);
    }
    if registry.contains(&request.filename).await || storage.exists(&request.filename).await? {
        return Err(ApiError::NameConflict(request.filename));
    }

    let slot = Slot::new(
        request.filename,
        &upload.base_url,
        request.length.unsigned_abs(),
        upload.slot_timeout,
    );
    let descriptor = SlotDescriptor::from(&slot);
    registry
        .insert(slot)
        .await
        .map_err(|slot| ApiError::NameConflict(slot.filename))?;
    Ok(descriptor)
}

/// `POST /`: negotiate a new upload slot.
pub async fn negotiate_upload(
    Extension(storage): Extension<Arc<Storage>>,
    Extension(registry): Extension<Arc<Registry>>,
    Extension(upload): Extension<Arc<UploadConfig>>,
    body: Bytes,
) -> Result<JsonResponse<SlotDescriptor>, ApiError> {
    let request: UploadRequest = serde_json::from_slice(&body).map_err(|err| {
        warn!(error = %err, "malformed upload request");
        ApiError::MalformedInput(err.to_string())
    })?;
    let filename = request.filename.clone();
    let length = request.length;

    match negotiate(&storage, &registry, &upload, request).await {
        Ok(descriptor) => {
            let pending = registry.len().await;
            info!(
                filename,
                length,
                url = descriptor.url,
                pending,
                "upload request accepted"
            );
            Ok(JsonResponse(descriptor))
        }
        Err(err) => {
            warn!(filename, length, error = ?err, "upload request rejected");
            Err(err)
        }
    }
}

/// `PUT /{filename}`: receive the bytes for a negotiated slot.
pub async fn transfer_upload(
    Path(filename): Path<String>,
    headers: HeaderMap,
    Extension(storage): Extension<Arc<Storage>>,
    Extension(registry): Extension<Arc<Registry>>,
    Extension(upload): Extension<Arc<UploadConfig>>,
    body: AxumBody,
) -> Result<Response, ApiError> {
    let Some(slot) = registry.claim(&filename).await else {
        warn!(filename, "unapproved upload");
        return Err(ApiError::NotFound(filename));
    };

    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok());
    if declared != Some(slot.length) {
        warn!(
            filename,
            expected = slot.length,
            received = ?declared,
            "length mismatch, upload aborted"
        );
        return Err(ApiError::LengthMismatch {
            expected: slot.length,
            received: declared,
        });
    }

    let location = HeaderValue::from_str(&slot.url).map_err(|_| ApiError::InvalidPath)?;
    let deadline = (!upload.transfer_timeout.is_zero())
        .then(|| Instant::now() + upload.transfer_timeout);
    let written = storage
        .write_stream(&slot.filename, slot.length, body, deadline)
        .await
        .map_err(|err| {
            warn!(filename, error = %err, "upload failed");
            ApiError::from(err)
        })?;

    info!(filename, bytes = written, url = slot.url, "upload complete");
    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::LOCATION, location);
    Ok((StatusCode::CREATED, response_headers, slot.url).into_response())
}

pub async fn negotiate_method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed(Method::POST)
}

pub async fn transfer_method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed(Method::PUT)
}
