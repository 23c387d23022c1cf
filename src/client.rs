//! Sending side of the two-phase upload: negotiate a slot, then PUT the bytes.

use reqwest::{Client, StatusCode, header};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

use crate::upload::{SlotDescriptor, UploadRequest};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("could not read {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} has no usable file name")]
    InvalidName { path: String },
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("server rejected the upload ({status}): {message}")]
    Rejected { status: StatusCode, message: String },
}

/// Asks `server` for a slot to upload `path` into.
pub async fn negotiate(
    client: &Client,
    server: &str,
    path: &Path,
) -> Result<SlotDescriptor, ClientError> {
    let shown = path.display().to_string();
    info!(file = %shown, server, "preparing upload");

    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|source| ClientError::File {
            path: shown.clone(),
            source,
        })?;
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| ClientError::InvalidName {
            path: shown.clone(),
        })?
        .to_string();
    let request = UploadRequest {
        filename,
        mime: String::new(),
        length: i64::try_from(metadata.len()).unwrap_or(i64::MAX),
    };

    let response = client
        .post(server)
        .header(header::CONTENT_TYPE, "text/json")
        .body(serde_json::to_vec(&request)?)
        .send()
        .await?;
    let status = response.status();
    let body = response.bytes().await?;
    if !status.is_success() {
        return Err(rejected(status, &body));
    }
    let descriptor: SlotDescriptor = serde_json::from_slice(&body)?;
    debug!(url = descriptor.url, timeout = descriptor.timeout, "slot granted");
    Ok(descriptor)
}

/// Sends `path` to the slot described by `slot` and returns the URL the
/// file can be reached at.
pub async fn upload(
    client: &Client,
    path: &Path,
    slot: &SlotDescriptor,
) -> Result<String, ClientError> {
    let shown = path.display().to_string();
    let content = tokio::fs::read(path)
        .await
        .map_err(|source| ClientError::File {
            path: shown.clone(),
            source,
        })?;
    info!(file = %shown, url = slot.url, length = content.len(), "sending file");

    let response = client.put(&slot.url).body(content).send().await?;
    let status = response.status();
    let location = response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let body = response.bytes().await?;
    if status != StatusCode::CREATED {
        return Err(rejected(status, &body));
    }
    Ok(location.unwrap_or_else(|| String::from_utf8_lossy(&body).trim().to_string()))
}

/// Negotiates and uploads in one go.
pub async fn send_file(server: &str, path: &Path) -> Result<String, ClientError> {
    let client = Client::new();
    let slot = negotiate(&client, server, path).await?;
    upload(&client, path, &slot).await
}

fn rejected(status: StatusCode, body: &[u8]) -> ClientError {
    ClientError::Rejected {
        status,
        message: String::from_utf8_lossy(body).trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::net::TcpListener;

    use crate::http::build_router;
    use crate::registry::Registry;
    use crate::storage::Storage;
    use crate::upload::UploadConfig;

    struct TestServer {
        _temp: tempfile::TempDir,
        root: std::path::PathBuf,
        base_url: String,
    }

    async fn start_server() -> TestServer {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("storage");
        std::fs::create_dir_all(&root).expect("create storage root");
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let base_url = format!("http://{}", listener.local_addr().expect("addr"));
        let router = build_router(
            Arc::new(Storage::new(root.clone())),
            Arc::new(Registry::new()),
            Arc::new(UploadConfig {
                base_url: base_url.clone(),
                slot_timeout: 60,
                transfer_timeout: Duration::ZERO,
            }),
        );
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        TestServer {
            _temp: temp,
            root,
            base_url,
        }
    }

    #[tokio::test]
    async fn send_file_round_trip() {
        let server = start_server().await;
        let source_dir = tempdir().expect("tempdir");
        let source = source_dir.path().join("a.txt");
        std::fs::write(&source, b"hello").expect("write source");

        let url = send_file(&server.base_url, &source).await.expect("send");
        assert_eq!(url, format!("{}/a.txt", server.base_url));
        assert_eq!(std::fs::read(server.root.join("a.txt")).expect("read"), b"hello");
    }

    #[tokio::test]
    async fn conflict_is_returned_not_fatal() {
        let server = start_server().await;
        std::fs::write(server.root.join("a.txt"), b"old").expect("seed");
        let source_dir = tempdir().expect("tempdir");
        let source = source_dir.path().join("a.txt");
        std::fs::write(&source, b"hello").expect("write source");

        let result = send_file(&server.base_url, &source).await;
        match result {
            Err(ClientError::Rejected { status, .. }) => assert_eq!(status, StatusCode::CONFLICT),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn transfer_rejection_is_an_error_value() {
        let server = start_server().await;
        let source_dir = tempdir().expect("tempdir");
        let source = source_dir.path().join("b.txt");
        std::fs::write(&source, b"hello").expect("write source");

        let client = Client::new();
        let slot = SlotDescriptor {
            url: format!("{}/b.txt", server.base_url),
            timeout: 60,
            filename: "b.txt".to_string(),
        };
        let result = upload(&client, &source, &slot).await;
        match result {
            Err(ClientError::Rejected { status, .. }) => assert_eq!(status, StatusCode::NOT_FOUND),
            other => panic!("expected not found, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_source_file_is_reported() {
        let result = send_file("http://127.0.0.1:9", Path::new("/definitely/not/here.txt")).await;
        assert!(matches!(result, Err(ClientError::File { .. })));
    }
}
