use axum::body::Body as AxumBody;
use futures_util::stream::StreamExt;
use http_body_util::BodyExt;
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncWriteExt, ErrorKind};
use tokio::time::{Instant, timeout_at};
use tracing::debug;

use crate::atomic::AtomicFile;

/// Local directory that receives finished uploads.
#[derive(Clone, Debug)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    /// Creates a storage rooted at `root`. The directory is not touched.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Creates the root directory if it is missing.
    pub async fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// Maps a client supplied name onto a path below the root.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, StorageError> {
        let mut normalized = PathBuf::new();
        let trimmed = relative.trim_start_matches(['/', '\\']);
        for component in Path::new(trimmed).components() {
            match component {
                Component::Normal(segment) => normalized.push(segment),
                Component::CurDir => continue,
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(StorageError::InvalidPath);
                }
            }
        }
        if normalized.as_os_str().is_empty() {
            return Err(StorageError::InvalidPath);
        }
        Ok(self.root.join(normalized))
    }

    /// Anything other than a clean "not found" counts as occupied.
    pub async fn exists(&self, relative: &str) -> Result<bool, StorageError> {
        let target = self.resolve(relative)?;
        match fs::symlink_metadata(&target).await {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(_) => Ok(true),
        }
    }

    /// Streams `body` into `relative`, replacing the target atomically once
    /// exactly `limit` bytes have been written. Reading more than `limit`
    /// bytes, or still waiting for data at `deadline`, aborts the write.
    /// Returns the number of bytes stored.
    pub async fn write_stream(
        &self,
        relative: &str,
        limit: u64,
        body: AxumBody,
        deadline: Option<Instant>,
    ) -> Result<u64, StorageError> {
        let target = self.resolve(relative)?;
        let mut atomic = AtomicFile::new(&target).await?;
        let write_result: Result<u64, StorageError> = async {
            let mut data_stream = BodyExt::into_data_stream(body);
            let mut written: u64 = 0;
            loop {
                let next = match deadline {
                    Some(deadline) => timeout_at(deadline, data_stream.next())
                        .await
                        .map_err(|_| StorageError::TimedOut)?,
                    None => data_stream.next().await,
                };
                let Some(chunk) = next else {
                    break;
                };
                let chunk = chunk.map_err(|err| StorageError::Body(err.to_string()))?;
                if chunk.is_empty() {
                    continue;
                }
                written += chunk.len() as u64;
                if written > limit {
                    return Err(StorageError::Overflow { limit });
                }
                atomic
                    .file_mut()
                    .write_all(&chunk)
                    .await
                    .map_err(StorageError::Write)?;
            }
            Ok(written)
        }
        .await;

        match write_result {
            Ok(written) if written == limit => {
                atomic.finalize().await?;
                debug!(path = ?target, bytes = written, "upload stored");
                Ok(written)
            }
            Ok(written) => {
                atomic.cleanup().await;
                Err(StorageError::Short { limit, written })
            }
            Err(err) => {
                atomic.cleanup().await;
                Err(err)
            }
        }
    }
}

#[derive(Debug)]
pub enum StorageError {
    InvalidPath,
    Create(io::Error),
    Write(io::Error),
    Body(String),
    Overflow { limit: u64 },
    Short { limit: u64, written: u64 },
    TimedOut,
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::InvalidPath => write!(f, "invalid path"),
            StorageError::Create(err) => write!(f, "could not create file: {err}"),
            StorageError::Write(err) => write!(f, "could not write file: {err}"),
            StorageError::Body(err) => write!(f, "could not read the content: {err}"),
            StorageError::Overflow { limit } => write!(f, "content exceeds {limit} bytes"),
            StorageError::Short { limit, written } => {
                write!(f, "content ended after {written} of {limit} bytes")
            }
            StorageError::TimedOut => write!(f, "upload deadline passed"),
        }
    }
}
