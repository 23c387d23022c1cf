//! Upload rejections and their HTTP mapping.

use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};

use crate::storage::StorageError;

#[derive(Debug)]
pub enum ApiError {
    MissingIdentifier,
    InvalidLength,
    UnsupportedFeature,
    NameConflict(String),
    LengthMismatch { expected: u64, received: Option<u64> },
    NotFound(String),
    MethodNotAllowed(Method),
    MalformedInput(String),
    InvalidPath,
    TransferTimeout,
    Storage(StorageError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingIdentifier
            | ApiError::InvalidLength
            | ApiError::LengthMismatch { .. }
            | ApiError::MalformedInput(_)
            | ApiError::InvalidPath => StatusCode::BAD_REQUEST,
            ApiError::UnsupportedFeature => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NameConflict(_) => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::TransferTimeout => StatusCode::REQUEST_TIMEOUT,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::MissingIdentifier => {
                "Either a filename or MIME-type needs to be specified".into()
            }
            ApiError::InvalidLength => "Valid length needs to be specified".into(),
            ApiError::UnsupportedFeature => {
                "Filename generation not implemented yet. Please supply a filename".into()
            }
            ApiError::NameConflict(name) => format!("File {name} already exists"),
            ApiError::LengthMismatch { expected, received } => match received {
                Some(received) => format!(
                    "The length of the content ({received}) doesn't match the originally negotiated length ({expected})"
                ),
                None => format!(
                    "The length of the content is unknown, {expected} bytes were negotiated"
                ),
            },
            ApiError::NotFound(name) => format!("No negotiated upload for {name}"),
            ApiError::MethodNotAllowed(_) => "Method not allowed".into(),
            ApiError::MalformedInput(detail) => {
                format!("The JSON data you have sent is invalid: {detail}")
            }
            ApiError::InvalidPath => "Invalid filename".into(),
            ApiError::TransferTimeout => "Upload did not complete in time".into(),
            ApiError::Storage(StorageError::Create(_)) => "Could not create resource".into(),
            ApiError::Storage(StorageError::Body(_)) => "Could not read the content".into(),
            ApiError::Storage(_) => "Could not write file".into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = format!("{}\r\n", self.message());
        match self {
            ApiError::MethodNotAllowed(allowed) => {
                let mut headers = HeaderMap::new();
                if let Ok(value) = HeaderValue::from_str(allowed.as_str()) {
                    headers.insert(header::ALLOW, value);
                }
                (status, headers, body).into_response()
            }
            _ => (status, body).into_response(),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::InvalidPath => ApiError::InvalidPath,
            StorageError::TimedOut => ApiError::TransferTimeout,
            StorageError::Overflow { limit } => ApiError::LengthMismatch {
                expected: limit,
                received: None,
            },
            StorageError::Short { limit, written } => ApiError::LengthMismatch {
                expected: limit,
                received: Some(written),
            },
            other => ApiError::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_map_to_http_status_codes() {
        assert_eq!(ApiError::MissingIdentifier.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::InvalidLength.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::UnsupportedFeature.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::NameConflict("a".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::LengthMismatch {
                expected: 5,
                received: None
            }
            .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::NotFound("a".into()).status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn method_not_allowed_sets_allow_header() {
        let response = ApiError::MethodNotAllowed(Method::PUT).into_response();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers().get(header::ALLOW).unwrap(), "PUT");
    }

    #[test]
    fn storage_invalid_path_is_a_client_error() {
        let error: ApiError = StorageError::InvalidPath.into();
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
        let error: ApiError = StorageError::Write(std::io::Error::other("disk full")).into();
        assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
