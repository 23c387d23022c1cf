//! Router assembly: control plane on `/`, data plane on `/{filename}`.

use axum::extract::{DefaultBodyLimit, Extension, connect_info::ConnectInfo};
use axum::http::Request;
use axum::routing::{post, put};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info_span};

use crate::registry::Registry;
use crate::storage::Storage;
use crate::upload::{self, UploadConfig};

pub fn build_router(
    storage: Arc<Storage>,
    registry: Arc<Registry>,
    upload_config: Arc<UploadConfig>,
) -> Router {
    Router::new()
        .route(
            "/",
            post(upload::negotiate_upload).fallback(upload::negotiate_method_not_allowed),
        )
        .route(
            "/{filename}",
            put(upload::transfer_upload)
                .fallback(upload::transfer_method_not_allowed)
                .layer(DefaultBodyLimit::disable()),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let forwarded_ip = request
                        .headers()
                        .get("x-forwarded-for")
                        .and_then(|v| v.to_str().ok())
                        .map(|s| s.split(',').next().unwrap_or("").trim().to_string());
                    let connect_ip = request
                        .extensions()
                        .get::<ConnectInfo<SocketAddr>>()
                        .map(|ConnectInfo(addr)| addr.to_string());
                    let client_ip = forwarded_ip
                        .or(connect_ip)
                        .unwrap_or_else(|| "unknown".to_string());

                    info_span!(
                        env!("CARGO_CRATE_NAME"),
                        client_ip,
                        method = ?request.method(),
                        path = ?request.uri().path(),
                    )
                })
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(Extension(storage))
        .layer(Extension(registry))
        .layer(Extension(upload_config))
}
