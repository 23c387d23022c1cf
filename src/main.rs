//! himawari: a small file upload server and client.
//!
//! Uploads happen in two steps. The client first posts the name and length
//! of the file to `/` and receives a single-use slot URL, then PUTs exactly
//! that many bytes to the slot. Slots that are not used within their timeout
//! are swept away by a background reaper.

mod atomic;
mod background;
mod client;
mod config;
mod error;
mod http;
mod logging;
mod registry;
mod storage;
mod upload;

use axum_server::Handle;
use clap::Parser;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::background::spawn_reaper;
use crate::config::{Cli, Command, SHUTDOWN_GRACE_SECS, SendArgs, ServeArgs};
use crate::http::build_router;
use crate::registry::Registry;
use crate::storage::Storage;
use crate::upload::UploadConfig;

#[tokio::main]
async fn main() -> Result<ExitCode, std::io::Error> {
    logging::init_logging();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => {
            serve(args).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Send(args) => Ok(send(args).await),
    }
}

/// Runs the upload server until Ctrl+C or SIGTERM.
async fn serve(args: ServeArgs) -> Result<(), std::io::Error> {
    let addr = args
        .bind
        .parse::<SocketAddr>()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;
    let storage = Arc::new(Storage::new(PathBuf::from(&args.datadir)));
    storage.ensure_root().await?;
    let registry = Arc::new(Registry::new());
    let upload_config = Arc::new(UploadConfig {
        base_url: args.base_url(),
        slot_timeout: args.slot_timeout_secs,
        transfer_timeout: Duration::from_secs(args.transfer_timeout_secs),
    });

    let cancel = CancellationToken::new();
    let reaper = spawn_reaper(
        registry.clone(),
        Duration::from_secs(args.reaper_interval_secs),
        args.reaper_interval_secs,
        cancel.clone(),
    );

    info!(
        %addr,
        datadir = %storage.root_path().display(),
        base_url = upload_config.base_url,
        "starting upload server"
    );
    let app = build_router(storage, registry, upload_config);
    let handle = Handle::new();
    tokio::spawn(shutdown_signal(handle.clone(), cancel.clone()));

    let result = axum_server::bind(addr)
        .handle(handle)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await;
    if let Err(err) = &result {
        error!(error = %err, "server stopped with an error");
    }

    cancel.cancel();
    if let Err(err) = reaper.await {
        warn!(error = %err, "slot reaper did not shut down cleanly");
    }
    result
}

/// Uploads one file and prints where it ended up.
async fn send(args: SendArgs) -> ExitCode {
    match client::send_file(&args.server, Path::new(&args.file)).await {
        Ok(url) => {
            println!("{url}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(file = args.file, server = args.server, error = %err, "upload failed");
            ExitCode::FAILURE
        }
    }
}

async fn shutdown_signal(handle: Handle, cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("received termination signal, shutting down");
    cancel.cancel();
    handle.graceful_shutdown(Some(Duration::from_secs(SHUTDOWN_GRACE_SECS)));
}
