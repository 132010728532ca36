// This file is part of Blackhole, a virtual-production take archival service.
// Copyright (C) 2024 The Blackhole Authors; see AUTHORS and LICENSE.txt.

//! Subcommand to run the capture/archival HTTP server.

use crate::web::{self, AppState};
use base::Error;
use bpaf::Bpaf;
use catalog::config;
use catalog::{Catalog, SessionManager};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

/// Runs the capture/archival HTTP server until interrupted.
#[derive(Bpaf, Debug)]
#[bpaf(command("run"))]
pub struct Args {
    /// Directory holding app_config.ini and device_config.ini.
    #[bpaf(external(crate::parse_config_dir))]
    config_dir: PathBuf,

    /// The number of worker threads used by the asynchronous runtime.
    /// Defaults to the number of cores on the system.
    #[bpaf(long)]
    worker_threads: Option<usize>,
}

pub fn run(args: Args) -> Result<i32, Error> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(worker_threads) = args.worker_threads {
        builder.worker_threads(worker_threads);
    }
    builder
        .build()
        .map_err(|e| base::err!(Internal, msg("building tokio runtime"), source(e)))?
        .block_on(async_run(args))
}

async fn async_run(args: Args) -> Result<i32, Error> {
    let (app_config, devices) = config::load_or_seed(&args.config_dir)?;
    info!(config_dir = %args.config_dir.display(), devices = devices.len(), "configuration loaded");

    let catalog = Catalog::open(&app_config.database_path)?;
    let workbook = catalog::workbook::Workbook::new(app_config.spreadsheet_path.clone());
    workbook.seed_from_catalog(&catalog)?;
    let sessions = SessionManager::new();

    let state = Arc::new(AppState {
        catalog,
        sessions,
        workbook,
        app_config: app_config.clone(),
        devices,
    });

    let listener = TcpListener::bind(app_config.bind_addr).await.map_err(|e| {
        base::err!(BindError, msg("binding --bind-addr={}", app_config.bind_addr), source(e))
    })?;
    info!(addr = %app_config.bind_addr, "ready to serve HTTP requests");

    let graceful = GracefulShutdown::new();
    let mut int = signal(SignalKind::interrupt())
        .map_err(|e| base::err!(Internal, msg("installing SIGINT handler"), source(e)))?;
    let mut term = signal(SignalKind::terminate())
        .map_err(|e| base::err!(Internal, msg("installing SIGTERM handler"), source(e)))?;

    loop {
        tokio::select! {
            conn = listener.accept() => {
                let (stream, peer_addr) = match conn {
                    Ok(c) => c,
                    Err(e) => {
                        error!(err = %e, "accept failed");
                        continue;
                    }
                };
                let io = TokioIo::new(stream);
                let state = state.clone();
                let conn = http1::Builder::new().serve_connection(
                    io,
                    service_fn(move |req| {
                        let state = state.clone();
                        async move { web::serve(state, req).await }
                    }),
                );
                let conn = graceful.watch(conn);
                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        error!(err = %e, %peer_addr, "connection error");
                    }
                });
            }
            _ = int.recv() => {
                info!("received SIGINT, shutting down");
                break;
            }
            _ = term.recv() => {
                info!("received SIGTERM, shutting down");
                break;
            }
        }
    }

    if state.sessions.get_recording_status().is_recording {
        info!("discarding in-progress recording on shutdown");
        state.sessions.reset_recording_state();
    }

    tokio::select! {
        () = graceful.shutdown() => info!("all connections closed gracefully"),
        () = tokio::time::sleep(std::time::Duration::from_secs(10)) => {
            info!("timed out waiting for connections to close");
        }
    }

    info!("exiting");
    Ok(0)
}
