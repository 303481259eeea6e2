// src/lib.rs

pub mod bridge;
pub mod cache_root;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod frontend;
pub mod fs;
pub mod job;
pub mod logging;
pub mod ops;
pub mod progress;
pub mod transaction;
pub mod types;

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::cache_root::CacheRootSwitch;
use crate::cli::CliArgs;
use crate::config::load_or_default;
use crate::engine::local::LocalEngine;
use crate::frontend::printer::{print_events, OutputFormat};
use crate::frontend::{ChannelSink, Outcome};
use crate::fs::{FileSystem, RealFileSystem};
use crate::job::Coordinator;
use crate::ops::Request;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the file-backed engine and the cache-root switch
/// - the job coordinator and the event printer
/// - Ctrl-C handling
///
/// Returns the outcome of the requested job.
pub async fn run(args: CliArgs) -> Result<Outcome> {
    let cfg = load_or_default(&args.config)?;
    debug!(config = %args.config.display(), "configuration loaded");

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let engine = LocalEngine::new(Arc::clone(&fs), cfg.engine_settings());
    let cache = CacheRootSwitch::new(Arc::clone(&fs), cfg.cache_roots());

    let (sink, rx) = ChannelSink::new();
    let format = if args.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    let printer = tokio::spawn(print_events(rx, format));

    let coordinator = Arc::new(Coordinator::new(
        Box::new(engine),
        fs,
        cache,
        cfg.job_settings(),
        Arc::new(sink),
    ));

    for id in &args.accept_eula {
        coordinator.eulas().accept(id.as_str());
    }

    let request = args.command.to_request();
    let job = coordinator.create_job();

    // Ctrl-C → cancel the running job.
    let interrupt = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            info!(job = %job, "interrupt received");
            coordinator.cancel(job);
        })
    };

    let outcome = {
        let coordinator = Arc::clone(&coordinator);
        let trust = args.trust.clone();
        tokio::task::spawn_blocking(move || {
            for key_id in trust {
                coordinator.execute(&Request::InstallSignature { key_id });
            }
            coordinator.run(job, &request)
        })
        .await?
    };

    // Dropping the last coordinator closes the event channel.
    interrupt.abort();
    let _ = interrupt.await;
    drop(coordinator);
    printer.await??;

    Ok(outcome)
}
