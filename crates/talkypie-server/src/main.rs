//! Talkypie binary: the Profile Service plus the voice agent worker.
//!
//! Starts the Profile Service once on its own thread, prewarms the worker,
//! joins the configured rooms, and shuts everything down on SIGTERM/SIGINT.

use std::net::SocketAddr;
use std::sync::Arc;
use talkypie_agent::{AgentJobHandler, JobRequest, ShutdownTrigger, Worker, DEFAULT_PREAMBLE};
use talkypie_server::{config, spawn_profile_service};
use talkypie_store::{FileProfileStore, ProfileStore};
use talkypie_voice::{DefaultStageProvider, LiveKitRoom, StageProvider, VoiceService};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("TALKYPIE_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("talkypie.toml"));

    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration, the process cannot start without valid config");

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    let store: Arc<dyn ProfileStore> = Arc::new(FileProfileStore::new(&config.profile.path));
    let addr = SocketAddr::new(config.server.host, config.server.port);
    let profile_service = spawn_profile_service(addr, Arc::clone(&store))
        .expect("failed to bind profile service, is another process using this port?");
    tracing::info!(
        addr = %profile_service.local_addr(),
        profile = %config.profile.path,
        "profile service started"
    );

    let provider: Arc<dyn StageProvider> =
        Arc::new(DefaultStageProvider::new(config.pipeline.clone()));
    let handler = AgentJobHandler::new(store, provider, DEFAULT_PREAMBLE);
    let worker = Worker::new(Arc::new(handler));
    let voice_service = Arc::new(VoiceService::new(config.livekit.clone()));

    let (jobs_tx, jobs_rx) = mpsc::channel(config.worker.rooms.len().max(1));
    for room in &config.worker.rooms {
        let (request, _) = JobRequest::new(LiveKitRoom::new(room, Arc::clone(&voice_service)));
        if jobs_tx.send(request).await.is_err() {
            break;
        }
    }
    if config.worker.rooms.is_empty() {
        tracing::info!("no rooms configured, serving profiles only");
    }

    let stop = ShutdownTrigger::new();
    let signal = stop.subscribe();
    let mut worker_task = tokio::spawn(async move { worker.run(jobs_rx, signal).await });

    let outcome = tokio::select! {
        () = shutdown_signal() => {
            stop.trigger();
            worker_task.await
        }
        outcome = &mut worker_task => outcome,
    };
    drop(jobs_tx);

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "worker stopped with error"),
        Err(e) => tracing::error!(error = %e, "worker task panicked"),
    }

    profile_service.shutdown();
    tracing::info!("talkypie shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
