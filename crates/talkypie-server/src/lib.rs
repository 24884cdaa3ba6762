//! The Talkypie Profile Service and process wiring.
//!
//! [`app`] builds the axum router for the profile API.
//! [`spawn_profile_service`] runs it on a dedicated thread with its own
//! runtime, so profile traffic never competes with voice sessions.

pub mod api_profile;
pub mod config;
pub mod middleware;

use axum::{extract::DefaultBodyLimit, routing::get, Extension, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;
use talkypie_store::ProfileStore;
use tokio::sync::oneshot;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ProfileStore>,
}

const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

pub fn app(state: AppState) -> Router {
    Router::new()
        .route(
            "/",
            get(api_profile::health_handler).fallback(api_profile::not_found_handler),
        )
        .route(
            "/profile",
            get(api_profile::get_profile_handler)
                .post(api_profile::post_profile_handler)
                // axum answers HEAD with the GET handler unless HEAD has its own route.
                .head(api_profile::not_found_handler)
                .fallback(api_profile::not_found_handler),
        )
        .fallback(api_profile::not_found_handler)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(Extension(Arc::new(state)))
        .layer(axum::middleware::from_fn(middleware::cors_middleware))
        .layer(TraceLayer::new_for_http())
}

/// A running Profile Service.
pub struct ProfileServiceHandle {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl ProfileServiceHandle {
    /// The bound address; differs from the requested one when port 0 was
    /// requested.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting connections, finishes in-flight requests, and joins
    /// the service thread.
    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("profile service thread panicked");
            }
        }
    }
}

impl Drop for ProfileServiceHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Binds `addr` and serves the profile API on a dedicated thread.
///
/// The socket is bound before this returns, so bind failures surface here
/// and clients may connect as soon as it does.
///
/// # Errors
///
/// Returns the I/O error if the address cannot be bound, or if the
/// service runtime or its thread cannot be started.
pub fn spawn_profile_service(
    addr: SocketAddr,
    store: Arc<dyn ProfileStore>,
) -> std::io::Result<ProfileServiceHandle> {
    let listener = std::net::TcpListener::bind(addr)?;
    listener.set_nonblocking(true)?;
    let local_addr = listener.local_addr()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("profile-service-worker")
        .enable_all()
        .build()?;
    let listener = {
        let _guard = runtime.enter();
        tokio::net::TcpListener::from_std(listener)?
    };
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let thread = std::thread::Builder::new()
        .name("profile-service".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                tracing::info!(addr = %local_addr, "profile service listening");

                let shutdown = async {
                    let _ = shutdown_rx.await;
                };
                if let Err(e) = axum::serve(listener, app(AppState { store }))
                    .with_graceful_shutdown(shutdown)
                    .await
                {
                    tracing::error!(error = %e, "profile service error");
                }
                tracing::info!("profile service stopped");
            });
        })?;

    Ok(ProfileServiceHandle {
        local_addr,
        shutdown: Some(shutdown_tx),
        thread: Some(thread),
    })
}
