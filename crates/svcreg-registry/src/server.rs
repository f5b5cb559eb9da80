//! Service registry server implementation.
//!
//! One registry, two listeners: plain HTTP always, HTTPS when the TLS
//! material can be loaded. Both serve the same router over the same shared
//! [`Registry`], and both hand the peer address to handlers as
//! [`ConnectInfo`] so registrations without a host can be filled in.

use crate::{api::create_router, config::RegistryConfig, storage::Registry, tls};
use axum::{extract::ConnectInfo, Extension, Router};
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto::Builder,
    service::TowerToHyperService,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use svcreg_common::{Error, Result, ResultExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

/// Pause after a failed `accept` on the TLS listener.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Service registry server.
pub struct RegistryServer {
    registry: Arc<Registry>,
    config: RegistryConfig,
    router: Router,
}

impl RegistryServer {
    /// Creates a server with a fresh, empty registry.
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_registry(config, Arc::new(Registry::new()))
    }

    /// Creates a server around an existing registry.
    pub fn with_registry(config: RegistryConfig, registry: Arc<Registry>) -> Self {
        let router = create_router(Arc::clone(&registry));

        Self {
            registry,
            config,
            router,
        }
    }

    /// Returns a reference to the registry.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Returns a handle to the router, e.g. for serving on a custom listener.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Starts the server and runs until SIGINT/SIGTERM.
    pub async fn run(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Starts the server and runs until `shutdown` completes.
    ///
    /// Failing to bind the HTTP port is fatal. Anything that goes wrong with
    /// TLS is logged and the server continues with HTTP only.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.http.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(Error::from)
            .context(format!("Failed to bind HTTP port {}", addr))?;

        let local_addr = listener.local_addr()?;
        info!("server running at http://localhost:{}", local_addr.port());

        let tls_task = self.spawn_tls().await;

        let result = serve_http(listener, self.router, shutdown).await;

        if let Some(task) = tls_task {
            task.abort();
            info!("Secure server stopped");
        }

        result
    }

    /// Starts the TLS listener if its material loads.
    pub(crate) async fn spawn_tls(&self) -> Option<JoinHandle<()>> {
        let options = &self.config.tls;
        if !options.enabled {
            info!("TLS disabled by configuration, serving plain HTTP only");
            return None;
        }

        let acceptor = match tls::load_acceptor(options) {
            Ok(acceptor) => acceptor,
            Err(e) => {
                warn!("could not read ssl cert + key: {}", e);
                return None;
            }
        };

        let addr = SocketAddr::from(([0, 0, 0, 0], options.port));
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                warn!("could not bind secure port {}: {}", addr, e);
                return None;
            }
        };

        if let Ok(local_addr) = listener.local_addr() {
            info!("secure server running at https://localhost:{}", local_addr.port());
        }

        Some(tokio::spawn(serve_tls(listener, acceptor, self.router.clone())))
    }
}

/// Serves `router` over plain HTTP until `shutdown` completes.
pub async fn serve_http<F>(listener: TcpListener, router: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    Ok(())
}

/// Accept loop for the TLS listener.
///
/// Each connection is handshaked and served on its own task; a failed
/// handshake only drops that connection. A failed `accept` backs off for
/// [`ACCEPT_RETRY_DELAY`] so a persistent error (e.g. EMFILE) cannot spin.
async fn serve_tls(listener: TcpListener, acceptor: TlsAcceptor, router: Router) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("TLS accept failed: {}", e);
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                continue;
            }
        };

        let acceptor = acceptor.clone();
        let service = router.clone().layer(Extension(ConnectInfo(peer)));

        tokio::spawn(async move {
            let stream = match acceptor.accept(stream).await {
                Ok(stream) => stream,
                Err(e) => {
                    debug!("TLS handshake with {} failed: {}", peer, e);
                    return;
                }
            };

            if let Err(e) = Builder::new(TokioExecutor::new())
                .serve_connection(TokioIo::new(stream), TowerToHyperService::new(service))
                .await
            {
                debug!("TLS connection with {} ended: {}", peer, e);
            }
        });
    }
}

/// Completes on SIGINT or SIGTERM (Ctrl+C on Windows).
pub async fn shutdown_signal() {
    use tokio::signal;

    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM signal"),
                    _ = sigint.recv() => info!("Received SIGINT signal"),
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!("Failed to install signal handlers ({}), falling back to Ctrl+C", e);
                let _ = signal::ctrl_c().await;
                info!("Received Ctrl+C signal");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
        info!("Received Ctrl+C signal");
    }
}
