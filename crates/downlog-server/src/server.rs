//! Log server implementation.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::{ServerConfig, TlsConfig};
use crate::error::{ServerError, ServerResult};
use crate::routes::create_router;
use crate::state::AppState;

/// How long in-flight downloads may run after a TLS shutdown request.
const TLS_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP server streaming log archives.
#[derive(Debug, Clone)]
pub struct LogServer {
    state: Arc<AppState>,
}

impl LogServer {
    /// Create a new log server with the given configuration.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self {
            state: Arc::new(AppState::new(config)),
        }
    }

    /// Get the shared state.
    #[must_use]
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Create the router without starting the server.
    ///
    /// Useful for testing or embedding in another server.
    pub fn router(&self) -> axum::Router {
        create_router(self.state())
    }

    /// Start the server on the configured address and run until it fails.
    ///
    /// # Errors
    ///
    /// Returns an error if binding fails, the TLS material cannot be loaded,
    /// or the server stops with an I/O error.
    pub async fn serve(&self) -> ServerResult<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Start the server with graceful shutdown support.
    ///
    /// The server stops accepting connections when `shutdown` completes and
    /// returns once in-flight downloads have finished.
    ///
    /// # Errors
    ///
    /// Returns an error if binding fails, the TLS material cannot be loaded,
    /// or the server stops with an I/O error.
    pub async fn serve_with_shutdown<F>(&self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let config = self.state.config();
        match &config.tls {
            Some(tls) => self.serve_tls(config.bind_addr, tls, shutdown).await,
            None => {
                let listener = TcpListener::bind(config.bind_addr)
                    .await
                    .map_err(|e| ServerError::BindFailed(config.bind_addr, e))?;
                self.serve_listener(listener, shutdown).await
            }
        }
    }

    /// Serve plain HTTP on an already bound listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the server stops with an I/O error.
    pub async fn serve_listener<F>(&self, listener: TcpListener, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr().map_err(ServerError::Serve)?;
        info!(addr = %addr, base = %self.state.config().api_base(), "Log server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(ServerError::Serve)?;

        info!("Log server shut down");
        Ok(())
    }

    async fn serve_tls<F>(&self, addr: SocketAddr, tls: &TlsConfig, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let rustls = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
            .await
            .map_err(ServerError::Tls)?;

        let listener = std::net::TcpListener::bind(addr).map_err(|e| ServerError::BindFailed(addr, e))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| ServerError::BindFailed(addr, e))?;

        let handle = Handle::new();
        let shutdown_handle = handle.clone();
        tokio::spawn(async move {
            shutdown.await;
            shutdown_handle.graceful_shutdown(Some(TLS_DRAIN_TIMEOUT));
        });

        info!(addr = %addr, base = %self.state.config().api_base(), "Log server listening with TLS");

        axum_server::from_tcp_rustls(listener, rustls)
            .handle(handle)
            .serve(self.router().into_make_service())
            .await
            .map_err(ServerError::Serve)?;

        info!("Log server shut down");
        Ok(())
    }
}
