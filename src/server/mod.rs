//! HTTP server module
//!
//! A small hyper server that puts the token authenticator in front of every
//! route except health, metrics and token issuance.
//!
//! # Example
//!
//! ```no_run
//! use komainu::config::Config;
//! use komainu::server::Server;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load("config.yaml")?;
//! let server = Server::new(config).await?;
//! println!("Server bound to: {}", server.local_addr());
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

mod handler;

use crate::auth::{AuthError, TokenAuthenticator};
use crate::config::Config;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info};

pub use handler::handle_request;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(String),

    #[error("Authenticator setup failed: {0}")]
    AuthError(#[from] AuthError),
}

/// State shared by every connection
#[derive(Debug, Clone)]
pub struct AppState {
    pub authenticator: TokenAuthenticator,
    pub metrics_enabled: bool,
}

/// HTTP Server
pub struct Server {
    state: Arc<AppState>,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Create a server, building the authenticator from the `auth` section
    pub async fn new(config: Config) -> Result<Self, ServerError> {
        let authenticator = TokenAuthenticator::from_config(&config.auth)?;
        Self::with_authenticator(&config, authenticator).await
    }

    /// Create a server around an already configured authenticator
    ///
    /// Binds immediately. With port 0 the OS assigns a port; see
    /// [`Server::local_addr`].
    pub async fn with_authenticator(
        config: &Config,
        authenticator: TokenAuthenticator,
    ) -> Result<Self, ServerError> {
        let addr: SocketAddr = config
            .server
            .address
            .parse()
            .map_err(|e| ServerError::BindError(format!("Invalid address: {}", e)))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(format!("Failed to bind to {}: {}", addr, e)))?;

        // Actual bound address, important for port 0
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::BindError(format!("Failed to get local address: {}", e)))?;

        info!("Server bound to {}", local_addr);

        Ok(Self {
            state: Arc::new(AppState {
                authenticator,
                metrics_enabled: config.metrics.enabled,
            }),
            listener,
            local_addr,
        })
    }

    /// Address the server is listening on
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until the task is dropped
    ///
    /// Each connection is served on its own tokio task. Accept and connection
    /// errors are logged and do not stop the loop.
    pub async fn run(self) -> Result<(), ServerError> {
        info!("Starting server on {}", self.local_addr);

        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            let state = Arc::clone(&self.state);

            tokio::spawn(async move {
                let io = TokioIo::new(stream);

                let service = service_fn(move |req| {
                    let state = Arc::clone(&state);
                    async move { handle_request(req, state).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Error serving connection from {}: {}", peer_addr, e);
                }
            });
        }
    }
}
