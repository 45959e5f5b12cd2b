use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use micro_http::connection::HttpConnection;
use micro_http::handler::ConnectionInfo;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::environ::EnvironBuilder;
use crate::router::Router;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("router must be set")]
    MissingRouter,

    #[error("failed to bind {address}: {source}")]
    Bind { address: String, source: io::Error },

    #[error("invalid log level {level:?}")]
    InvalidLogLevel { level: String },
}

#[derive(Debug, Default)]
pub struct ServerBuilder {
    router: Option<Router>,
    config: ServerConfig,
    address: Option<String>,
}

impl ServerBuilder {
    fn new() -> Self {
        Self::default()
    }

    pub fn router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Listens on `address` instead of the configured host and port.
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn build(self) -> Result<Server, ServerError> {
        let router = self.router.ok_or(ServerError::MissingRouter)?;
        let address = self.address.unwrap_or_else(|| self.config.address());
        Ok(Server { router: Arc::new(router), config: self.config, address })
    }
}

#[derive(Debug)]
pub struct Server {
    router: Arc<Router>,
    config: ServerConfig,
    address: String,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Binds the listening socket without accepting yet.
    pub async fn bind(self) -> Result<BoundServer, ServerError> {
        let bind_error = |source| ServerError::Bind { address: self.address.clone(), source };
        let listener = TcpListener::bind(self.address.as_str()).await.map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        let environ_builder = EnvironBuilder::new(self.config.server_name(), local_addr.port());
        let dispatcher = Arc::new(Dispatcher::new(self.router, environ_builder));

        info!(%local_addr, "start listening");
        Ok(BoundServer { listener, local_addr, dispatcher })
    }

    /// Installs a log subscriber at the configured level, binds, and serves
    /// until the process ends. An already installed subscriber is kept.
    pub async fn start(self) -> Result<(), ServerError> {
        let subscriber = FmtSubscriber::builder().with_max_level(self.config.level()?).finish();
        if tracing::subscriber::set_global_default(subscriber).is_err() {
            debug!("a global subscriber is already installed");
        }

        let bound = self.bind().await.inspect_err(|e| error!(cause = %e, "bind server error"))?;
        bound.serve().await;
        Ok(())
    }
}

/// A server whose socket is bound; [`serve`](Self::serve) accepts connections.
#[derive(Debug)]
pub struct BoundServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
}

impl BoundServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections forever, each served by its own task.
    pub async fn serve(self) {
        loop {
            let (tcp_stream, remote_addr) = match self.listener.accept().await {
                Ok(stream_and_addr) => stream_and_addr,
                Err(e) => {
                    warn!(cause = %e, "failed to accept");
                    continue;
                }
            };

            let dispatcher = Arc::clone(&self.dispatcher);
            let connection_info = ConnectionInfo { local_addr: tcp_stream.local_addr().ok(), remote_addr: Some(remote_addr) };

            tokio::spawn(async move {
                let (reader, writer) = tcp_stream.into_split();
                let connection = HttpConnection::new(reader, writer).with_connection_info(connection_info);
                match connection.process(dispatcher).await {
                    Ok(()) => debug!(%remote_addr, "connection shutdown"),
                    Err(e) => warn!(%remote_addr, cause = %e, "connection shutdown with error"),
                }
            });
        }
    }
}
