//! HTTP transport: serves the router from [`crate::routes`].

use async_trait::async_trait;
use tokio::net::TcpListener;

use super::{resolve, BindError, Transport};
use crate::config::ListenConfig;
use crate::routes::{router, AppState};

pub struct HttpTransport {
    config: ListenConfig,
    state: AppState,
}

impl HttpTransport {
    pub fn new(config: ListenConfig, state: AppState) -> Self {
        Self { config, state }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    type Connection = TcpListener;

    async fn setup(&self) -> Result<TcpListener, BindError> {
        let ListenConfig { address, port } = &self.config;
        let addr = resolve(address, *port).await?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| BindError::from_io(address, *port, e))?;
        tracing::info!("Listening on HTTP {}:{}", address, port);
        Ok(listener)
    }

    async fn process(&self, listener: TcpListener) {
        if let Err(e) = axum::serve(listener, router(self.state.clone())).await {
            tracing::error!("HTTP server stopped: {e}");
        }
    }
}
