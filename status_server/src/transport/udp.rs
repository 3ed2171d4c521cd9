//! UDP transport: one JSON build event per datagram.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UdpSocket;

use super::{resolve, BindError, Transport};
use crate::config::ListenConfig;
use crate::services::pipeline::Pipeline;

/// Larger datagrams are truncated to this size.
pub const MAX_DATAGRAM: usize = 2048;

pub struct UdpTransport {
    config: ListenConfig,
    pipeline: Arc<Pipeline>,
}

impl UdpTransport {
    pub fn new(config: ListenConfig, pipeline: Arc<Pipeline>) -> Self {
        Self { config, pipeline }
    }
}

#[async_trait]
impl Transport for UdpTransport {
    type Connection = UdpSocket;

    async fn setup(&self) -> Result<UdpSocket, BindError> {
        let ListenConfig { address, port } = &self.config;
        let addr = resolve(address, *port).await?;
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| BindError::from_io(address, *port, e))?;
        tracing::info!("Listening on UDP {}:{}", address, port);
        Ok(socket)
    }

    async fn process(&self, socket: UdpSocket) {
        let mut buf = [0u8; MAX_DATAGRAM];
        loop {
            let (len, peer) = match socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    tracing::warn!("UDP receive failed: {e}");
                    continue;
                }
            };
            tracing::debug!(%peer, len, "Datagram received");

            // Failures are logged by the pipeline; the loop keeps serving.
            let _ = self.pipeline.dispatch("udp", buf[..len].to_vec()).await;
        }
    }
}
