//! Listening transports. Each one binds in `setup` and then feeds raw
//! messages into the shared pipeline from `process` until the process stops.

pub mod http;
pub mod udp;

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use thiserror::Error;

/// Startup failures binding a listener. Fatal; binds are never retried.
#[derive(Debug, Error)]
pub enum BindError {
    #[error(
        "There appears that another instance is running, or another process \
         is listening at the same port ({address}:{port})"
    )]
    AddressInUse { address: String, port: u16 },

    #[error("The address {address} is not available on this host: {source}")]
    AddressNotAvailable {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to bind {address}:{port}: {source}")]
    Io {
        address: String,
        port: u16,
        #[source]
        source: io::Error,
    },
}

impl BindError {
    pub fn from_io(address: &str, port: u16, source: io::Error) -> Self {
        let address = address.to_string();
        match source.kind() {
            io::ErrorKind::AddrInUse => BindError::AddressInUse { address, port },
            io::ErrorKind::AddrNotAvailable => BindError::AddressNotAvailable { address, source },
            _ => BindError::Io {
                address,
                port,
                source,
            },
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    type Connection: Send;

    /// Bind the listening socket.
    async fn setup(&self) -> Result<Self::Connection, BindError>;

    /// Serve messages on the bound socket. Runs until cancelled.
    async fn process(&self, connection: Self::Connection);
}

/// Resolve `address:port` to the first socket address. A name that does not
/// resolve counts as an unavailable address.
pub async fn resolve(address: &str, port: u16) -> Result<SocketAddr, BindError> {
    let not_available = |source| BindError::AddressNotAvailable {
        address: address.to_string(),
        source,
    };
    tokio::net::lookup_host((address, port))
        .await
        .map_err(not_available)?
        .next()
        .ok_or_else(|| not_available(io::Error::from(io::ErrorKind::AddrNotAvailable)))
}
