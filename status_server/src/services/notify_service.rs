//! Indicator notifier: pushes the aggregate pass/fail state to the light.
//!
//! Each attempt opens a connection, sends `GET <path> HTTP/1.0`, reads the
//! answer to EOF and closes, all within [`ATTEMPT_TIMEOUT`]. Timeouts retry
//! immediately; refused or unreachable hosts retry after an exponential
//! backoff ([`wait_for`]). Anything else abandons the notification. At most
//! `tcp_client.attempts + 1` attempts are made per call.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::TcpClientConfig;

/// Upper bound on a single connect/send/receive exchange.
pub const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

/// Backoff ceiling, in seconds.
pub const MAX_WAIT_SECS: u64 = 60;

/// Backoff before retrying after the given (1-based) attempt: 2, 4, 8, ...
/// capped at one minute.
pub fn wait_for(attempt: u32) -> Duration {
    let secs = 2u64
        .checked_pow(attempt)
        .map_or(MAX_WAIT_SECS, |w| w.min(MAX_WAIT_SECS));
    Duration::from_secs(secs)
}

/// Opens the connection to the indicator.
#[async_trait]
pub trait Connector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    async fn connect(&self, host: &str, port: u16) -> io::Result<Self::Stream>;
}

/// Plain TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, host: &str, port: u16) -> io::Result<TcpStream> {
        TcpStream::connect((host, port)).await
    }
}

/// How a `notify` call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The indicator answered.
    Delivered { answer: String },
    /// Every attempt timed out or could not reach the host.
    GaveUp,
    /// An unexpected error stopped retrying.
    Abandoned,
}

impl Delivery {
    pub fn as_str(&self) -> &'static str {
        match self {
            Delivery::Delivered { .. } => "delivered",
            Delivery::GaveUp => "gave_up",
            Delivery::Abandoned => "abandoned",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyReport {
    pub delivery: Delivery,
    /// Attempts made, including the first.
    pub attempts: u32,
    /// Backoff sleeps taken between attempts.
    pub waits: Vec<Duration>,
}

#[derive(Debug)]
enum AttemptError {
    TimedOut,
    Unreachable(io::Error),
    Unexpected(io::Error),
}

impl AttemptError {
    fn classify(e: io::Error) -> Self {
        let unreachable = matches!(
            e.raw_os_error(),
            Some(code) if code == libc::EHOSTUNREACH || code == libc::ENETUNREACH
        );
        match e.kind() {
            io::ErrorKind::ConnectionRefused => AttemptError::Unreachable(e),
            io::ErrorKind::TimedOut => AttemptError::TimedOut,
            _ if unreachable => AttemptError::Unreachable(e),
            _ => AttemptError::Unexpected(e),
        }
    }
}

pub struct Notifier<C = TcpConnector> {
    config: TcpClientConfig,
    connector: C,
}

impl Notifier<TcpConnector> {
    pub fn new(config: TcpClientConfig) -> Self {
        Self::with_connector(config, TcpConnector)
    }
}

impl<C: Connector> Notifier<C> {
    pub fn with_connector(config: TcpClientConfig, connector: C) -> Self {
        Self { config, connector }
    }

    /// Total attempts per notification.
    pub fn max_attempts(&self) -> u32 {
        self.config.attempts.saturating_add(1)
    }

    /// Request path for the given state.
    pub fn target(&self, passing: bool) -> &str {
        if passing {
            &self.config.pass
        } else {
            &self.config.fail
        }
    }

    /// Signal the indicator. Never fails; the report says what happened.
    pub async fn notify(&self, passing: bool) -> NotifyReport {
        let light = self.target(passing);
        let request = format!("GET {light} HTTP/1.0\n\n");
        let max_attempts = self.max_attempts();
        let mut waits = Vec::new();

        for attempt in 1..=max_attempts {
            match self.attempt(request.as_bytes()).await {
                Ok(answer) => {
                    tracing::debug!(light, attempt, %answer, "Indicator answered");
                    return self.finish(Delivery::Delivered { answer }, attempt, waits);
                }
                Err(AttemptError::TimedOut) => {
                    tracing::warn!(attempt, "Error: timed out while trying to send {light}");
                }
                Err(AttemptError::Unreachable(e)) => {
                    tracing::warn!(attempt, "Error: {e} while trying to send {light}");
                    if attempt < max_attempts {
                        let wait = wait_for(attempt);
                        tracing::warn!("Will wait for {} seconds and try again...", wait.as_secs());
                        tokio::time::sleep(wait).await;
                        waits.push(wait);
                    }
                }
                Err(AttemptError::Unexpected(e)) => {
                    tracing::error!(
                        attempt,
                        "There was an error, but we don't know how to handle it: ({:?}) {e}",
                        e.kind()
                    );
                    return self.finish(Delivery::Abandoned, attempt, waits);
                }
            }
        }

        tracing::warn!(attempts = max_attempts, "Giving up on sending {light}");
        self.finish(Delivery::GaveUp, max_attempts, waits)
    }

    fn finish(&self, delivery: Delivery, attempts: u32, waits: Vec<Duration>) -> NotifyReport {
        crate::metrics::notification_finished(delivery.as_str());
        NotifyReport {
            delivery,
            attempts,
            waits,
        }
    }

    async fn attempt(&self, request: &[u8]) -> Result<String, AttemptError> {
        let round_trip = async {
            let mut stream = self
                .connector
                .connect(&self.config.host, self.config.port)
                .await?;
            let result = exchange(&mut stream, request).await;
            // Closed on every path; a failed shutdown changes nothing for the caller.
            let _ = stream.shutdown().await;
            result
        };

        match tokio::time::timeout(ATTEMPT_TIMEOUT, round_trip).await {
            Ok(result) => result.map_err(AttemptError::classify),
            Err(_) => Err(AttemptError::TimedOut),
        }
    }
}

async fn exchange<S>(stream: &mut S, request: &[u8]) -> io::Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(request).await?;
    stream.flush().await?;
    let mut answer = Vec::new();
    stream.read_to_end(&mut answer).await?;
    Ok(String::from_utf8_lossy(&answer).into_owned())
}
