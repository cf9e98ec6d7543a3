//! Connection to the colony server
//!
//! One TCP session at a time, opened lazily and reopened after any transport
//! failure. Requests are strictly serialized: the session mutex is held from
//! writing a request line until its single response line arrives, so responses
//! cannot be handed to the wrong caller.
//!
//! State transitions are published on a watch channel:
//! `Disconnected -> Connecting -> Connected -> AwaitingResponse -> Connected`.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, info, warn};

use super::line_reader::{AsyncLineReader, ReadEnd};
use super::protocol::Request;
use crate::config::ServerConfig;
use crate::error::{Result, SyncError};
use crate::sync::ChangeHub;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    AwaitingResponse,
}

/// One open socket: the write half plus the background line reader.
struct Session {
    writer: OwnedWriteHalf,
    lines: mpsc::UnboundedReceiver<String>,
    _reader: AbortOnDropHandle<ReadEnd>,
}

impl Session {
    async fn round_trip(
        &mut self,
        line: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<String> {
        while let Ok(stale) = self.lines.try_recv() {
            debug!(line = %stale, "Discarding unsolicited line");
        }

        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;

        tokio::select! {
            _ = cancel.cancelled() => Err(SyncError::Cancelled),
            received = tokio::time::timeout(timeout, self.lines.recv()) => match received {
                Ok(Some(response)) => Ok(response),
                Ok(None) => Err(SyncError::ConnectionClosed),
                Err(_) => Err(SyncError::Timeout(format!(
                    "no response within {} ms",
                    timeout.as_millis()
                ))),
            },
        }
    }
}

/// Exponential reconnect delay.
#[derive(Debug)]
struct Backoff {
    next: Duration,
    max: Duration,
}

impl Backoff {
    fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.max(Duration::from_millis(1));
        Self {
            next: initial,
            max: max.max(initial),
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = self.next.saturating_mul(2).min(self.max);
        delay
    }
}

pub struct ServerConnection {
    config: ServerConfig,
    session: Mutex<Option<Session>>,
    state: watch::Sender<ConnectionState>,
    hub: Arc<ChangeHub>,
    cancel: CancellationToken,
}

impl ServerConnection {
    /// Nothing is opened until the first request or `ensure_connected`.
    /// Connection failures are reported as notices on `hub`.
    pub fn new(config: ServerConfig, hub: Arc<ChangeHub>, cancel: CancellationToken) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            session: Mutex::new(None),
            state,
            hub,
            cancel,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Follow state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Open a session if there is none, retrying with backoff.
    pub async fn ensure_connected(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        if session.is_none() {
            *session = Some(self.connect_with_backoff().await?);
        }
        Ok(())
    }

    /// Drop the current session, if any.
    pub async fn disconnect(&self) {
        if self.session.lock().await.take().is_some() {
            info!(server = %self.config.address(), "Disconnected from server");
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// Send one request and return the raw response line.
    ///
    /// Transport failures are retried on a fresh session up to
    /// `request_attempts` times. Exhausted connection attempts and
    /// cancellation are returned immediately.
    pub async fn request(&self, request: &Request) -> Result<String> {
        let line = request.to_line()?;
        let attempts = self.config.request_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.exchange(request.name(), &line).await {
                Ok(response) => return Ok(response),
                Err(e) if retryable(&e) && attempt < attempts => {
                    warn!(request = request.name(), attempt, error = %e, "Request failed, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn exchange(&self, name: &'static str, line: &str) -> Result<String> {
        let mut guard = self.session.lock().await;
        if guard.is_none() {
            *guard = Some(self.connect_with_backoff().await?);
        }
        let Some(session) = guard.as_mut() else {
            return Err(SyncError::ConnectionClosed);
        };

        self.set_state(ConnectionState::AwaitingResponse);
        debug!(request = name, bytes = line.len(), "Sending request");

        match session
            .round_trip(line, self.config.request_timeout(), &self.cancel)
            .await
        {
            Ok(response) => {
                self.set_state(ConnectionState::Connected);
                debug!(request = name, bytes = response.len(), "Received response");
                Ok(response)
            }
            Err(e) => {
                // A late answer must never be read as the reply to the next
                // request, so the session goes with the failure.
                *guard = None;
                self.set_state(ConnectionState::Disconnected);
                warn!(request = name, error = %e, "Request failed, session dropped");
                Err(e)
            }
        }
    }

    async fn connect_with_backoff(&self) -> Result<Session> {
        let mut backoff = Backoff::new(
            Duration::from_millis(self.config.backoff_initial_ms),
            Duration::from_millis(self.config.backoff_max_ms),
        );
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            self.set_state(ConnectionState::Connecting);

            let opened = tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.set_state(ConnectionState::Disconnected);
                    return Err(SyncError::Cancelled);
                }
                opened = self.open_session() => opened,
            };

            match opened {
                Ok(session) => {
                    self.set_state(ConnectionState::Connected);
                    info!(server = %self.config.address(), attempt, "Connected to server");
                    return Ok(session);
                }
                Err(e) => {
                    self.set_state(ConnectionState::Disconnected);
                    warn!(server = %self.config.address(), attempt, error = %e, "Connection attempt failed");
                    self.hub.notice(&format!("Connection error: {e}"));

                    if let Some(max) = self.config.max_connect_attempts {
                        if attempt >= max {
                            return Err(SyncError::Connection(format!(
                                "{} unreachable after {attempt} attempts: {e}",
                                self.config.address()
                            )));
                        }
                    }

                    let delay = backoff.next_delay();
                    debug!(delay_ms = delay.as_millis() as u64, "Waiting before reconnect");
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(SyncError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    async fn open_session(&self) -> Result<Session> {
        let address = (self.config.host.as_str(), self.config.port);
        let stream = tokio::time::timeout(self.config.connect_timeout(), TcpStream::connect(address))
            .await
            .map_err(|_| SyncError::Timeout(format!("connecting to {}", self.config.address())))?
            .map_err(|e| SyncError::Connection(format!("{}: {e}", self.config.address())))?;
        stream.set_nodelay(true)?;

        let (read_half, writer) = stream.into_split();
        let (line_tx, lines) = mpsc::unbounded_channel();
        let reader = AsyncLineReader::new(read_half).spawn(
            move |line: String| {
                let _ = line_tx.send(line);
            },
            self.cancel.child_token(),
        );

        Ok(Session {
            writer,
            lines,
            _reader: reader,
        })
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }
}

fn retryable(error: &SyncError) -> bool {
    error.is_transport() && !matches!(error, SyncError::Connection(_))
}
