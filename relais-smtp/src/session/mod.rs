use std::{borrow::Cow, net::SocketAddr, sync::Arc, time::Duration};

use relais_common::{
    Signal, config::ServerTimeouts, context, error::SessionError, internal, outgoing,
    status::Status, tracing,
};
use relais_delivery::Deliver;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    State,
    connection::Connection,
    extensions::Extension,
    state,
    transaction_handler::{RelayTransactionHandler, SmtpTransactionHandler},
};

// Submodules containing implementation details
mod events;
mod io;
mod response;

#[derive(PartialEq, Eq, Debug)]
pub enum Event {
    ConnectionClose,
    ConnectionKeepAlive,
}

/// Protocol-side bookkeeping for one session
#[derive(Debug, Default)]
pub struct Context {
    pub state: State,
    /// Body received so far, dot-unstuffed
    pub message: Vec<u8>,
    /// Body bytes seen since `DATA`, including any that were discarded
    pub received: usize,
    /// The body has gone over the limit and is being drained
    pub oversized: bool,
    pub sent: bool,
}

pub type Response = (Option<Vec<String>>, Event);

pub struct SessionConfig {
    pub extensions: Vec<Extension>,
    pub banner: String,
    pub timeouts: ServerTimeouts,
    pub delivery: Option<Arc<dyn Deliver>>,
    pub delivery_timeout: Duration,
    pub max_recipients: usize,
}

impl SessionConfig {
    /// Create a new `SessionConfig` builder
    #[must_use]
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }
}

/// Builder for `SessionConfig`
pub struct SessionConfigBuilder {
    extensions: Vec<Extension>,
    banner: String,
    timeouts: ServerTimeouts,
    delivery: Option<Arc<dyn Deliver>>,
    delivery_timeout: Duration,
    max_recipients: usize,
}

impl Default for SessionConfigBuilder {
    fn default() -> Self {
        Self {
            extensions: Vec::new(),
            banner: String::new(),
            timeouts: ServerTimeouts::default(),
            delivery: None,
            delivery_timeout: Duration::from_secs(30),
            max_recipients: 50,
        }
    }
}

impl SessionConfigBuilder {
    /// Set the SMTP extensions supported by this session
    #[must_use]
    pub fn with_extensions(mut self, extensions: Vec<Extension>) -> Self {
        self.extensions = extensions;
        self
    }

    /// Set the server banner hostname
    #[must_use]
    pub fn with_banner(mut self, banner: String) -> Self {
        self.banner = banner;
        self
    }

    /// Set the timeout configuration for this session
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: ServerTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set where accepted messages are delivered
    #[must_use]
    pub fn with_delivery(mut self, delivery: Option<Arc<dyn Deliver>>) -> Self {
        self.delivery = delivery;
        self
    }

    #[must_use]
    pub const fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_max_recipients(mut self, max_recipients: usize) -> Self {
        self.max_recipients = max_recipients;
        self
    }

    /// Build the final `SessionConfig`
    #[must_use]
    pub fn build(self) -> SessionConfig {
        SessionConfig {
            extensions: self.extensions,
            banner: self.banner,
            timeouts: self.timeouts,
            delivery: self.delivery,
            delivery_timeout: self.delivery_timeout,
            max_recipients: self.max_recipients,
        }
    }
}

pub struct Session<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync> {
    peer: SocketAddr,
    pub(super) context: Context,
    pub(super) extensions: Vec<Extension>,
    pub(super) banner: Arc<str>,
    pub(super) connection: Connection<Stream>,
    /// Maximum message size in bytes as advertised via SIZE extension (RFC 1870).
    ///
    /// A value of 0 means no size limit is enforced (unlimited).
    ///
    /// This is validated at two points:
    /// 1. **MAIL FROM**: Against declared SIZE parameter (RFC 1870 Section 4)
    /// 2. **DATA**: Against actual received bytes (RFC 1870 Section 5)
    ///
    /// When the limit is exceeded, the server rejects with SMTP status code 552
    /// (Exceeded Storage Allocation).
    pub(super) max_message_size: usize,
    timeouts: ServerTimeouts,
    /// Start time for tracking connection lifetime
    start_time: std::time::Instant,
    pub(super) transaction_handler: Box<dyn SmtpTransactionHandler>,
}

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync> Session<Stream> {
    #[tracing::instrument(level = "trace", skip_all)]
    pub(crate) fn create(stream: Stream, peer: SocketAddr, config: SessionConfig) -> Self {
        tracing::debug!("Extensions: {:?}", config.extensions);

        // Extract max message size from SIZE extension
        let max_message_size = config
            .extensions
            .iter()
            .find_map(|ext| match ext {
                Extension::Size(size) => Some(*size),
                _ => None,
            })
            .unwrap_or(0);

        tracing::debug!("Max message size: {max_message_size}");

        let transaction_handler = RelayTransactionHandler::new(config.delivery, peer)
            .with_timeout(config.delivery_timeout)
            .with_max_recipients(config.max_recipients);

        Self {
            peer,
            connection: Connection::new(stream),
            context: Context::default(),
            extensions: config.extensions,
            banner: if config.banner.is_empty() {
                std::env::var("HOSTNAME")
                    .unwrap_or_else(|_| "localhost".to_string())
                    .into()
            } else {
                config.banner.into()
            },
            max_message_size,
            timeouts: config.timeouts,
            start_time: std::time::Instant::now(),
            transaction_handler: Box::new(transaction_handler),
        }
    }

    /// How long to wait for the next line in the current state
    const fn read_timeout(&self) -> Duration {
        match &self.context.state {
            State::Reading(_) => self.timeouts.data(),
            _ => self.timeouts.command(),
        }
    }

    #[tracing::instrument(level = "trace", skip_all, fields(peer = %self.peer), ret)]
    pub(crate) async fn run(
        mut self,
        signal: tokio::sync::broadcast::Receiver<Signal>,
    ) -> Result<(), SessionError> {
        internal!("Connected");

        let mut ctx = context::Context {
            banner: Arc::clone(&self.banner),
            max_message_size: self.max_message_size,
            ..Default::default()
        };

        let result = self.run_inner(&mut ctx, signal).await;

        self.transaction_handler.on_close(&mut ctx).await;
        internal!("Connection closed");

        result
    }

    async fn run_inner(
        &mut self,
        ctx: &mut context::Context,
        mut signal: tokio::sync::broadcast::Receiver<Signal>,
    ) -> Result<(), SessionError> {
        loop {
            // Check if connection has exceeded maximum lifetime
            let connection_duration = self.start_time.elapsed();
            if connection_duration >= self.timeouts.connection() {
                tracing::warn!(
                    peer = ?self.peer,
                    duration_secs = connection_duration.as_secs(),
                    max_secs = self.timeouts.connection_secs,
                    "Connection exceeded maximum lifetime, closing"
                );
                return Err(SessionError::Timeout(self.timeouts.connection_secs));
            }

            let (response, ev) = self.response(ctx).await;

            ctx.response = None;
            self.context.sent = true;

            for response in response.unwrap_or_default() {
                outgoing!("{response}");

                self.connection.send(&response).await.map_err(|err| {
                    internal!(level = ERROR, "{err}");
                    SessionError::Protocol(format!("Failed to send response: {err}"))
                })?;
            }

            if Event::ConnectionClose == ev {
                return Ok(());
            }

            self.context.state = std::mem::take(&mut self.context.state).settle(ctx);

            if self.handle_command_loop(ctx, &mut signal).await? {
                return Ok(());
            }
        }
    }

    /// Wait for the next line from the client, or for shutdown.
    ///
    /// Returns `Ok(true)` once the client has gone away.
    ///
    /// # Errors
    /// Returns `SessionError` if a timeout occurs or connection error happens.
    async fn handle_command_loop(
        &mut self,
        ctx: &mut context::Context,
        signal: &mut tokio::sync::broadcast::Receiver<Signal>,
    ) -> Result<bool, SessionError> {
        let timeout = self.read_timeout();

        tokio::select! {
            _ = signal.recv() => {
                self.context.sent = false;
                self.context.state = State::Close(state::Close);
                ctx.response = Some((Status::Unavailable, Cow::Borrowed("Server shutting down")));
                Ok(false)
            }
            result = tokio::time::timeout(timeout, self.receive(ctx)) => {
                result.unwrap_or_else(|_| {
                    tracing::warn!(
                        peer = ?self.peer,
                        state = %self.context.state,
                        timeout_secs = timeout.as_secs(),
                        "Client connection timed out"
                    );
                    Err(SessionError::Timeout(timeout.as_secs()))
                })
            }
        }
    }
}
