//! The SMTP side of the relay: command parsing, the session state machine and
//! the per-connection session that drives it.

pub mod auth;
pub mod command;
pub mod connection;
pub mod error;
pub mod extensions;
mod fsm;
pub mod session;
pub mod state;
pub mod transaction_handler;

use std::{fmt, net::SocketAddr, sync::Arc, time::Duration};

use relais_common::{
    Signal,
    config::ServerTimeouts,
    error::{ProtocolError, SessionError},
    traits::protocol::{Protocol, SessionHandler},
    tracing,
};
use relais_delivery::Deliver;
use serde::Deserialize;
use tokio::net::TcpStream;

pub use crate::{
    command::{Command, MailParameters},
    state::State,
};
use crate::{
    extensions::Extension,
    session::{Session, SessionConfig},
};

mod defaults {
    pub fn banner() -> String {
        String::from("relais.local")
    }

    pub const fn max_message_size() -> usize {
        10 * 1024 * 1024
    }

    pub const fn max_recipients() -> usize {
        50
    }

    pub const fn delivery_timeout_secs() -> u64 {
        30
    }
}

#[derive(Default, Deserialize)]
pub struct Smtp;

#[derive(Clone, Deserialize)]
pub struct SmtpArgs {
    #[serde(default = "defaults::banner")]
    banner: String,
    #[serde(default = "defaults::max_message_size")]
    max_message_size: usize,
    #[serde(default = "defaults::max_recipients")]
    max_recipients: usize,
    #[serde(default = "defaults::delivery_timeout_secs")]
    delivery_timeout_secs: u64,
    #[serde(default)]
    timeouts: ServerTimeouts,
    #[serde(default)]
    extensions: Vec<Extension>,
    #[serde(skip)]
    delivery: Option<Arc<dyn Deliver>>,
}

impl Default for SmtpArgs {
    fn default() -> Self {
        Self {
            banner: defaults::banner(),
            max_message_size: defaults::max_message_size(),
            max_recipients: defaults::max_recipients(),
            delivery_timeout_secs: defaults::delivery_timeout_secs(),
            timeouts: ServerTimeouts::default(),
            extensions: Vec::new(),
            delivery: None,
        }
    }
}

impl fmt::Debug for SmtpArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpArgs")
            .field("banner", &self.banner)
            .field("max_message_size", &self.max_message_size)
            .field("max_recipients", &self.max_recipients)
            .field("delivery_timeout_secs", &self.delivery_timeout_secs)
            .field("timeouts", &self.timeouts)
            .field("extensions", &self.extensions)
            .field("delivery", &self.delivery.is_some())
            .finish()
    }
}

impl SmtpArgs {
    /// Create a new `SmtpArgs` builder
    #[must_use]
    pub fn builder() -> Self {
        Self::default()
    }

    /// Set the hostname used in the greeting
    #[must_use]
    pub fn with_banner(mut self, banner: impl Into<String>) -> Self {
        self.banner = banner.into();
        self
    }

    /// Set the largest message body accepted, in bytes
    #[must_use]
    pub const fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    #[must_use]
    pub const fn with_max_recipients(mut self, max_recipients: usize) -> Self {
        self.max_recipients = max_recipients;
        self
    }

    #[must_use]
    pub const fn with_delivery_timeout_secs(mut self, secs: u64) -> Self {
        self.delivery_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn with_timeouts(mut self, timeouts: ServerTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set the SMTP extensions supported by this server
    #[must_use]
    pub fn with_extensions(mut self, extensions: Vec<Extension>) -> Self {
        self.extensions = extensions;
        self
    }

    /// Set where accepted messages are delivered
    #[must_use]
    pub fn with_delivery(mut self, delivery: Arc<dyn Deliver>) -> Self {
        self.delivery = Some(delivery);
        self
    }

    pub const fn delivery_timeout_secs(&self) -> u64 {
        self.delivery_timeout_secs
    }

    pub fn extensions(&self) -> &[Extension] {
        &self.extensions
    }
}

impl Protocol for Smtp {
    type Session = Session<TcpStream>;
    type Args = SmtpArgs;

    fn ty() -> &'static str {
        "SMTP"
    }

    #[tracing::instrument(level = "trace", skip(self, stream, args))]
    fn handle(&self, stream: TcpStream, peer: SocketAddr, args: Self::Args) -> Self::Session {
        Session::create(
            stream,
            peer,
            SessionConfig::builder()
                .with_extensions(args.extensions)
                .with_banner(args.banner)
                .with_timeouts(args.timeouts)
                .with_delivery(args.delivery)
                .with_delivery_timeout(Duration::from_secs(args.delivery_timeout_secs))
                .with_max_recipients(args.max_recipients)
                .build(),
        )
    }

    #[tracing::instrument(level = "trace", skip(self, args))]
    fn validate(&mut self, args: &mut Self::Args) -> Result<(), ProtocolError> {
        if args.delivery.is_none() {
            return Err(ProtocolError::MissingField("delivery"));
        }

        if args.max_recipients == 0 {
            return Err(ProtocolError::InvalidConfiguration {
                field: String::from("max_recipients"),
                reason: String::from("must be at least 1"),
            });
        }

        if args.delivery_timeout_secs == 0 {
            return Err(ProtocolError::InvalidConfiguration {
                field: String::from("delivery_timeout_secs"),
                reason: String::from("must be at least 1"),
            });
        }

        if !args
            .extensions
            .iter()
            .any(|ext| matches!(ext, Extension::Size(_)))
        {
            args.extensions.push(Extension::Size(args.max_message_size));
        }

        for default in [Extension::Auth, Extension::EightBitMime, Extension::Help] {
            if !args.extensions.contains(&default) {
                args.extensions.push(default);
            }
        }

        Ok(())
    }
}

impl SessionHandler for Session<TcpStream> {
    async fn run(
        self,
        signal: tokio::sync::broadcast::Receiver<Signal>,
    ) -> Result<(), SessionError> {
        Self::run(self, signal).await
    }
}
