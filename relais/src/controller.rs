use std::{
    net::{Ipv4Addr, SocketAddr},
    path::Path,
    sync::{Arc, LazyLock},
    time::Duration,
};

use relais_common::{
    Signal, controller::Controller, error::ProtocolError, internal, listener::Listener, logging,
    tracing,
};
use relais_delivery::{Deliver, HttpDelivery};
use relais_smtp::{Smtp, SmtpArgs};
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::config::{self, ConfigError, DeliveryConfig, Overrides};

/// Port used when no listener is configured
pub const DEFAULT_PORT: u16 = 587;

#[derive(Default, Deserialize)]
pub struct Relais {
    #[serde(alias = "smtp", default)]
    smtp_controller: Controller<Smtp>,
    #[serde(default)]
    delivery: DeliveryConfig,
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

#[tracing::instrument(level = "trace")]
async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!(level = INFO, "CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate Signal received, shutting down");
        }
    };

    let mut receiver = SHUTDOWN_BROADCAST.subscribe();

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    loop {
        tokio::select! {
            sig = receiver.recv() => {
                match sig {
                    Ok(s) => tracing::debug!("Received {s:?}"),
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(e) => tracing::debug!("Received: {e:?}"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    Ok(())
}

impl Relais {
    ///
    /// # Errors
    /// If the text is not a valid configuration
    ///
    pub fn from_ron(config: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(config)
    }

    ///
    /// Load the configuration from `path`, or run on defaults when there is none
    ///
    /// # Errors
    /// If the file can't be read or parsed
    ///
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                internal!(level = INFO, "Loading configuration from {}", path.display());
                config::read(path)
            }
            None => {
                internal!(
                    level = INFO,
                    "No configuration file found, using defaults and environment"
                );
                Ok(Self::default())
            }
        }
    }

    /// Layer environment overrides on top of the loaded configuration
    #[must_use]
    pub fn apply(mut self, overrides: Overrides) -> Self {
        if let Some(port) = overrides.port {
            if self.smtp_controller.listeners().is_empty() {
                self.add_default_listener(port);
            }

            for listener in self.smtp_controller.listeners_mut() {
                listener.set_port(port);
            }
        }

        if let Some(endpoint) = overrides.endpoint {
            self.delivery.endpoint = endpoint;
        }

        if let Some(token) = overrides.token {
            self.delivery.token = token;
        }

        self
    }

    pub const fn delivery(&self) -> &DeliveryConfig {
        &self.delivery
    }

    pub fn listeners(&self) -> &[Listener<Smtp>] {
        self.smtp_controller.listeners()
    }

    fn add_default_listener(&mut self, port: u16) {
        self.smtp_controller.listeners_mut().push(Listener::new(
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)),
            SmtpArgs::default(),
        ));
    }

    ///
    /// Validate the configuration and wire the delivery client into every
    /// listener
    ///
    /// # Errors
    /// If the delivery settings are incomplete, or any listener is invalid
    ///
    pub fn prepare(&mut self) -> anyhow::Result<()> {
        self.delivery.validate()?;

        let delivery = HttpDelivery::new(
            &self.delivery.endpoint,
            self.delivery.token.clone(),
            Duration::from_secs(self.delivery.timeout_secs),
        )
        .map_err(|err| ProtocolError::InvalidConfiguration {
            field: String::from("endpoint"),
            reason: err.to_string(),
        })?;

        internal!(
            level = INFO,
            "Delivering to {}",
            self.delivery.endpoint.trim_end_matches('/')
        );

        self.prepare_with(Arc::new(delivery))
    }

    ///
    /// As [`Self::prepare`], with an explicit delivery target
    ///
    /// # Errors
    /// If any listener is invalid
    ///
    pub fn prepare_with(&mut self, delivery: Arc<dyn Deliver>) -> anyhow::Result<()> {
        if self.smtp_controller.listeners().is_empty() {
            self.add_default_listener(DEFAULT_PORT);
        }

        let timeout_secs = self.delivery.timeout_secs;
        self.smtp_controller.map_args(|args| {
            args.with_delivery(Arc::clone(&delivery))
                .with_delivery_timeout_secs(timeout_secs)
        });

        self.smtp_controller.init()?;

        Ok(())
    }

    ///
    /// Serve until `signal` says otherwise
    ///
    /// # Errors
    /// If a listener fails
    ///
    pub async fn control(self, signal: broadcast::Receiver<Signal>) -> anyhow::Result<()> {
        self.smtp_controller.control(signal).await?;
        Ok(())
    }

    /// Run the relay until it is told to stop
    ///
    /// # Errors
    ///
    /// This function will return an error if the configuration is incomplete,
    /// or a listener can't be bound.
    #[tracing::instrument(level = "trace", skip_all, err)]
    pub async fn run(mut self) -> anyhow::Result<()> {
        logging::init();

        self.prepare()?;

        internal!(level = INFO, "Controller running");

        let ret = tokio::select! {
            r = self.control(SHUTDOWN_BROADCAST.subscribe()) => {
                r
            }
            r = shutdown() => {
                r
            }
        };

        internal!(level = INFO, "Shutting down...");

        ret
    }
}
