use futures_util::future::join_all;
use serde::Deserialize;
use tokio::sync::broadcast::Receiver;

use crate::{
    Signal, error::ControllerError, internal, listener::Listener, traits::Protocol,
};

#[derive(Deserialize)]
pub struct Controller<Proto: Protocol> {
    #[serde(alias = "listener", default = "Vec::new")]
    listeners: Vec<Listener<Proto>>,
}

impl<Proto: Protocol> Default for Controller<Proto> {
    fn default() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }
}

impl<Proto: Protocol> Controller<Proto> {
    pub const fn new(listeners: Vec<Listener<Proto>>) -> Self {
        Self { listeners }
    }

    pub fn listeners(&self) -> &[Listener<Proto>] {
        &self.listeners
    }

    pub fn listeners_mut(&mut self) -> &mut Vec<Listener<Proto>> {
        &mut self.listeners
    }

    /// Map over the args of all listeners, allowing modification before initialization
    ///
    /// This is how collaborators that cannot be deserialized, such as the
    /// delivery client, reach each session.
    pub fn map_args<F>(&mut self, f: F)
    where
        F: Fn(Proto::Args) -> Proto::Args,
    {
        for listener in &mut self.listeners {
            listener.map_args(&f);
        }
    }

    ///
    /// Initialise this controller
    ///
    /// # Errors
    /// If there is nothing to serve, or any listener fails validation
    ///
    pub fn init(&mut self) -> Result<(), ControllerError> {
        internal!("Initialising Controller for {}", Proto::ty());

        if self.listeners.is_empty() {
            return Err(ControllerError::NoListeners);
        }

        for listener in &mut self.listeners {
            listener.init()?;
        }

        Ok(())
    }

    ///
    /// Serve every listener until shutdown
    ///
    /// # Errors
    /// If any of the listeners have a failure
    ///
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn control(self, signal: Receiver<Signal>) -> Result<(), ControllerError> {
        join_all(
            self.listeners
                .iter()
                .map(|listener| listener.serve(signal.resubscribe())),
        )
        .await
        .into_iter()
        .try_for_each(|served| served.map_err(ControllerError::from))
    }
}
