use std::{fmt::Debug, future::Future, net::SocketAddr};

use serde::Deserialize;
use tokio::{net::TcpStream, sync::broadcast::Receiver};

use crate::{
    Signal,
    error::{ProtocolError, SessionError},
};

/// A single accepted connection, driven to completion by its listener.
pub trait SessionHandler {
    fn run(self, signal: Receiver<Signal>) -> impl Future<Output = Result<(), SessionError>> + Send;
}

/// A wire protocol a [`Listener`](crate::listener::Listener) can serve.
pub trait Protocol: Default + Send + Sync {
    type Session: SessionHandler + Send + 'static;
    type Args: Default + Clone + Debug + Send + Sync + for<'a> Deserialize<'a>;

    fn handle(&self, stream: TcpStream, peer: SocketAddr, args: Self::Args) -> Self::Session;

    ///
    /// Validate the arguments being provided to the protocol, filling in
    /// anything that has a sensible default.
    ///
    /// # Errors
    /// When the arguments can never produce a working session, e.g. a
    /// required collaborator was never injected.
    ///
    fn validate(&mut self, args: &mut Self::Args) -> Result<(), ProtocolError>;

    fn ty() -> &'static str;
}
