use std::{io, net::SocketAddr, time::Duration};

use futures_util::future::join_all;
use serde::Deserialize;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::broadcast::{Receiver, error::RecvError},
    task::{AbortHandle, JoinHandle},
};

use crate::{
    Signal,
    error::{ListenerError, ProtocolError},
    internal,
    traits::protocol::{Protocol, SessionHandler},
};

const fn default_shutdown_grace_secs() -> u64 {
    30
}

/// Pause after a failed `accept` before trying again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// A source of client connections
pub trait Incoming: Send + Sync {
    fn accept(&self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

impl Incoming for TcpListener {
    fn accept(&self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send {
        Self::accept(self)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Self::local_addr(self)
    }
}

#[derive(Deserialize)]
pub struct Listener<Proto: Protocol> {
    #[serde(skip)]
    handler: Proto,
    socket: SocketAddr,
    /// How long in-flight sessions may keep running once shutdown starts
    #[serde(default = "default_shutdown_grace_secs")]
    shutdown_grace_secs: u64,
    #[serde(default)]
    args: Proto::Args,
}

impl<Proto: Protocol> Listener<Proto> {
    pub fn new(socket: SocketAddr, args: Proto::Args) -> Self {
        Self {
            handler: Proto::default(),
            socket,
            shutdown_grace_secs: default_shutdown_grace_secs(),
            args,
        }
    }

    #[must_use]
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace_secs = grace.as_secs();
        self
    }

    pub const fn socket(&self) -> SocketAddr {
        self.socket
    }

    pub fn set_port(&mut self, port: u16) {
        self.socket.set_port(port);
    }

    pub const fn args(&self) -> &Proto::Args {
        &self.args
    }

    pub(crate) fn map_args<F>(&mut self, f: F)
    where
        F: FnOnce(Proto::Args) -> Proto::Args,
    {
        self.args = f(std::mem::take(&mut self.args));
    }

    ///
    /// # Errors
    /// If the protocol rejects this listener's arguments, or the socket is unusable
    ///
    #[tracing::instrument(level = "trace", skip(self), fields(socket = %self.socket))]
    pub fn init(&mut self) -> Result<(), ProtocolError> {
        if self.socket.port() == 0 {
            return Err(ProtocolError::InvalidConfiguration {
                field: "port".to_string(),
                reason: "must be between 1-65535".to_string(),
            });
        }

        self.handler.validate(&mut self.args)
    }

    ///
    /// Bind the configured socket and serve it until a shutdown signal arrives
    ///
    /// # Errors
    /// If the socket cannot be bound
    ///
    pub async fn serve(&self, shutdown: Receiver<Signal>) -> Result<(), ListenerError> {
        let listener =
            TcpListener::bind(self.socket)
                .await
                .map_err(|source| ListenerError::BindFailed {
                    address: self.socket.to_string(),
                    source,
                })?;

        self.serve_on(listener, shutdown).await;
        Ok(())
    }

    ///
    /// Serve an already bound socket until a shutdown signal arrives
    ///
    /// Each accepted connection runs in its own task. On shutdown the listener
    /// stops accepting, gives running sessions the configured grace period to
    /// finish, and aborts whatever is left. A failed `accept` is logged and
    /// retried after a short pause.
    ///
    #[tracing::instrument(level = "trace", skip_all, fields(socket = %self.socket))]
    pub async fn serve_on(&self, listener: impl Incoming, mut shutdown: Receiver<Signal>) {
        let local = listener.local_addr().unwrap_or(self.socket);
        internal!(level = INFO, "{} listening on {local}", Proto::ty());

        let mut sessions: Vec<JoinHandle<()>> = Vec::default();

        loop {
            tokio::select! {
                sig = shutdown.recv() => {
                    if matches!(sig, Ok(Signal::Shutdown) | Err(RecvError::Closed)) {
                        internal!(
                            level = INFO,
                            "{} listener {local} received shutdown signal, finishing {} sessions ...",
                            Proto::ty(),
                            sessions.len()
                        );
                        self.drain(sessions).await;
                        return;
                    }
                }

                connection = listener.accept() => {
                    let (stream, peer) = match connection {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            internal!(
                                level = WARN,
                                "{} listener {local} failed to accept a connection: {err}",
                                Proto::ty()
                            );
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                            continue;
                        }
                    };
                    tracing::debug!("Connection received on {local} from {peer}");

                    sessions.retain(|session| !session.is_finished());

                    let session = self.handler.handle(stream, peer, self.args.clone());
                    let signal = shutdown.resubscribe();

                    sessions.push(tokio::spawn(async move {
                        if let Err(err) = session.run(signal).await {
                            if err.is_client_error() {
                                internal!(level = WARN, "{peer}: {err}");
                            } else {
                                internal!(level = ERROR, "{peer}: {err}");
                            }
                        }
                    }));
                }
            }
        }
    }

    async fn drain(&self, sessions: Vec<JoinHandle<()>>) {
        let grace = Duration::from_secs(self.shutdown_grace_secs);
        let aborts: Vec<AbortHandle> = sessions.iter().map(JoinHandle::abort_handle).collect();

        if tokio::time::timeout(grace, join_all(sessions)).await.is_err() {
            let remaining = aborts.iter().filter(|handle| !handle.is_finished()).count();
            internal!(
                level = WARN,
                "{remaining} sessions still running after {}s, aborting",
                grace.as_secs()
            );
            aborts.iter().for_each(AbortHandle::abort);
        }
    }
}
