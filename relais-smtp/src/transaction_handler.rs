//! What happens once the protocol layer has accepted a command.
//!
//! The session owns the state machine and the socket; everything with an
//! effect outside the session (labelling, limits, delivery) goes through a
//! [`SmtpTransactionHandler`].

use std::{borrow::Cow, net::SocketAddr, sync::Arc, time::Duration};

use async_trait::async_trait;
use relais_common::{context::Context, internal, label::AppLabel, status::Status, tracing};
use relais_delivery::Deliver;
use relais_mime::NormalizedMessage;

use crate::auth::Credentials;

/// Callbacks the session makes after a state transition.
///
/// Every `on_*` method returning `bool` may refuse by returning `false`, in
/// which case it is expected to have set `ctx.response`. Accepting without a
/// response falls back to the session's default reply.
#[async_trait]
pub trait SmtpTransactionHandler: Send + Sync {
    /// Decoded `AUTH PLAIN` credentials
    async fn on_auth(&mut self, ctx: &mut Context, credentials: &Credentials) -> bool;

    /// The envelope sender has just been recorded
    async fn on_mail(&mut self, ctx: &mut Context) -> bool;

    /// One or more recipients have just been added
    async fn on_rcpt(&mut self, ctx: &mut Context) -> bool;

    /// A complete body is in `ctx.data`.
    ///
    /// The transaction is over once this returns, whatever the outcome.
    async fn on_data(&mut self, ctx: &mut Context) -> bool;

    async fn on_reset(&mut self, ctx: &mut Context);

    async fn on_close(&mut self, ctx: &mut Context);
}

/// Normalises each accepted message and hands it to a [`Deliver`]
/// implementation, exactly once.
pub struct RelayTransactionHandler {
    delivery: Option<Arc<dyn Deliver>>,
    /// Upper bound on a single delivery call
    timeout: Duration,
    /// Recipients accepted per transaction before answering `452`
    max_recipients: usize,
    peer: SocketAddr,
}

impl RelayTransactionHandler {
    #[must_use]
    pub fn new(delivery: Option<Arc<dyn Deliver>>, peer: SocketAddr) -> Self {
        Self {
            delivery,
            timeout: Duration::from_secs(30),
            max_recipients: 50,
            peer,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_max_recipients(mut self, max_recipients: usize) -> Self {
        self.max_recipients = max_recipients;
        self
    }

    async fn deliver(&self, ctx: &Context, message: &NormalizedMessage) -> (Status, Cow<'static, str>) {
        let Some(delivery) = self.delivery.as_ref() else {
            internal!(level = ERROR, "No delivery configured, deferring message");
            return (
                Status::ActionUnavailable,
                Cow::Borrowed("Delivery unavailable, please try again later"),
            );
        };

        match tokio::time::timeout(self.timeout, delivery.deliver(message)).await {
            Ok(Ok(())) => {
                internal!(
                    level = INFO,
                    "Delivered message from {} (peer {}) to {} as {}",
                    ctx.sender(),
                    self.peer,
                    message.recipient,
                    message.app_name
                );
                (Status::Ok, Cow::Borrowed("Ok: delivered"))
            }
            Ok(Err(err)) if err.is_transient() => {
                internal!(level = ERROR, "Delivery to {} failed: {err}", message.recipient);
                (
                    Status::ActionUnavailable,
                    Cow::Borrowed("Delivery failed, please try again later"),
                )
            }
            Ok(Err(err)) => {
                internal!(level = ERROR, "Delivery to {} rejected: {err}", message.recipient);
                (Status::TransactionFailed, Cow::Borrowed("Delivery rejected"))
            }
            Err(_) => {
                internal!(
                    level = ERROR,
                    "Delivery to {} timed out after {:?}",
                    message.recipient,
                    self.timeout
                );
                (
                    Status::ActionUnavailable,
                    Cow::Borrowed("Delivery timed out, please try again later"),
                )
            }
        }
    }
}

#[async_trait]
impl SmtpTransactionHandler for RelayTransactionHandler {
    async fn on_auth(&mut self, ctx: &mut Context, credentials: &Credentials) -> bool {
        let label = AppLabel::sanitize(&credentials.authcid);
        internal!(level = DEBUG, "{} authenticated as {label}", self.peer);

        ctx.label = Some(label);
        ctx.response = Some((
            Status::AuthSucceeded,
            Cow::Borrowed("Authentication successful"),
        ));
        true
    }

    async fn on_mail(&mut self, ctx: &mut Context) -> bool {
        if let Some(declared) = ctx.envelope.declared_size()
            && ctx.max_message_size > 0
            && declared > ctx.max_message_size
        {
            ctx.response = Some((
                Status::ExceededStorage,
                Cow::Owned(format!(
                    "Declared message size {declared} exceeds maximum {}",
                    ctx.max_message_size
                )),
            ));
            return false;
        }

        true
    }

    async fn on_rcpt(&mut self, ctx: &mut Context) -> bool {
        if ctx.envelope.recipient_count() > self.max_recipients {
            ctx.response = Some((
                Status::InsufficientStorage,
                Cow::Borrowed("Too many recipients"),
            ));
            return false;
        }

        true
    }

    async fn on_data(&mut self, ctx: &mut Context) -> bool {
        let Some(data) = ctx.data.take() else {
            ctx.response = Some((Status::TransactionFailed, Cow::Borrowed("No message data")));
            ctx.reset_transaction();
            return false;
        };

        let recipient = ctx.envelope.first_recipient().unwrap_or_default().to_string();
        let message =
            NormalizedMessage::new(relais_mime::normalize(&data), recipient, ctx.app_label());

        internal!(
            level = DEBUG,
            "Normalised {} byte message, subject {:?}, app {}",
            data.len(),
            message.subject,
            message.app_name
        );

        let (status, reply) = self.deliver(ctx, &message).await;
        let accepted = status == Status::Ok;

        ctx.response = Some((status, reply));
        ctx.reset_transaction();

        accepted
    }

    async fn on_reset(&mut self, ctx: &mut Context) {
        internal!(level = DEBUG, "Transaction reset for {}", ctx.id);
    }

    async fn on_close(&mut self, ctx: &mut Context) {
        if ctx.envelope.sender().is_some() || ctx.envelope.recipient_count() > 0 {
            internal!(
                level = DEBUG,
                "{} closed with an unfinished transaction",
                self.peer
            );
        }
        ctx.reset_transaction();
    }
}
