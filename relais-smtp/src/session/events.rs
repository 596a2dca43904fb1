use std::borrow::Cow;

use relais_common::{context, internal, status::Status, tracing};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{State, auth::Credentials, session::Session, state};

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync> Session<Stream> {
    /// Hand the current state to the transaction handler.
    ///
    /// State transitions have already happened; this is where they are
    /// accepted or undone.
    #[tracing::instrument(level = "trace", skip_all)]
    pub(super) async fn emit(&mut self, ctx: &mut context::Context) {
        match &self.context.state {
            State::Auth(state::Auth { response }) => match Credentials::decode_plain(response) {
                Ok(credentials) => {
                    self.transaction_handler.on_auth(ctx, &credentials).await;
                }
                Err(err) => {
                    internal!(level = DEBUG, "Rejected AUTH PLAIN: {err}");
                    ctx.response = Some((Status::ParameterSyntax, Cow::Owned(err.to_string())));
                }
            },
            State::MailFrom(_) => {
                if !self.transaction_handler.on_mail(ctx).await {
                    ctx.envelope.clear();
                    self.context.state = State::greeted(ctx);
                }
            }
            State::RcptTo(state::RcptTo { sender, added }) => {
                let (sender, added) = (sender.clone(), *added);

                if !self.transaction_handler.on_rcpt(ctx).await {
                    self.context.state = Self::undo_rcpt(ctx, sender, added);
                }
            }
            State::PostDot(_) => {
                self.transaction_handler.on_data(ctx).await;
            }
            State::Rset(_) => self.transaction_handler.on_reset(ctx).await,
            _ => {}
        }
    }

    /// Drop the recipients a refused `RCPT` added
    fn undo_rcpt(
        ctx: &mut context::Context,
        sender: Option<mailparse::MailAddr>,
        added: usize,
    ) -> State {
        if let Some(rcpts) = ctx.envelope.recipients_mut() {
            let keep = rcpts.len().saturating_sub(added);
            rcpts.truncate(keep);
        }

        if ctx.envelope.recipient_count() == 0 {
            *ctx.envelope.recipients_mut() = None;
            State::MailFrom(state::MailFrom { sender })
        } else {
            State::RcptTo(state::RcptTo { sender, added: 0 })
        }
    }
}
