use relais_common::{context, error::SessionError, incoming, internal, tracing};
use tokio::io::{AsyncRead, AsyncWrite};

use super::{Context, Session};
use crate::{State, command::Command, state};

/// Longest command line we keep; anything longer is refused with `500`
const MAX_COMMAND_LINE: usize = 4096;

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync> Session<Stream> {
    /// Receive and process one line from the client
    ///
    /// Returns `Ok(true)` if the connection should be closed, `Ok(false)` to continue.
    ///
    /// # Errors
    /// Returns `SessionError` if there's an I/O failure.
    #[tracing::instrument(level = "trace", skip_all, ret)]
    pub(super) async fn receive(
        &mut self,
        ctx: &mut context::Context,
    ) -> Result<bool, SessionError> {
        let reading = matches!(self.context.state, State::Reading(_));
        let limit = if reading {
            self.body_line_limit()
        } else {
            MAX_COMMAND_LINE
        };

        let mut line = Vec::new();
        match self.connection.read_line(&mut line, limit).await {
            // Consider any errors received here to be fatal
            Err(err) => {
                internal!("Error: {err}");
                Err(SessionError::Protocol(err.to_string()))
            }
            Ok(0) => {
                // Reading 0 bytes means the other side has closed the
                // connection or is done writing, then so are we.
                Ok(true)
            }
            Ok(consumed) => {
                if reading {
                    self.handle_data_line(&line, consumed, ctx);
                } else {
                    self.handle_command_line(&line, consumed, ctx);
                }

                Ok(false)
            }
        }
    }

    /// Enough to notice a line pushing the body over the limit
    fn body_line_limit(&self) -> usize {
        if self.max_message_size == 0 {
            usize::MAX
        } else {
            self.max_message_size
                .saturating_sub(self.context.message.len())
                .saturating_add(3)
        }
    }

    /// Handle one line of message data (after DATA), undoing dot-stuffing
    fn handle_data_line(&mut self, line: &[u8], consumed: usize, ctx: &mut context::Context) {
        if line == b".\r\n" || line == b".\n" {
            self.finish_data(ctx);
            return;
        }

        let content = line.strip_prefix(b".").unwrap_or(line);
        let discarded = consumed.saturating_sub(line.len());
        self.context.received = self.context.received.saturating_add(consumed);

        if self.context.oversized {
            return;
        }

        let total = self
            .context
            .message
            .len()
            .saturating_add(content.len())
            .saturating_add(discarded);

        if self.max_message_size > 0 && total > self.max_message_size {
            internal!(
                level = DEBUG,
                "Message exceeds {} bytes, discarding the rest",
                self.max_message_size
            );
            self.context.oversized = true;
            self.context.message = Vec::new();
        } else {
            self.context.message.extend_from_slice(content);
        }
    }

    fn finish_data(&mut self, ctx: &mut context::Context) {
        let message = std::mem::take(&mut self.context.message);

        let state = if self.context.oversized {
            ctx.reset_transaction();
            State::TooLarge(state::TooLarge {
                received: self.context.received,
            })
        } else {
            ctx.data = Some(message.into());
            State::PostDot(state::PostDot)
        };

        self.context = Context {
            state,
            ..Context::default()
        };
    }

    /// Handle reception of SMTP commands
    fn handle_command_line(&mut self, line: &[u8], consumed: usize, ctx: &mut context::Context) {
        let command = if consumed > line.len() {
            Command::Unknown(String::from("Line too long"))
        } else if matches!(self.context.state, State::AuthChallenge(_)) {
            Command::AuthResponse(String::from_utf8_lossy(line).trim().to_string())
        } else {
            Command::try_from(line).unwrap_or_else(|e| e)
        };

        incoming!("{command}");

        self.context = Context {
            state: std::mem::take(&mut self.context.state).transition(command, ctx),
            ..Context::default()
        };

        tracing::debug!("Transitioned to {:?}", self.context.state);
    }
}
