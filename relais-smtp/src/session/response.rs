use relais_common::{context, status::Status, tracing};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::{
    State,
    session::{Event, Response, Session},
    state,
};

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync> Session<Stream> {
    /// Format and return the response to send to the client
    ///
    /// The transaction handler runs first and may set its own reply in the
    /// context; otherwise the state decides.
    #[tracing::instrument(level = "trace", skip_all, ret)]
    pub(super) async fn response(&mut self, ctx: &mut context::Context) -> Response {
        if self.context.sent {
            return (None, Event::ConnectionKeepAlive);
        }

        self.emit(ctx).await;

        if let Some((status, ref message)) = ctx.response {
            let event = if self.context.state.should_close() {
                Event::ConnectionClose
            } else {
                Event::ConnectionKeepAlive
            };

            return (Some(vec![format!("{status} {message}")]), event);
        }

        self.default_response()
    }

    fn default_response(&self) -> Response {
        let reply = |line: String| (Some(vec![line]), Event::ConnectionKeepAlive);

        match &self.context.state {
            State::Connect(_) => reply(format!(
                "{} {} ESMTP relais ready",
                Status::ServiceReady,
                self.banner
            )),
            State::Ehlo(state::Ehlo { id }) => (
                Some(self.ehlo_response(id)),
                Event::ConnectionKeepAlive,
            ),
            State::Helo(state::Helo { id }) => reply(format!(
                "{} {} says hello to {id}",
                Status::Ok,
                self.banner
            )),
            State::Help(_) => reply(format!(
                "{} Commands: EHLO HELO AUTH MAIL RCPT DATA RSET NOOP HELP QUIT",
                Status::HelpMessage
            )),
            State::Noop(_) | State::Rset(_) | State::MailFrom(_) | State::RcptTo(_) => {
                reply(format!("{} Ok", Status::Ok))
            }
            State::Auth(_) => reply(format!("{} Authentication successful", Status::AuthSucceeded)),
            State::AuthChallenge(_) => reply(format!("{} ", Status::AuthContinue)),
            State::Data(_) => reply(format!(
                "{} End data with <CR><LF>.<CR><LF>",
                Status::StartMailInput
            )),
            State::PostDot(_) => reply(format!("{} Ok", Status::Ok)),
            State::TooLarge(state::TooLarge { received }) => reply(format!(
                "{} Message size {received} exceeds maximum {}",
                Status::ExceededStorage,
                self.max_message_size
            )),
            State::Invalid(state::Invalid { kind, reason, .. }) => {
                reply(format!("{} {reason}", kind.status()))
            }
            State::Quit(_) => (
                Some(vec![format!("{} Bye", Status::GoodBye)]),
                Event::ConnectionClose,
            ),
            State::Close(_) => (
                Some(vec![format!(
                    "{} {} Service not available, closing connection",
                    Status::Unavailable,
                    self.banner
                )]),
                Event::ConnectionClose,
            ),
            State::Reading(_) => (None, Event::ConnectionKeepAlive),
        }
    }

    /// Multi-line EHLO reply: the greeting, then one line per extension
    fn ehlo_response(&self, id: &str) -> Vec<String> {
        let greeting = format!("{} says hello to {id}", self.banner);

        std::iter::once(greeting)
            .chain(self.extensions.iter().map(ToString::to_string))
            .enumerate()
            .map(|(idx, line)| {
                let separator = if idx == self.extensions.len() { ' ' } else { '-' };
                format!("{}{separator}{line}", Status::Ok)
            })
            .collect()
    }
}
