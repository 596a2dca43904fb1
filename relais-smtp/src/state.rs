use core::fmt::{self, Display, Formatter};

use mailparse::MailAddr;
use relais_common::{context::Context, status::Status};

use crate::command::{Command, HeloVariant};

/// Initial connection state - client just connected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connect;

/// After successful EHLO command (extended SMTP)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ehlo {
    pub id: String,
}

/// After successful HELO command (basic SMTP)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Helo {
    pub id: String,
}

/// A command that is answered and then forgotten; `resume` is where the
/// session picks up afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interlude {
    pub resume: Box<State>,
}

/// `AUTH PLAIN` with a response to check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Auth {
    pub response: String,
}

/// `AUTH PLAIN` without an initial response; waiting for the client's answer
/// to the `334` challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthChallenge;

/// After MAIL FROM command (beginning of mail transaction)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailFrom {
    pub sender: Option<MailAddr>,
}

/// After RCPT TO command (at least one recipient)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RcptTo {
    pub sender: Option<MailAddr>,
    /// How many recipients the latest `RCPT` added
    pub added: usize,
}

/// After DATA command (ready to receive message body)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Data;

/// Reading message data (after DATA command, before end-of-data marker)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading;

/// After end-of-data marker (.\r\n), message complete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostDot;

/// The body ran past the size limit and was thrown away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TooLarge {
    pub received: usize,
}

/// Client issued QUIT command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quit;

/// Why a command was refused without touching the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    /// Not a command at all
    Unrecognised,
    /// A known command with bad arguments
    Syntax,
    /// A valid command at the wrong time
    Sequence,
    /// A parameter we do not support
    NotImplemented,
}

impl Violation {
    pub const fn status(self) -> Status {
        match self {
            Self::Unrecognised => Status::SyntaxError,
            Self::Syntax => Status::ParameterSyntax,
            Self::Sequence => Status::InvalidCommandSequence,
            Self::NotImplemented => Status::ParameterNotImplemented,
        }
    }
}

/// Invalid command or sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invalid {
    pub kind: Violation,
    pub reason: String,
    pub resume: Box<State>,
}

/// Connection closing on our side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Close;

/// Every state an SMTP session can be in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    Connect(Connect),
    Ehlo(Ehlo),
    Helo(Helo),
    Help(Interlude),
    Noop(Interlude),
    Rset(Interlude),
    Auth(Auth),
    AuthChallenge(AuthChallenge),
    MailFrom(MailFrom),
    RcptTo(RcptTo),
    Data(Data),
    Reading(Reading),
    PostDot(PostDot),
    TooLarge(TooLarge),
    Quit(Quit),
    Invalid(Invalid),
    Close(Close),
}

impl Default for State {
    fn default() -> Self {
        Self::Connect(Connect)
    }
}

impl Display for State {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        fmt.write_str(match self {
            Self::Reading(_) | Self::PostDot(_) | Self::TooLarge(_) => "",
            Self::Connect(_) => "Connect",
            Self::Close(_) => "Close",
            Self::Ehlo(_) => "EHLO",
            Self::Helo(_) => "HELO",
            Self::Help(_) => "HELP",
            Self::Noop(_) => "NOOP",
            Self::Rset(_) => "RSET",
            Self::Auth(_) | Self::AuthChallenge(_) => "AUTH",
            Self::MailFrom(_) => "MAIL",
            Self::RcptTo(_) => "RCPT",
            Self::Data(_) => "DATA",
            Self::Quit(_) => "QUIT",
            Self::Invalid(_) => "INVALID",
        })
    }
}

/// Longest reason echoed back to the client; replies are capped at 512 bytes
const MAX_REASON: usize = 256;

/// Cut client-supplied text down so the reply carrying it always fits
fn clip(mut reason: String) -> String {
    if reason.len() > MAX_REASON {
        let mut end = MAX_REASON;
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        reason.truncate(end);
        reason.push_str("...");
    }

    reason
}

impl State {
    /// The resting state for a client that has (or hasn't) said hello
    pub fn greeted(ctx: &Context) -> Self {
        if !ctx.is_greeted() {
            Self::Connect(Connect)
        } else if ctx.extended {
            Self::Ehlo(Ehlo { id: ctx.id.clone() })
        } else {
            Self::Helo(Helo { id: ctx.id.clone() })
        }
    }

    fn refuse(self, kind: Violation, reason: impl Into<String>) -> Self {
        Self::Invalid(Invalid {
            kind,
            reason: clip(reason.into()),
            resume: Box::new(self),
        })
    }

    /// Transition from current state based on received command
    #[must_use]
    pub fn transition(self, command: Command, ctx: &mut Context) -> Self {
        match (self, command) {
            (_, Command::Quit) => Self::Quit(Quit),

            // The answer to a challenge is the only thing expected here
            (Self::AuthChallenge(_), Command::AuthResponse(response)) => {
                Self::Auth(Auth { response })
            }
            (Self::AuthChallenge(_), _) => {
                Self::greeted(ctx).refuse(Violation::Syntax, "Expected an AUTH response")
            }

            // A greeting always starts over
            (_, Command::Helo(HeloVariant::Ehlo(id))) => {
                ctx.reset_transaction();
                ctx.id.clone_from(&id);
                ctx.extended = true;
                Self::Ehlo(Ehlo { id })
            }
            (_, Command::Helo(HeloVariant::Helo(id))) => {
                ctx.reset_transaction();
                ctx.id.clone_from(&id);
                ctx.extended = false;
                Self::Helo(Helo { id })
            }

            (state, Command::Help) => Self::Help(Interlude {
                resume: Box::new(state),
            }),
            (state, Command::Noop) => Self::Noop(Interlude {
                resume: Box::new(state),
            }),
            (_, Command::Rset) => {
                ctx.reset_transaction();
                Self::Rset(Interlude {
                    resume: Box::new(Self::greeted(ctx)),
                })
            }

            (state @ (Self::Ehlo(_) | Self::Helo(_)), Command::Auth { mechanism, initial }) => {
                if ctx.label.is_some() {
                    state.refuse(Violation::Sequence, "Already authenticated")
                } else if mechanism != "PLAIN" {
                    state.refuse(
                        Violation::NotImplemented,
                        format!("Unsupported authentication mechanism {mechanism}"),
                    )
                } else {
                    initial.map_or(Self::AuthChallenge(AuthChallenge), |response| {
                        Self::Auth(Auth { response })
                    })
                }
            }
            (state @ (Self::MailFrom(_) | Self::RcptTo(_)), Command::Auth { .. }) => {
                state.refuse(Violation::Sequence, "AUTH not permitted during a mail transaction")
            }

            (Self::Ehlo(_) | Self::Helo(_), Command::MailFrom(sender, params)) => {
                ctx.envelope.sender_mut().clone_from(&sender);
                *ctx.envelope.declared_size_mut() = params.size();
                Self::MailFrom(MailFrom { sender })
            }
            (state @ (Self::MailFrom(_) | Self::RcptTo(_)), Command::MailFrom(..)) => {
                state.refuse(Violation::Sequence, "Sender already specified")
            }

            (
                Self::MailFrom(MailFrom { sender }) | Self::RcptTo(RcptTo { sender, .. }),
                Command::RcptTo(recipients),
            ) => {
                let added = recipients.len();
                if let Some(rcpts) = ctx.envelope.recipients_mut() {
                    rcpts.extend_from_slice(&recipients[..]);
                } else {
                    *ctx.envelope.recipients_mut() = Some(recipients);
                }
                Self::RcptTo(RcptTo { sender, added })
            }

            // DATA command (must have at least one recipient)
            (Self::RcptTo(_), Command::Data) => Self::Data(Data),
            (state @ Self::MailFrom(_), Command::Data) => {
                state.refuse(Violation::Sequence, "No valid recipients")
            }

            (state, Command::Unknown(command)) => state.refuse(
                Violation::Unrecognised,
                format!("Command not recognised: {command}"),
            ),
            (state, Command::Invalid(reason)) => state.refuse(Violation::Syntax, reason),

            (state, command) => {
                let reason = if matches!(state, Self::Connect(_)) {
                    String::from("Send EHLO or HELO first")
                } else {
                    format!("{command} not permitted here")
                };
                state.refuse(Violation::Sequence, reason)
            }
        }
    }

    /// Where the session rests once the reply for this state has been sent
    #[must_use]
    pub fn settle(self, ctx: &Context) -> Self {
        match self {
            Self::Help(Interlude { resume })
            | Self::Noop(Interlude { resume })
            | Self::Rset(Interlude { resume })
            | Self::Invalid(Invalid { resume, .. }) => *resume,
            Self::Data(_) => Self::Reading(Reading),
            Self::Auth(_) | Self::PostDot(_) | Self::TooLarge(_) => Self::greeted(ctx),
            state => state,
        }
    }

    /// Check if this state should close the connection
    #[must_use]
    pub const fn should_close(&self) -> bool {
        matches!(self, Self::Quit(_) | Self::Close(_))
    }
}
