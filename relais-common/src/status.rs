use core::fmt::{self, Display, Formatter};

/// SMTP reply codes used by the relay (RFC 5321 Section 4.2, RFC 4954).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Debug)]
pub enum Status {
    HelpMessage,
    ServiceReady,
    GoodBye,
    AuthSucceeded,
    Ok,
    AuthContinue,
    StartMailInput,
    Unavailable,
    ActionUnavailable,
    InsufficientStorage,
    SyntaxError,
    ParameterSyntax,
    InvalidCommandSequence,
    ParameterNotImplemented,
    ExceededStorage,
    TransactionFailed,
}

impl From<Status> for u32 {
    fn from(value: Status) -> Self {
        match value {
            Status::HelpMessage => 214,
            Status::ServiceReady => 220,
            Status::GoodBye => 221,
            Status::AuthSucceeded => 235,
            Status::Ok => 250,
            Status::AuthContinue => 334,
            Status::StartMailInput => 354,
            Status::Unavailable => 421,
            Status::ActionUnavailable => 451,
            Status::InsufficientStorage => 452,
            Status::SyntaxError => 500,
            Status::ParameterSyntax => 501,
            Status::InvalidCommandSequence => 503,
            Status::ParameterNotImplemented => 504,
            Status::ExceededStorage => 552,
            Status::TransactionFailed => 554,
        }
    }
}

impl Display for Status {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(fmt, "{}", u32::from(*self))
    }
}
