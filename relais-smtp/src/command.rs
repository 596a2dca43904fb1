use core::fmt::{self, Display, Formatter};
use std::borrow::Cow;

use ahash::AHashMap;
use mailparse::{MailAddr, MailAddrList};
use phf::phf_map;

/// ESMTP parameters for MAIL FROM command (RFC 5321 Section 3.3).
///
/// Keys are case-insensitive. Only `SIZE` (RFC 1870) and `BODY` (RFC 6152)
/// change how the relay behaves; anything else is kept but ignored.
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct MailParameters {
    params: AHashMap<Cow<'static, str>, Option<String>>,
}

/// Perfect hash map of known ESMTP parameters for O(1) lookup
static KNOWN_PARAMS: phf::Map<&'static str, &'static str> = phf_map! {
    "SIZE" => "SIZE",
    "BODY" => "BODY",
    "AUTH" => "AUTH",
    "RET" => "RET",
    "ENVID" => "ENVID",
    "SMTPUTF8" => "SMTPUTF8",
};

/// Uppercase a parameter key, borrowing the static name for known parameters
fn normalize_key(key: &str) -> Cow<'static, str> {
    let upper = key.to_ascii_uppercase();

    KNOWN_PARAMS
        .get(upper.as_str())
        .map_or_else(|| Cow::Owned(upper), |&known| Cow::Borrowed(known))
}

impl MailParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses ESMTP parameters from the text following the reverse-path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A parameter appears multiple times
    /// - SIZE parameter has an invalid value (non-numeric or zero)
    pub fn from_params_str(params_str: &str) -> Result<Self, String> {
        let mut params = Self::new();

        for token in params_str.split_whitespace() {
            let (key, value) = token
                .split_once('=')
                .map_or((token, None), |(key, value)| (key, Some(value)));

            let key = normalize_key(key);
            if params.params.contains_key(&key) {
                return Err(format!("Duplicate parameter '{key}' not allowed"));
            }

            if key == "SIZE" {
                match value.map(str::parse::<usize>) {
                    Some(Ok(0)) => return Err(String::from("SIZE=0 is not allowed")),
                    Some(Ok(_)) => {}
                    _ => return Err(format!("Invalid SIZE value: {}", value.unwrap_or(""))),
                }
            }

            params.params.insert(key, value.map(str::to_string));
        }

        Ok(params)
    }

    /// Gets a parameter value by key (case-insensitive).
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(normalize_key(key).as_ref())?.as_deref()
    }

    /// Gets the SIZE parameter value, if present.
    pub fn size(&self) -> Option<usize> {
        self.get("SIZE")?.parse().ok()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl Display for MailParameters {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (k, v) in &self.params {
            if !first {
                f.write_str(" ")?;
            }
            first = false;

            match v {
                None => f.write_str(k)?,
                Some(val) => write!(f, "{k}={val}")?,
            }
        }
        Ok(())
    }
}

#[derive(PartialEq, PartialOrd, Eq, Hash, Debug, Clone)]
pub enum HeloVariant {
    Ehlo(String),
    Helo(String),
}

impl Display for HeloVariant {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ehlo(_) => "EHLO",
            Self::Helo(_) => "HELO",
        })
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum Command {
    Helo(HeloVariant),
    Help,
    Noop,
    /// If this contains `None`, then it should be assumed this is the `null sender`, or `null reverse-path`,
    /// from [RFC-5321](https://www.ietf.org/rfc/rfc5321.txt).
    MailFrom(Option<MailAddr>, MailParameters),
    RcptTo(MailAddrList),
    Rset,
    /// `AUTH <mechanism> [initial-response]` (RFC 4954)
    Auth {
        mechanism: String,
        initial: Option<String>,
    },
    /// A bare line sent in reply to a `334` challenge
    AuthResponse(String),
    Data,
    Quit,
    /// A known command with arguments that don't parse
    Invalid(String),
    /// Not a command we know
    Unknown(String),
}

impl Command {
    pub fn inner(&self) -> Cow<'_, str> {
        match self {
            Self::MailFrom(Some(MailAddr::Single(from)), _) => Cow::Owned(from.addr.clone()),
            Self::RcptTo(to) => Cow::Owned(to.to_string()),
            Self::Invalid(command) | Self::Unknown(command) => Cow::Borrowed(command.as_str()),
            Self::Helo(HeloVariant::Ehlo(id) | HeloVariant::Helo(id)) => Cow::Borrowed(id.as_str()),
            Self::Auth { mechanism, .. } => Cow::Borrowed(mechanism.as_str()),
            _ => Cow::Borrowed(""),
        }
    }
}

impl Display for Command {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Helo(v) => write!(fmt, "{v} {}", self.inner()),
            Self::MailFrom(_, params) => {
                if params.is_empty() {
                    write!(fmt, "MAIL FROM:<{}>", self.inner())
                } else {
                    write!(fmt, "MAIL FROM:<{}> {params}", self.inner())
                }
            }
            Self::RcptTo(rcpt) => write!(fmt, "RCPT TO:{rcpt}"),
            Self::Data => fmt.write_str("DATA"),
            Self::Quit => fmt.write_str("QUIT"),
            Self::Help => fmt.write_str("HELP"),
            Self::Noop => fmt.write_str("NOOP"),
            Self::Rset => fmt.write_str("RSET"),
            // Credentials never make it into the logs
            Self::Auth { mechanism, .. } => write!(fmt, "AUTH {mechanism}"),
            Self::AuthResponse(_) => fmt.write_str("<credentials>"),
            Self::Invalid(s) | Self::Unknown(s) => fmt.write_str(s),
        }
    }
}

/// Longest EHLO/HELO argument accepted (RFC 5321 4.5.3.1.2)
pub const MAX_HOSTNAME: usize = 255;

/// Case-insensitively strip `verb` from the front of `line`.
fn strip_verb<'a>(line: &'a str, verb: &str) -> Option<&'a str> {
    line.get(..verb.len())
        .filter(|prefix| prefix.eq_ignore_ascii_case(verb))
        .and_then(|_| line.get(verb.len()..))
}

impl TryFrom<&str> for Command {
    type Error = Self;

    fn try_from(command: &str) -> Result<Self, Self::Error> {
        let trimmed = command.trim();

        if let Some(rest) = strip_verb(trimmed, "MAIL FROM:") {
            let rest = rest.trim();
            if rest.is_empty() {
                return Err(Self::Invalid(String::from("Expected reverse-path in MAIL FROM")));
            }

            // Format: MAIL FROM:<addr> [param1=value1] [param2=value2] ...
            let (addr, params) = rest
                .split_once(char::is_whitespace)
                .map_or((rest, None), |(addr, params)| (addr, Some(params)));

            let mail_params = params
                .map(MailParameters::from_params_str)
                .transpose()
                .map_err(Self::Invalid)?
                .unwrap_or_default();

            // Handle NULL sender explicitly, as mailparse doesn't tend to like this
            if addr == "<>" {
                return Ok(Self::MailFrom(None, mail_params));
            }

            return mailparse::addrparse(addr).map_or_else(
                |err| Err(Self::Invalid(err.to_string())),
                |from| Ok(Self::MailFrom(from.first().cloned(), mail_params)),
            );
        }

        if let Some(rest) = strip_verb(trimmed, "RCPT TO:") {
            let rest = rest.trim();
            if rest.is_empty() {
                return Err(Self::Invalid(String::from("Expected forward-path in RCPT TO")));
            }

            return match mailparse::addrparse(rest) {
                Ok(to) if !to.is_empty() => Ok(Self::RcptTo(to)),
                Ok(_) => Err(Self::Invalid(format!("No recipient in {rest}"))),
                Err(err) => Err(Self::Invalid(err.to_string())),
            };
        }

        let (verb, args) = trimmed
            .split_once(' ')
            .map_or((trimmed, ""), |(verb, args)| (verb, args.trim()));

        match verb.to_ascii_uppercase().as_str() {
            "EHLO" | "HELO" if args.is_empty() => {
                Err(Self::Invalid(format!("Expected hostname in {trimmed}")))
            }
            "EHLO" | "HELO" if args.len() > MAX_HOSTNAME => Err(Self::Invalid(format!(
                "Hostname longer than {MAX_HOSTNAME} characters"
            ))),
            "EHLO" => Ok(Self::Helo(HeloVariant::Ehlo(args.to_string()))),
            "HELO" => Ok(Self::Helo(HeloVariant::Helo(args.to_string()))),
            "AUTH" => {
                let mut parts = args.split_whitespace();
                let Some(mechanism) = parts.next() else {
                    return Err(Self::Invalid(String::from("Expected mechanism in AUTH")));
                };

                Ok(Self::Auth {
                    mechanism: mechanism.to_ascii_uppercase(),
                    initial: parts.next().map(str::to_string),
                })
            }
            "DATA" if args.is_empty() => Ok(Self::Data),
            "QUIT" if args.is_empty() => Ok(Self::Quit),
            "RSET" if args.is_empty() => Ok(Self::Rset),
            // Both may carry an argument, which is ignored
            "NOOP" => Ok(Self::Noop),
            "HELP" => Ok(Self::Help),
            "DATA" | "QUIT" | "RSET" => Err(Self::Invalid(format!("{verb} takes no arguments"))),
            "MAIL" | "RCPT" => Err(Self::Invalid(command.trim_end().to_owned())),
            _ => Err(Self::Unknown(command.trim_end().to_owned())),
        }
    }
}

impl TryFrom<&[u8]> for Command {
    type Error = Self;

    fn try_from(command: &[u8]) -> Result<Self, Self::Error> {
        std::str::from_utf8(command).map_or_else(
            |_| Err(Self::Invalid("Unable to interpret command".to_string())),
            Self::try_from,
        )
    }
}

impl TryFrom<String> for Command {
    type Error = Self;

    fn try_from(command: String) -> Result<Self, Self::Error> {
        Self::try_from(command.as_str())
    }
}
