use core::fmt::{self, Display};

use serde::Deserialize;

/// SMTP service extensions advertised in the EHLO response.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Extension {
    /// HELP extension - Provides command help information.
    Help,

    /// SIZE extension (RFC 1870) - Message size declaration and enforcement.
    ///
    /// The maximum is enforced twice: against the `SIZE=` a client declares in
    /// MAIL FROM, and against the bytes actually received after DATA. Both
    /// rejections use status 552. A value of 0 means no limit.
    Size(usize),

    /// AUTH extension (RFC 4954), `PLAIN` mechanism only.
    ///
    /// Any identity is accepted; it only names the submitting application.
    Auth,

    /// 8BITMIME extension (RFC 6152)
    EightBitMime,
}

impl Display for Extension {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Self::Help => fmt.write_str("HELP"),
            Self::Size(max) => {
                if *max == 0 {
                    fmt.write_str("SIZE")
                } else {
                    write!(fmt, "SIZE {max}")
                }
            }
            Self::Auth => fmt.write_str("AUTH PLAIN"),
            Self::EightBitMime => fmt.write_str("8BITMIME"),
        }
    }
}
