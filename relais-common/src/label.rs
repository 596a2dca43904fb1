//! Application labels.
//!
//! Every relayed message is tagged with the name of the application that sent
//! it. The name comes from whatever the client presented (an AUTH identity or
//! the local-part of the envelope sender) and is squeezed into a short,
//! predictable token before it leaves the relay.

use core::fmt::{self, Display, Formatter};

use serde::Serialize;

/// A sanitised application name: lowercase `[a-z0-9-]`, at most
/// [`AppLabel::MAX_LEN`] characters, never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct AppLabel(String);

impl AppLabel {
    pub const DEFAULT: &'static str = "app";
    pub const MAX_LEN: usize = 20;

    /// Lowercase `raw`, drop everything outside `[a-z0-9-]` and truncate.
    ///
    /// An input with nothing left after stripping becomes [`AppLabel::DEFAULT`].
    #[must_use]
    pub fn sanitize(raw: &str) -> Self {
        let label: String = raw
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
            .take(Self::MAX_LEN)
            .collect();

        if label.is_empty() {
            Self::default()
        } else {
            Self(label)
        }
    }

    /// Derive a label from an envelope address by sanitising its local-part.
    #[must_use]
    pub fn from_address(address: &str) -> Self {
        let local = address.split('@').next().unwrap_or_default();
        Self::sanitize(local)
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for AppLabel {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

impl Display for AppLabel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AppLabel {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
