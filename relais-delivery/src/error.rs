//! Typed errors for handing a message to the delivery API.
//!
//! Every failure is either transient (worth the sender retrying later, so the
//! SMTP reply is a 4xx) or permanent (a 5xx):
//! - Network failures, timeouts, `5xx` and `429` responses are transient
//! - Any other non-success response and serialisation failures are permanent

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The request never got a response
    #[error("Unable to reach the delivery endpoint: {0}")]
    Network(#[source] reqwest::Error),

    #[error("Delivery timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The endpoint answered with something other than `2xx`
    #[error("Delivery endpoint responded with {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unable to serialize message for delivery: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The HTTP client couldn't be constructed
    #[error("Unable to build delivery client: {0}")]
    Client(#[source] reqwest::Error),
}

impl DeliveryError {
    /// Whether trying the same message again later could succeed.
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Serialization(_) | Self::Client(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16) -> DeliveryError {
        DeliveryError::Status {
            status,
            body: String::new(),
        }
    }

    #[test]
    fn classification() {
        assert!(status(500).is_transient());
        assert!(status(503).is_transient());
        assert!(status(429).is_transient());
        assert!(DeliveryError::Timeout(Duration::from_secs(30)).is_transient());

        assert!(!status(400).is_transient());
        assert!(!status(401).is_transient());
        assert!(!status(404).is_transient());
        assert!(!status(302).is_transient());

        let err = serde_json::from_str::<u8>("nope").unwrap_err();
        assert!(!DeliveryError::from(err).is_transient());
    }

    #[test]
    fn display() {
        assert_eq!(
            status(502).to_string(),
            "Delivery endpoint responded with 502: "
        );
        assert_eq!(
            DeliveryError::Timeout(Duration::from_secs(30)).to_string(),
            "Delivery timed out after 30s"
        );
    }
}
