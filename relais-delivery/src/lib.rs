//! Hands normalised messages to the internal email API
//!
//! Delivery happens exactly once per accepted message, inside the session that
//! received it. There is no queue and no retry here; a failed delivery is
//! reported back so the SMTP client can retry the submission itself.

mod error;
mod http;
#[cfg(any(test, feature = "test-util"))]
mod recording;
mod request;

use async_trait::async_trait;
pub use error::DeliveryError;
pub use http::{HttpDelivery, SEND_PATH};
#[cfg(any(test, feature = "test-util"))]
pub use recording::{Outcome, RecordingDelivery};
use relais_mime::NormalizedMessage;
pub use request::SendRequest;

/// Something that can take a message off the relay's hands.
#[async_trait]
pub trait Deliver: Send + Sync {
    ///
    /// Deliver a single message
    ///
    /// # Errors
    /// If the message was not accepted; see [`DeliveryError::is_transient`]
    ///
    async fn deliver(&self, message: &NormalizedMessage) -> Result<(), DeliveryError>;
}
