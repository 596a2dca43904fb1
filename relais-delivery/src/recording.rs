use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use relais_mime::NormalizedMessage;

use crate::{Deliver, DeliveryError};

/// How a [`RecordingDelivery`] answers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Outcome {
    #[default]
    Accept,
    /// Respond as the API would with the given status
    Status(u16),
    /// Never respond
    Hang,
}

/// An in-memory [`Deliver`] that keeps everything it is given.
///
/// Stands in for the HTTP endpoint when exercising sessions.
#[derive(Debug, Clone, Default)]
pub struct RecordingDelivery {
    delivered: Arc<Mutex<Vec<NormalizedMessage>>>,
    outcome: Arc<Mutex<Outcome>>,
}

impl RecordingDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outcome(outcome: Outcome) -> Self {
        let delivery = Self::default();
        delivery.set_outcome(outcome);
        delivery
    }

    pub fn set_outcome(&self, outcome: Outcome) {
        *self.outcome.lock() = outcome;
    }

    /// Every message handed over so far, including rejected ones
    pub fn delivered(&self) -> Vec<NormalizedMessage> {
        self.delivered.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.delivered.lock().len()
    }
}

#[async_trait]
impl Deliver for RecordingDelivery {
    async fn deliver(&self, message: &NormalizedMessage) -> Result<(), DeliveryError> {
        self.delivered.lock().push(message.clone());

        let outcome = *self.outcome.lock();
        match outcome {
            Outcome::Accept => Ok(()),
            Outcome::Status(status) => Err(DeliveryError::Status {
                status,
                body: String::from("rejected by test"),
            }),
            Outcome::Hang => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use relais_common::label::AppLabel;
    use relais_mime::Content;

    use super::*;

    fn message() -> NormalizedMessage {
        NormalizedMessage::new(Content::default(), "to@example.com", AppLabel::default())
    }

    #[tokio::test]
    async fn records_and_answers() {
        let delivery = RecordingDelivery::new();
        assert!(delivery.deliver(&message()).await.is_ok());

        delivery.set_outcome(Outcome::Status(503));
        let err = delivery.deliver(&message()).await.unwrap_err();
        assert!(err.is_transient());

        assert_eq!(delivery.count(), 2);
        assert_eq!(delivery.delivered()[0].recipient, "to@example.com");
    }
}
