use std::time::Duration;

use async_trait::async_trait;
use relais_common::internal;
use relais_mime::NormalizedMessage;
use reqwest::{Client, header::CONTENT_TYPE};

use crate::{Deliver, DeliveryError, request::SendRequest};

/// Path appended to the configured endpoint.
pub const SEND_PATH: &str = "/email/send";

/// Hands messages to the internal email API with a single authenticated
/// JSON `POST` per message.
#[derive(Debug, Clone)]
pub struct HttpDelivery {
    client: Client,
    url: String,
    token: String,
    timeout: Duration,
}

impl HttpDelivery {
    ///
    /// Create a client for the API rooted at `endpoint`
    ///
    /// # Errors
    /// If the underlying HTTP client can't be built
    ///
    pub fn new(
        endpoint: &str,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(DeliveryError::Client)?;

        Ok(Self {
            client,
            url: format!("{}{SEND_PATH}", endpoint.trim_end_matches('/')),
            token: token.into(),
            timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl Deliver for HttpDelivery {
    #[tracing::instrument(level = "debug", skip_all, fields(app = %message.app_name))]
    async fn deliver(&self, message: &NormalizedMessage) -> Result<(), DeliveryError> {
        let body = serde_json::to_vec(&SendRequest::from(message))?;

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    DeliveryError::Timeout(self.timeout)
                } else {
                    DeliveryError::Network(err)
                }
            })?;

        let status = response.status();
        if status.is_success() {
            internal!(
                level = DEBUG,
                "Delivered message for {} to {}",
                message.app_name,
                message.recipient
            );
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(DeliveryError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_cleanly() {
        let delivery =
            HttpDelivery::new("http://api.internal/", "token", Duration::from_secs(30)).unwrap();
        assert_eq!(delivery.url(), "http://api.internal/email/send");

        let delivery =
            HttpDelivery::new("http://api.internal", "token", Duration::from_secs(5)).unwrap();
        assert_eq!(delivery.url(), "http://api.internal/email/send");
        assert_eq!(delivery.timeout(), Duration::from_secs(5));
    }
}
