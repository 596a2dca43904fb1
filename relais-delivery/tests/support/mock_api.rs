//! Mock email API for exercising HTTP delivery
#![allow(dead_code)] // Test utility module - not all methods used in every test
//!
//! Accepts plain HTTP/1.1 requests, records them, and answers every request
//! with the configured status. Each response closes the connection.
//!
//! ```rust,no_run
//! let api = MockApi::builder()
//!     .with_status(503, "try later")
//!     .build()
//!     .await?;
//!
//! // Point the delivery client at api.endpoint()
//! ```

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::{Notify, RwLock},
    time::timeout,
};

/// A request as the mock API saw it
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    /// Header names are lowercased
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("Request body should be JSON")
    }
}

#[derive(Clone)]
struct MockApiConfig {
    status: u16,
    body: String,
    response_delay: Option<Duration>,
}

impl Default for MockApiConfig {
    fn default() -> Self {
        Self {
            status: 200,
            body: String::from("{\"ok\":true}"),
            response_delay: None,
        }
    }
}

pub struct MockApi {
    addr: SocketAddr,
    requests: Arc<RwLock<Vec<RecordedRequest>>>,
    received: Arc<Notify>,
    shutdown: Arc<AtomicBool>,
}

impl MockApi {
    #[must_use]
    pub fn builder() -> MockApiBuilder {
        MockApiBuilder {
            config: MockApiConfig::default(),
        }
    }

    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL to configure as the delivery endpoint
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.read().await.clone()
    }

    /// Wait until at least `expected` requests have been recorded
    pub async fn wait_for_requests(&self, expected: usize, wait: Duration) -> Vec<RecordedRequest> {
        timeout(wait, async {
            loop {
                let notified = self.received.notified();
                if self.requests.read().await.len() >= expected {
                    return;
                }
                notified.await;
            }
        })
        .await
        .expect("Timed out waiting for requests");

        self.requests().await
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    async fn handle_client(
        stream: TcpStream,
        config: Arc<MockApiConfig>,
        requests: Arc<RwLock<Vec<RecordedRequest>>>,
        received: Arc<Notify>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut reader = BufReader::new(stream);

        let mut request_line = String::new();
        if reader.read_line(&mut request_line).await? == 0 {
            return Ok(());
        }

        let mut parts = request_line.split_whitespace();
        let method = parts.next().unwrap_or_default().to_string();
        let path = parts.next().unwrap_or_default().to_string();

        let mut headers = HashMap::new();
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await? == 0 {
                break;
            }

            let line = line.trim_end();
            if line.is_empty() {
                break;
            }

            if let Some((name, value)) = line.split_once(':') {
                headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
            }
        }

        let length = headers
            .get("content-length")
            .and_then(|length| length.parse::<usize>().ok())
            .unwrap_or_default();
        let mut body = vec![0; length];
        reader.read_exact(&mut body).await?;

        tracing::debug!("Mock API received: {method} {path}");
        requests.write().await.push(RecordedRequest {
            method,
            path,
            headers,
            body,
        });
        received.notify_waiters();

        if let Some(delay) = config.response_delay {
            tokio::time::sleep(delay).await;
        }

        let response = format!(
            "HTTP/1.1 {} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            config.status,
            config.body.len(),
            config.body
        );

        let stream = reader.get_mut();
        stream.write_all(response.as_bytes()).await?;
        stream.flush().await?;
        stream.shutdown().await?;

        Ok(())
    }
}

pub struct MockApiBuilder {
    config: MockApiConfig,
}

impl MockApiBuilder {
    /// Answer every request with this status and body
    #[must_use]
    pub fn with_status(mut self, status: u16, body: impl Into<String>) -> Self {
        self.config.status = status;
        self.config.body = body.into();
        self
    }

    /// Wait before answering each request
    #[must_use]
    pub const fn with_response_delay(mut self, delay: Duration) -> Self {
        self.config.response_delay = Some(delay);
        self
    }

    /// Bind to an ephemeral port and start serving
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to a port
    pub async fn build(self) -> Result<MockApi, std::io::Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let config = Arc::new(self.config);
        let requests = Arc::new(RwLock::new(Vec::new()));
        let received = Arc::new(Notify::new());
        let shutdown = Arc::new(AtomicBool::new(false));

        let requests_clone = Arc::clone(&requests);
        let received_clone = Arc::clone(&received);
        let shutdown_clone = Arc::clone(&shutdown);

        tokio::spawn(async move {
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }

                // Accept with a timeout so the shutdown flag is checked regularly
                let accept_result = timeout(Duration::from_millis(100), listener.accept()).await;

                if let Ok(Ok((stream, _peer))) = accept_result {
                    let config = Arc::clone(&config);
                    let requests = Arc::clone(&requests_clone);
                    let received = Arc::clone(&received_clone);

                    tokio::spawn(async move {
                        if let Err(e) =
                            MockApi::handle_client(stream, config, requests, received).await
                        {
                            tracing::debug!("Mock API client error: {}", e);
                        }
                    });
                }
            }
        });

        Ok(MockApi {
            addr,
            requests,
            received,
            shutdown,
        })
    }
}
