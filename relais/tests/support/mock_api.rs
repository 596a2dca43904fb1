//! Stand-in for the internal email API
//!
//! Records every request and answers each one with a fixed status, closing
//! the connection afterwards.

use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};

use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::{Notify, RwLock},
    task::JoinHandle,
    time::timeout,
};

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    /// Lowercased names
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("Request body should be JSON")
    }
}

pub struct MockApi {
    addr: SocketAddr,
    requests: Arc<RwLock<Vec<RecordedRequest>>>,
    received: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl MockApi {
    /// Bind to an ephemeral port and answer every request with `status`
    pub async fn start(status: u16) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let requests = Arc::new(RwLock::new(Vec::new()));
        let received = Arc::new(Notify::new());

        let handle = {
            let requests = Arc::clone(&requests);
            let received = Arc::clone(&received);

            tokio::spawn(async move {
                while let Ok((stream, _peer)) = listener.accept().await {
                    let requests = Arc::clone(&requests);
                    let received = Arc::clone(&received);

                    tokio::spawn(async move {
                        let _ = Self::answer(stream, status, requests, received).await;
                    });
                }
            })
        };

        Ok(Self {
            addr,
            requests,
            received,
            handle,
        })
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.read().await.clone()
    }

    /// Wait until at least `expected` requests have arrived
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
        .expect("Timed out waiting for API requests");

        self.requests().await
    }

    pub fn shutdown(&self) {
        self.handle.abort();
    }

    async fn answer(
        stream: TcpStream,
        status: u16,
        requests: Arc<RwLock<Vec<RecordedRequest>>>,
        received: Arc<Notify>,
    ) -> std::io::Result<()> {
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

        requests.write().await.push(RecordedRequest {
            method,
            path,
            headers,
            body,
        });
        received.notify_waiters();

        let response = format!(
            "HTTP/1.1 {status} Mock\r\nContent-Type: application/json\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{{}}"
        );

        let stream = reader.get_mut();
        stream.write_all(response.as_bytes()).await?;
        stream.flush().await?;
        stream.shutdown().await
    }
}
