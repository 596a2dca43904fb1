//! End-to-end test harness for the relay
//!
//! Starts a complete relay on a free local port, pointed at a [`MockApi`],
//! and speaks plain SMTP to it.
//!
//! ```no_run
//! let harness = E2ETestHarness::builder().build().await.unwrap();
//! let mut client = harness.connect().await.unwrap();
//! client.expect(220).await;
//! client.send("EHLO test").await;
//! harness.shutdown().await;
//! ```

use std::time::Duration;

use relais::{Relais, config::Overrides};
use relais_common::Signal;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        TcpListener, TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::broadcast,
    task::JoinHandle,
    time::timeout,
};

use super::mock_api::MockApi;

pub const TOKEN: &str = "relay-test-token";

/// A complete SMTP reply, possibly spread over several lines
#[derive(Debug)]
pub struct SmtpReply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl SmtpReply {
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

pub struct SmtpClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl SmtpClient {
    pub async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\r\n").as_bytes())
            .await
            .expect("Failed to write to relay");
    }

    pub async fn read_reply(&mut self) -> Option<SmtpReply> {
        let mut lines = Vec::new();

        loop {
            let mut line = String::new();
            let read = timeout(Duration::from_secs(5), self.reader.read_line(&mut line))
                .await
                .expect("Timed out waiting for the relay")
                .expect("Failed to read from relay");
            if read == 0 {
                return None;
            }

            let line = line.trim_end().to_string();
            let code = line.get(..3)?.parse().ok()?;
            let last = line.as_bytes().get(3) != Some(&b'-');
            lines.push(line.get(4..).unwrap_or_default().to_string());

            if last {
                return Some(SmtpReply { code, lines });
            }
        }
    }

    /// Read a reply and insist on its code
    pub async fn expect(&mut self, code: u16) -> SmtpReply {
        let reply = self.read_reply().await.expect("Connection closed");
        assert_eq!(reply.code, code, "Unexpected reply: {reply:?}");
        reply
    }

    pub async fn command(&mut self, line: &str, code: u16) -> SmtpReply {
        self.send(line).await;
        self.expect(code).await
    }

    /// Run a full transaction, returning the reply to the final dot
    pub async fn submit(&mut self, from: &str, to: &str, message: &str) -> SmtpReply {
        self.command(&format!("MAIL FROM:<{from}>"), 250).await;
        self.command(&format!("RCPT TO:<{to}>"), 250).await;
        self.command("DATA", 354).await;

        for line in message.lines() {
            if line.starts_with('.') {
                self.send(&format!(".{line}")).await;
            } else {
                self.send(line).await;
            }
        }
        self.send(".").await;

        self.read_reply().await.expect("Connection closed")
    }
}

pub struct E2ETestHarness {
    port: u16,
    api: MockApi,
    handle: JoinHandle<anyhow::Result<()>>,
    shutdown_tx: broadcast::Sender<Signal>,
}

impl E2ETestHarness {
    pub fn builder() -> E2ETestHarnessBuilder {
        E2ETestHarnessBuilder {
            api_status: 200,
            max_message_size: 1024 * 1024,
        }
    }

    pub const fn api(&self) -> &MockApi {
        &self.api
    }

    /// Connect and consume nothing; the greeting is left for the test
    pub async fn connect(&self) -> std::io::Result<SmtpClient> {
        let stream = TcpStream::connect(("127.0.0.1", self.port)).await?;
        let (reader, writer) = stream.into_split();

        Ok(SmtpClient {
            reader: BufReader::new(reader),
            writer,
        })
    }

    /// Connect, read the greeting and say EHLO
    pub async fn greeted(&self) -> std::io::Result<SmtpClient> {
        let mut client = self.connect().await?;
        client.expect(220).await;
        client.command("EHLO e2e.test", 250).await;
        Ok(client)
    }

    pub fn signal_shutdown(&self) {
        let _ = self.shutdown_tx.send(Signal::Shutdown);
    }

    pub async fn shutdown(self) {
        self.signal_shutdown();
        self.api.shutdown();

        let _ = timeout(Duration::from_secs(5), self.handle).await;
    }
}

pub struct E2ETestHarnessBuilder {
    api_status: u16,
    max_message_size: usize,
}

impl E2ETestHarnessBuilder {
    /// Status the mock API answers with
    #[must_use]
    pub const fn with_api_status(mut self, status: u16) -> Self {
        self.api_status = status;
        self
    }

    #[must_use]
    pub const fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub async fn build(self) -> anyhow::Result<E2ETestHarness> {
        let api = MockApi::start(self.api_status).await?;

        // Reserve a port, then release it for the relay
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await?;
            listener.local_addr()?.port()
        };

        let config = format!(
            r#"(
                smtp: (
                    listeners: [
                        (
                            socket: "127.0.0.1:{port}",
                            shutdown_grace_secs: 1,
                            args: (
                                banner: "relay.test",
                                max_message_size: {},
                                timeouts: (command_secs: 5, data_secs: 5),
                            ),
                        ),
                    ],
                ),
                delivery: (timeout_secs: 5),
            )"#,
            self.max_message_size
        );

        let mut relais = Relais::from_ron(&config)?.apply(Overrides {
            port: None,
            endpoint: Some(api.endpoint()),
            token: Some(TOKEN.to_string()),
        });
        relais.prepare()?;

        let (shutdown_tx, shutdown_rx) = broadcast::channel(8);
        let handle = tokio::spawn(relais.control(shutdown_rx));

        // Wait for the listener to come up
        let start = tokio::time::Instant::now();
        while TcpStream::connect(("127.0.0.1", port)).await.is_err() {
            anyhow::ensure!(
                start.elapsed() < Duration::from_secs(5),
                "Relay did not start listening on port {port}"
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        Ok(E2ETestHarness {
            port,
            api,
            handle,
            shutdown_tx,
        })
    }
}
