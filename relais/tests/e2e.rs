//! End-to-end tests: SMTP in one side, JSON out the other
#![allow(clippy::expect_used, clippy::unwrap_used)]

mod support;

use std::time::Duration;

use base64::Engine;
use pretty_assertions::assert_eq;
use support::{E2ETestHarness, harness::TOKEN};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
#[cfg_attr(miri, ignore = "Network operations not supported in MIRI")]
async fn plain_message_reaches_api() {
    let harness = E2ETestHarness::builder().build().await.unwrap();
    let mut client = harness.greeted().await.unwrap();

    let reply = client
        .submit(
            "BackupJob@host.local",
            "ops@example.com",
            "Subject: Nightly backup\r\n\r\nAll volumes copied.\r\n.hidden line\r\n",
        )
        .await;
    assert_eq!(reply.code, 250, "{reply:?}");

    client.command("QUIT", 221).await;

    let requests = harness.api().wait_for_requests(1, WAIT).await;
    assert_eq!(requests.len(), 1);

    let request = &requests[0];
    assert_eq!(request.method, "POST");
    assert_eq!(request.path, "/email/send");
    assert_eq!(
        request.header("Authorization"),
        Some(format!("Bearer {TOKEN}").as_str())
    );

    let body = request.json();
    assert_eq!(body["to"], "ops@example.com");
    assert_eq!(body["subject"], "Nightly backup");
    assert_eq!(body["appName"], "backupjob");
    let text = body["text"].as_str().unwrap();
    assert!(text.contains("All volumes copied."));
    assert!(text.contains(".hidden line"));
    assert!(!text.contains("..hidden"));
    assert!(body.get("html").is_none());

    harness.shutdown().await;
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Network operations not supported in MIRI")]
async fn authenticated_html_message_with_inline_image() {
    let harness = E2ETestHarness::builder().build().await.unwrap();
    let mut client = harness.greeted().await.unwrap();

    let plain = base64::engine::general_purpose::STANDARD.encode("\0Immich Server\0secret");
    let reply = client.command(&format!("AUTH PLAIN {plain}"), 235).await;
    assert!(reply.text().contains("successful"));

    let message = "Subject: =?UTF-8?B?UGhvdG9zIHJlYWR5?=\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/related; boundary=\"rel\"\r\n\
\r\n\
--rel\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>Album</p><img src=\"cid:logo@immich\">\r\n\
--rel\r\n\
Content-Type: image/png\r\n\
Content-Transfer-Encoding: base64\r\n\
Content-ID: <logo@immich>\r\n\
\r\n\
iVBORw0KGgo=\r\n\
--rel--\r\n";

    let reply = client
        .submit("noreply@photos.local", "family@example.com", message)
        .await;
    assert_eq!(reply.code, 250, "{reply:?}");

    let requests = harness.api().wait_for_requests(1, WAIT).await;
    let body = requests[0].json();

    assert_eq!(body["subject"], "Photos ready");
    assert_eq!(body["appName"], "immichserver");
    let html = body["html"].as_str().unwrap();
    assert!(html.contains("<p>Album</p>"));
    assert!(html.contains("src=\"data:image/png;base64,iVBORw0KGgo=\""));
    assert!(!html.contains("cid:"));

    harness.shutdown().await;
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Network operations not supported in MIRI")]
async fn api_outage_is_reported_as_temporary() {
    let harness = E2ETestHarness::builder()
        .with_api_status(503)
        .build()
        .await
        .unwrap();
    let mut client = harness.greeted().await.unwrap();

    let reply = client
        .submit("app@host", "ops@example.com", "Subject: Hi\r\n\r\nBody\r\n")
        .await;
    assert_eq!(reply.code, 451, "{reply:?}");

    // The session survives and the transaction was reset
    client.command("NOOP", 250).await;
    client.command("DATA", 503).await;

    harness.shutdown().await;
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Network operations not supported in MIRI")]
async fn api_rejection_is_permanent() {
    let harness = E2ETestHarness::builder()
        .with_api_status(400)
        .build()
        .await
        .unwrap();
    let mut client = harness.greeted().await.unwrap();

    let reply = client
        .submit("app@host", "ops@example.com", "Subject: Hi\r\n\r\nBody\r\n")
        .await;
    assert_eq!(reply.code, 554, "{reply:?}");

    harness.shutdown().await;
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Network operations not supported in MIRI")]
async fn oversized_message_is_refused_without_delivery() {
    let harness = E2ETestHarness::builder()
        .with_max_message_size(64)
        .build()
        .await
        .unwrap();
    let mut client = harness.greeted().await.unwrap();

    let body = format!("Subject: Big\r\n\r\n{}\r\n", "x".repeat(200));
    let reply = client.submit("app@host", "ops@example.com", &body).await;
    assert_eq!(reply.code, 552, "{reply:?}");

    // A message that fits still goes through on the same connection
    let reply = client
        .submit("app@host", "ops@example.com", "Subject: Small\r\n\r\nok\r\n")
        .await;
    assert_eq!(reply.code, 250, "{reply:?}");

    let requests = harness.api().wait_for_requests(1, WAIT).await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].json()["subject"], "Small");

    harness.shutdown().await;
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Network operations not supported in MIRI")]
async fn protocol_errors_do_not_drop_the_session() {
    let harness = E2ETestHarness::builder().build().await.unwrap();
    let mut client = harness.connect().await.unwrap();

    client.expect(220).await;
    client.command("MAIL FROM:<app@host>", 503).await;
    client.command("FROB", 500).await;

    let ehlo = client.command("EHLO e2e.test", 250).await;
    assert!(ehlo.lines.iter().any(|line| line.starts_with("SIZE")));
    assert!(ehlo.lines.iter().any(|line| line.starts_with("AUTH PLAIN")));

    client.command("RCPT TO:<ops@example.com>", 503).await;
    client.command("QUIT", 221).await;

    assert!(harness.api().requests().await.is_empty());
    harness.shutdown().await;
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Network operations not supported in MIRI")]
async fn shutdown_closes_idle_sessions() {
    let harness = E2ETestHarness::builder().build().await.unwrap();
    let mut client = harness.greeted().await.unwrap();

    harness.signal_shutdown();

    let reply = client.read_reply().await.expect("Expected a closing reply");
    assert_eq!(reply.code, 421);
    assert!(client.read_reply().await.is_none());

    harness.shutdown().await;
}
