//! End-to-end tests of the relay over a Unix socket

mod common;

use async_trait::async_trait;
use common::*;
use pushrelay::provider::{Delivery, NotificationProvider, STATUS_UNREGISTERED};
use pushrelay::{Namespace, RegistrationStore, Result};
use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[tokio::test]
async fn test_register_then_notify_sends_once() {
    let provider = Arc::new(MockProvider::default());
    let relay = TestRelay::start(provider.clone(), 8).await;
    let mut client = relay.connect().await;

    let response = client
        .request(&register_line("AAA", "BBB", &["Inbox", "Notes"]))
        .await;
    assert_eq!(response, format!("OK {}", TOPIC));

    let response = client.request(&notify_line("Inbox")).await;
    assert_eq!(response, "OK ");

    let sent = provider.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "BBB");
    assert_eq!(sent[0].1, br#"{"aps":{"account-id":"AAA"}}"#.to_vec());

    relay.stop().await.unwrap();
}

#[tokio::test]
async fn test_reregistration_drops_mailboxes() {
    let provider = Arc::new(MockProvider::default());
    let relay = TestRelay::start(provider.clone(), 8).await;
    let mut client = relay.connect().await;

    client
        .request(&register_line("AAA", "BBB", &["Inbox", "Notes"]))
        .await;
    client.request(&register_line("AAA", "BBB", &["Inbox"])).await;

    assert_eq!(client.request(&notify_line("Notes")).await, "OK ");
    assert!(provider.sent().is_empty());

    assert_eq!(client.request(&notify_line("Inbox")).await, "OK ");
    assert_eq!(provider.sent_to("BBB"), 1);

    relay.stop().await.unwrap();
}

#[tokio::test]
async fn test_unknown_subtopic_is_rejected() {
    let provider = Arc::new(MockProvider::default());
    let relay = TestRelay::start(provider.clone(), 8).await;
    let mut client = relay.connect().await;

    let response = client
        .request("REGISTER aps-account-id=\"AAA\"\taps-device-token=\"BBB\"\taps-subtopic=\"com.other\"\tdovecot-username=\"user@domain\"\tdovecot-mailboxes=(\"Inbox\")")
        .await;
    assert_eq!(response, "ERROR Unknown aps-subtopic");

    let ns = relay
        .store
        .resolve_namespace(&Namespace::new("user", "domain"))
        .await
        .unwrap();
    assert_eq!(
        relay.store.find_registration(ns, "AAA", "BBB").await.unwrap(),
        None
    );

    relay.stop().await.unwrap();
}

#[tokio::test]
async fn test_validation_and_parse_errors_keep_connection_open() {
    let provider = Arc::new(MockProvider::default());
    let relay = TestRelay::start(provider.clone(), 8).await;
    let mut client = relay.connect().await;

    assert_eq!(
        client.request("NOTIFY dovecot-mailbox=\"Inbox\"").await,
        "ERROR Missing dovecot-username argument"
    );
    assert!(client.request("FOO bar").await.starts_with("ERROR "));
    assert_eq!(
        client.request("FOO bar=\"baz\"").await,
        "ERROR Unknown command"
    );

    // Still usable after the errors
    assert_eq!(
        client
            .request(&register_line("AAA", "BBB", &["Inbox"]))
            .await,
        format!("OK {}", TOPIC)
    );

    relay.stop().await.unwrap();
}

#[tokio::test]
async fn test_unknown_user_fails_registration() {
    let provider = Arc::new(MockProvider::default());
    let relay = TestRelay::start(provider.clone(), 8).await;
    let mut client = relay.connect().await;

    let response = client
        .request("REGISTER aps-account-id=\"AAA\"\taps-device-token=\"BBB\"\taps-subtopic=\"com.apple.mobilemail\"\tdovecot-username=\"nobody@domain\"\tdovecot-mailboxes=(\"Inbox\")")
        .await;
    assert!(response.starts_with("ERROR Failed to register client: "));

    relay.stop().await.unwrap();
}

#[tokio::test]
async fn test_unregistered_device_is_removed() {
    let provider = Arc::new(MockProvider::default());
    provider.set_status("stale", STATUS_UNREGISTERED);
    let relay = TestRelay::start(provider.clone(), 8).await;
    let mut client = relay.connect().await;

    client.request(&register_line("AAA", "stale", &["Inbox"])).await;
    client.request(&register_line("AAA", "fresh", &["Inbox"])).await;

    assert_eq!(client.request(&notify_line("Inbox")).await, "OK ");
    assert_eq!(client.request(&notify_line("Inbox")).await, "OK ");

    assert_eq!(provider.sent_to("stale"), 1);
    assert_eq!(provider.sent_to("fresh"), 2);

    relay.stop().await.unwrap();
}

#[tokio::test]
async fn test_transport_failure_still_answers_ok() {
    let provider = Arc::new(MockProvider::default());
    provider.set_status("down", 0);
    let relay = TestRelay::start(provider.clone(), 8).await;
    let mut client = relay.connect().await;

    client.request(&register_line("AAA", "down", &["Inbox"])).await;
    client.request(&register_line("AAA", "up", &["Inbox"])).await;

    assert_eq!(client.request(&notify_line("Inbox")).await, "OK ");
    assert_eq!(provider.sent_to("down"), 1);
    assert_eq!(provider.sent_to("up"), 1);

    relay.stop().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_clients() {
    let provider = Arc::new(MockProvider::default());
    let relay = TestRelay::start(provider.clone(), 8).await;

    let mut first = relay.connect().await;
    let mut second = relay.connect().await;

    first.request(&register_line("AAA", "one", &["Inbox"])).await;
    second.request(&register_line("BBB", "two", &["Inbox"])).await;
    assert_eq!(first.request(&notify_line("Inbox")).await, "OK ");

    assert_eq!(provider.sent_to("one"), 1);
    assert_eq!(provider.sent_to("two"), 1);

    relay.stop().await.unwrap();
}

#[tokio::test]
async fn test_connection_cap_defers_extra_clients() {
    let provider = Arc::new(MockProvider::default());
    let relay = TestRelay::start(provider.clone(), 1).await;

    let mut first = relay.connect().await;
    assert_eq!(first.request(&notify_line("Inbox")).await, "OK ");

    // Connects through the backlog but is not served while the first is open
    let mut second = relay.connect().await;
    second.write_line(&notify_line("Inbox")).await;
    let pending = tokio::time::timeout(Duration::from_millis(200), second.read_line()).await;
    assert!(pending.is_err());

    drop(first);
    let response = tokio::time::timeout(Duration::from_secs(5), second.read_line())
        .await
        .unwrap();
    assert_eq!(response.as_deref(), Some("OK "));

    relay.stop().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_closes_idle_sessions_and_socket() {
    let provider = Arc::new(MockProvider::default());
    let relay = TestRelay::start(provider.clone(), 8).await;
    let socket = relay.socket.clone();

    let mut client = relay.connect().await;
    assert_eq!(client.request(&notify_line("Inbox")).await, "OK ");
    let mode = std::fs::metadata(&socket).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o770);

    relay.stop().await.unwrap();
    assert_eq!(client.read_line().await, None);
    assert!(!socket.exists());
}

/// Blocks every send until released
struct GatedProvider {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl NotificationProvider for GatedProvider {
    async fn send(&self, _device_token: &str, _payload: &[u8]) -> Result<Delivery> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(Delivery {
            status_code: 200,
            provider_message_id: None,
            reason: None,
        })
    }
}

#[tokio::test]
async fn test_shutdown_finishes_command_in_flight() {
    let provider = Arc::new(GatedProvider {
        entered: Notify::new(),
        release: Notify::new(),
    });
    let relay = TestRelay::start(provider.clone(), 8).await;
    let mut client = relay.connect().await;

    client.request(&register_line("AAA", "BBB", &["Inbox"])).await;
    client.write_line(&notify_line("Inbox")).await;
    provider.entered.notified().await;

    relay.request_shutdown();
    provider.release.notify_one();

    assert_eq!(client.read_line().await.as_deref(), Some("OK "));
    assert_eq!(client.read_line().await, None);
    relay.join().await.unwrap();
}
