//! Shared harness for relay integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use pushrelay::provider::{Delivery, NotificationProvider};
use pushrelay::store::r#impl::SQLiteRegistrationStore;
use pushrelay::{Dispatcher, Error, Namespace, RelayServer, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const TOPIC: &str = "com.apple.mail.XServer.test";
pub const USERNAME: &str = "user@domain";

/// Answers with a configured status per device token and records every send
#[derive(Default)]
pub struct MockProvider {
    statuses: Mutex<HashMap<String, u16>>,
    sent: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MockProvider {
    /// Status 0 makes the send fail with a transport error
    pub fn set_status(&self, token: &str, status: u16) {
        self.statuses
            .lock()
            .unwrap()
            .insert(token.to_string(), status);
    }

    pub fn sent(&self) -> Vec<(String, Vec<u8>)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, token: &str) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == token)
            .count()
    }
}

#[async_trait]
impl NotificationProvider for MockProvider {
    async fn send(&self, device_token: &str, payload: &[u8]) -> Result<Delivery> {
        self.sent
            .lock()
            .unwrap()
            .push((device_token.to_string(), payload.to_vec()));

        let status = self
            .statuses
            .lock()
            .unwrap()
            .get(device_token)
            .copied()
            .unwrap_or(200);
        if status == 0 {
            return Err(Error::Transport("connection refused".to_string()));
        }

        Ok(Delivery {
            status_code: status,
            provider_message_id: Some(format!("id-{}", device_token)),
            reason: None,
        })
    }
}

/// A relay server running on a socket in a temporary directory
pub struct TestRelay {
    pub socket: PathBuf,
    pub store: Arc<SQLiteRegistrationStore>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<Result<()>>,
    _tmp_dir: TempDir,
}

impl TestRelay {
    pub async fn start(provider: Arc<dyn NotificationProvider>, max_connections: usize) -> Self {
        let tmp_dir = TempDir::new().unwrap();
        let socket = tmp_dir.path().join("relay.sock");
        let db_path = tmp_dir.path().join("registrations.db");

        let store = Arc::new(SQLiteRegistrationStore::new(&db_path).await.unwrap());
        store
            .create_namespace(&Namespace::new("user", "domain"))
            .await
            .unwrap();

        let dispatcher = Arc::new(Dispatcher::with_store(store.clone(), provider, TOPIC));
        let server = RelayServer::new(dispatcher, max_connections);

        let (shutdown, shutdown_rx) = watch::channel(false);
        let path = socket.clone();
        let task = tokio::spawn(async move { server.listen(&path, 0o770, shutdown_rx).await });

        // Wait for the socket to be bound
        for _ in 0..500 {
            if socket.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        Self {
            socket,
            store,
            shutdown,
            task,
            _tmp_dir: tmp_dir,
        }
    }

    pub async fn connect(&self) -> TestClient {
        let stream = UnixStream::connect(&self.socket).await.unwrap();
        let (read_half, write_half) = stream.into_split();
        TestClient {
            lines: BufReader::new(read_half).lines(),
            writer: write_half,
        }
    }

    /// Request shutdown and wait for the server to finish
    pub async fn stop(self) -> Result<()> {
        self.shutdown.send(true).unwrap();
        self.task.await.unwrap()
    }

    pub fn request_shutdown(&self) {
        self.shutdown.send(true).unwrap();
    }

    pub async fn join(self) -> Result<()> {
        self.task.await.unwrap()
    }
}

/// One mail server connection to the relay
pub struct TestClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    pub async fn write_line(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
    }

    /// Next response line, or `None` once the relay closed the connection
    pub async fn read_line(&mut self) -> Option<String> {
        self.lines.next_line().await.unwrap()
    }

    pub async fn request(&mut self, line: &str) -> String {
        self.write_line(line).await;
        self.read_line().await.unwrap()
    }
}

pub fn register_line(account: &str, token: &str, mailboxes: &[&str]) -> String {
    let mailboxes = mailboxes
        .iter()
        .map(|m| format!("\"{}\"", m))
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "REGISTER aps-account-id=\"{}\"\taps-device-token=\"{}\"\taps-subtopic=\"com.apple.mobilemail\"\tdovecot-username=\"{}\"\tdovecot-mailboxes=({})",
        account, token, USERNAME, mailboxes
    )
}

pub fn notify_line(mailbox: &str) -> String {
    format!(
        "NOTIFY dovecot-username=\"{}\"\tdovecot-mailbox=\"{}\"",
        USERNAME, mailbox
    )
}
