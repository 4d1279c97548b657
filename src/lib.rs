//! pushrelay - Relay between a mail server and Apple Push Notification service
//!
//! The mail server talks a small line protocol over a Unix socket: `REGISTER`
//! records which mailboxes a device wants to hear about, `NOTIFY` announces new
//! mail in a mailbox. Registrations live in a SQLite store; pushes go out
//! through a [`NotificationProvider`].

pub mod error;
pub mod types;
pub mod protocol;
pub mod request;
pub mod store;
pub mod reconcile;
pub mod provider;
pub mod notifier;
pub mod command_handler;
pub mod handlers;
pub mod dispatcher;
pub mod connection;
pub mod session;
pub mod socket;
pub mod server;
pub mod config;

pub use error::{Error, Result};
pub use types::*;
pub use protocol::{parse_command, Command, Response, Value};
pub use request::{NotifyRequest, RegisterRequest, Request};
pub use store::RegistrationStore;
pub use reconcile::{Reconciler, ReconcileOutcome};
pub use provider::{Delivery, NotificationProvider};
pub use notifier::{DeliveryOutcome, DeliveryReport, Notifier};
pub use command_handler::CommandHandler;
pub use dispatcher::Dispatcher;
pub use socket::SocketGuard;
pub use server::RelayServer;
pub use config::Config;
