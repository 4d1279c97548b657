//! NOTIFY command handler

use async_trait::async_trait;
use std::sync::Arc;

use crate::command_handler::CommandHandler;
use crate::error::Error;
use crate::notifier::{DeliveryOutcome, Notifier};
use crate::protocol::Response;
use crate::request::NotifyRequest;
use crate::types::Namespace;

/// Handler for the NOTIFY command
///
/// ```text
/// NOTIFY dovecot-username="user@domain"  dovecot-mailbox="Inbox"
/// ```
///
/// Pushes `{"aps":{"account-id":...}}` to every device registered for the
/// mailbox. Delivery failures are logged, not reported to the mail server.
pub struct NotifyHandler {
    notifier: Arc<Notifier>,
}

impl NotifyHandler {
    pub fn new(notifier: Arc<Notifier>) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl CommandHandler for NotifyHandler {
    type Request = NotifyRequest;

    fn command_name(&self) -> &'static str {
        "NOTIFY"
    }

    async fn handle(&self, request: NotifyRequest) -> Response {
        let namespace = match Namespace::from_username(&request.username) {
            Ok(namespace) => namespace,
            Err(e) => return failure(e),
        };

        match self.notifier.notify(&namespace, &request.mailbox).await {
            Ok(reports) => {
                let unregistered = reports
                    .iter()
                    .filter(|r| matches!(r.outcome, DeliveryOutcome::Unregistered { .. }))
                    .count();
                log::debug!(
                    "Notified {} devices for {} in {} ({} unregistered)",
                    reports.len(),
                    request.mailbox,
                    namespace,
                    unregistered
                );
                Response::ok("")
            }
            Err(e) => failure(e),
        }
    }
}

fn failure(e: Error) -> Response {
    let message = format!("Cannot lookup registrations: {}", e);
    if e.is_store_error() {
        log::warn!("{}", message);
    } else {
        log::error!("{}", message);
    }
    Response::error(message)
}
