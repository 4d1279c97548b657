//! REGISTER command handler

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::command_handler::CommandHandler;
use crate::error::Error;
use crate::protocol::Response;
use crate::reconcile::Reconciler;
use crate::request::RegisterRequest;
use crate::types::Namespace;

/// Handler for the REGISTER command
///
/// ```text
/// REGISTER aps-account-id="AAA"  aps-device-token="BBB"
///     aps-subtopic="com.apple.mobilemail"  dovecot-username="user@domain"
///     dovecot-mailboxes=("Inbox","Notes")
/// ```
///
/// Replaces the mailboxes the device is interested in and answers with the
/// APNs topic the device has to listen on.
pub struct RegisterHandler {
    reconciler: Arc<Reconciler>,
    topic: String,
}

impl RegisterHandler {
    pub fn new(reconciler: Arc<Reconciler>, topic: impl Into<String>) -> Self {
        Self {
            reconciler,
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl CommandHandler for RegisterHandler {
    type Request = RegisterRequest;

    fn command_name(&self) -> &'static str {
        "REGISTER"
    }

    async fn handle(&self, request: RegisterRequest) -> Response {
        let namespace = match Namespace::from_username(&request.username) {
            Ok(namespace) => namespace,
            Err(e) => return failure(e),
        };
        let desired: BTreeSet<_> = request.mailboxes.into_iter().collect();

        match self
            .reconciler
            .reconcile(&namespace, &request.account_id, &request.device_token, &desired)
            .await
        {
            Ok(outcome) => {
                log::debug!(
                    "Registered {} for {}: {:?}",
                    request.account_id,
                    namespace,
                    outcome
                );
                Response::ok(self.topic.clone())
            }
            Err(e) => failure(e),
        }
    }
}

fn failure(e: Error) -> Response {
    let message = format!("Failed to register client: {}", e);
    if e.is_store_error() {
        log::warn!("{}", message);
    } else {
        log::error!("{}", message);
    }
    Response::error(message)
}
