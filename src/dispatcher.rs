//! Routing of request lines to command handlers
//!
//! Parse errors, unknown commands and invalid arguments all end here as an
//! `ERROR` response; the session carries on with the next line.

use std::sync::Arc;

use crate::command_handler::CommandHandler;
use crate::handlers::{NotifyHandler, RegisterHandler};
use crate::notifier::Notifier;
use crate::protocol::{parse_command, Command, Response};
use crate::provider::NotificationProvider;
use crate::reconcile::Reconciler;
use crate::request::Request;
use crate::store::RegistrationStore;

/// Maps each command to its handler
pub struct Dispatcher {
    register: RegisterHandler,
    notify: NotifyHandler,
}

impl Dispatcher {
    pub fn new(register: RegisterHandler, notify: NotifyHandler) -> Self {
        Self { register, notify }
    }

    /// Wire the default handlers around a store and a provider
    ///
    /// `topic` is returned to devices on successful registration.
    pub fn with_store(
        store: Arc<dyn RegistrationStore>,
        provider: Arc<dyn NotificationProvider>,
        topic: impl Into<String>,
    ) -> Self {
        let reconciler = Arc::new(Reconciler::new(Arc::clone(&store)));
        let notifier = Arc::new(Notifier::new(store, provider));

        Self::new(
            RegisterHandler::new(reconciler, topic),
            NotifyHandler::new(notifier),
        )
    }

    /// Validate and handle a parsed command
    pub async fn dispatch(&self, command: &Command) -> Response {
        match Request::from_command(command) {
            Ok(Request::Register(request)) => {
                log::debug!("Dispatching {}", self.register.command_name());
                self.register.handle(request).await
            }
            Ok(Request::Notify(request)) => {
                log::debug!("Dispatching {}", self.notify.command_name());
                self.notify.handle(request).await
            }
            Err(e) => {
                log::debug!("Rejected {}: {}", command.name, e);
                Response::error(e.to_string())
            }
        }
    }

    /// Parse and handle one request line
    pub async fn dispatch_line(&self, line: &str) -> Response {
        match parse_command(line) {
            Ok(command) => self.dispatch(&command).await,
            Err(e) => {
                log::warn!("Reading from socket: {}", e);
                Response::error(e.to_string())
            }
        }
    }
}
