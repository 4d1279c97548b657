//! Command handler trait for relay commands

use async_trait::async_trait;
use crate::protocol::Response;

/// Trait for handling one kind of validated request
///
/// Handlers never fail: every error is turned into an `ERROR` response so
/// the connection can carry on with the next line.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// The typed request this handler processes
    type Request: Send + 'static;

    /// The command name on the wire (e.g. "REGISTER")
    fn command_name(&self) -> &'static str;

    /// Handle the request and return the response line
    async fn handle(&self, request: Self::Request) -> Response;
}
