//! Session management for relay connections
//!
//! One session serves one connected mail server process. Lines are handled
//! strictly in order: the next line is read only after the response to the
//! previous one has been written.

use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;

use crate::connection::Connection;
use crate::dispatcher::Dispatcher;
use crate::error::Result;

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The peer closed the connection
    Eof,
    /// The daemon is shutting down and the session was idle
    Shutdown,
}

pub struct Session<S> {
    connection: Connection<S>,
    dispatcher: Arc<Dispatcher>,
    shutdown: watch::Receiver<bool>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Send,
{
    pub fn new(stream: S, dispatcher: Arc<Dispatcher>, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            connection: Connection::new(stream),
            dispatcher,
            shutdown,
        }
    }

    /// Serve request lines until EOF, a read error or shutdown
    ///
    /// Shutdown only interrupts the wait for the next line; a command that
    /// has been read is always handled and answered.
    pub async fn run(mut self) -> Result<SessionEnd> {
        loop {
            let line = tokio::select! {
                _ = wait_for_shutdown(&mut self.shutdown) => {
                    log::debug!("Closing idle session for shutdown");
                    return Ok(SessionEnd::Shutdown);
                }
                line = self.connection.read_line() => line?,
            };

            let line = match line {
                Some(line) => line,
                None => return Ok(SessionEnd::Eof),
            };
            log::debug!("Received: {}", line);

            let response = self.dispatcher.dispatch_line(&line).await;
            log::debug!("Sending: {}", response.to_string().trim_end());
            self.connection.write_response(&response).await?;
        }
    }
}

/// Resolves once shutdown has been requested
///
/// A dropped sender means nobody can request shutdown any more, so the
/// future then never resolves.
pub(crate) async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
