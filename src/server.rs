//! Relay server accept loop

use std::path::Path;
use std::sync::Arc;
use tokio::net::UnixListener;
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinError, JoinSet};

use crate::dispatcher::Dispatcher;
use crate::error::{Error, Result};
use crate::session::{wait_for_shutdown, Session, SessionEnd};
use crate::socket::SocketGuard;

/// Accepts mail server connections and runs one session per connection
pub struct RelayServer {
    dispatcher: Arc<Dispatcher>,
    max_connections: usize,
}

impl RelayServer {
    pub fn new(dispatcher: Arc<Dispatcher>, max_connections: usize) -> Self {
        Self {
            dispatcher,
            max_connections,
        }
    }

    /// Bind the socket at `path` and serve until shutdown
    ///
    /// The socket file is removed once every session has finished.
    pub async fn listen<P: AsRef<Path>>(
        &self,
        path: P,
        mode: u32,
        shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let (guard, listener) = SocketGuard::bind(path, mode)?;
        log::info!("Relay listening on {}", guard.path().display());
        self.serve(listener, shutdown).await
    }

    /// Serve connections from `listener` until shutdown is requested
    ///
    /// At most `max_connections` sessions are open at once; further clients
    /// wait in the listen backlog. On shutdown the listener is closed, idle
    /// sessions end, and sessions in the middle of a command answer it
    /// before this returns. An accept failure outside of shutdown is
    /// returned as an error.
    pub async fn serve(&self, listener: UnixListener, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let permits = Arc::new(Semaphore::new(self.max_connections));
        let mut sessions = JoinSet::new();

        'accept: loop {
            let permit = tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break 'accept,
                permit = Arc::clone(&permits).acquire_owned() => {
                    permit.map_err(|e| Error::Internal(e.to_string()))?
                }
            };

            let stream = loop {
                tokio::select! {
                    _ = wait_for_shutdown(&mut shutdown) => break 'accept,
                    Some(joined) = sessions.join_next() => reap(joined),
                    accepted = listener.accept() => match accepted {
                        Ok((stream, _addr)) => break stream,
                        Err(_) if *shutdown.borrow() => break 'accept,
                        Err(e) => {
                            log::error!("Accept failed: {}", e);
                            return Err(e.into());
                        }
                    },
                }
            };
            log::debug!("Accepted connection");

            let session = Session::new(stream, Arc::clone(&self.dispatcher), shutdown.clone());
            sessions.spawn(async move {
                let _permit = permit;
                session.run().await
            });
        }

        drop(listener);
        log::info!("Waiting for {} sessions to finish", sessions.len());
        while let Some(joined) = sessions.join_next().await {
            reap(joined);
        }
        Ok(())
    }
}

fn reap(joined: std::result::Result<Result<SessionEnd>, JoinError>) {
    match joined {
        Ok(Ok(end)) => log::debug!("Session closed: {:?}", end),
        Ok(Err(e)) => log::error!("Session error: {}", e),
        Err(e) => log::error!("Session task failed: {}", e),
    }
}
