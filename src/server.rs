//! TCP server for command connections.
//!
//! Accepts incoming connections and runs one [`Session`] per connection on
//! its own task. Sessions share nothing but the stateless dispatcher.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{AcquireError, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::ServerSettings;
use crate::protocol::Dispatcher;
use crate::runtime::{CloseReason, LineChannel, Session, MAX_LINE_LENGTH};

/// Pause after a transient accept failure such as descriptor exhaustion.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Pending connection queue length passed to `listen(2)`.
const LISTEN_BACKLOG: i32 = 1024;

/// How long live sessions get to wind down after the accept loop stops.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("listener failed: {0}")]
    Accept(#[source] io::Error),

    #[error("connection limiter closed: {0}")]
    Limiter(#[from] AcquireError),
}

/// Server instance
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    dispatcher: Dispatcher,
    connection_limit: Arc<Semaphore>,
    idle_timeout: Option<Duration>,
}

impl Server {
    /// Bind the listening socket. Must be called from within a tokio runtime.
    pub fn bind(settings: &ServerSettings, dispatcher: Dispatcher) -> Result<Self, ServerError> {
        let bind_error = |source: io::Error| ServerError::Bind {
            addr: settings.listen.clone(),
            source,
        };

        let addr: SocketAddr = settings
            .listen
            .parse()
            .map_err(|e| bind_error(io::Error::new(io::ErrorKind::InvalidInput, e)))?;
        let listener = create_listener(addr, LISTEN_BACKLOG).map_err(bind_error)?;
        let listener = TcpListener::from_std(listener).map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        Ok(Server {
            listener,
            local_addr,
            dispatcher,
            connection_limit: Arc::new(Semaphore::new(settings.max_connections)),
            idle_timeout: settings.idle_timeout,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until `shutdown` fires or the listener fails.
    ///
    /// Live sessions are cancelled and awaited before this returns.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), ServerError> {
        info!(address = %self.local_addr, "Server listening");

        let sessions_token = shutdown.child_token();
        let mut sessions: JoinSet<CloseReason> = JoinSet::new();
        let mut next_id: u64 = 0;

        let result = loop {
            // Wait for a connection slot
            let permit = tokio::select! {
                biased;
                () = shutdown.cancelled() => break Ok(()),
                permit = self.connection_limit.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(e) => break Err(ServerError::from(e)),
                },
            };

            tokio::select! {
                biased;

                () = shutdown.cancelled() => break Ok(()),

                Some(res) = sessions.join_next() => {
                    drop(permit);
                    report_session(res);
                }

                res = self.listener.accept() => match res {
                    Ok((stream, peer)) => {
                        next_id = next_id.wrapping_add(1);
                        info!(peer = %peer, id = next_id, "Client connected");

                        if let Err(e) = stream.set_nodelay(true) {
                            debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
                        }

                        let channel = LineChannel::from_tcp(stream, MAX_LINE_LENGTH);
                        let session = Session::new(
                            channel,
                            self.dispatcher.clone(),
                            sessions_token.child_token(),
                        )
                        .with_idle_timeout(self.idle_timeout);

                        sessions.spawn(
                            async move {
                                let reason = session.run().await;
                                drop(permit);
                                reason
                            }
                            .instrument(info_span!("session", id = next_id, peer = %peer)),
                        );
                    }
                    Err(e) if is_transient(&e) => {
                        warn!(error = %e, "Failed to accept connection");
                        drop(permit);
                        tokio::select! {
                            () = shutdown.cancelled() => {}
                            () = tokio::time::sleep(ACCEPT_BACKOFF) => {}
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Listener failed, no longer accepting connections");
                        break Err(ServerError::Accept(e));
                    }
                },
            }
        };

        sessions_token.cancel();
        if !sessions.is_empty() {
            info!(count = sessions.len(), "Closing live sessions");
        }
        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while let Some(res) = sessions.join_next().await {
                report_session(res);
            }
        })
        .await;
        if drained.is_err() {
            warn!("Timed out waiting for sessions to close, aborting them");
            sessions.shutdown().await;
        }

        info!("Server stopped");
        result
    }
}

fn report_session(res: Result<CloseReason, tokio::task::JoinError>) {
    match res {
        Ok(reason) => debug!(reason = %reason, "Session finished"),
        Err(e) if e.is_panic() => error!(error = ?e, "Session panicked"),
        Err(e) => debug!(error = %e, "Session aborted"),
    }
}

/// Accept errors that concern a single connection or a temporary resource
/// shortage rather than the listener itself.
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    ) || matches!(
        e.raw_os_error(),
        Some(libc::EMFILE) | Some(libc::ENFILE) | Some(libc::ENOMEM)
    )
}

/// Create a non-blocking TCP listener with SO_REUSEADDR.
fn create_listener(addr: SocketAddr, backlog: i32) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;

    Ok(socket.into())
}
