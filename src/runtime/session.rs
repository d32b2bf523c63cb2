//! Per-connection session state machine.
//!
//! ```text
//! Active --(end of stream | LOGOUT | transport error)--> Closing --> Closed
//! ```
//!
//! `serve` is the `Active` loop: read one line, dispatch it, write the
//! response, and only then read the next line. `close` is `Closing`: it
//! releases the channel and reports why. `Session::run` consumes the
//! session, so once it returns the [`CloseReason`] the session is `Closed`
//! and nothing can use it again.

use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::channel::LineChannel;
use crate::error::TransportError;
use crate::protocol::Dispatcher;

/// Upper bound on flushing and shutting down a channel while closing.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Why a session ended.
#[derive(Debug)]
pub enum CloseReason {
    /// The peer closed its side of the connection.
    PeerClosed,
    /// The peer sent `LOGOUT`.
    Logout,
    /// Read or write failed, timed out, or was cancelled by shutdown.
    Transport(TransportError),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::PeerClosed => f.write_str("peer closed"),
            CloseReason::Logout => f.write_str("logout"),
            CloseReason::Transport(e) => write!(f, "transport error: {e}"),
        }
    }
}

/// One connection's read-dispatch-write loop.
pub struct Session<R, W> {
    channel: LineChannel<R, W>,
    dispatcher: Dispatcher,
    shutdown: CancellationToken,
    idle_timeout: Option<Duration>,
}

impl<R, W> Session<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(
        channel: LineChannel<R, W>,
        dispatcher: Dispatcher,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            channel,
            dispatcher,
            shutdown,
            idle_timeout: None,
        }
    }

    /// Close the session when no line arrives within `timeout`.
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Drive the session until it is closed.
    pub async fn run(self) -> CloseReason {
        let Session {
            mut channel,
            dispatcher,
            shutdown,
            idle_timeout,
        } = self;

        let mut commands = 0u64;
        let reason = match serve(
            &mut channel,
            &dispatcher,
            &shutdown,
            idle_timeout,
            &mut commands,
        )
        .await
        {
            Ok(reason) => reason,
            Err(e) => CloseReason::Transport(e),
        };

        debug!(reason = %reason, "Session closing");
        close(channel, &reason, commands).await;
        reason
    }
}

async fn serve<R, W>(
    channel: &mut LineChannel<R, W>,
    dispatcher: &Dispatcher,
    shutdown: &CancellationToken,
    idle_timeout: Option<Duration>,
    commands: &mut u64,
) -> Result<CloseReason, TransportError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let line = tokio::select! {
            biased;
            () = shutdown.cancelled() => return Err(TransportError::Cancelled),
            line = next_line(channel, idle_timeout) => line?,
        };

        let Some(line) = line else {
            return Ok(CloseReason::PeerClosed);
        };

        debug!(command = %line, "Received command");
        let response = dispatcher.dispatch(&line, shutdown).await;
        let text = response.to_string();
        *commands += 1;

        tokio::select! {
            biased;
            () = shutdown.cancelled() => return Err(TransportError::Cancelled),
            res = channel.write_line(&text) => res?,
        }
        debug!(response = %text, "Sent response");

        if response.terminates() {
            return Ok(CloseReason::Logout);
        }
    }
}

async fn next_line<R, W>(
    channel: &mut LineChannel<R, W>,
    idle_timeout: Option<Duration>,
) -> Result<Option<String>, TransportError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, channel.read_line())
            .await
            .map_err(|_| TransportError::IdleTimeout(limit))?,
        None => channel.read_line().await,
    }
}

async fn close<R, W>(channel: LineChannel<R, W>, reason: &CloseReason, commands: u64)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match reason {
        // The stream is broken or abandoned; dropping it releases both halves.
        CloseReason::Transport(_) => drop(channel),
        _ => match tokio::time::timeout(CLOSE_TIMEOUT, channel.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "Error while closing connection"),
            Err(_) => debug!("Timed out closing connection"),
        },
    }

    match reason {
        CloseReason::PeerClosed => info!(commands, "Client disconnected"),
        CloseReason::Logout => info!(commands, "Client logged out"),
        CloseReason::Transport(TransportError::Cancelled) => {
            info!(commands, "Session cancelled by shutdown")
        }
        CloseReason::Transport(e) if e.is_disconnect() => {
            info!(commands, error = %e, "Client disconnected unexpectedly")
        }
        CloseReason::Transport(e) => {
            warn!(commands, error = %e, "Session terminated by transport error")
        }
    }
}
