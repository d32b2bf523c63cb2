//! Interactive client.
//!
//! Two directions run concurrently over one connection:
//! - outbound: forwards non-blank input lines to the server, stopping after
//!   `LOGOUT` or when the input runs out, then closes the write direction
//! - inbound: prints every server line as `Server: <line>` until the server
//!   closes the connection, then tells the outbound direction to stop
//!
//! After the write direction is closed the server gets `close_timeout` to
//! send its last responses and close; after that the inbound direction is
//! stopped as well.
//!
//! `Peer::run` returns once both directions have stopped.

use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::protocol::Verb;
use crate::runtime::{LineChannel, LineReader, LineWriter, MAX_LINE_LENGTH};

pub const BANNER: &str = "Client ready. Enter commands (type 'LOGOUT' to disconnect):";

/// Default wait for the server to close after the client stops sending.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Line counts of a finished client run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PeerSummary {
    pub sent: usize,
    pub received: usize,
}

pub struct Peer<R, W> {
    channel: LineChannel<R, W>,
    close_timeout: Duration,
}

impl Peer<OwnedReadHalf, OwnedWriteHalf> {
    pub async fn connect(host: &str, port: u16) -> io::Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        info!(host, port, "Connected to server");
        Ok(Self::new(LineChannel::from_tcp(stream, MAX_LINE_LENGTH)))
    }
}

impl<R, W> Peer<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(channel: LineChannel<R, W>) -> Self {
        Self {
            channel,
            close_timeout: CLOSE_TIMEOUT,
        }
    }

    /// How long to keep reading after the write direction is closed.
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Run both directions until the connection is torn down.
    ///
    /// Fails only when writing to `output` fails.
    pub async fn run<I, O>(
        self,
        input: I,
        mut output: O,
        shutdown: CancellationToken,
    ) -> io::Result<PeerSummary>
    where
        I: AsyncBufRead + Unpin,
        O: AsyncWrite + Unpin,
    {
        output.write_all(BANNER.as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;

        let close_timeout = self.close_timeout;
        let (reader, writer) = self.channel.split();
        // Cancelled by inbound once the server is gone.
        let teardown = shutdown.child_token();
        // Cancelled by outbound when the server does not close in time.
        let abandon = shutdown.child_token();

        let (sent, received) = tokio::join!(
            async {
                let sent = outbound(input, writer, &teardown).await;
                await_server_close(close_timeout, &teardown, &abandon).await;
                sent
            },
            inbound(reader, output, &abandon, &teardown),
        );

        info!("Connection closed.");
        Ok(PeerSummary {
            sent,
            received: received?,
        })
    }
}

async fn outbound<I, W>(input: I, mut writer: LineWriter<W>, teardown: &CancellationToken) -> usize
where
    I: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut sent = 0;

    loop {
        let line = tokio::select! {
            biased;
            () = teardown.cancelled() => break,
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("Input exhausted");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read input");
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let res = tokio::select! {
            biased;
            () = teardown.cancelled() => break,
            res = writer.write_line(&line) => res,
        };
        if let Err(e) = res {
            warn!(error = %e, "Failed to send command");
            break;
        }
        sent += 1;

        if line.trim().eq_ignore_ascii_case(Verb::Logout.as_str()) {
            info!("Logout command sent, disconnecting...");
            break;
        }
    }

    if let Err(e) = writer.close().await {
        debug!(error = %e, "Error closing connection");
    }
    sent
}

async fn await_server_close(
    timeout: Duration,
    teardown: &CancellationToken,
    abandon: &CancellationToken,
) {
    if tokio::time::timeout(timeout, teardown.cancelled())
        .await
        .is_err()
    {
        warn!(timeout = ?timeout, "Server did not close the connection, disconnecting");
        abandon.cancel();
    }
}

async fn inbound<R, O>(
    mut reader: LineReader<R>,
    mut output: O,
    abandon: &CancellationToken,
    teardown: &CancellationToken,
) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
    O: AsyncWrite + Unpin,
{
    let mut received = 0;

    let result = loop {
        let line = tokio::select! {
            biased;
            () = abandon.cancelled() => break Ok(()),
            line = reader.read_line() => line,
        };

        match line {
            Ok(Some(line)) => {
                if let Err(e) = print_received(&mut output, &line).await {
                    break Err(e);
                }
                received += 1;
            }
            Ok(None) => {
                info!("Server closed the connection.");
                break Ok(());
            }
            Err(e) if e.is_disconnect() => {
                info!("Connection closed by server.");
                break Ok(());
            }
            Err(e) => {
                warn!(error = %e, "Error reading server responses");
                break Ok(());
            }
        }
    };

    teardown.cancel();
    result.map(|()| received)
}

async fn print_received<O: AsyncWrite + Unpin>(output: &mut O, line: &str) -> io::Result<()> {
    output
        .write_all(format!("Server: {line}\n").as_bytes())
        .await?;
    output.flush().await
}
