//! Relay engine: unidirectional byte pumps between the client socket and the
//! shell's pipes.
//!
//! Every pump follows the writer-owns-close rule. The sink is taken by value
//! and shut down when the pump ends. The source is only borrowed, so the
//! pump never closes the stream it reads from; that stream belongs to
//! whoever produces into it.
//!
//! Each chunk is flushed as soon as it is written. Keystrokes and prompts
//! must not sit in a buffer waiting for a newline.

use std::fmt::{Display, Formatter};
use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};

/// Size of the per-pump transfer buffer.
pub const TRANSFER_BUFFER_SIZE: usize = 1024;

/// Which way a relay pump moves bytes.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Direction {
    /// Client socket to shell `stdin`.
    ClientToShell,
    /// Shell merged output to client socket.
    ShellToClient,
}

impl Direction {
    /// Short label used in log fields.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::ClientToShell => "client->shell",
            Self::ShellToClient => "shell->client",
        }
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Why a pump stopped.
#[derive(Debug)]
pub enum RelayEnd {
    /// The source reached end-of-stream.
    SourceClosed,
    /// Reading from the source failed.
    ReadFailed(io::Error),
    /// Writing or flushing the sink failed.
    WriteFailed(io::Error),
}

impl RelayEnd {
    /// `true` when the pump ended on plain end-of-stream.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::SourceClosed)
    }
}

/// Result of one finished pump.
#[derive(Debug)]
pub struct RelayOutcome {
    /// Direction the pump was moving bytes.
    pub direction: Direction,
    /// Total bytes written to the sink.
    pub bytes: usize,
    /// End condition.
    pub end: RelayEnd,
    /// Error raised while shutting the sink down, if any.
    pub close_error: Option<io::Error>,
}

/// Copy `source` into `sink` until end-of-stream or an I/O error, then shut
/// `sink` down.
///
/// Errors never escape: they become the pump's end condition and are logged.
pub async fn pump<R, W>(direction: Direction, source: &mut R, mut sink: W) -> RelayOutcome
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin,
{
    let mut buf = [0_u8; TRANSFER_BUFFER_SIZE];
    let mut bytes = 0_usize;

    let end = loop {
        let n = match source.read(&mut buf).await {
            Ok(0) => break RelayEnd::SourceClosed,
            Ok(n) => n,
            Err(err) => break RelayEnd::ReadFailed(err),
        };

        if let Err(err) = write_chunk(&mut sink, &buf[..n]).await {
            break RelayEnd::WriteFailed(err);
        }
        bytes = bytes.saturating_add(n);
    };

    match &end {
        RelayEnd::SourceClosed => debug!(%direction, bytes, "relay source reached end of stream"),
        RelayEnd::ReadFailed(err) | RelayEnd::WriteFailed(err) => {
            warn!(%direction, bytes, %err, "error in {direction} communication");
        }
    }

    let close_error = close_sink(direction, sink).await;

    RelayOutcome {
        direction,
        bytes,
        end,
        close_error,
    }
}

async fn write_chunk<W>(sink: &mut W, chunk: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    sink.write_all(chunk).await?;
    sink.flush().await
}

async fn close_sink<W>(direction: Direction, mut sink: W) -> Option<io::Error>
where
    W: AsyncWrite + Unpin,
{
    let result = sink.shutdown().await;
    drop(sink);

    match result {
        Ok(()) => {
            debug!(%direction, "relay sink closed");
            None
        }
        Err(err) => {
            warn!(%direction, %err, "error closing {direction} sink");
            Some(err)
        }
    }
}

/// Run [`pump`] on its own task.
///
/// The returned handle may be dropped; the task keeps running until its
/// source ends or the runtime shuts down.
#[must_use]
pub fn spawn_relay<R, W>(direction: Direction, source: R, sink: W) -> JoinHandle<RelayOutcome>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let span = info_span!("relay", direction = direction.label());
    tokio::spawn(
        async move {
            let mut source = source;
            let outcome = pump(direction, &mut source, sink).await;
            info!(bytes = outcome.bytes, clean = outcome.end.is_clean(), "relay finished");
            outcome
        }
        .instrument(span),
    )
}
