//! Single-shot TCP listener and the accepted client connection.
//!
//! The listener hands out exactly one [`ClientConnection`]. Later clients may
//! complete the TCP handshake against the kernel backlog but are never
//! serviced; they observe the socket closing once the listener is dropped.

use std::net::{Shutdown, SocketAddr};

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::{AppError, Result};

/// Bound listening endpoint that accepts a single client.
#[derive(Debug)]
pub struct BridgeListener {
    inner: Option<TcpListener>,
    local_addr: SocketAddr,
    accepted: bool,
}

impl BridgeListener {
    /// Bind the listening socket.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Bind` if the address is invalid or already in use.
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|err| AppError::Bind(format!("failed to bind {addr}: {err}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|err| AppError::Bind(format!("failed to read bound address: {err}")))?;

        info!(%local_addr, port = local_addr.port(), "server listening");

        Ok(Self {
            inner: Some(listener),
            local_addr,
            accepted: false,
        })
    }

    /// Address the socket is bound to, including an OS-assigned port.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether the listener is still open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    /// Wait for the first client to connect.
    ///
    /// Blocks with no timeout. Only the first call can succeed.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the listener is closed, has already handed
    /// out its connection, or the accept call fails.
    pub async fn accept_one(&mut self) -> Result<ClientConnection> {
        if self.accepted {
            return Err(AppError::Io(
                "listener already accepted its connection".into(),
            ));
        }

        let listener = self
            .inner
            .as_ref()
            .ok_or_else(|| AppError::Io("listener is closed".into()))?;

        let (stream, peer) = listener
            .accept()
            .await
            .map_err(|err| AppError::Io(format!("accept failed: {err}")))?;
        self.accepted = true;

        info!(%peer, client = %peer.ip(), "client connected");
        ClientConnection::new(stream, peer)
    }

    /// Close the listening socket. Safe to call more than once.
    pub fn close(&mut self) {
        match self.inner.take() {
            Some(listener) => {
                drop(listener);
                debug!(local_addr = %self.local_addr, "listener closed");
            }
            None => debug!(local_addr = %self.local_addr, "listener already closed"),
        }
    }
}

/// The one accepted client socket.
#[derive(Debug)]
pub struct ClientConnection {
    stream: TcpStream,
    control: std::net::TcpStream,
    peer: SocketAddr,
}

impl ClientConnection {
    fn new(stream: TcpStream, peer: SocketAddr) -> Result<Self> {
        // Keep a duplicate descriptor so the session can tear the socket down
        // after both halves have been handed to the relay tasks.
        let std_stream = stream
            .into_std()
            .map_err(|err| AppError::Io(format!("failed to detach client socket: {err}")))?;
        let control = std_stream
            .try_clone()
            .map_err(|err| AppError::Io(format!("failed to clone client socket: {err}")))?;
        let stream = TcpStream::from_std(std_stream)
            .map_err(|err| AppError::Io(format!("failed to register client socket: {err}")))?;

        Ok(Self {
            stream,
            control,
            peer,
        })
    }

    /// Remote address of the client.
    #[must_use]
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Write the greeting line and flush it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the write fails.
    pub async fn send_banner(&mut self, banner: &str) -> Result<()> {
        self.stream
            .write_all(banner.as_bytes())
            .await
            .map_err(|err| AppError::Io(format!("failed to send banner: {err}")))?;
        self.stream
            .flush()
            .await
            .map_err(|err| AppError::Io(format!("failed to flush banner: {err}")))
    }

    /// Split into the readable half, the writable half, and a close handle.
    ///
    /// The readable half is owned by the client-to-shell relay, the writable
    /// half by the shell-to-client relay, and the handle by the session.
    #[must_use]
    pub fn split(self) -> (OwnedReadHalf, OwnedWriteHalf, ConnectionHandle) {
        let (reader, writer) = self.stream.into_split();
        let handle = ConnectionHandle {
            socket: self.control,
            peer: self.peer,
            closed: false,
        };
        (reader, writer, handle)
    }
}

/// Session-side handle that shuts the client socket down in both directions.
#[derive(Debug)]
pub struct ConnectionHandle {
    socket: std::net::TcpStream,
    peer: SocketAddr,
    closed: bool,
}

impl ConnectionHandle {
    /// Remote address of the client.
    #[must_use]
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Whether [`close`](Self::close) has already run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Shut the socket down in both directions.
    ///
    /// Pending reads and writes in the relay tasks return immediately. A
    /// socket that is already shut down or reset is not an error.
    pub fn close(&mut self) {
        if self.closed {
            debug!(peer = %self.peer, "client connection already closed");
            return;
        }
        self.closed = true;

        match self.socket.shutdown(Shutdown::Both) {
            Ok(()) => debug!(peer = %self.peer, "client connection closed"),
            Err(err) => debug!(peer = %self.peer, %err, "client connection was already down"),
        }
    }
}
