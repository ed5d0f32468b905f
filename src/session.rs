//! Lifecycle coordinator for the single bridge session.
//!
//! The session moves strictly forward through
//! `Idle → Listening → Connected → Running → ShellExited → Closed`.
//!
//! Once both relays are spawned the coordinator waits on the shell process
//! and nothing else. Shell exit is the end-of-life signal: the client socket
//! and listener are then closed whether or not the relays have drained. The
//! relay tasks are never joined here; closing the socket is what unblocks a
//! relay still parked on a read.
//!
//! The socket is shut down as soon as `wait()` returns, so shell output still
//! sitting in the pipe at that moment can lose the race and never reach the
//! client.

use std::net::SocketAddr;

use tracing::{error, info, warn};

use crate::config::BridgeConfig;
use crate::listener::BridgeListener;
use crate::relay::{spawn_relay, Direction};
use crate::shell::{describe_exit, spawn_shell};
use crate::Result;

/// Session lifecycle stage.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum SessionState {
    /// Nothing bound yet.
    Idle,
    /// Listener bound, waiting for the client.
    Listening,
    /// Client accepted, shell not yet relayed.
    Connected,
    /// Both relays running.
    Running,
    /// Shell has exited; resources not yet released.
    ShellExited,
    /// Connection and listener released. Terminal.
    Closed,
}

/// Summary of a finished session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    /// Address of the client that was served.
    pub peer: SocketAddr,
    /// Shell exit code, `None` if it was killed by a signal.
    pub exit_code: Option<i32>,
    /// Human-readable description of the exit.
    pub exit_reason: String,
}

/// One bridge run: bind, serve a single client, shut down.
#[derive(Debug)]
pub struct Session {
    config: BridgeConfig,
    state: SessionState,
}

impl Session {
    /// Create an idle session.
    #[must_use]
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            state: SessionState::Idle,
        }
    }

    /// Current lifecycle stage.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Bind the configured address.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Bind` if the socket cannot be bound.
    pub async fn bind(&mut self) -> Result<BridgeListener> {
        let listener = BridgeListener::bind(&self.config.bind_addr()).await?;
        self.advance(SessionState::Listening);
        Ok(listener)
    }

    /// Bind, then serve exactly one client until the shell exits.
    ///
    /// # Errors
    ///
    /// Returns the first fatal startup error (bind, accept, spawn).
    pub async fn run(&mut self) -> Result<SessionReport> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Serve exactly one client on an already bound listener.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if accepting fails or the shell cannot be
    /// waited on, and `AppError::Spawn` if the shell cannot be started.
    /// Relay failures are never returned.
    pub async fn serve(&mut self, mut listener: BridgeListener) -> Result<SessionReport> {
        self.advance(SessionState::Listening);

        let mut connection = listener.accept_one().await?;
        let peer = connection.peer_addr();
        self.advance(SessionState::Connected);

        let mut shell = spawn_shell(&self.config).map_err(|err| {
            error!(%err, %peer, "failed to start shell");
            err
        })?;
        let shell_stdin = shell.take_stdin()?;
        let shell_output = shell.take_output()?;

        if let Err(err) = connection.send_banner(&self.config.banner_line()).await {
            warn!(%err, %peer, "failed to greet client");
        }

        let (client_reader, client_writer, mut handle) = connection.split();

        // Never awaited: the session only ever waits on the shell itself.
        let _inbound = spawn_relay(Direction::ClientToShell, client_reader, shell_stdin);
        let _outbound = spawn_relay(Direction::ShellToClient, shell_output, client_writer);
        self.advance(SessionState::Running);

        let status = shell.wait().await;
        self.advance(SessionState::ShellExited);

        handle.close();
        listener.close();
        self.advance(SessionState::Closed);

        let status = status?;
        let exit_code = status.code();
        let exit_reason = describe_exit(exit_code);
        info!(%peer, ?exit_code, reason = %exit_reason, "shell process exited");

        Ok(SessionReport {
            peer,
            exit_code,
            exit_reason,
        })
    }

    fn advance(&mut self, next: SessionState) {
        if next <= self.state {
            return;
        }
        info!(from = ?self.state, to = ?next, "session state changed");
        self.state = next;
    }
}
