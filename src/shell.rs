//! Shell process launcher.
//!
//! Spawns the configured shell with:
//! - a piped `stdin` that the client-to-shell relay writes into;
//! - `stdout` and `stderr` both attached to the write end of one OS pipe, so
//!   output and errors reach the client interleaved in emission order;
//! - `kill_on_drop(true)` so an abandoned session never leaks the shell.

use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, ChildStdin, Command};
use tracing::info;

use crate::config::BridgeConfig;
use crate::{AppError, Result};

/// Readable end of the shell's merged `stdout`/`stderr` stream.
#[cfg(unix)]
pub type ShellOutput = tokio::net::unix::pipe::Receiver;

/// Readable end of the shell's `stdout` stream.
///
/// Without unix pipes `stderr` is inherited from the bridge instead of merged.
#[cfg(not(unix))]
pub type ShellOutput = tokio::process::ChildStdout;

/// A running shell and the two stream endpoints the relays take over.
#[derive(Debug)]
pub struct ShellProcess {
    program: String,
    child: Child,
    stdin: Option<ChildStdin>,
    output: Option<ShellOutput>,
}

impl ShellProcess {
    /// Program path the process was started from.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// OS process id, if the process has not been reaped yet.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Hand the shell's `stdin` to its writer.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Spawn` if the stream was already taken.
    pub fn take_stdin(&mut self) -> Result<ChildStdin> {
        self.stdin
            .take()
            .ok_or_else(|| AppError::Spawn("shell stdin already taken".into()))
    }

    /// Hand the shell's merged output to its reader.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Spawn` if the stream was already taken.
    pub fn take_output(&mut self) -> Result<ShellOutput> {
        self.output
            .take()
            .ok_or_else(|| AppError::Spawn("shell output already taken".into()))
    }

    /// Wait for the shell to exit.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the OS wait call fails.
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        self.child
            .wait()
            .await
            .map_err(|err| AppError::Io(format!("failed to wait for shell: {err}")))
    }
}

/// Start the configured shell.
///
/// # Errors
///
/// Returns `AppError::Spawn` if the output pipe cannot be created, the
/// program cannot be started, or its `stdin` cannot be captured.
pub fn spawn_shell(config: &BridgeConfig) -> Result<ShellProcess> {
    let mut cmd = Command::new(&config.shell);
    cmd.args(&config.shell_args)
        .stdin(Stdio::piped())
        .kill_on_drop(true);

    let output = attach_output(&mut cmd, config)?;

    let mut child = cmd
        .spawn()
        .map_err(|err| AppError::Spawn(format!("failed to start {}: {err}", config.shell)))?;

    // The command still holds the parent's copies of the pipe's write end;
    // the reader only sees EOF once those are gone too.
    drop(cmd);

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture shell stdin".into()))?;

    let output = finish_output(output, &mut child)?;

    info!(shell = %config.shell, pid = ?child.id(), "shell process started");

    Ok(ShellProcess {
        program: config.shell.clone(),
        child,
        stdin: Some(stdin),
        output: Some(output),
    })
}

#[cfg(unix)]
fn attach_output(cmd: &mut Command, config: &BridgeConfig) -> Result<std::io::PipeReader> {
    let (reader, writer) = std::io::pipe()
        .map_err(|err| AppError::Spawn(format!("failed to create output pipe: {err}")))?;
    let error_writer = writer
        .try_clone()
        .map_err(|err| AppError::Spawn(format!("failed to clone output pipe: {err}")))?;

    tracing::debug!(shell = %config.shell, "merging shell stderr into stdout");
    cmd.stdout(writer).stderr(error_writer);
    Ok(reader)
}

#[cfg(unix)]
fn finish_output(reader: std::io::PipeReader, _child: &mut Child) -> Result<ShellOutput> {
    let fd = std::os::fd::OwnedFd::from(reader);
    tokio::net::unix::pipe::Receiver::from_owned_fd(fd)
        .map_err(|err| AppError::Spawn(format!("failed to register output pipe: {err}")))
}

#[cfg(not(unix))]
fn attach_output(cmd: &mut Command, config: &BridgeConfig) -> Result<()> {
    tracing::warn!(shell = %config.shell, "stderr merging unsupported here, inheriting stderr");
    cmd.stdout(Stdio::piped()).stderr(Stdio::inherit());
    Ok(())
}

#[cfg(not(unix))]
fn finish_output((): (), child: &mut Child) -> Result<ShellOutput> {
    child
        .stdout
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture shell stdout".into()))
}

/// Human-readable description of how the shell ended.
#[must_use]
pub fn describe_exit(code: Option<i32>) -> String {
    code.map_or_else(
        || "process terminated by signal".to_owned(),
        |c| format!("process exited with code {c}"),
    )
}
