//! Bridge configuration: TOML file parsing, validation, and the lenient
//! positional port override.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Port the bridge listens on when none is configured.
pub const DEFAULT_PORT: u16 = 9933;

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

#[cfg(unix)]
fn default_shell() -> String {
    "/bin/sh".into()
}

#[cfg(not(unix))]
fn default_shell() -> String {
    "cmd.exe".into()
}

/// Bridge configuration, optionally parsed from a TOML file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct BridgeConfig {
    /// Interface address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// TCP port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Shell program spawned for the client.
    #[serde(default = "default_shell")]
    pub shell: String,
    /// Extra arguments passed to the shell.
    #[serde(default)]
    pub shell_args: Vec<String>,
    /// Replacement for the greeting line sent to the client.
    #[serde(default)]
    pub banner: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shell: default_shell(),
            shell_args: Vec::new(),
            banner: None,
        }
    }
}

impl BridgeConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read, contains
    /// invalid TOML, or fails validation.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// `host:port` string handed to the listener.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Greeting line written to the client before any shell output.
    ///
    /// Always terminated by a single `\n`.
    #[must_use]
    pub fn banner_line(&self) -> String {
        let mut line = self.banner.clone().unwrap_or_else(|| {
            format!(
                "Connected to shell bridge. Commands will be forwarded to {}",
                self.shell
            )
        });
        if !line.ends_with('\n') {
            line.push('\n');
        }
        line
    }

    fn validate(&self) -> Result<()> {
        if self.shell.trim().is_empty() {
            return Err(AppError::Config("shell must not be empty".into()));
        }

        if self.host.trim().is_empty() {
            return Err(AppError::Config("host must not be empty".into()));
        }

        Ok(())
    }
}

/// Resolve the listen port from the optional positional argument.
///
/// The argument is parsed as given, without trimming. Text that is not an
/// integer is ignored with a warning and `fallback` is returned instead.
/// An integer outside the TCP port range cannot be bound and is fatal.
///
/// # Errors
///
/// Returns `AppError::Bind` if the argument is an integer outside
/// `0..=65535`.
pub fn resolve_port(arg: Option<&str>, fallback: u16) -> Result<u16> {
    let Some(raw) = arg else {
        return Ok(fallback);
    };

    match raw.parse::<i64>() {
        Ok(value) => u16::try_from(value)
            .map_err(|_| AppError::Bind(format!("port out of range: {value}"))),
        Err(err) => {
            warn!(value = raw, %err, fallback, "invalid port number, using default");
            Ok(fallback)
        }
    }
}
