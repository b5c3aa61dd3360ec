//! Error type shared by every layer of qssh.
//!
//! Lower layers never terminate the process. Each failure is returned as a
//! [`QsshError`] whose message names the step that failed, and `main` decides
//! how to report it.
//!
//! # Categories
//!
//! - **Resolution**: unknown alias, malformed directory entry
//! - **Credential**: private key unreadable or unparsable
//! - **Transport**: connect, authentication and channel failures
//! - **Terminal**: raw mode switch or size query failures
//! - **Subprocess**: copy/backup tools that could not start or exited non-zero

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = QsshError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum QsshError {
    #[error("unknown host {0}")]
    UnknownHost(String),

    #[error("malformed entry for {alias}: '{target}' ({reason})")]
    MalformedEntry {
        alias: String,
        target: String,
        reason: String,
    },

    #[error("cannot write host directory {}: {source}", .path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot locate home directory")]
    HomeDirUnavailable,

    #[error("cannot read/parse private key {}: {message}", .path.display())]
    Credential { path: PathBuf, message: String },

    #[error("failed to connect to {address}: {message}")]
    Connect { address: String, message: String },

    #[error("authentication failed for {login}: {message}")]
    Authentication { login: String, message: String },

    #[error("failed to open session channel: {0}")]
    Channel(String),

    #[error("terminal {step} failed: {source}")]
    Terminal {
        step: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("pty request failed: {0}")]
    Pty(String),

    #[error("remote shell failed: {0}")]
    Shell(String),

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{step} failed: {program} exited with {}{}", describe_code(.code), describe_stderr(.stderr))]
    CommandFailed {
        step: &'static str,
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("invalid remote path '{0}'")]
    InvalidRemotePath(String),
}

impl QsshError {
    /// Short label of the step that failed, used as a log field.
    pub fn step(&self) -> &'static str {
        match self {
            QsshError::UnknownHost(_) | QsshError::MalformedEntry { .. } => "resolve",
            QsshError::Directory { .. } => "append",
            QsshError::HomeDirUnavailable => "config",
            QsshError::Credential { .. } => "credential",
            QsshError::Connect { .. } => "connect",
            QsshError::Authentication { .. } => "authenticate",
            QsshError::Channel(_) => "channel",
            QsshError::Terminal { step, .. } => *step,
            QsshError::Pty(_) => "pty",
            QsshError::Shell(_) => "shell",
            QsshError::Spawn { .. } => "spawn",
            QsshError::CommandFailed { step, .. } => *step,
            QsshError::InvalidRemotePath(_) => "deploy",
        }
    }
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "signal".to_string(),
    }
}

fn describe_stderr(stderr: &str) -> String {
    let trimmed = stderr.trim();
    match trimmed.lines().last() {
        Some(line) if !line.is_empty() => format!(": {}", line),
        _ => String::new(),
    }
}
