//! Shared value types for the host directory, sessions and remote operations.
//!
//! These types carry no behaviour beyond formatting helpers. A `HostDescriptor`
//! is built fresh from the directory on every lookup and never mutated.

use std::fmt;
use std::str::FromStr;

use russh::Pty;

/// Default SSH port used when a directory entry omits `:port`
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Terminal type announced to the remote PTY
pub const DEFAULT_TERM: &str = "xterm-256color";

/// Baud-rate hint sent for both input and output speed
pub const TTY_SPEED_HINT: u32 = 14400;

/// Resolved connection parameters for an alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostDescriptor {
    pub username: String,
    /// Hostname or IP address
    pub address: String,
    pub port: u16,
}

impl HostDescriptor {
    pub fn new(username: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            username: username.into(),
            address: address.into(),
            port,
        }
    }

    /// `username@address`, the login form understood by `ssh`.
    pub fn login(&self) -> String {
        format!("{}@{}", self.username, self.address)
    }

    /// `username@address:path`, the remote form understood by `scp`.
    pub fn remote_spec(&self, path: &str) -> String {
        format!("{}@{}:{}", self.username, self.address, path)
    }
}

impl fmt::Display for HostDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.username, self.address, self.port)
    }
}

/// How the server's host key is checked during the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostKeyPolicy {
    /// Accept and record unknown hosts, reject changed keys
    #[default]
    TrustOnFirstUse,
    /// Accept only keys already present in known_hosts
    PinnedKnownHosts,
    /// Accept every key without verification
    AcceptAny,
}

impl HostKeyPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostKeyPolicy::TrustOnFirstUse => "tofu",
            HostKeyPolicy::PinnedKnownHosts => "pinned",
            HostKeyPolicy::AcceptAny => "accept-any",
        }
    }
}

impl FromStr for HostKeyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tofu" | "trust-on-first-use" => Ok(HostKeyPolicy::TrustOnFirstUse),
            "pinned" | "known-hosts" => Ok(HostKeyPolicy::PinnedKnownHosts),
            "accept-any" | "insecure" => Ok(HostKeyPolicy::AcceptAny),
            other => Err(format!(
                "unknown host key policy '{}' (expected tofu, pinned or accept-any)",
                other
            )),
        }
    }
}

impl fmt::Display for HostKeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote pseudo-terminal parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtyRequest {
    pub term: String,
    pub cols: u32,
    pub rows: u32,
    pub modes: Vec<(Pty, u32)>,
}

impl PtyRequest {
    /// PTY request for a local terminal of the given size: echo on and
    /// symmetric speed hints.
    pub fn for_size(cols: u16, rows: u16) -> Self {
        Self {
            term: DEFAULT_TERM.to_string(),
            cols: u32::from(cols),
            rows: u32::from(rows),
            modes: vec![
                (Pty::ECHO, 1),
                (Pty::TTY_OP_ISPEED, TTY_SPEED_HINT),
                (Pty::TTY_OP_OSPEED, TTY_SPEED_HINT),
            ],
        }
    }
}

/// Captured result of a finished subprocess.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessOutput {
    /// Exit code, `None` when terminated by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}
