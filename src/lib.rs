//! qssh: named SSH hosts, interactive shells and deploys.
//!
//! - [`directory`]: the `alias username@address[:port]` host directory
//! - [`shell`]: the interactive session controller and its transport seams
//! - [`client`]: the russh-backed transport
//! - [`sequencer`]: copy and backup-then-upload deploys over `scp`/`ssh`
//! - [`cli`]: command table and dispatch

pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod directory;
pub mod error;
pub mod sequencer;
pub mod session;
pub mod shell;
pub mod terminal;
pub mod types;

pub use error::{QsshError, Result};
