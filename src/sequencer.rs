//! Remote operation sequencer.
//!
//! Runs multi-step remote file operations through external tools:
//!
//! - `transfer`: recursive copy with `scp`
//! - `deploy`: archive-and-clear the remote target over `ssh`, then `transfer`
//!
//! Steps run strictly one after another and the first failure aborts the
//! rest. A deploy whose backup fails never starts its transfer.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use tracing::{debug, info};

use crate::error::{QsshError, Result};
use crate::types::{HostDescriptor, ProcessOutput};

/// Program used for recursive copies
pub const DEFAULT_COPY_PROGRAM: &str = "scp";

/// Program used to run the backup command remotely
pub const DEFAULT_SHELL_PROGRAM: &str = "ssh";

/// Timestamp format embedded in backup archive names
pub const ARCHIVE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d~%H-%M-%S";

/// Runs an external program to completion, capturing its output.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> Result<ProcessOutput>;
}

/// Runner spawning real subprocesses with tokio.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<ProcessOutput> {
        debug!("Running {} {:?}", program, args);
        let output = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| QsshError::Spawn {
                program: program.to_string(),
                source,
            })?;

        Ok(ProcessOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Composes ordered remote operations over a [`ProcessRunner`].
pub struct Sequencer<R> {
    runner: R,
    copy_program: String,
    shell_program: String,
    identity: Option<PathBuf>,
}

impl<R: ProcessRunner> Sequencer<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            copy_program: DEFAULT_COPY_PROGRAM.to_string(),
            shell_program: DEFAULT_SHELL_PROGRAM.to_string(),
            identity: None,
        }
    }

    /// Authenticate `scp` and `ssh` with this private key instead of their
    /// own defaults.
    pub fn with_identity(mut self, identity: impl Into<PathBuf>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Recursively copy `local_path` to `remote_path` on `host`.
    pub async fn transfer(
        &self,
        host: &HostDescriptor,
        local_path: &str,
        remote_path: &str,
    ) -> Result<()> {
        let args = transfer_args(host, self.identity.as_deref(), local_path, remote_path);
        info!("Copying {} to {}", local_path, host.remote_spec(remote_path));
        self.run_step("transfer", &self.copy_program, &args).await
    }

    /// Back up and clear `remote_path`, then upload `local_path` in its place.
    pub async fn deploy(
        &self,
        host: &HostDescriptor,
        local_path: &str,
        remote_path: &str,
    ) -> Result<()> {
        self.deploy_at(host, local_path, remote_path, Local::now())
            .await
    }

    /// [`Sequencer::deploy`] with an explicit archive timestamp.
    pub async fn deploy_at(
        &self,
        host: &HostDescriptor,
        local_path: &str,
        remote_path: &str,
        now: DateTime<Local>,
    ) -> Result<()> {
        let target = RemoteTarget::parse(remote_path)?;
        let command = backup_command(&target, &now.format(ARCHIVE_TIMESTAMP_FORMAT).to_string());
        let args = backup_args(host, self.identity.as_deref(), command);

        info!("Backing up {} on {}", target.path(), host);
        self.run_step("backup", &self.shell_program, &args).await?;

        self.transfer(host, local_path, &target.path()).await
    }

    async fn run_step(&self, step: &'static str, program: &str, args: &[String]) -> Result<()> {
        let output = self.runner.run(program, args).await?;
        if !output.success() {
            return Err(QsshError::CommandFailed {
                step,
                program: program.to_string(),
                code: output.code,
                stderr: output.stderr,
            });
        }

        debug!(
            "{} finished: stdout={:?} stderr={:?}",
            step,
            output.stdout.trim(),
            output.stderr.trim()
        );
        Ok(())
    }
}

/// `-i <key>` when an identity is configured.
fn identity_args(identity: Option<&Path>) -> Vec<String> {
    identity
        .map(|path| vec!["-i".to_string(), path.display().to_string()])
        .unwrap_or_default()
}

/// `scp` arguments for a recursive copy on the host's port.
pub(crate) fn transfer_args(
    host: &HostDescriptor,
    identity: Option<&Path>,
    local_path: &str,
    remote_path: &str,
) -> Vec<String> {
    let mut args = identity_args(identity);
    args.extend([
        "-P".to_string(),
        host.port.to_string(),
        "-r".to_string(),
        local_path.to_string(),
        host.remote_spec(remote_path),
    ]);
    args
}

/// `ssh` arguments running `command` on the host.
pub(crate) fn backup_args(
    host: &HostDescriptor,
    identity: Option<&Path>,
    command: String,
) -> Vec<String> {
    let mut args = identity_args(identity);
    args.extend(["-p".to_string(), host.port.to_string(), host.login(), command]);
    args
}

/// Remote directory split into parent and base name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RemoteTarget {
    parent: String,
    base: String,
}

impl RemoteTarget {
    pub(crate) fn parse(remote_path: &str) -> Result<Self> {
        let trimmed = remote_path.trim_end_matches('/');
        let (parent, base) = match trimmed.rsplit_once('/') {
            Some(("", base)) => ("/", base),
            Some((parent, base)) => (parent, base),
            None => (".", trimmed),
        };

        if base.is_empty() || base == "." || base == ".." {
            return Err(QsshError::InvalidRemotePath(remote_path.to_string()));
        }

        Ok(Self {
            parent: parent.to_string(),
            base: base.to_string(),
        })
    }

    /// Full path with trailing slashes removed.
    pub(crate) fn path(&self) -> String {
        match self.parent.as_str() {
            "." => self.base.clone(),
            "/" => format!("/{}", self.base),
            parent => format!("{}/{}", parent, self.base),
        }
    }
}

/// Remote command archiving `target` into `<base>_<timestamp>.zip` next to
/// it and then removing it.
pub(crate) fn backup_command(target: &RemoteTarget, timestamp: &str) -> String {
    let archive = format!("{}_{}.zip", target.base, timestamp);
    format!(
        "cd {} && zip -r {} {} && rm -rf {}",
        shell_quote(&target.parent),
        shell_quote(&archive),
        shell_quote(&target.base),
        shell_quote(&target.base)
    )
}

/// Quote `value` as a single POSIX shell word.
pub(crate) fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
