//! Command table and dispatch.
//!
//! Each subcommand is one clap variant with its arguments declared on it, and
//! each maps to exactly one handler:
//!
//! - `add`: append an alias to the host directory
//! - `connect` (or a bare alias): open an interactive shell
//! - `list`: print raw directory entries
//! - `copy`: recursive copy to the host (default remote path `~`)
//! - `deploy`: back up `<deploy-root>/<path>` and upload in its place

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{debug, warn};

use crate::client::RusshProvider;
use crate::config::{Overrides, Settings};
use crate::directory::HostDirectory;
use crate::error::{QsshError, Result};
use crate::sequencer::{Sequencer, TokioProcessRunner};
use crate::shell::SessionController;
use crate::terminal::CrosstermTerminal;
use crate::types::HostKeyPolicy;

#[derive(Debug, Parser)]
#[command(name = "qssh")]
#[command(about = "Quickly ssh: named hosts, interactive shells and deploys")]
#[command(version)]
#[command(after_help = r#"EXAMPLES:
    qssh add box1 alice@10.0.0.5:2222   # Register a host
    qssh box1                           # Shell on a registered host
    qssh copy box1 ./notes.txt /tmp     # Copy a file or directory
    qssh deploy box1 ./dist site        # Back up /www/site, upload ./dist
"#)]
pub struct Cli {
    /// Host directory file (env: QSSH_CONFIG, default: ~/.qssh)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Private key (env: QSSH_IDENTITY, default: ~/.ssh/id_rsa)
    #[arg(long, short = 'i', global = true)]
    pub identity: Option<PathBuf>,

    /// known_hosts file (env: QSSH_KNOWN_HOSTS, default: ~/.ssh/known_hosts)
    #[arg(long, global = true)]
    pub known_hosts: Option<PathBuf>,

    /// tofu, pinned or accept-any (env: QSSH_HOST_KEY_POLICY, default: tofu)
    #[arg(long, global = true)]
    pub host_key_policy: Option<HostKeyPolicy>,

    /// Connection timeout in seconds (env: SSH_CONNECT_TIMEOUT, default: 30)
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Remote root for deploy targets (env: QSSH_DEPLOY_ROOT, default: /www)
    #[arg(long, global = true)]
    pub deploy_root: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Register a host as `alias username@address[:port]`
    Add { alias: String, target: String },

    /// Open an interactive shell on a registered host
    Connect { alias: String },

    /// Print every directory entry
    #[command(alias = "ls")]
    List,

    /// Copy a local file or directory to a registered host
    Copy {
        alias: String,
        local_path: String,
        #[arg(default_value = "~")]
        remote_path: String,
    },

    /// Back up the remote directory, then upload a local one in its place
    Deploy {
        alias: String,
        local_path: String,
        remote_path: String,
    },

    /// `qssh <alias>` shorthand for `connect`
    #[command(external_subcommand)]
    Shorthand(Vec<String>),
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            directory_path: self.config.clone(),
            identity_path: self.identity.clone(),
            known_hosts_path: self.known_hosts.clone(),
            host_key_policy: self.host_key_policy,
            connect_timeout_secs: self.timeout,
            deploy_root: self.deploy_root.clone(),
        }
    }
}

/// Run the parsed command line.
pub async fn dispatch(cli: Cli) -> Result<ExitCode> {
    let settings = Settings::resolve(cli.overrides())?;
    debug!("config path: {}", settings.directory_path.display());
    let directory = HostDirectory::new(&settings.directory_path);

    match cli.command {
        Command::Add { alias, target } => add(&directory, &alias, &target),
        Command::Connect { alias } => connect(&settings, &directory, &alias).await,
        Command::Shorthand(args) => {
            let (alias, rest) = args
                .split_first()
                .ok_or_else(|| QsshError::UnknownHost(String::new()))?;
            if !rest.is_empty() {
                warn!("Ignoring extra arguments after {}: {:?}", alias, rest);
            }
            connect(&settings, &directory, alias).await
        }
        Command::List => list(&directory),
        Command::Copy {
            alias,
            local_path,
            remote_path,
        } => copy(&settings, &directory, &alias, &local_path, &remote_path).await,
        Command::Deploy {
            alias,
            local_path,
            remote_path,
        } => {
            let target = deploy_target(&settings.deploy_root, &remote_path)?;
            deploy(&settings, &directory, &alias, &local_path, &target).await
        }
    }
}

fn add(directory: &HostDirectory, alias: &str, target: &str) -> Result<ExitCode> {
    directory.append(alias, target)?;
    Ok(ExitCode::SUCCESS)
}

async fn connect(settings: &Settings, directory: &HostDirectory, alias: &str) -> Result<ExitCode> {
    let host = directory.resolve(alias)?;
    let provider = RusshProvider::new(
        settings.host_key_policy,
        &settings.known_hosts_path,
        Duration::from_secs(settings.connect_timeout_secs),
    );
    let mut controller = SessionController::new(provider, CrosstermTerminal, &settings.identity_path);

    let status = controller.run(&host).await?;
    Ok(status
        .map(|code| ExitCode::from(u8::try_from(code).unwrap_or(u8::MAX)))
        .unwrap_or(ExitCode::SUCCESS))
}

fn list(directory: &HostDirectory) -> Result<ExitCode> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for entry in &directory.entries() {
        // A closed pipe (e.g. `qssh list | head`) just ends the listing
        if writeln!(out, "{}", entry).is_err() {
            break;
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn copy(
    settings: &Settings,
    directory: &HostDirectory,
    alias: &str,
    local_path: &str,
    remote_path: &str,
) -> Result<ExitCode> {
    let host = directory.resolve(alias)?;
    Sequencer::new(TokioProcessRunner)
        .with_identity(&settings.identity_path)
        .transfer(&host, local_path, remote_path)
        .await?;
    Ok(ExitCode::SUCCESS)
}

async fn deploy(
    settings: &Settings,
    directory: &HostDirectory,
    alias: &str,
    local_path: &str,
    remote_path: &str,
) -> Result<ExitCode> {
    let host = directory.resolve(alias)?;
    Sequencer::new(TokioProcessRunner)
        .with_identity(&settings.identity_path)
        .deploy(&host, local_path, remote_path)
        .await?;
    Ok(ExitCode::SUCCESS)
}

/// `<root>/<relative>`, without doubled slashes.
///
/// The relative part must name something below the root; an empty one would
/// make the root itself the backup target.
pub(crate) fn deploy_target(root: &str, relative: &str) -> Result<String> {
    let trimmed = relative.trim_matches('/');
    if trimmed.is_empty() {
        return Err(QsshError::InvalidRemotePath(relative.to_string()));
    }
    Ok(format!("{}/{}", root.trim_end_matches('/'), trimmed))
}
