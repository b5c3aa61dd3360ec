//! Configuration resolution for qssh.
//!
//! Every setting is resolved with a three-tier priority system:
//!
//! 1. **Parameter** - Value given on the command line (highest priority)
//! 2. **Environment Variable** - Value from environment variable
//! 3. **Default** - Built-in default value (lowest priority)
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `QSSH_CONFIG` | `~/.qssh` | Host directory file |
//! | `QSSH_IDENTITY` | `~/.ssh/id_rsa` | Private key used for authentication |
//! | `QSSH_KNOWN_HOSTS` | `~/.ssh/known_hosts` | Host keys checked by the host-key policy |
//! | `QSSH_HOST_KEY_POLICY` | `tofu` | `tofu`, `pinned` or `accept-any` |
//! | `SSH_CONNECT_TIMEOUT` | 30s | Connection timeout in seconds |
//! | `QSSH_DEPLOY_ROOT` | `/www` | Remote root that `deploy` targets live under |

use std::env;
use std::path::{Path, PathBuf};

use crate::error::{QsshError, Result};
use crate::types::HostKeyPolicy;

/// Host directory file name under the home directory
pub(crate) const DEFAULT_DIRECTORY_FILE: &str = ".qssh";

/// Private key path relative to the home directory
pub(crate) const DEFAULT_IDENTITY_FILE: &str = ".ssh/id_rsa";

/// known_hosts path relative to the home directory
pub(crate) const DEFAULT_KNOWN_HOSTS_FILE: &str = ".ssh/known_hosts";

/// Default SSH connection timeout in seconds
pub(crate) const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default remote root for deploy targets
pub(crate) const DEFAULT_DEPLOY_ROOT: &str = "/www";

pub(crate) const DIRECTORY_ENV_VAR: &str = "QSSH_CONFIG";
pub(crate) const IDENTITY_ENV_VAR: &str = "QSSH_IDENTITY";
pub(crate) const KNOWN_HOSTS_ENV_VAR: &str = "QSSH_KNOWN_HOSTS";
pub(crate) const HOST_KEY_POLICY_ENV_VAR: &str = "QSSH_HOST_KEY_POLICY";
pub(crate) const CONNECT_TIMEOUT_ENV_VAR: &str = "SSH_CONNECT_TIMEOUT";
pub(crate) const DEPLOY_ROOT_ENV_VAR: &str = "QSSH_DEPLOY_ROOT";

/// Fully resolved settings for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub directory_path: PathBuf,
    pub identity_path: PathBuf,
    pub known_hosts_path: PathBuf,
    pub host_key_policy: HostKeyPolicy,
    pub connect_timeout_secs: u64,
    pub deploy_root: String,
}

/// Command-line overrides, all optional.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub directory_path: Option<PathBuf>,
    pub identity_path: Option<PathBuf>,
    pub known_hosts_path: Option<PathBuf>,
    pub host_key_policy: Option<HostKeyPolicy>,
    pub connect_timeout_secs: Option<u64>,
    pub deploy_root: Option<String>,
}

impl Settings {
    /// Resolve every setting, falling back to files under the user's home
    /// directory.
    pub fn resolve(overrides: Overrides) -> Result<Self> {
        Self::resolve_with_home(overrides, dirs::home_dir().as_deref())
    }

    /// The home directory is only required by paths that fall through to
    /// their default.
    pub(crate) fn resolve_with_home(overrides: Overrides, home: Option<&Path>) -> Result<Self> {
        Ok(Self {
            directory_path: resolve_path(
                overrides.directory_path,
                DIRECTORY_ENV_VAR,
                home,
                DEFAULT_DIRECTORY_FILE,
            )?,
            identity_path: resolve_path(
                overrides.identity_path,
                IDENTITY_ENV_VAR,
                home,
                DEFAULT_IDENTITY_FILE,
            )?,
            known_hosts_path: resolve_path(
                overrides.known_hosts_path,
                KNOWN_HOSTS_ENV_VAR,
                home,
                DEFAULT_KNOWN_HOSTS_FILE,
            )?,
            host_key_policy: resolve_host_key_policy(overrides.host_key_policy),
            connect_timeout_secs: resolve_connect_timeout(overrides.connect_timeout_secs),
            deploy_root: resolve_deploy_root(overrides.deploy_root),
        })
    }
}

/// Resolve a file path with priority: parameter -> env var -> `home/default`
fn resolve_path(
    param: Option<PathBuf>,
    env_var: &str,
    home: Option<&Path>,
    default: &str,
) -> Result<PathBuf> {
    if let Some(path) = param {
        return Ok(path);
    }

    if let Ok(env_path) = env::var(env_var)
        && !env_path.trim().is_empty()
    {
        return Ok(PathBuf::from(env_path));
    }

    home.map(|home| home.join(default))
        .ok_or(QsshError::HomeDirUnavailable)
}

/// Resolve the host-key policy with priority: parameter -> env var -> default (TOFU)
pub(crate) fn resolve_host_key_policy(policy_param: Option<HostKeyPolicy>) -> HostKeyPolicy {
    if let Some(policy) = policy_param {
        return policy;
    }

    if let Ok(env_policy) = env::var(HOST_KEY_POLICY_ENV_VAR)
        && let Ok(policy) = env_policy.parse::<HostKeyPolicy>()
    {
        return policy;
    }

    HostKeyPolicy::default()
}

/// Resolve the connection timeout value with priority: parameter -> env var -> default
pub(crate) fn resolve_connect_timeout(timeout_param: Option<u64>) -> u64 {
    if let Some(timeout) = timeout_param {
        return timeout;
    }

    if let Ok(env_timeout) = env::var(CONNECT_TIMEOUT_ENV_VAR)
        && let Ok(timeout) = env_timeout.parse::<u64>()
    {
        return timeout;
    }

    DEFAULT_CONNECT_TIMEOUT_SECS
}

/// Resolve the deploy root with priority: parameter -> env var -> default
pub(crate) fn resolve_deploy_root(root_param: Option<String>) -> String {
    if let Some(root) = root_param {
        return root;
    }

    if let Ok(env_root) = env::var(DEPLOY_ROOT_ENV_VAR)
        && !env_root.trim().is_empty()
    {
        return env_root;
    }

    DEFAULT_DEPLOY_ROOT.to_string()
}
