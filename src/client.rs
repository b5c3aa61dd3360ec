//! russh-backed secure session provider.
//!
//! ## Connection Lifecycle
//!
//! 1. **Credential**: the private key is loaded into a [`KeyAuth`] before any
//!    network activity.
//! 2. **Connection Establishment**: TCP connect and handshake, bounded by the
//!    configured timeout. The server key is checked by [`SshClientHandler`].
//! 3. **Authentication**: public-key authentication is the only method.
//! 4. **Channel**: one session channel carries the PTY and the shell.
//! 5. **Streaming**: stdin, stdout and stderr are pumped until the channel
//!    closes.
//!
//! There is no retry anywhere; every failure is returned to the caller.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Msg};
use russh::{Channel, ChannelMsg, Disconnect};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::auth::{AuthStrategy, KeyAuth};
use crate::error::{QsshError, Result};
use crate::session::SshClientHandler;
use crate::shell::{RemoteSession, SessionProvider};
use crate::types::{HostDescriptor, HostKeyPolicy, PtyRequest};

/// Keepalive interval for interactive sessions
pub(crate) const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Keepalives without reply before the connection is dropped
pub(crate) const KEEPALIVE_MAX: usize = 3;

/// Size of the buffer used to forward local keystrokes
const STDIN_BUFFER_SIZE: usize = 1024;

/// SSH extended data type for stderr
const EXTENDED_DATA_STDERR: u32 = 1;

/// Build russh client configuration for an interactive session.
///
/// Interactive shells can sit idle for a long time, so there is no inactivity
/// timeout; dead peers are detected through keepalives instead.
pub(crate) fn build_client_config() -> Arc<client::Config> {
    Arc::new(client::Config {
        inactivity_timeout: None,
        keepalive_interval: Some(KEEPALIVE_INTERVAL),
        keepalive_max: KEEPALIVE_MAX,
        ..Default::default()
    })
}

/// Session provider connecting with russh.
#[derive(Debug, Clone)]
pub struct RusshProvider {
    policy: HostKeyPolicy,
    known_hosts: PathBuf,
    connect_timeout: Duration,
}

impl RusshProvider {
    pub fn new(
        policy: HostKeyPolicy,
        known_hosts: impl Into<PathBuf>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            policy,
            known_hosts: known_hosts.into(),
            connect_timeout,
        }
    }
}

#[async_trait]
impl SessionProvider for RusshProvider {
    type Credential = KeyAuth;
    type Session = RusshSession;

    fn load_credential(&self, key_path: &Path) -> Result<KeyAuth> {
        KeyAuth::load(key_path)
    }

    async fn connect(&self, host: &HostDescriptor, credential: &KeyAuth) -> Result<RusshSession> {
        let address = format!("{}:{}", host.address, host.port);
        let handler = SshClientHandler::new(
            host.address.clone(),
            host.port,
            self.policy,
            self.known_hosts.clone(),
        );

        let connect_future = client::connect(
            build_client_config(),
            (host.address.as_str(), host.port),
            handler,
        );

        let mut handle = tokio::time::timeout(self.connect_timeout, connect_future)
            .await
            .map_err(|_| QsshError::Connect {
                address: address.clone(),
                message: format!("timed out after {:?}", self.connect_timeout),
            })?
            .map_err(|e| QsshError::Connect {
                address: address.clone(),
                message: e.to_string(),
            })?;

        debug!(
            "Authenticating {} with {} strategy",
            host.login(),
            credential.name()
        );
        let accepted = credential
            .authenticate(&mut handle, &host.username)
            .await
            .map_err(|message| QsshError::Authentication {
                login: host.login(),
                message,
            })?;

        if !accepted {
            return Err(QsshError::Authentication {
                login: host.login(),
                message: format!("key {} rejected", credential.key_path().display()),
            });
        }

        info!("Authenticated as {} on {}", host.username, address);
        Ok(RusshSession {
            handle,
            channel: None,
        })
    }
}

/// Authenticated russh connection with at most one open channel.
pub struct RusshSession {
    handle: client::Handle<SshClientHandler>,
    channel: Option<Channel<Msg>>,
}

impl RusshSession {
    fn channel(&mut self) -> Result<&mut Channel<Msg>> {
        self.channel
            .as_mut()
            .ok_or_else(|| QsshError::Channel("no channel open".to_string()))
    }
}

#[async_trait]
impl RemoteSession for RusshSession {
    async fn open_channel(&mut self) -> Result<()> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| QsshError::Channel(e.to_string()))?;
        debug!("Opened session channel {:?}", channel.id());
        self.channel = Some(channel);
        Ok(())
    }

    async fn request_pty(&mut self, pty: &PtyRequest) -> Result<()> {
        self.channel()?
            .request_pty(true, &pty.term, pty.cols, pty.rows, 0, 0, &pty.modes)
            .await
            .map_err(|e| QsshError::Pty(e.to_string()))
    }

    async fn run_shell(&mut self) -> Result<Option<u32>> {
        let channel = self.channel()?;
        channel
            .request_shell(true)
            .await
            .map_err(|e| QsshError::Shell(e.to_string()))?;
        pump_stdio(channel).await
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(channel) = self.channel.take() {
            // The server usually closed the channel already when the shell exited
            if let Err(e) = channel.close().await {
                debug!("Channel close: {}", e);
            }
        }

        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "session closed", "en")
            .await
        {
            warn!("Failed to disconnect: {}", e);
        }
        Ok(())
    }
}

/// Forward local stdio to the channel until the remote side closes it.
///
/// Returns the exit status when the server sent one.
async fn pump_stdio(channel: &mut Channel<Msg>) -> Result<Option<u32>> {
    let mut stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut stderr = tokio::io::stderr();
    let mut buf = vec![0u8; STDIN_BUFFER_SIZE];
    let mut stdin_open = true;
    let mut exit_status = None;

    let stream_error = |e: std::io::Error| QsshError::Shell(e.to_string());

    loop {
        tokio::select! {
            read = stdin.read(&mut buf), if stdin_open => {
                match read.map_err(stream_error)? {
                    0 => {
                        stdin_open = false;
                        channel
                            .eof()
                            .await
                            .map_err(|e| QsshError::Shell(e.to_string()))?;
                    }
                    n => channel
                        .data(&buf[..n])
                        .await
                        .map_err(|e| QsshError::Shell(e.to_string()))?,
                }
            }
            msg = channel.wait() => {
                match msg {
                    Some(ChannelMsg::Data { ref data }) => {
                        stdout.write_all(data).await.map_err(stream_error)?;
                        stdout.flush().await.map_err(stream_error)?;
                    }
                    Some(ChannelMsg::ExtendedData { ref data, ext }) if ext == EXTENDED_DATA_STDERR => {
                        stderr.write_all(data).await.map_err(stream_error)?;
                        stderr.flush().await.map_err(stream_error)?;
                    }
                    Some(ChannelMsg::ExitStatus { exit_status: status }) => {
                        exit_status = Some(status);
                    }
                    Some(ChannelMsg::Close) | None => break,
                    Some(_) => {
                        // Eof, window adjustments and other notifications
                    }
                }
            }
        }
    }

    Ok(exit_status)
}
