//! Interactive session controller.
//!
//! Turns a [`HostDescriptor`] into a live shell bound to the local terminal.
//! The steps run in a fixed order and any failure ends the session:
//!
//! ```text
//! Idle -> CredentialLoaded -> Connected -> ChannelOpen -> RawMode
//!      -> PtyRequested -> Streaming -> Closed
//! ```
//!
//! Resources are released in reverse acquisition order on every exit path:
//! the local terminal leaves raw mode first, then the channel and connection
//! are closed. The secure transport itself sits behind [`SessionProvider`]
//! and [`RemoteSession`], so the controller is independent of russh.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{QsshError, Result};
use crate::terminal::{RawModeGuard, TerminalControl};
use crate::types::{HostDescriptor, PtyRequest};

/// Source of authenticated remote sessions.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    type Credential: Send + Sync;
    type Session: RemoteSession;

    /// Read and parse the signing credential at `key_path`.
    fn load_credential(&self, key_path: &Path) -> Result<Self::Credential>;

    /// Connect to `host` and authenticate with `credential`.
    async fn connect(
        &self,
        host: &HostDescriptor,
        credential: &Self::Credential,
    ) -> Result<Self::Session>;
}

/// One authenticated connection carrying a single command channel.
#[async_trait]
pub trait RemoteSession: Send {
    async fn open_channel(&mut self) -> Result<()>;

    async fn request_pty(&mut self, pty: &PtyRequest) -> Result<()>;

    /// Start the default shell with stdio attached; returns its exit status.
    async fn run_shell(&mut self) -> Result<Option<u32>>;

    /// Close the channel (if open) and the connection.
    async fn close(&mut self) -> Result<()>;
}

/// Lifecycle position of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    CredentialLoaded,
    Connected,
    ChannelOpen,
    RawMode,
    PtyRequested,
    Streaming,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::CredentialLoaded => "credential-loaded",
            SessionState::Connected => "connected",
            SessionState::ChannelOpen => "channel-open",
            SessionState::RawMode => "raw-mode",
            SessionState::PtyRequested => "pty-requested",
            SessionState::Streaming => "streaming",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

fn transition(state: &mut SessionState, next: SessionState) {
    debug!("Session state {} -> {}", state, next);
    *state = next;
}

/// Drives one interactive session at a time.
pub struct SessionController<P, T> {
    provider: P,
    terminal: T,
    key_path: PathBuf,
    state: SessionState,
}

impl<P, T> SessionController<P, T>
where
    P: SessionProvider,
    T: TerminalControl,
{
    pub fn new(provider: P, terminal: T, key_path: impl Into<PathBuf>) -> Self {
        Self {
            provider,
            terminal,
            key_path: key_path.into(),
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn terminal(&self) -> &T {
        &self.terminal
    }

    /// Run an interactive shell on `host` until it exits.
    ///
    /// Returns the remote shell's exit status when the server reported one.
    pub async fn run(&mut self, host: &HostDescriptor) -> Result<Option<u32>> {
        self.state = SessionState::Idle;

        let credential = match self.provider.load_credential(&self.key_path) {
            Ok(credential) => credential,
            Err(e) => {
                transition(&mut self.state, SessionState::Closed);
                return Err(e);
            }
        };
        transition(&mut self.state, SessionState::CredentialLoaded);

        info!("Connecting to {}", host);
        let mut session = match self.provider.connect(host, &credential).await {
            Ok(session) => session,
            Err(e) => {
                transition(&mut self.state, SessionState::Closed);
                return Err(e);
            }
        };
        transition(&mut self.state, SessionState::Connected);

        let outcome = self.attach(&mut session).await;

        // Raw mode was released inside `attach`; the session goes last.
        let closed = session.close().await;
        transition(&mut self.state, SessionState::Closed);

        match (outcome, closed) {
            (Ok(status), Ok(())) => Ok(status),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_err)) => {
                warn!("Failed to close session after error: {}", close_err);
                Err(e)
            }
        }
    }

    async fn attach(&mut self, session: &mut P::Session) -> Result<Option<u32>> {
        session.open_channel().await?;
        transition(&mut self.state, SessionState::ChannelOpen);

        let raw_mode =
            RawModeGuard::acquire(&self.terminal).map_err(|source| QsshError::Terminal {
                step: "raw mode",
                source,
            })?;
        transition(&mut self.state, SessionState::RawMode);

        let (cols, rows) = self.terminal.size().map_err(|source| QsshError::Terminal {
            step: "size query",
            source,
        })?;

        session.request_pty(&PtyRequest::for_size(cols, rows)).await?;
        transition(&mut self.state, SessionState::PtyRequested);

        transition(&mut self.state, SessionState::Streaming);
        let status = session.run_shell().await?;
        debug!("Remote shell exited with {:?}", status);

        raw_mode.restore().map_err(|source| QsshError::Terminal {
            step: "restore",
            source,
        })?;
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::testing::FakeTerminal;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Which step of the remote side should fail.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    enum FailAt {
        #[default]
        Nowhere,
        Credential,
        Connect,
        Channel,
        Pty,
        Shell,
        Close,
    }

    #[derive(Default)]
    struct Calls {
        connects: AtomicUsize,
        closes: AtomicUsize,
        shells: AtomicUsize,
        pty: Mutex<Option<PtyRequest>>,
    }

    struct FakeProvider {
        fail_at: FailAt,
        calls: Arc<Calls>,
    }

    struct FakeSession {
        fail_at: FailAt,
        calls: Arc<Calls>,
    }

    #[async_trait]
    impl SessionProvider for FakeProvider {
        type Credential = ();
        type Session = FakeSession;

        fn load_credential(&self, key_path: &Path) -> Result<()> {
            if self.fail_at == FailAt::Credential {
                return Err(QsshError::Credential {
                    path: key_path.to_path_buf(),
                    message: "unreadable".to_string(),
                });
            }
            Ok(())
        }

        async fn connect(&self, host: &HostDescriptor, _credential: &()) -> Result<FakeSession> {
            self.calls.connects.fetch_add(1, Ordering::SeqCst);
            if self.fail_at == FailAt::Connect {
                return Err(QsshError::Connect {
                    address: host.to_string(),
                    message: "connection refused".to_string(),
                });
            }
            Ok(FakeSession {
                fail_at: self.fail_at,
                calls: self.calls.clone(),
            })
        }
    }

    #[async_trait]
    impl RemoteSession for FakeSession {
        async fn open_channel(&mut self) -> Result<()> {
            if self.fail_at == FailAt::Channel {
                return Err(QsshError::Channel("administratively prohibited".to_string()));
            }
            Ok(())
        }

        async fn request_pty(&mut self, pty: &PtyRequest) -> Result<()> {
            *self.calls.pty.lock().unwrap() = Some(pty.clone());
            if self.fail_at == FailAt::Pty {
                return Err(QsshError::Pty("refused".to_string()));
            }
            Ok(())
        }

        async fn run_shell(&mut self) -> Result<Option<u32>> {
            self.calls.shells.fetch_add(1, Ordering::SeqCst);
            if self.fail_at == FailAt::Shell {
                return Err(QsshError::Shell("connection reset".to_string()));
            }
            Ok(Some(0))
        }

        async fn close(&mut self) -> Result<()> {
            self.calls.closes.fetch_add(1, Ordering::SeqCst);
            if self.fail_at == FailAt::Close {
                return Err(QsshError::Shell("disconnect failed".to_string()));
            }
            Ok(())
        }
    }

    fn controller(
        fail_at: FailAt,
        terminal: FakeTerminal,
    ) -> (SessionController<FakeProvider, FakeTerminal>, Arc<Calls>) {
        let calls = Arc::new(Calls::default());
        let provider = FakeProvider {
            fail_at,
            calls: calls.clone(),
        };
        (
            SessionController::new(provider, terminal, "/home/u/.ssh/id_rsa"),
            calls,
        )
    }

    fn host() -> HostDescriptor {
        HostDescriptor::new("alice", "10.0.0.5", 2222)
    }

    mod happy_path {
        use super::*;

        #[tokio::test]
        async fn test_shell_runs_and_everything_is_released() {
            let (mut controller, calls) = controller(FailAt::Nowhere, FakeTerminal::default());
            let status = controller.run(&host()).await.unwrap();

            assert_eq!(status, Some(0));
            assert_eq!(calls.shells.load(Ordering::SeqCst), 1);
            assert_eq!(calls.closes.load(Ordering::SeqCst), 1);
            assert_eq!(controller.terminal().enabled(), 1);
            assert_eq!(controller.terminal().restored(), 1);
            assert_eq!(controller.state(), SessionState::Closed);
        }

        #[tokio::test]
        async fn test_pty_uses_local_terminal_size() {
            let (mut controller, calls) = controller(FailAt::Nowhere, FakeTerminal::default());
            controller.run(&host()).await.unwrap();

            let pty = calls.pty.lock().unwrap().clone().unwrap();
            assert_eq!((pty.cols, pty.rows), (120, 40));
            assert_eq!(pty.term, "xterm-256color");
        }

        #[tokio::test]
        async fn test_controller_is_reusable() {
            let (mut controller, calls) = controller(FailAt::Nowhere, FakeTerminal::default());
            controller.run(&host()).await.unwrap();
            controller.run(&host()).await.unwrap();

            assert_eq!(calls.closes.load(Ordering::SeqCst), 2);
            assert_eq!(controller.terminal().restored(), 2);
        }
    }

    mod raw_mode_restoration {
        use super::*;

        #[tokio::test]
        async fn test_remote_failure_mid_session_restores_once() {
            let (mut controller, calls) = controller(FailAt::Shell, FakeTerminal::default());
            let err = controller.run(&host()).await.unwrap_err();

            assert!(matches!(err, QsshError::Shell(_)));
            assert_eq!(controller.terminal().restored(), 1);
            assert_eq!(calls.closes.load(Ordering::SeqCst), 1);
            assert_eq!(controller.state(), SessionState::Closed);
        }

        #[tokio::test]
        async fn test_pty_failure_restores_once() {
            let (mut controller, calls) = controller(FailAt::Pty, FakeTerminal::default());
            let err = controller.run(&host()).await.unwrap_err();

            assert!(matches!(err, QsshError::Pty(_)));
            assert_eq!(controller.terminal().restored(), 1);
            assert_eq!(calls.shells.load(Ordering::SeqCst), 0);
            assert_eq!(calls.closes.load(Ordering::SeqCst), 1);
        }

        #[tokio::test]
        async fn test_size_failure_restores_once_and_closes() {
            let terminal = FakeTerminal {
                fail_size: true,
                ..Default::default()
            };
            let (mut controller, calls) = controller(FailAt::Nowhere, terminal);
            let err = controller.run(&host()).await.unwrap_err();

            assert_eq!(err.step(), "size query");
            assert_eq!(controller.terminal().restored(), 1);
            assert_eq!(calls.closes.load(Ordering::SeqCst), 1);
            assert!(calls.pty.lock().unwrap().is_none());
        }

        #[tokio::test]
        async fn test_close_failure_after_shell_still_restored_once() {
            let (mut controller, calls) = controller(FailAt::Close, FakeTerminal::default());
            assert!(controller.run(&host()).await.is_err());

            assert_eq!(controller.terminal().restored(), 1);
            assert_eq!(calls.closes.load(Ordering::SeqCst), 1);
        }
    }

    mod early_failures {
        use super::*;

        #[tokio::test]
        async fn test_raw_mode_failure_does_not_leak_session() {
            let terminal = FakeTerminal {
                fail_raw_mode: true,
                ..Default::default()
            };
            let (mut controller, calls) = controller(FailAt::Nowhere, terminal);
            let err = controller.run(&host()).await.unwrap_err();

            assert_eq!(err.step(), "raw mode");
            assert_eq!(calls.closes.load(Ordering::SeqCst), 1);
            assert_eq!(controller.terminal().restored(), 0);
        }

        #[tokio::test]
        async fn test_channel_failure_closes_connection_without_raw_mode() {
            let (mut controller, calls) = controller(FailAt::Channel, FakeTerminal::default());
            let err = controller.run(&host()).await.unwrap_err();

            assert!(matches!(err, QsshError::Channel(_)));
            assert_eq!(calls.closes.load(Ordering::SeqCst), 1);
            assert_eq!(controller.terminal().enabled(), 0);
            assert_eq!(controller.terminal().restored(), 0);
        }

        #[tokio::test]
        async fn test_connect_failure_touches_nothing_else() {
            let (mut controller, calls) = controller(FailAt::Connect, FakeTerminal::default());
            let err = controller.run(&host()).await.unwrap_err();

            assert_eq!(err.step(), "connect");
            assert_eq!(calls.closes.load(Ordering::SeqCst), 0);
            assert_eq!(controller.terminal().enabled(), 0);
            assert_eq!(controller.state(), SessionState::Closed);
        }

        #[tokio::test]
        async fn test_credential_failure_never_connects() {
            let (mut controller, calls) = controller(FailAt::Credential, FakeTerminal::default());
            let err = controller.run(&host()).await.unwrap_err();

            assert!(err.to_string().starts_with("cannot read/parse private key"));
            assert_eq!(calls.connects.load(Ordering::SeqCst), 0);
            assert_eq!(controller.terminal().enabled(), 0);
        }
    }

    #[test]
    fn test_state_names() {
        assert_eq!(SessionState::ChannelOpen.to_string(), "channel-open");
        assert_eq!(SessionState::Closed.to_string(), "closed");
    }
}
