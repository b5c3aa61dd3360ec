//! russh client handler and host-key verification.
//!
//! `SshClientHandler` checks the server's public key against a known_hosts
//! file according to the configured [`HostKeyPolicy`]:
//!
//! - `TrustOnFirstUse`: known keys must match, unknown hosts are learned
//! - `PinnedKnownHosts`: only keys already in known_hosts are accepted
//! - `AcceptAny`: every key is accepted (similar to `StrictHostKeyChecking=no`)

use std::path::PathBuf;

use russh::{client, keys};
use tracing::{info, warn};

use crate::types::HostKeyPolicy;

/// Outcome of looking a server key up in known_hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KnownHostStatus {
    Match,
    Unknown,
    Changed,
}

/// What the handler does with a server key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HostKeyDecision {
    Accept,
    AcceptAndLearn,
    Reject,
}

/// Apply `policy` to a known_hosts lookup result.
pub(crate) fn decide(policy: HostKeyPolicy, status: KnownHostStatus) -> HostKeyDecision {
    match (policy, status) {
        (HostKeyPolicy::AcceptAny, _) => HostKeyDecision::Accept,
        (_, KnownHostStatus::Match) => HostKeyDecision::Accept,
        (_, KnownHostStatus::Changed) => HostKeyDecision::Reject,
        (HostKeyPolicy::TrustOnFirstUse, KnownHostStatus::Unknown) => {
            HostKeyDecision::AcceptAndLearn
        }
        (HostKeyPolicy::PinnedKnownHosts, KnownHostStatus::Unknown) => HostKeyDecision::Reject,
    }
}

/// Client handler for russh enforcing a host-key policy.
pub struct SshClientHandler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
    known_hosts: PathBuf,
}

impl SshClientHandler {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        policy: HostKeyPolicy,
        known_hosts: impl Into<PathBuf>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            policy,
            known_hosts: known_hosts.into(),
        }
    }

    fn lookup(&self, key: &keys::PublicKey) -> KnownHostStatus {
        match keys::check_known_hosts_path(&self.host, self.port, key, &self.known_hosts) {
            Ok(true) => KnownHostStatus::Match,
            Ok(false) => KnownHostStatus::Unknown,
            Err(keys::Error::KeyChanged { line }) => {
                warn!(
                    "Host key for {}:{} does not match {} line {}",
                    self.host,
                    self.port,
                    self.known_hosts.display(),
                    line
                );
                KnownHostStatus::Changed
            }
            Err(e) => {
                // A missing or unreadable known_hosts file knows no hosts
                warn!(
                    "Cannot read {}: {}",
                    self.known_hosts.display(),
                    e
                );
                KnownHostStatus::Unknown
            }
        }
    }
}

impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        let status = if self.policy == HostKeyPolicy::AcceptAny {
            warn!(
                "Accepting host key for {}:{} without verification",
                self.host, self.port
            );
            KnownHostStatus::Unknown
        } else {
            self.lookup(server_public_key)
        };

        match decide(self.policy, status) {
            HostKeyDecision::Accept => Ok(true),
            HostKeyDecision::AcceptAndLearn => {
                info!(
                    "Learning host key for {}:{} into {}",
                    self.host,
                    self.port,
                    self.known_hosts.display()
                );
                if let Err(e) = keys::known_hosts::learn_known_hosts_path(
                    &self.host,
                    self.port,
                    server_public_key,
                    &self.known_hosts,
                ) {
                    warn!("Failed to record host key: {}", e);
                }
                Ok(true)
            }
            HostKeyDecision::Reject => {
                warn!(
                    "Rejecting host key for {}:{} (policy {})",
                    self.host, self.port, self.policy
                );
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod policy_decisions {
        use super::*;

        #[test]
        fn test_accept_any_accepts_everything() {
            for status in [
                KnownHostStatus::Match,
                KnownHostStatus::Unknown,
                KnownHostStatus::Changed,
            ] {
                assert_eq!(
                    decide(HostKeyPolicy::AcceptAny, status),
                    HostKeyDecision::Accept
                );
            }
        }

        #[test]
        fn test_tofu_learns_unknown_hosts() {
            assert_eq!(
                decide(HostKeyPolicy::TrustOnFirstUse, KnownHostStatus::Unknown),
                HostKeyDecision::AcceptAndLearn
            );
        }

        #[test]
        fn test_tofu_rejects_changed_keys() {
            assert_eq!(
                decide(HostKeyPolicy::TrustOnFirstUse, KnownHostStatus::Changed),
                HostKeyDecision::Reject
            );
        }

        #[test]
        fn test_tofu_accepts_matching_keys() {
            assert_eq!(
                decide(HostKeyPolicy::TrustOnFirstUse, KnownHostStatus::Match),
                HostKeyDecision::Accept
            );
        }

        #[test]
        fn test_pinned_rejects_unknown_hosts() {
            assert_eq!(
                decide(HostKeyPolicy::PinnedKnownHosts, KnownHostStatus::Unknown),
                HostKeyDecision::Reject
            );
        }

        #[test]
        fn test_pinned_rejects_changed_keys() {
            assert_eq!(
                decide(HostKeyPolicy::PinnedKnownHosts, KnownHostStatus::Changed),
                HostKeyDecision::Reject
            );
        }

        #[test]
        fn test_pinned_accepts_matching_keys() {
            assert_eq!(
                decide(HostKeyPolicy::PinnedKnownHosts, KnownHostStatus::Match),
                HostKeyDecision::Accept
            );
        }
    }

    mod known_hosts_file {
        use super::*;
        use russh::client::Handler;
        use std::fs;

        const FIRST_KEY: &str =
            "AAAAC3NzaC1lZDI1NTE5AAAAIEEq0HPJ51Rea10Mfn5P8zcTWeirsi8D/AmM0DrTOBl+";
        const SECOND_KEY: &str =
            "AAAAC3NzaC1lZDI1NTE5AAAAIHMH6RPhJHHVF3pakfFu00AcCOF/mrPYXBHSPU8U8rNN";

        fn key(base64: &str) -> keys::PublicKey {
            keys::parse_public_key_base64(base64).unwrap()
        }

        fn handler(policy: HostKeyPolicy, known_hosts: &std::path::Path) -> SshClientHandler {
            SshClientHandler::new("10.0.0.5", 2222, policy, known_hosts)
        }

        fn recorded_lines(path: &std::path::Path) -> usize {
            fs::read_to_string(path)
                .map(|contents| contents.lines().filter(|l| !l.trim().is_empty()).count())
                .unwrap_or(0)
        }

        #[tokio::test]
        async fn test_tofu_records_unknown_host_key() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("known_hosts");
            fs::write(&path, "").unwrap();

            let mut handler = handler(HostKeyPolicy::TrustOnFirstUse, &path);
            assert!(handler.check_server_key(&key(FIRST_KEY)).await.unwrap());

            let contents = fs::read_to_string(&path).unwrap();
            assert_eq!(recorded_lines(&path), 1);
            assert!(contents.contains("10.0.0.5"));
            assert!(contents.contains(FIRST_KEY));
        }

        #[tokio::test]
        async fn test_tofu_accepts_learned_key_again() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("known_hosts");

            let mut first = handler(HostKeyPolicy::TrustOnFirstUse, &path);
            assert!(first.check_server_key(&key(FIRST_KEY)).await.unwrap());

            let mut second = handler(HostKeyPolicy::TrustOnFirstUse, &path);
            assert!(second.check_server_key(&key(FIRST_KEY)).await.unwrap());
            assert_eq!(recorded_lines(&path), 1);
        }

        #[tokio::test]
        async fn test_tofu_rejects_changed_key() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("known_hosts");

            let mut handler = handler(HostKeyPolicy::TrustOnFirstUse, &path);
            assert!(handler.check_server_key(&key(FIRST_KEY)).await.unwrap());
            assert!(!handler.check_server_key(&key(SECOND_KEY)).await.unwrap());

            let contents = fs::read_to_string(&path).unwrap();
            assert_eq!(recorded_lines(&path), 1);
            assert!(!contents.contains(SECOND_KEY));
        }

        #[tokio::test]
        async fn test_pinned_rejects_host_missing_from_file() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("known_hosts");
            fs::write(&path, "").unwrap();

            let mut handler = handler(HostKeyPolicy::PinnedKnownHosts, &path);
            assert!(!handler.check_server_key(&key(FIRST_KEY)).await.unwrap());
            assert_eq!(recorded_lines(&path), 0);
        }

        #[tokio::test]
        async fn test_pinned_accepts_key_learned_earlier() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("known_hosts");

            let mut tofu = handler(HostKeyPolicy::TrustOnFirstUse, &path);
            assert!(tofu.check_server_key(&key(FIRST_KEY)).await.unwrap());

            let mut pinned = handler(HostKeyPolicy::PinnedKnownHosts, &path);
            assert!(pinned.check_server_key(&key(FIRST_KEY)).await.unwrap());
        }

        #[tokio::test]
        async fn test_accept_any_leaves_file_alone() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("known_hosts");

            let mut handler = handler(HostKeyPolicy::AcceptAny, &path);
            assert!(handler.check_server_key(&key(SECOND_KEY)).await.unwrap());
            assert!(!path.exists());
        }
    }

    #[test]
    fn test_handler_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<SshClientHandler>();
    }
}
