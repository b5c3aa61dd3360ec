//! Authentication strategy trait definition.

use async_trait::async_trait;
use russh::client;

use crate::session::SshClientHandler;

/// Trait for SSH authentication strategies.
#[async_trait]
pub trait AuthStrategy: Send + Sync {
    /// Attempt to authenticate with the SSH server.
    ///
    /// * `Ok(true)` - Authentication succeeded
    /// * `Ok(false)` - Credentials rejected
    /// * `Err(message)` - Error during the authentication exchange
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<bool, String>;

    /// Name used in log lines.
    fn name(&self) -> &'static str;
}
