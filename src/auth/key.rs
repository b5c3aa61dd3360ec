//! Private key file authentication.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use russh::{client, keys};
use tracing::debug;

use super::traits::AuthStrategy;
use crate::error::{QsshError, Result};
use crate::session::SshClientHandler;

/// Private key file authentication strategy.
///
/// Only passphrase-less keys are supported.
pub struct KeyAuth {
    key_path: PathBuf,
    key: Arc<keys::PrivateKey>,
}

impl KeyAuth {
    /// Read and parse the private key at `key_path`.
    pub fn load(key_path: impl Into<PathBuf>) -> Result<Self> {
        let key_path = key_path.into();
        let key = keys::load_secret_key(&key_path, None).map_err(|e| QsshError::Credential {
            path: key_path.clone(),
            message: e.to_string(),
        })?;

        debug!("Loaded private key from {}", key_path.display());
        Ok(Self {
            key_path,
            key: Arc::new(key),
        })
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }
}

#[async_trait]
impl AuthStrategy for KeyAuth {
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<bool, String> {
        // For RSA keys, use the best supported hash algorithm
        let hash_alg = handle
            .best_supported_rsa_hash()
            .await
            .ok()
            .flatten()
            .flatten();
        debug!("Using RSA hash algorithm for key auth: {:?}", hash_alg);

        let key_with_hash = keys::PrivateKeyWithHashAlg::new(self.key.clone(), hash_alg);

        let result = handle
            .authenticate_publickey(username, key_with_hash)
            .await
            .map_err(|e| format!("key authentication failed: {}", e))?;

        Ok(result.success())
    }

    fn name(&self) -> &'static str {
        "key"
    }
}
