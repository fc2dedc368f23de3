//! Credential resolution.
//!
//! A request names its account and presents a credential. The resolver
//! only answers whether the credential is good for that account; the
//! account id alone then locates the store.
//!
//! ## Token Format
//!
//! [`TokenResolver`] tokens are hex strings of:
//! - 8 bytes: issue time (hundredths of a second, big-endian)
//! - 32 bytes: HMAC-SHA256 over `account id || issue time`
//!
//! Total: 40 bytes, 80 hex characters.

use crate::error::{ServerError, ServerResult};
use bsostore_core::{AccountId, Clock, Timestamp};
use hmac::{Hmac, Mac};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_LEN: usize = 40;

/// Decides whether a credential is valid for an account.
pub trait CredentialResolver: Send + Sync {
    /// Returns true if `credential` grants access to `account`.
    fn verify(&self, account: &AccountId, credential: &[u8]) -> bool;
}

/// Accepts every credential. For local, single-user setups.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl CredentialResolver for AllowAll {
    fn verify(&self, _account: &AccountId, _credential: &[u8]) -> bool {
        true
    }
}

/// Signed, expiring tokens bound to an account id.
pub struct TokenResolver {
    secret: Vec<u8>,
    token_expiry: Duration,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for TokenResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResolver")
            .field("token_expiry", &self.token_expiry)
            .finish_non_exhaustive()
    }
}

impl TokenResolver {
    /// Creates a resolver with a 24 hour token lifetime.
    pub fn new(secret: Vec<u8>, clock: Arc<dyn Clock>) -> Self {
        Self {
            secret,
            token_expiry: Duration::from_secs(24 * 60 * 60),
            clock,
        }
    }

    /// Sets the token lifetime.
    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.token_expiry = expiry;
        self
    }

    fn mac(&self, account: &AccountId, issued: &[u8]) -> ServerResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| ServerError::InvalidRequest(format!("unusable token secret: {e}")))?;
        mac.update(account.as_str().as_bytes());
        mac.update(issued);
        Ok(mac)
    }

    /// Issues a token for `account`.
    pub fn issue(&self, account: &AccountId) -> ServerResult<String> {
        let issued = self.clock.now().as_centis().to_be_bytes();
        let signature = self.mac(account, &issued)?.finalize().into_bytes();

        let mut token = Vec::with_capacity(TOKEN_LEN);
        token.extend_from_slice(&issued);
        token.extend_from_slice(&signature);
        Ok(hex::encode(token))
    }

    /// Checks a token.
    pub fn validate(&self, account: &AccountId, token: &str) -> ServerResult<()> {
        let raw = hex::decode(token.trim())
            .map_err(|_| ServerError::NotAuthorized("token is not hex".into()))?;
        if raw.len() != TOKEN_LEN {
            return Err(ServerError::NotAuthorized("invalid token length".into()));
        }
        let (issued, signature) = raw.split_at(8);

        self.mac(account, issued)?
            .verify_slice(signature)
            .map_err(|_| ServerError::NotAuthorized("invalid signature".into()))?;

        let mut issued_bytes = [0u8; 8];
        issued_bytes.copy_from_slice(issued);
        let issued = Timestamp::from_centis(u64::from_be_bytes(issued_bytes));
        let lifetime = u64::try_from(self.token_expiry.as_millis() / 10).unwrap_or(u64::MAX);
        if self.clock.now().centis_since(issued) > lifetime {
            return Err(ServerError::NotAuthorized("token expired".into()));
        }
        Ok(())
    }
}

impl CredentialResolver for TokenResolver {
    fn verify(&self, account: &AccountId, credential: &[u8]) -> bool {
        let Ok(token) = std::str::from_utf8(credential) else {
            return false;
        };
        match self.validate(account, token) {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!(account = %account, error = %err, "token rejected");
                false
            }
        }
    }
}

/// Fixed table of account passwords, stored as SHA-256 digests.
#[derive(Debug, Default)]
pub struct StaticResolver {
    digests: RwLock<HashMap<AccountId, [u8; 32]>>,
}

fn digest(password: &[u8]) -> [u8; 32] {
    Sha256::digest(password).into()
}

impl StaticResolver {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an account, builder style.
    pub fn with_account(self, account: AccountId, password: &str) -> Self {
        self.set_password(account, password);
        self
    }

    /// Adds or replaces an account's password.
    pub fn set_password(&self, account: AccountId, password: &str) {
        self.digests.write().insert(account, digest(password.as_bytes()));
    }

    /// Removes an account.
    pub fn remove(&self, account: &AccountId) -> bool {
        self.digests.write().remove(account).is_some()
    }
}

impl CredentialResolver for StaticResolver {
    fn verify(&self, account: &AccountId, credential: &[u8]) -> bool {
        let presented = digest(credential);
        self.digests.read().get(account).is_some_and(|stored| {
            stored
                .iter()
                .zip(presented.iter())
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
        })
    }
}
