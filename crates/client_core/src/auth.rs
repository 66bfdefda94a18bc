use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use shared::domain::User;
use tracing::{info, warn};

/// Session collaborator that owns the current user and the local unlock step.
#[async_trait]
pub trait AuthSession: Send + Sync {
    async fn current_user(&self) -> Option<User>;
    /// True when a previous unlock in this session already succeeded.
    async fn is_unlocked(&self) -> bool;
    /// `Ok(false)` means the secret was rejected; `Err` means verification
    /// itself could not run.
    async fn unlock(&self, secret: &str) -> Result<bool>;
}

/// Session gated by a locally held PIN. Only the SHA-256 digest of the PIN
/// is retained.
pub struct LocalPinSession {
    user: Option<User>,
    pin_digest: Option<[u8; 32]>,
    unlocked: AtomicBool,
}

impl LocalPinSession {
    pub fn new(user: User, pin: &str) -> Self {
        Self {
            user: Some(user),
            pin_digest: Some(digest(pin)),
            unlocked: AtomicBool::new(false),
        }
    }

    /// A session with no signed-in user. It never unlocks.
    pub fn anonymous() -> Self {
        Self {
            user: None,
            pin_digest: None,
            unlocked: AtomicBool::new(false),
        }
    }

    pub fn already_unlocked(self) -> Self {
        self.unlocked.store(self.pin_digest.is_some(), Ordering::SeqCst);
        self
    }
}

fn digest(secret: &str) -> [u8; 32] {
    Sha256::digest(secret.as_bytes()).into()
}

#[async_trait]
impl AuthSession for LocalPinSession {
    async fn current_user(&self) -> Option<User> {
        self.user.clone()
    }

    async fn is_unlocked(&self) -> bool {
        self.unlocked.load(Ordering::SeqCst)
    }

    async fn unlock(&self, secret: &str) -> Result<bool> {
        let Some(expected) = self.pin_digest else {
            warn!("auth: unlock attempted without a signed-in user");
            return Ok(false);
        };

        let accepted = digest(secret) == expected;
        if accepted {
            self.unlocked.store(true, Ordering::SeqCst);
            info!(
                "auth: unlocked user={}",
                self.user.as_ref().map(|u| u.username.as_str()).unwrap_or("-")
            );
        } else {
            warn!("auth: pin rejected");
        }
        Ok(accepted)
    }
}

#[cfg(test)]
#[path = "tests/auth_tests.rs"]
mod tests;
