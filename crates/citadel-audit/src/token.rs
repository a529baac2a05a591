//! Session tokens.
//!
//! The raw token is handed to the operator once; only its SHA-256 digest is
//! stored.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A freshly issued token and its stored digest.
#[derive(Clone)]
pub struct SessionToken {
    raw: String,
    hash: String,
}

impl SessionToken {
    pub fn generate() -> Self {
        let raw = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        let hash = hash_token(&raw);
        Self { raw, hash }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn into_raw(self) -> String {
        self.raw
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionToken")
            .field("raw", &"<redacted>")
            .field("hash", &self.hash)
            .finish()
    }
}

pub fn hash_token(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    format!("{:x}", hasher.finalize())
}
