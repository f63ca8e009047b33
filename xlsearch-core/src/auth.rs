//! Credential checks for privileged operations

use sha2::{Digest, Sha256};

/// Decides whether a caller-supplied secret unlocks a privileged operation.
pub trait Authorizer: Send + Sync {
    fn is_authorized(&self, supplied: &str) -> bool;
}

/// Compares against one process-wide secret.
///
/// Both sides are hashed first so the comparison always walks 32 bytes,
/// whatever the inputs' lengths. An empty secret authorizes nobody.
pub struct SharedSecret {
    digest: Option<[u8; 32]>,
}

impl SharedSecret {
    pub fn new(secret: &str) -> Self {
        Self {
            digest: (!secret.is_empty()).then(|| digest(secret)),
        }
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSecret")
            .field("configured", &self.digest.is_some())
            .finish()
    }
}

impl Authorizer for SharedSecret {
    fn is_authorized(&self, supplied: &str) -> bool {
        let Some(expected) = &self.digest else {
            return false;
        };
        let supplied = digest(supplied);
        expected
            .iter()
            .zip(supplied.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

fn digest(value: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hasher.finalize().into()
}
