use std::sync::Arc;

use anyhow::{Result, anyhow};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use rand::rngs::OsRng;
use tracing::warn;

/// Argon2id memory cost in KiB.
const MEMORY_COST_KIB: u32 = 19 * 1024;
/// Argon2id passes over memory.
const TIME_COST: u32 = 2;
const LANES: u32 = 1;

/// One-way password hashing with argon2id plus a process-wide pepper.
///
/// Every digest embeds its own random salt, so hashing the same password twice
/// yields two different PHC strings that both verify. The pepper is fed to
/// argon2 as its secret input and never appears in the digest.
#[derive(Clone)]
pub struct CredentialHasher {
    pepper: Arc<[u8]>,
}

impl std::fmt::Debug for CredentialHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialHasher")
            .field("pepper", &"<redacted>")
            .finish()
    }
}

impl CredentialHasher {
    pub fn new(pepper: impl AsRef<[u8]>) -> Self {
        Self {
            pepper: Arc::from(pepper.as_ref()),
        }
    }

    fn argon2(&self) -> Result<Argon2<'_>> {
        let params = Params::new(MEMORY_COST_KIB, TIME_COST, LANES, None)
            .map_err(|e| anyhow!("Invalid argon2 parameters: {}", e))?;
        if self.pepper.is_empty() {
            return Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params));
        }
        Argon2::new_with_secret(&self.pepper, Algorithm::Argon2id, Version::V0x13, params)
            .map_err(|e| anyhow!("Failed to initialise argon2: {}", e))
    }

    /// Hash a password. Failure here is an environment problem, not a user one.
    pub fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);

        self.argon2()?
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| anyhow!("Password hashing failed: {}", e))
    }

    /// Check a password against a stored digest.
    ///
    /// Never errors: a malformed digest is simply a failed match. The
    /// comparison inside argon2 is constant-time.
    pub fn verify(&self, digest: &str, password: &str) -> bool {
        let parsed = match PasswordHash::new(digest) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Stored password digest is malformed: {}", e);
                return false;
            }
        };

        match self.argon2() {
            Ok(argon2) => argon2
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                warn!("Password verification unavailable: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> CredentialHasher {
        CredentialHasher::new("unit-test-pepper")
    }

    #[test]
    fn hash_then_verify() {
        let h = hasher();
        let digest = h.hash("correct horse").unwrap();
        assert!(h.verify(&digest, "correct horse"));
        assert!(!h.verify(&digest, "wrong horse"));
    }

    #[test]
    fn same_password_hashes_differently() {
        let h = hasher();
        let a = h.hash("password123").unwrap();
        let b = h.hash("password123").unwrap();
        assert_ne!(a, b);
        assert!(h.verify(&a, "password123"));
        assert!(h.verify(&b, "password123"));
    }

    #[test]
    fn digest_is_argon2id_phc_string() {
        let digest = hasher().hash("pw").unwrap();
        assert!(digest.starts_with("$argon2id$"));
    }

    #[test]
    fn different_pepper_does_not_verify() {
        let digest = hasher().hash("password123").unwrap();
        let other = CredentialHasher::new("another-pepper");
        assert!(!other.verify(&digest, "password123"));
    }

    #[test]
    fn malformed_digest_is_a_mismatch_not_an_error() {
        assert!(!hasher().verify("not a phc string", "anything"));
        assert!(!hasher().verify("", ""));
    }

    #[test]
    fn empty_pepper_still_hashes() {
        let h = CredentialHasher::new("");
        let digest = h.hash("pw").unwrap();
        assert!(h.verify(&digest, "pw"));
        assert!(!hasher().verify(&digest, "pw"));
    }

    #[test]
    fn debug_output_hides_pepper() {
        let rendered = format!("{:?}", hasher());
        assert!(!rendered.contains("unit-test-pepper"));
    }
}
