use argon2::Config;
use rand::Rng;

use crate::error::{Error, Result};

/// Hashes and checks staff passwords.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> Result<String>;

    /// Whether `password` matches `hash`. A malformed hash never matches.
    fn compare(&self, password: &str, hash: &str) -> bool;
}

/// Argon2 with default parameters and a random salt per password.
#[derive(Debug, Default, Clone, Copy)]
pub struct Argon2Hasher;

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, password: &str) -> Result<String> {
        // 16 bytes is recommended for password hashing:
        //  https://en.wikipedia.org/wiki/Argon2
        let mut salt = [0_u8; 16];
        rand::thread_rng().fill(&mut salt);
        argon2::hash_encoded(password.as_bytes(), &salt, &Config::default())
            .map_err(|e| Error::Internal(format!("Password hashing failed: {e}")))
    }

    fn compare(&self, password: &str, hash: &str) -> bool {
        argon2::verify_encoded(hash, password.as_bytes()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_compare() {
        let hasher = Argon2Hasher;
        let hash = hasher.hash("correct horse").unwrap();
        assert!(hasher.compare("correct horse", &hash));
        assert!(!hasher.compare("battery staple", &hash));
    }

    #[test]
    fn salts_differ() {
        let hasher = Argon2Hasher;
        assert_ne!(hasher.hash("same").unwrap(), hasher.hash("same").unwrap());
    }

    #[test]
    fn malformed_hash_never_matches() {
        assert!(!Argon2Hasher.compare("anything", "not a hash"));
    }
}
