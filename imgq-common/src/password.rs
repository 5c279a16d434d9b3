//! Password hashing for the users table
//!
//! Credentials are stored as `password_hash` + `password_salt` columns.
//! Hash = hex of SHA-256(salt || ":" || password), re-hashed together with
//! the password `HASH_ROUNDS` times.

use rand::RngCore;
use sha2::{Digest, Sha256};

/// Salt length in bytes
const SALT_LEN: usize = 16;

/// Extra SHA-256 rounds applied after the salted digest
pub const HASH_ROUNDS: u32 = 10_000;

/// Generate a random salt, hex encoded
pub fn generate_salt() -> String {
    let mut bytes = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn salted_digest(password: &str, salt: &str, rounds: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    let mut digest = hasher.finalize();
    for _ in 0..rounds {
        let mut hasher = Sha256::new();
        hasher.update(digest);
        hasher.update(password.as_bytes());
        digest = hasher.finalize();
    }
    format!("{:x}", digest)
}

/// Hash a password with the given salt
pub fn hash_password(password: &str, salt: &str) -> String {
    salted_digest(password, salt, HASH_ROUNDS)
}

/// Check a password against a stored hash
pub fn verify_password(password: &str, salt: &str, expected_hash: &str) -> bool {
    let calculated = hash_password(password, salt);
    // Compare every byte regardless of where the first mismatch is
    calculated.len() == expected_hash.len()
        && calculated
            .bytes()
            .zip(expected_hash.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_salt_is_hex_and_random() {
        let a = generate_salt();
        let b = generate_salt();
        assert_eq!(a.len(), SALT_LEN * 2);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_is_deterministic_per_salt() {
        let h1 = hash_password("secret", "abc");
        let h2 = hash_password("secret", "abc");
        let h3 = hash_password("secret", "abd");
        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn test_hash_is_stretched() {
        let single = salted_digest("secret", "abc", 0);
        assert_ne!(hash_password("secret", "abc"), single);
        assert_eq!(salted_digest("secret", "abc", HASH_ROUNDS), hash_password("secret", "abc"));
    }

    #[test]
    fn test_verify_password() {
        let salt = generate_salt();
        let hash = hash_password("hunter2", &salt);
        assert!(verify_password("hunter2", &salt, &hash));
        assert!(!verify_password("hunter3", &salt, &hash));
        assert!(!verify_password("hunter2", &salt, ""));
    }
}
