//! Salted, stretched password references for the credential table.
//!
//! Stored format: `sha256$<iterations>$<salt_hex>$<digest_hex>`. Anything
//! else, including legacy plaintext values, never verifies.

use anyhow::{bail, Result};
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

const SCHEME: &str = "sha256";
const SALT_LEN: usize = 16;
pub const DEFAULT_ITERATIONS: u32 = 100_000;
/// References asking for more rounds than this are rejected outright.
pub const MAX_ITERATIONS: u32 = 10 * DEFAULT_ITERATIONS;

pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    hash_with(password, &salt, DEFAULT_ITERATIONS)
}

/// Hashes one password read from a line of input, without its line ending.
pub fn hash_from_input(raw: &str) -> Result<String> {
    let password = raw.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        bail!("refusing to hash an empty password");
    }
    Ok(hash_password(password))
}

pub fn hash_with(password: &str, salt: &[u8], iterations: u32) -> String {
    let digest = stretch(password.as_bytes(), salt, iterations);
    format!(
        "{SCHEME}${iterations}${}${}",
        hex::encode(salt),
        hex::encode(digest)
    )
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some(reference) = StoredReference::parse(stored) else {
        return false;
    };

    let candidate = stretch(password.as_bytes(), &reference.salt, reference.iterations);
    candidate.as_slice().ct_eq(&reference.digest).into()
}

struct StoredReference {
    iterations: u32,
    salt: Vec<u8>,
    digest: Vec<u8>,
}

impl StoredReference {
    fn parse(stored: &str) -> Option<Self> {
        let mut parts = stored.split('$');
        if parts.next()? != SCHEME {
            return None;
        }
        let iterations: u32 = parts.next()?.parse().ok()?;
        let salt = hex::decode(parts.next()?).ok()?;
        let digest = hex::decode(parts.next()?).ok()?;
        if parts.next().is_some()
            || iterations == 0
            || iterations > MAX_ITERATIONS
            || salt.is_empty()
            || digest.len() != 32
        {
            return None;
        }
        Some(Self {
            iterations,
            salt,
            digest,
        })
    }
}

fn stretch(password: &[u8], salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut digest: [u8; 32] = Sha256::new()
        .chain_update(salt)
        .chain_update(password)
        .finalize()
        .into();
    for _ in 1..iterations {
        digest = Sha256::new()
            .chain_update(digest)
            .chain_update(salt)
            .finalize()
            .into();
    }
    digest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashed_password_verifies() {
        let stored = hash_with("correct", b"0123456789abcdef", 1_000);

        assert!(stored.starts_with("sha256$1000$"));
        assert!(verify_password("correct", &stored));
        assert!(!verify_password("wrong", &stored));
        assert!(!verify_password("Correct", &stored));
    }

    #[test]
    fn salt_changes_the_reference() {
        let a = hash_password("correct");
        let b = hash_password("correct");

        assert_ne!(a, b);
        assert!(verify_password("correct", &a));
        assert!(verify_password("correct", &b));
    }

    #[test]
    fn plaintext_and_garbled_references_never_verify() {
        let valid = hash_with("correct", b"salt", 10);
        let truncated = &valid[..valid.len() - 2];
        let zero_rounds = valid.replacen("$10$", "$0$", 1);
        for stored in [
            "correct",
            "",
            "sha256$",
            "md5$10$73616c74$00",
            truncated,
            zero_rounds.as_str(),
        ] {
            assert!(!verify_password("correct", stored), "{stored}");
        }
    }

    #[test]
    fn references_above_the_round_cap_never_verify() {
        let at_cap = hash_with("correct", b"salt", 10);
        let over_cap = at_cap.replacen("$10$", &format!("${}$", MAX_ITERATIONS + 1), 1);

        assert!(verify_password("correct", &at_cap));
        assert!(!verify_password("correct", &over_cap));
    }

    #[test]
    fn input_line_is_hashed_without_its_newline() {
        let stored = hash_from_input("hunter2\r\n").unwrap();

        assert!(stored.starts_with(&format!("sha256${DEFAULT_ITERATIONS}$")));
        assert!(verify_password("hunter2", &stored));
        assert!(hash_from_input("\n").is_err());
    }
}
