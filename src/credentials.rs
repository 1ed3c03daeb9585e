use anyhow::anyhow;
use argon2::password_hash::rand_core::{OsRng, RngCore};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

/// One-way credential hashing. Implementations must be salted and slow.
pub trait CredentialHasher {
    fn hash(&self, secret: &str) -> anyhow::Result<String>;
    fn verify(&self, secret: &str, digest: &str) -> bool;
    /// A digest no real secret matches, verified against when the account
    /// does not exist so both failure paths do the same work.
    fn decoy_digest(&self) -> &str;
}

pub struct Argon2Hasher {
    decoy: String,
}

impl Argon2Hasher {
    pub fn new() -> anyhow::Result<Self> {
        let mut noise = [0u8; 32];
        OsRng.fill_bytes(&mut noise);
        let decoy = hash_with_argon2(&noise)?;
        Ok(Self { decoy })
    }
}

fn hash_with_argon2(secret: &[u8]) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret, &salt)
        .map(|h| h.to_string())
        .map_err(|e| anyhow!("password hashing failed: {e}"))
}

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, secret: &str) -> anyhow::Result<String> {
        hash_with_argon2(secret.as_bytes())
    }

    fn verify(&self, secret: &str, digest: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(digest) else {
            return false;
        };
        Argon2::default()
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok()
    }

    fn decoy_digest(&self) -> &str {
        &self.decoy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_salted_and_verifiable() {
        let h = Argon2Hasher::new().expect("hasher");
        let a = h.hash("correct horse").expect("hash a");
        let b = h.hash("correct horse").expect("hash b");
        assert_ne!(a, b);
        assert!(a.starts_with("$argon2"));
        assert!(!a.contains("correct horse"));
        assert!(h.verify("correct horse", &a));
        assert!(h.verify("correct horse", &b));
        assert!(!h.verify("wrong horse", &a));
    }

    #[test]
    fn malformed_digest_never_verifies() {
        let h = Argon2Hasher::new().expect("hasher");
        assert!(!h.verify("anything", "not-a-phc-string"));
        assert!(!h.verify("", h.decoy_digest()));
    }
}
