use crate::errors::{Error, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, PasswordHash,
};
use rand::{distributions::Alphanumeric, Rng};

pub const API_KEY_LEN: usize = 40;

/// One-way derivation and verification of sensor ingestion secrets.
#[cfg_attr(test, mockall::automock)]
pub trait PasswordService: Send + Sync {
    fn hash_password(&self, password: &str) -> Result<String>;

    /// `Ok(false)` for a mismatch; `Err` only when `hash` is not a usable hash.
    fn verify_password(&self, password: &str, hash: &str) -> Result<bool>;
}

/// Argon2id with default parameters, storing PHC strings.
#[derive(Debug, Default, Clone, Copy)]
pub struct Argon2PasswordService;

impl Argon2PasswordService {
    pub fn new() -> Self {
        Self
    }
}

impl PasswordService for Argon2PasswordService {
    fn hash_password(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| Error::PasswordHash(e.to_string()))
    }

    fn verify_password(&self, password: &str, hash: &str) -> Result<bool> {
        let parsed = PasswordHash::new(hash).map_err(|e| Error::PasswordHash(e.to_string()))?;

        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }
}

/// Generates a fresh sensor API key from the OS-seeded thread RNG.
pub fn generate_api_key() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(API_KEY_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_phc_string() {
        let hash = Argon2PasswordService::new().hash_password("s3cret").unwrap();
        assert!(hash.starts_with("$argon2id$"));
    }

    #[test]
    fn test_verify_round() {
        let service = Argon2PasswordService::new();
        let hash = service.hash_password("correct").unwrap();

        assert!(service.verify_password("correct", &hash).unwrap());
        assert!(!service.verify_password("wrong", &hash).unwrap());
    }

    #[test]
    fn test_salts_differ() {
        let service = Argon2PasswordService::new();
        let a = service.hash_password("same").unwrap();
        let b = service.hash_password("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_verify_garbage_hash_errors() {
        let result = Argon2PasswordService::new().verify_password("any", "not-a-hash");
        assert!(matches!(result, Err(Error::PasswordHash(_))));
    }

    #[test]
    fn test_api_key_shape() {
        let key = generate_api_key();
        assert_eq!(key.len(), API_KEY_LEN);
        assert!(key.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(key, generate_api_key());
    }
}
