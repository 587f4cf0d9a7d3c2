//! Password hashing.
//!
//! Digests are PBKDF2-HMAC-SHA256 with a random salt, encoded as
//! `pbkdf2-sha256$<iterations>$<salt>$<hash>` (standard base64, no padding) so
//! the work factor can be raised without invalidating stored passwords.

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use rand::Rng;
use sha2::Sha256;
use subtle::ConstantTimeEq;

const SCHEME: &str = "pbkdf2-sha256";
const SALT_BYTES: usize = 16;
const HASH_BYTES: usize = 32;

pub const DEFAULT_ITERATIONS: u32 = 100_000;

pub trait PasswordHasher: Send + Sync {
    fn hash(&self, plaintext: &str) -> String;

    /// False for a wrong password and for a digest this hasher cannot read.
    fn verify(&self, plaintext: &str, digest: &str) -> bool;
}

#[derive(Debug, Clone)]
pub struct Pbkdf2Hasher {
    iterations: u32,
}

impl Default for Pbkdf2Hasher {
    fn default() -> Self {
        Self::new(DEFAULT_ITERATIONS)
    }
}

impl Pbkdf2Hasher {
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: iterations.max(1),
        }
    }
}

fn derive(plaintext: &str, salt: &[u8], iterations: u32) -> [u8; HASH_BYTES] {
    let mut out = [0u8; HASH_BYTES];
    pbkdf2::pbkdf2_hmac::<Sha256>(plaintext.as_bytes(), salt, iterations, &mut out);
    out
}

impl PasswordHasher for Pbkdf2Hasher {
    fn hash(&self, plaintext: &str) -> String {
        let mut salt = [0u8; SALT_BYTES];
        rand::rng().fill(&mut salt);
        let hash = derive(plaintext, &salt, self.iterations);
        format!(
            "{SCHEME}${}${}${}",
            self.iterations,
            STANDARD_NO_PAD.encode(salt),
            STANDARD_NO_PAD.encode(hash)
        )
    }

    fn verify(&self, plaintext: &str, digest: &str) -> bool {
        let mut parts = digest.split('$');
        let (Some(SCHEME), Some(iterations), Some(salt), Some(expected), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return false;
        };

        let Ok(iterations) = iterations.parse::<u32>() else {
            return false;
        };
        let (Ok(salt), Ok(expected)) = (
            STANDARD_NO_PAD.decode(salt),
            STANDARD_NO_PAD.decode(expected),
        ) else {
            return false;
        };
        if iterations == 0 || expected.len() != HASH_BYTES {
            return false;
        }

        let actual = derive(plaintext, &salt, iterations);
        actual.ct_eq(expected.as_slice()).into()
    }
}
