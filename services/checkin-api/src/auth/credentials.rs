//! Bearer credential signing and verification.
//!
//! Token format: `chk_<claims>.<signature>`, both parts base64url without
//! padding. `claims` is the JSON encoding of [`Claims`]; `signature` is
//! HMAC-SHA256 over the encoded claims. Tokens are self-contained, so nothing
//! is stored server side.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use checkin_id::UserId;
use checkin_model::Role;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Prefix of every token this service issues.
pub const TOKEN_PREFIX: &str = "chk_";

/// Nonce bytes mixed into each token so two tokens signed in the same second differ.
const NONCE_BYTES: usize = 12;

/// What a token may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// The identity a token speaks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub id: UserId,
    pub email: String,
    pub role: Role,
}

/// Signed token contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: UserId,
    pub email: String,
    pub role: Role,
    pub kind: TokenKind,
    /// Expiry, seconds since the Unix epoch.
    pub exp: i64,
    nonce: String,
}

impl Claims {
    pub fn subject(&self) -> Subject {
        Subject {
            id: self.sub,
            email: self.email.clone(),
            role: self.role,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("token is malformed")]
    Malformed,

    #[error("token signature is invalid")]
    BadSignature,

    #[error("token has expired")]
    Expired,

    #[error("signing key cannot be empty")]
    EmptyKey,
}

/// Issues and checks bearer credentials.
pub trait CredentialService: Send + Sync {
    fn sign(&self, subject: &Subject, kind: TokenKind, ttl: Duration) -> String;

    fn verify(&self, token: &str) -> Result<Claims, CredentialError>;
}

/// HMAC-SHA256 credential service keyed by a shared secret.
#[derive(Clone)]
pub struct HmacCredentials {
    mac: HmacSha256,
}

impl HmacCredentials {
    pub fn new(secret: &[u8]) -> Result<Self, CredentialError> {
        if secret.is_empty() {
            return Err(CredentialError::EmptyKey);
        }
        let mac = HmacSha256::new_from_slice(secret).map_err(|_| CredentialError::EmptyKey)?;
        Ok(Self { mac })
    }

    fn signature(&self, payload: &str) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

impl CredentialService for HmacCredentials {
    fn sign(&self, subject: &Subject, kind: TokenKind, ttl: Duration) -> String {
        let mut nonce = [0u8; NONCE_BYTES];
        rand::rng().fill(&mut nonce);

        let claims = Claims {
            sub: subject.id,
            email: subject.email.clone(),
            role: subject.role,
            kind,
            exp: (Utc::now() + ttl).timestamp(),
            nonce: URL_SAFE_NO_PAD.encode(nonce),
        };

        // Claims hold only strings, ids and integers; encoding cannot fail.
        let json = serde_json::to_vec(&claims).unwrap_or_default();
        let payload = URL_SAFE_NO_PAD.encode(json);
        let signature = URL_SAFE_NO_PAD.encode(self.signature(&payload));
        format!("{TOKEN_PREFIX}{payload}.{signature}")
    }

    fn verify(&self, token: &str) -> Result<Claims, CredentialError> {
        let body = token
            .strip_prefix(TOKEN_PREFIX)
            .ok_or(CredentialError::Malformed)?;
        let (payload, signature) = body.split_once('.').ok_or(CredentialError::Malformed)?;

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| CredentialError::Malformed)?;
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| CredentialError::BadSignature)?;

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| CredentialError::Malformed)?;
        let claims: Claims =
            serde_json::from_slice(&json).map_err(|_| CredentialError::Malformed)?;

        if claims.exp <= Utc::now().timestamp() {
            return Err(CredentialError::Expired);
        }
        Ok(claims)
    }
}
