//! Credential and password services.
//!
//! Both are traits so the HTTP layer and the engine only see capabilities;
//! `HmacCredentials` and `Pbkdf2Hasher` are the implementations wired in by
//! `main`.

mod credentials;
mod password;

pub use credentials::{
    Claims, CredentialError, CredentialService, HmacCredentials, Subject, TokenKind, TOKEN_PREFIX,
};
pub use password::{PasswordHasher, Pbkdf2Hasher, DEFAULT_ITERATIONS};
