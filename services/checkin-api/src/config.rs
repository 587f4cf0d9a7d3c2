use std::net::SocketAddr;

use anyhow::{bail, Context, Result};

use crate::db::DbConfig;

/// Which document store backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    Memory,
}

impl StoreKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "pg" => Some(StoreKind::Postgres),
            "memory" | "mem" => Some(StoreKind::Memory),
            _ => None,
        }
    }
}

/// Default admin account created at startup when no admin exists.
#[derive(Debug, Clone)]
pub struct AdminSeed {
    pub email: String,
    pub name: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: String,
    pub dev_mode: bool,
    pub store: StoreKind,
    pub database: DbConfig,
    /// HMAC key for bearer credentials. `None` only in dev mode, where a
    /// random per-process key is used.
    pub token_secret: Option<String>,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    pub admin: AdminSeed,
    pub live_capacity: usize,
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(false)
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{name} has an invalid value: {raw}")),
        Err(_) => Ok(default),
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let listen_addr = std::env::var("CHECKIN_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .context("CHECKIN_LISTEN_ADDR is not a socket address")?;

        let log_level = std::env::var("CHECKIN_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let dev_mode = env_flag("CHECKIN_DEV");

        let store = match std::env::var("CHECKIN_STORE") {
            Ok(raw) => match StoreKind::parse(&raw) {
                Some(kind) => kind,
                None => bail!("CHECKIN_STORE must be 'postgres' or 'memory', got '{raw}'"),
            },
            Err(_) => StoreKind::Postgres,
        };

        let defaults = DbConfig::default();
        let database = DbConfig {
            database_url: env_non_empty("DATABASE_URL").unwrap_or(defaults.database_url),
            max_connections: env_parse("CHECKIN_DB_MAX_CONNECTIONS", defaults.max_connections)?,
            min_connections: env_parse("CHECKIN_DB_MIN_CONNECTIONS", defaults.min_connections)?,
            acquire_timeout: std::time::Duration::from_secs(env_parse(
                "CHECKIN_DB_ACQUIRE_TIMEOUT_SECS",
                defaults.acquire_timeout.as_secs(),
            )?),
            migrations_dir: env_non_empty("CHECKIN_MIGRATIONS_DIR")
                .map(Into::into)
                .unwrap_or(defaults.migrations_dir),
        };
        if database.min_connections > database.max_connections {
            bail!("CHECKIN_DB_MIN_CONNECTIONS exceeds CHECKIN_DB_MAX_CONNECTIONS");
        }

        let token_secret = env_non_empty("CHECKIN_TOKEN_SECRET");
        if token_secret.is_none() && !dev_mode {
            bail!("CHECKIN_TOKEN_SECRET is required outside dev mode");
        }

        let access_token_ttl_secs = env_parse("CHECKIN_ACCESS_TOKEN_TTL_SECS", 900)?;
        let refresh_token_ttl_secs = env_parse("CHECKIN_REFRESH_TOKEN_TTL_SECS", 604_800)?;

        let admin_password = match env_non_empty("CHECKIN_ADMIN_PASSWORD") {
            Some(password) => password,
            None if dev_mode => "admin".to_string(),
            None => bail!("CHECKIN_ADMIN_PASSWORD is required outside dev mode"),
        };
        let admin = AdminSeed {
            email: env_non_empty("CHECKIN_ADMIN_EMAIL")
                .unwrap_or_else(|| "admin@example.com".to_string()),
            name: env_non_empty("CHECKIN_ADMIN_NAME").unwrap_or_else(|| "Admin".to_string()),
            password: admin_password,
        };

        let live_capacity = env_parse("CHECKIN_LIVE_CAPACITY", 64)?;

        Ok(Self {
            listen_addr,
            log_level,
            dev_mode,
            store,
            database,
            token_secret,
            access_token_ttl_secs,
            refresh_token_ttl_secs,
            admin,
            live_capacity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("postgres", Some(StoreKind::Postgres))]
    #[case(" Memory ", Some(StoreKind::Memory))]
    #[case("mem", Some(StoreKind::Memory))]
    #[case("sqlite", None)]
    fn test_store_kind_parse(#[case] raw: &str, #[case] expected: Option<StoreKind>) {
        assert_eq!(StoreKind::parse(raw), expected);
    }
}
