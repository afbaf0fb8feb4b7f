//! Authentication configuration from environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use jsonwebtoken::Algorithm;
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use thiserror::Error;
use tracing::{info, warn};

use crate::auth::signer::{JwtSigner, KeySource, SignerError, parse_algorithm};

/// Expired sessions older than this are purged.
pub const SESSION_RETENTION: Duration = Duration::from_secs(30 * 24 * 3600);

/// Upper bound for any configured duration (ten years).
pub const MAX_DURATION: Duration = Duration::from_secs(10 * 365 * 24 * 3600);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be a positive number of seconds up to ten years, got '{value}'")]
    InvalidDuration { var: &'static str, value: String },

    #[error(transparent)]
    Signer(#[from] SignerError),
}

/// Token signing configuration.
#[derive(Clone, Debug)]
pub struct JwtConfig {
    pub algorithm: Algorithm,
    pub keys: KeySource,
}

impl JwtConfig {
    /// Build the signer for the configured algorithm and keys.
    pub fn signer(&self) -> Result<JwtSigner, SignerError> {
        JwtSigner::new(self.algorithm, &self.keys)
    }
}

/// Maintenance worker timing.
#[derive(Clone, Copy, Debug)]
pub struct MaintenanceConfig {
    pub expire_interval: Duration,
    pub purge_interval: Duration,
    pub retention: Duration,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            expire_interval: Duration::from_secs(300),
            purge_interval: Duration::from_secs(3600),
            retention: SESSION_RETENTION,
        }
    }
}

/// Session, token and maintenance settings.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub session_lifetime: Duration,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub jwt: JwtConfig,
    pub maintenance: MaintenanceConfig,
}

impl AuthConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                       | Default                          |
    /// |--------------------------------|----------------------------------|
    /// | `SESSION_LIFETIME_SECS`        | `86400`                          |
    /// | `ACCESS_TOKEN_TTL_SECS`        | `900`                            |
    /// | `REFRESH_TOKEN_TTL_SECS`       | `604800`                         |
    /// | `JWT_ALGORITHM`                | `HS256`                          |
    /// | `JWT_SECRET` / `AUTH_SECRET`   | generated & persisted to file    |
    /// | `JWT_KEY_DIR`                  | `<data dir>/tessera/keys`        |
    /// | `JWT_PRIVATE_KEY`              | `private.pem`                    |
    /// | `JWT_PUBLIC_KEY`               | `public.pem`                     |
    /// | `SESSION_EXPIRE_INTERVAL_SECS` | `300`                            |
    /// | `SESSION_PURGE_INTERVAL_SECS`  | `3600`                           |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`AuthConfig::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secs = |var: &'static str, default: u64| seconds(&lookup, var, default);
        let defaults = MaintenanceConfig::default();

        Ok(Self {
            session_lifetime: secs("SESSION_LIFETIME_SECS", 24 * 3600)?,
            access_token_ttl: secs("ACCESS_TOKEN_TTL_SECS", 15 * 60)?,
            refresh_token_ttl: secs("REFRESH_TOKEN_TTL_SECS", 7 * 24 * 3600)?,
            jwt: jwt_config(&lookup)?,
            maintenance: MaintenanceConfig {
                expire_interval: secs(
                    "SESSION_EXPIRE_INTERVAL_SECS",
                    defaults.expire_interval.as_secs(),
                )?,
                purge_interval: secs(
                    "SESSION_PURGE_INTERVAL_SECS",
                    defaults.purge_interval.as_secs(),
                )?,
                retention: defaults.retention,
            },
        })
    }
}

fn seconds<F>(lookup: &F, var: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(var).filter(|v| !v.trim().is_empty()) else {
        return Ok(Duration::from_secs(default));
    };
    match raw.trim().parse::<u64>() {
        Ok(n) if n > 0 && n <= MAX_DURATION.as_secs() => Ok(Duration::from_secs(n)),
        _ => Err(ConfigError::InvalidDuration { var, value: raw }),
    }
}

fn jwt_config<F>(lookup: &F) -> Result<JwtConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let algorithm = match lookup("JWT_ALGORITHM").filter(|v| !v.trim().is_empty()) {
        Some(name) => parse_algorithm(&name)?,
        None => Algorithm::HS256,
    };

    let hmac = matches!(
        algorithm,
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
    );
    let keys = if hmac {
        KeySource::Secret(resolve_jwt_secret(lookup).into_bytes())
    } else {
        KeySource::Files {
            base_dir: lookup("JWT_KEY_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| data_dir().join("keys")),
            private_key: lookup("JWT_PRIVATE_KEY")
                .unwrap_or_else(|| "private.pem".into())
                .into(),
            public_key: lookup("JWT_PUBLIC_KEY")
                .unwrap_or_else(|| "public.pem".into())
                .into(),
        }
    };

    Ok(JwtConfig { algorithm, keys })
}

/// Resolve the HMAC secret: `JWT_SECRET` → `AUTH_SECRET` → persisted file.
pub fn resolve_jwt_secret<F>(lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    for var in ["JWT_SECRET", "AUTH_SECRET"] {
        if let Some(secret) = lookup(var)
            && !secret.is_empty()
        {
            return secret;
        }
    }
    load_or_generate_secret(&data_dir().join("jwt-secret"))
}

/// Read the secret at `path`, generating and persisting a new one if absent.
pub fn load_or_generate_secret(path: &Path) -> String {
    if let Ok(existing) = std::fs::read_to_string(path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let secret: String = rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    if let Some(parent) = path.parent()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        warn!(path = %parent.display(), error = %e, "cannot create secret directory");
    }
    match std::fs::write(path, &secret) {
        Ok(()) => info!(path = %path.display(), "generated new JWT secret"),
        Err(e) => warn!(path = %path.display(), error = %e, "JWT secret not persisted"),
    }
    secret
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tessera")
}
