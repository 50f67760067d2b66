//! Escrow tool configuration

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use custos_shared::SessionConfig;

/// Default location of the escrow secret key file
pub const DEFAULT_KEY_PATH: &str = "./escrow.key";

/// Escrow tool configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscrowConfig {
    /// Path of the hex-encoded escrow secret key
    pub key_path: PathBuf,
    /// Session limits used by the simulator
    pub session: SessionConfig,
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            key_path: PathBuf::from(DEFAULT_KEY_PATH),
            session: SessionConfig::default(),
        }
    }
}

impl EscrowConfig {
    /// Load configuration from `.env` and environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = SessionConfig::default();

        let config = EscrowConfig {
            key_path: lookup("CUSTOS_ESCROW_KEY")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_KEY_PATH)),
            session: SessionConfig {
                max_skip: match lookup("CUSTOS_MAX_SKIP") {
                    Some(value) => value.parse().context("Invalid CUSTOS_MAX_SKIP")?,
                    None => defaults.max_skip,
                },
                max_cached_keys: match lookup("CUSTOS_MAX_CACHED_KEYS") {
                    Some(value) => value.parse().context("Invalid CUSTOS_MAX_CACHED_KEYS")?,
                    None => defaults.max_cached_keys,
                },
            },
        };

        config
            .session
            .validate()
            .context("Invalid session limits")?;
        Ok(config)
    }

    /// Session limits with command-line overrides applied
    pub fn session_with(
        &self,
        max_skip: Option<u32>,
        max_cached_keys: Option<usize>,
    ) -> Result<SessionConfig> {
        let session = SessionConfig {
            max_skip: max_skip.unwrap_or(self.session.max_skip),
            max_cached_keys: max_cached_keys.unwrap_or(self.session.max_cached_keys),
        };
        session.validate().context("Invalid session limits")?;
        Ok(session)
    }
}
