//! Session limits

use serde::Deserialize;

use crate::error::{CryptoError, Result};

/// Default maximum number of message keys derived for one gap.
pub const DEFAULT_MAX_SKIP: u32 = 2000;

/// Default maximum number of skipped keys held per session.
pub const DEFAULT_MAX_CACHED_KEYS: usize = 4000;

/// Per-session resource limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Largest counter gap a single header may ask us to skip.
    pub max_skip: u32,
    /// Largest number of skipped keys cached per session.
    pub max_cached_keys: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_skip: DEFAULT_MAX_SKIP,
            max_cached_keys: DEFAULT_MAX_CACHED_KEYS,
        }
    }
}

impl SessionConfig {
    /// Check that the limits are usable together.
    pub fn validate(&self) -> Result<()> {
        if self.max_skip == 0 {
            return Err(CryptoError::InvalidConfig(
                "max_skip must be positive".to_string(),
            ));
        }
        if self.max_cached_keys < self.max_skip as usize {
            return Err(CryptoError::InvalidConfig(format!(
                "max_cached_keys ({}) must be at least max_skip ({})",
                self.max_cached_keys, self.max_skip
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(SessionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_deserialize_fills_missing_fields() {
        #[derive(serde::Serialize)]
        struct Partial {
            max_skip: u32,
        }

        let encoded = rmp_serde::to_vec_named(&Partial { max_skip: 64 }).unwrap();
        let config: SessionConfig = rmp_serde::from_slice(&encoded).unwrap();
        assert_eq!(config.max_skip, 64);
        assert_eq!(config.max_cached_keys, DEFAULT_MAX_CACHED_KEYS);
        assert!(config.validate().is_ok());

        let empty = rmp_serde::to_vec_named(&std::collections::HashMap::<String, u32>::new()).unwrap();
        let config: SessionConfig = rmp_serde::from_slice(&empty).unwrap();
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn test_invalid_limits_rejected() {
        let zero = SessionConfig {
            max_skip: 0,
            ..SessionConfig::default()
        };
        assert!(matches!(zero.validate(), Err(CryptoError::InvalidConfig(_))));

        let small_cache = SessionConfig {
            max_skip: 100,
            max_cached_keys: 99,
        };
        assert!(matches!(
            small_cache.validate(),
            Err(CryptoError::InvalidConfig(_))
        ));
    }
}
