//! Reactor configuration.
//!
//! Built either from the environment (`EVLOOP_BACKEND`,
//! `EVLOOP_POLL_CEILING_MS`) or programmatically through the builder
//! methods. Validation happens when a loop is created.

use std::time::Duration;

use evloop_core::env::{env_get, env_get_str};
use evloop_core::ewarn;

use crate::backend::BackendKind;
use crate::error::{ReactorError, ReactorResult};

/// Longest a reactor thread blocks in one demultiplex call. Bounds how
/// late it can notice work queued from other threads.
pub const DEFAULT_POLL_CEILING_MS: u64 = 10;

#[derive(Debug, Clone)]
pub struct ReactorConfig {
    /// Which readiness facility each loop uses.
    pub backend: BackendKind,
    /// Upper bound for one blocking wait.
    pub poll_ceiling: Duration,
    /// Threads are named `<prefix>-<id>`.
    pub name_prefix: String,
}

impl Default for ReactorConfig {
    fn default() -> ReactorConfig {
        ReactorConfig {
            backend: BackendKind::platform_default(),
            poll_ceiling: Duration::from_millis(DEFAULT_POLL_CEILING_MS),
            name_prefix: "evloop".to_string(),
        }
    }
}

impl ReactorConfig {
    pub fn new() -> ReactorConfig {
        ReactorConfig::default()
    }

    /// Defaults overridden by environment variables where set.
    pub fn from_env() -> ReactorConfig {
        let mut cfg = ReactorConfig::default();
        let name = env_get_str("EVLOOP_BACKEND", "");
        if !name.is_empty() {
            match name.parse() {
                Ok(kind) => cfg.backend = kind,
                Err(_) => ewarn!("ignoring unknown EVLOOP_BACKEND value {:?}", name),
            }
        }
        cfg.poll_ceiling =
            Duration::from_millis(env_get("EVLOOP_POLL_CEILING_MS", DEFAULT_POLL_CEILING_MS));
        cfg
    }

    pub fn backend(mut self, kind: BackendKind) -> ReactorConfig {
        self.backend = kind;
        self
    }

    pub fn poll_ceiling(mut self, ceiling: Duration) -> ReactorConfig {
        self.poll_ceiling = ceiling;
        self
    }

    pub fn name_prefix(mut self, prefix: impl Into<String>) -> ReactorConfig {
        self.name_prefix = prefix.into();
        self
    }

    pub fn validate(&self) -> ReactorResult<()> {
        if self.poll_ceiling.is_zero() {
            return Err(ReactorError::Config("poll ceiling must be positive"));
        }
        if self.name_prefix.is_empty() {
            return Err(ReactorError::Config("name prefix must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(ReactorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_ceiling_rejected() {
        let cfg = ReactorConfig::new().poll_ceiling(Duration::ZERO);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_empty_prefix_rejected() {
        let cfg = ReactorConfig::new().name_prefix("");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_builder_chaining() {
        let cfg = ReactorConfig::new()
            .backend(BackendKind::Select)
            .poll_ceiling(Duration::from_millis(25))
            .name_prefix("worker");
        assert_eq!(cfg.backend, BackendKind::Select);
        assert_eq!(cfg.poll_ceiling, Duration::from_millis(25));
        assert_eq!(cfg.name_prefix, "worker");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_from_env_overrides() {
        std::env::set_var("EVLOOP_BACKEND", "select");
        std::env::set_var("EVLOOP_POLL_CEILING_MS", "25");
        let cfg = ReactorConfig::from_env();
        std::env::remove_var("EVLOOP_BACKEND");
        std::env::remove_var("EVLOOP_POLL_CEILING_MS");

        assert_eq!(cfg.backend, BackendKind::Select);
        assert_eq!(cfg.poll_ceiling, Duration::from_millis(25));

        let cfg = ReactorConfig::from_env();
        assert_eq!(cfg.poll_ceiling, Duration::from_millis(DEFAULT_POLL_CEILING_MS));
    }
}
