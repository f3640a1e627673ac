//! Environment variable helpers.
//!
//! Runtime knobs (log level, backend selection, pool sizing) are read from
//! the environment at startup. These helpers centralize the parsing so every
//! crate treats malformed values the same way: fall back to the default.

use std::str::FromStr;

/// Read an environment variable and parse it, falling back to `default`
/// when the variable is unset or does not parse.
pub fn env_get<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Read a boolean environment variable.
///
/// Accepts `1`, `true`, `yes`, `on` (case-insensitive) as true and
/// `0`, `false`, `no`, `off` as false. Anything else yields `default`.
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => match val.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

/// Read a string environment variable with a default.
pub fn env_get_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_get_parses_numbers() {
        std::env::set_var("EVLOOP_TEST_NUM", "42");
        assert_eq!(env_get("EVLOOP_TEST_NUM", 0u64), 42);
        std::env::remove_var("EVLOOP_TEST_NUM");
        assert_eq!(env_get("EVLOOP_TEST_NUM", 7u64), 7);
    }

    #[test]
    fn test_env_get_bad_value_falls_back() {
        std::env::set_var("EVLOOP_TEST_BAD", "not-a-number");
        assert_eq!(env_get("EVLOOP_TEST_BAD", 13usize), 13);
        std::env::remove_var("EVLOOP_TEST_BAD");
    }

    #[test]
    fn test_env_get_bool_variants() {
        for v in ["1", "true", "YES", "On"] {
            std::env::set_var("EVLOOP_TEST_BOOL", v);
            assert!(env_get_bool("EVLOOP_TEST_BOOL", false), "value {:?}", v);
        }
        for v in ["0", "false", "no", "OFF"] {
            std::env::set_var("EVLOOP_TEST_BOOL", v);
            assert!(!env_get_bool("EVLOOP_TEST_BOOL", true), "value {:?}", v);
        }
        std::env::set_var("EVLOOP_TEST_BOOL", "maybe");
        assert!(env_get_bool("EVLOOP_TEST_BOOL", true));
        std::env::remove_var("EVLOOP_TEST_BOOL");
        assert!(!env_get_bool("EVLOOP_TEST_BOOL", false));
    }

    #[test]
    fn test_env_get_str() {
        std::env::remove_var("EVLOOP_TEST_STR");
        assert_eq!(env_get_str("EVLOOP_TEST_STR", "fallback"), "fallback");
        std::env::set_var("EVLOOP_TEST_STR", "hello");
        assert_eq!(env_get_str("EVLOOP_TEST_STR", "fallback"), "hello");
        std::env::remove_var("EVLOOP_TEST_STR");
    }
}
