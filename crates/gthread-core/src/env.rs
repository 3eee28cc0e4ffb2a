//! Environment variable utilities
//!
//! Used by `SchedulerConfig::from_env` and the logging setup.
//!
//! ```ignore
//! use gthread_core::env::{env_get, env_get_bool};
//!
//! let quantum_us: u64 = env_get("GT_QUANTUM_US", 10_000);
//! let preempt: bool = env_get_bool("GT_ENABLE_PREEMPTION", true);
//! ```

use std::str::FromStr;

/// Get environment variable parsed as type T, or return default
///
/// A value that fails to parse falls back to the default.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Get environment variable as boolean
///
/// "1", "true", "yes", "on" are true and "0", "false", "no", "off" are false
/// (case-insensitive). Anything else, including unset, returns the default.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => match val.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_get_default() {
        let val: u64 = env_get("__GT_TEST_UNSET_VAR__", 42);
        assert_eq!(val, 42);
    }

    #[test]
    fn test_env_get_with_set_var() {
        std::env::set_var("__GT_TEST_QUANTUM__", " 2500 ");
        let val: u64 = env_get("__GT_TEST_QUANTUM__", 0);
        assert_eq!(val, 2500);
        std::env::remove_var("__GT_TEST_QUANTUM__");
    }

    #[test]
    fn test_env_get_invalid_parse() {
        std::env::set_var("__GT_TEST_INVALID__", "not_a_number");
        let val: usize = env_get("__GT_TEST_INVALID__", 99);
        assert_eq!(val, 99);
        std::env::remove_var("__GT_TEST_INVALID__");
    }

    #[test]
    fn test_env_get_bool_variants() {
        assert!(env_get_bool("__GT_TEST_BOOL_UNSET__", true));

        std::env::set_var("__GT_TEST_BOOL__", "YES");
        assert!(env_get_bool("__GT_TEST_BOOL__", false));

        std::env::set_var("__GT_TEST_BOOL__", "off");
        assert!(!env_get_bool("__GT_TEST_BOOL__", true));

        std::env::set_var("__GT_TEST_BOOL__", "garbage");
        assert!(env_get_bool("__GT_TEST_BOOL__", true));

        std::env::remove_var("__GT_TEST_BOOL__");
    }
}
