//! Environment variable helpers shared by the `from_env` constructors.
//!
//! Unset or empty variables fall back to the default; present but malformed
//! values are a [`Error::Config`] rather than a silent fallback.

use std::str::FromStr;

use crate::{Error, Result};

/// Read a variable, treating empty strings as unset.
pub fn var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Read a string variable or return `default`.
pub fn var_or(key: &str, default: &str) -> String {
    var(key).unwrap_or_else(|| default.to_string())
}

/// Parse a variable into `T`, or return `default` when unset.
pub fn parse_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("invalid {}: {}", key, raw))),
        None => Ok(default),
    }
}

/// Parse a boolean flag. Accepts `1/0`, `true/false`, `yes/no`, `on/off`.
pub fn flag_or(key: &str, default: bool) -> Result<bool> {
    match var(key) {
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(Error::Config(format!("invalid {}: {}", key, raw))),
        },
        None => Ok(default),
    }
}
