//! Runtime configuration.
//!
//! Values come from the environment (a `.env` file is loaded first by the
//! binary through `dotenvy`). CLI flags override them.
//!
//! | Variable                   | Default                   |
//! |----------------------------|---------------------------|
//! | `RESHAPE_PORT`             | `8085`                    |
//! | `RESHAPE_WORKERS`          | available parallelism     |
//! | `RESHAPE_REPORT_MAX_CHARS` | `0` (no limit)            |
//! | `RESHAPE_OUTPUT_DIR`       | next to the source file   |
//! | `RESHAPE_OUTPUT_DELIMITER` | `,`                       |

use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::transform::pipeline::default_workers;

pub const DEFAULT_PORT: u16 = 8085;

#[derive(Debug, Error)]
#[error("Invalid value '{value}' for {key}: {reason}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}

/// Service settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// HTTP listen port
    pub port: u16,
    /// Maximum concurrent row workers per run
    pub workers: usize,
    /// Character budget for rendered error reports, 0 = unlimited
    pub report_max_chars: usize,
    /// Where reshaped files are written; `None` = beside the source
    pub output_dir: Option<PathBuf>,
    /// Delimiter used when writing reshaped files
    pub output_delimiter: char,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            workers: default_workers(),
            report_max_chars: 0,
            output_dir: None,
            output_delimiter: ',',
        }
    }
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary lookup (used by tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let workers = parse_or("RESHAPE_WORKERS", &lookup, defaults.workers)?;
        if workers == 0 {
            return Err(ConfigError {
                key: "RESHAPE_WORKERS",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let output_delimiter = match lookup("RESHAPE_OUTPUT_DELIMITER") {
            None => defaults.output_delimiter,
            Some(raw) => parse_delimiter(&raw).ok_or_else(|| ConfigError {
                key: "RESHAPE_OUTPUT_DELIMITER",
                value: raw.clone(),
                reason: "expected a single ASCII character or \\t".to_string(),
            })?,
        };

        Ok(Self {
            port: parse_or("RESHAPE_PORT", &lookup, defaults.port)?,
            workers,
            report_max_chars: parse_or("RESHAPE_REPORT_MAX_CHARS", &lookup, defaults.report_max_chars)?,
            output_dir: lookup("RESHAPE_OUTPUT_DIR")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            output_delimiter,
        })
    }
}

fn parse_or<T, F>(key: &'static str, lookup: &F, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

/// Accepts one ASCII character, or the escape `\t`.
pub fn parse_delimiter(raw: &str) -> Option<char> {
    if raw == "\\t" {
        return Some('\t');
    }
    let mut chars = raw.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii() => Some(c),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings.port, 8085);
        assert!(settings.workers >= 1);
        assert_eq!(settings.report_max_chars, 0);
        assert_eq!(settings.output_dir, None);
        assert_eq!(settings.output_delimiter, ',');
    }

    #[test]
    fn test_overrides() {
        let settings = Settings::from_lookup(lookup(&[
            ("RESHAPE_PORT", "9000"),
            ("RESHAPE_WORKERS", "2"),
            ("RESHAPE_REPORT_MAX_CHARS", "500"),
            ("RESHAPE_OUTPUT_DIR", "/tmp/out"),
            ("RESHAPE_OUTPUT_DELIMITER", ";"),
        ]))
        .unwrap();
        assert_eq!(settings.port, 9000);
        assert_eq!(settings.workers, 2);
        assert_eq!(settings.report_max_chars, 500);
        assert_eq!(settings.output_dir, Some(PathBuf::from("/tmp/out")));
        assert_eq!(settings.output_delimiter, ';');
    }

    #[test]
    fn test_invalid_values() {
        let err = Settings::from_lookup(lookup(&[("RESHAPE_PORT", "http")])).unwrap_err();
        assert_eq!(err.key, "RESHAPE_PORT");

        let err = Settings::from_lookup(lookup(&[("RESHAPE_WORKERS", "0")])).unwrap_err();
        assert_eq!(err.key, "RESHAPE_WORKERS");

        let err = Settings::from_lookup(lookup(&[("RESHAPE_OUTPUT_DELIMITER", ";;")])).unwrap_err();
        assert!(err.to_string().contains("RESHAPE_OUTPUT_DELIMITER"));
    }

    #[test]
    fn test_parse_delimiter() {
        assert_eq!(parse_delimiter("\\t"), Some('\t'));
        assert_eq!(parse_delimiter("|"), Some('|'));
        assert_eq!(parse_delimiter("§"), None);
        assert_eq!(parse_delimiter(""), None);
    }
}
