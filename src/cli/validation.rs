//! CLI argument validation functions
//!
//! Value parsers for arguments that need more than clap's built-in checks.

use std::fs;
use std::path::PathBuf;

/// Longest accepted `--interval`, one day
const MAX_INTERVAL_SECS: u64 = 86_400;

/// Validate that a file path is accessible (exists and is readable)
pub fn validate_config_file_path(path_str: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(format!("Configuration file does not exist: '{}'", path_str));
    }

    if !path.is_file() {
        return Err(format!("Configuration path is not a file: '{}'", path_str));
    }

    match fs::File::open(&path) {
        Ok(_) => Ok(path),
        Err(e) => Err(format!("Cannot read configuration file '{}': {}", path_str, e)),
    }
}

/// Validate rollback steps is between 1 and 100
pub fn validate_rollback_steps(steps_str: &str) -> Result<u32, String> {
    let steps: u32 = steps_str
        .parse()
        .map_err(|_| format!("Rollback steps must be a valid positive number, got: '{}'", steps_str))?;

    if steps == 0 {
        return Err("Rollback steps must be greater than 0".to_string());
    }

    if steps > 100 {
        return Err("Rollback steps cannot exceed 100 for safety reasons".to_string());
    }

    Ok(steps)
}

/// Validate a dispatch interval in seconds
pub fn validate_interval(secs_str: &str) -> Result<u64, String> {
    let secs: u64 = secs_str
        .parse()
        .map_err(|_| format!("Interval must be a whole number of seconds, got: '{}'", secs_str))?;

    if secs == 0 || secs > MAX_INTERVAL_SECS {
        return Err(format!(
            "Interval must be between 1 and {} seconds",
            MAX_INTERVAL_SECS
        ));
    }

    Ok(secs)
}

/// Parse a `KEY=VALUE` job argument. Only the first `=` splits.
pub fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("Expected KEY=VALUE, got: '{}'", raw))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(format!("Argument key cannot be empty in '{}'", raw));
    }

    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rollback_steps_validation_valid() {
        for steps_str in ["1", "5", "10", "50", "100"] {
            assert!(
                validate_rollback_steps(steps_str).is_ok(),
                "Steps {} should be valid",
                steps_str
            );
        }
    }

    #[test]
    fn test_rollback_steps_validation_invalid() {
        for steps_str in ["0", "101", "999", "-1", "abc", ""] {
            assert!(
                validate_rollback_steps(steps_str).is_err(),
                "Steps '{}' should be invalid",
                steps_str
            );
        }
    }

    #[test]
    fn test_interval_validation() {
        assert_eq!(validate_interval("5"), Ok(5));
        assert_eq!(validate_interval("86400"), Ok(86_400));
        for bad in ["0", "86401", "1.5", "soon"] {
            assert!(validate_interval(bad).is_err(), "'{}' should be invalid", bad);
        }
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("src=https://x/a.png?w=1"),
            Ok(("src".to_string(), "https://x/a.png?w=1".to_string()))
        );
        assert_eq!(parse_key_value("empty="), Ok(("empty".to_string(), String::new())));
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=value").is_err());
    }

    #[test]
    fn test_config_file_path_missing() {
        let err = validate_config_file_path("/definitely/not/here.toml").unwrap_err();
        assert!(err.contains("does not exist"));
    }

    #[test]
    fn test_config_file_path_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = validate_config_file_path(dir.path().to_str().unwrap()).unwrap_err();
        assert!(err.contains("not a file"));
    }
}
