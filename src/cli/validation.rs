//! CLI argument validation functions
//!
//! Value parsers for arguments clap cannot check on its own.

use std::fs;
use std::path::PathBuf;

use crate::reaper::POLICY_NAMES;

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

/// Validate rollback steps is a number between 1 and 100
pub fn validate_rollback_steps(steps_str: &str) -> Result<u32, String> {
    let steps: u32 = steps_str.parse().map_err(|_| {
        format!("Rollback steps must be a valid positive number, got: '{}'", steps_str)
    })?;

    if steps == 0 {
        return Err("Rollback steps must be greater than 0".to_string());
    }

    if steps > 100 {
        return Err("Rollback steps cannot exceed 100 for safety reasons".to_string());
    }

    Ok(steps)
}

/// Validate a drop policy name against the policy table
pub fn validate_policy_name(name: &str) -> Result<String, String> {
    let name = name.trim().to_lowercase();
    if POLICY_NAMES.contains(&name.as_str()) {
        Ok(name)
    } else {
        Err(format!(
            "Unknown policy '{}'. Valid policies are: {}",
            name,
            POLICY_NAMES.join(", ")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_file_path_validation() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap();
        assert_eq!(validate_config_file_path(path).unwrap(), file.path());

        assert!(validate_config_file_path("/definitely/not/here.toml").is_err());

        let dir = tempfile::TempDir::new().unwrap();
        assert!(validate_config_file_path(dir.path().to_str().unwrap()).is_err());
    }

    #[test]
    fn test_rollback_steps_validation_valid() {
        for steps_str in ["1", "5", "50", "100"] {
            assert!(
                validate_rollback_steps(steps_str).is_ok(),
                "Steps {} should be valid",
                steps_str
            );
        }
    }

    #[test]
    fn test_rollback_steps_validation_invalid() {
        for steps_str in ["0", "101", "-1", "abc", ""] {
            assert!(
                validate_rollback_steps(steps_str).is_err(),
                "Steps '{}' should be invalid",
                steps_str
            );
        }
    }

    #[test]
    fn test_policy_name_validation() {
        assert_eq!(validate_policy_name("Pending_Stuck").unwrap(), "pending_stuck");
        let err = validate_policy_name("zombie").unwrap_err();
        assert!(err.contains("canceling"));
    }
}
