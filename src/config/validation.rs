//! Configuration validation.

use super::snapshot::{
    Snapshot, KEY_LOG_LEVEL, KEY_ROTATE_COMPRESS, KEY_ROTATE_FILENAME, KEY_ROTATE_MAX_AGE,
    KEY_ROTATE_MAX_BACKUPS, KEY_ROTATE_MAX_SIZE,
};
use crate::domain::{ConfigError, ConfigResult, LogLevel};

/// Validate the recognized keys of a snapshot.
///
/// Returns warnings for values that are accepted but fall back to a
/// default.
pub fn validate(snapshot: &Snapshot) -> ConfigResult<Vec<String>> {
    let mut warnings = Vec::new();

    // Validate log file path
    if let Some(value) = snapshot.get(KEY_ROTATE_FILENAME) {
        let filename = value.to_string();
        if filename.trim().is_empty() {
            return Err(invalid(format!("{KEY_ROTATE_FILENAME} cannot be empty")));
        }
        if filename.contains('\0') {
            return Err(invalid(format!(
                "{KEY_ROTATE_FILENAME}: contains null character"
            )));
        }
    } else {
        warnings.push(format!(
            "{KEY_ROTATE_FILENAME} not set, using {}",
            snapshot.rotation_policy().filename.display()
        ));
    }

    // Validate rotation limits
    for key in [KEY_ROTATE_MAX_SIZE, KEY_ROTATE_MAX_BACKUPS, KEY_ROTATE_MAX_AGE] {
        if !snapshot.contains(key) {
            continue;
        }
        let value = snapshot.try_get_int(key)?;
        if value < 0 {
            return Err(invalid(format!("{key} must not be negative, got {value}")));
        }
    }

    if snapshot.contains(KEY_ROTATE_COMPRESS) {
        snapshot.try_get_bool(KEY_ROTATE_COMPRESS)?;
    }

    // Validate log level
    if snapshot.contains(KEY_LOG_LEVEL) {
        let level = snapshot.try_get_int(KEY_LOG_LEVEL)?;
        if !LogLevel::is_known_config_value(level) {
            warnings.push(format!(
                "{KEY_LOG_LEVEL} {level} is outside -1..4, falling back to {}",
                LogLevel::Debug
            ));
        }
    } else {
        warnings.push(format!(
            "{KEY_LOG_LEVEL} not set, using {}",
            snapshot.log_level()
        ));
    }

    Ok(warnings)
}

fn invalid(message: String) -> ConfigError {
    ConfigError::Invalid(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::service::DEFAULT_CONFIG;

    fn parse(doc: &str) -> Snapshot {
        Snapshot::from_yaml_str(doc).unwrap()
    }

    #[test]
    fn test_default_config_is_valid() {
        let warnings = validate(&parse(DEFAULT_CONFIG)).unwrap();
        assert!(warnings.is_empty(), "{warnings:?}");
    }

    #[test]
    fn test_empty_filename() {
        let err = validate(&parse("logrotate:\n  filename: \"  \"\n")).unwrap_err();
        assert!(err.to_string().contains("cannot be empty"));
    }

    #[test]
    fn test_negative_limits() {
        let err = validate(&parse(
            "logrotate:\n  filename: a.log\n  maxage: -3\nlog:\n  level: 0\n",
        ))
        .unwrap_err();
        assert!(err.to_string().contains("logrotate.maxage"));
    }

    #[test]
    fn test_wrong_kinds() {
        let err = validate(&parse("logrotate:\n  filename: a.log\n  maxsize: big\n")).unwrap_err();
        assert!(matches!(err, ConfigError::TypeMismatch { .. }));

        let err =
            validate(&parse("logrotate:\n  filename: a.log\n  compress: maybe\n")).unwrap_err();
        assert!(matches!(err, ConfigError::TypeMismatch { .. }));
    }

    #[test]
    fn test_out_of_range_level_warns() {
        let warnings =
            validate(&parse("logrotate:\n  filename: a.log\nlog:\n  level: 9\n")).unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("outside -1..4"));
    }

    #[test]
    fn test_missing_keys_warn() {
        let warnings = validate(&Snapshot::default()).unwrap();
        assert_eq!(warnings.len(), 2, "{warnings:?}");
    }
}
