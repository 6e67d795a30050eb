//! Configuration validation logic
//!
//! Every section checks its own ranges and formats; [`Settings::validate`]
//! decides which sections apply.

use crate::config::error::ConfigError;
use crate::config::settings::{
    DatabaseConfig, DispatcherSettings, FileSettings, ImageResizeSettings, LoggerSettings,
    Settings, StoreBackend,
};

/// Valid log levels
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid log formats
const VALID_LOG_FORMATS: &[&str] = &["full", "compact", "json"];

/// Upper bound for `dispatcher.max_concurrent_tasks`
const MAX_CONCURRENT_TASKS: usize = 10_000;

impl DatabaseConfig {
    /// Validate database configuration
    ///
    /// # Validation Rules
    /// - URL must be a non-empty postgres URL
    /// - Max and min connections must be greater than 0
    /// - Min connections must not exceed max connections
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::validation(
                "database.url",
                "Database URL is required. Please specify a valid database connection string.",
            ));
        }

        if !self.is_valid_database_url() {
            return Err(ConfigError::validation(
                "database.url",
                "Invalid database URL format. Expected format: postgres://[user:password@]host[:port]/database",
            ));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::validation(
                "database.max_connections",
                "Max connections must be greater than 0.",
            ));
        }

        if self.min_connections == 0 {
            return Err(ConfigError::validation(
                "database.min_connections",
                "Min connections must be greater than 0.",
            ));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::ValidationError {
                field: "database.min_connections".to_string(),
                message: format!(
                    "Min connections ({}) cannot exceed max connections ({}).",
                    self.min_connections, self.max_connections
                ),
            });
        }

        Ok(())
    }

    fn is_valid_database_url(&self) -> bool {
        ["postgres://", "postgresql://"]
            .iter()
            .any(|scheme| self.url.starts_with(scheme))
    }
}

impl FileSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && self.path.trim().is_empty() {
            return Err(ConfigError::validation(
                "logger.file.path",
                "File path is required when file logging is enabled.",
            ));
        }

        if !VALID_LOG_FORMATS.contains(&self.format.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError {
                field: "logger.file.format".to_string(),
                message: format!(
                    "Invalid log format '{}'. Valid formats are: {}",
                    self.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            });
        }

        Ok(())
    }
}

impl LoggerSettings {
    /// Validate logger settings
    ///
    /// # Validation Rules
    /// - Log level must be one of: trace, debug, info, warn, error, or a
    ///   filter directive containing `=`
    /// - If file logging is enabled, path must not be empty
    /// - Log format must be one of: full, compact, json
    pub fn validate(&self) -> Result<(), ConfigError> {
        let is_directive = self.level.contains('=');
        if !is_directive && !VALID_LOG_LEVELS.contains(&self.level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError {
                field: "logger.level".to_string(),
                message: format!(
                    "Invalid log level '{}'. Valid levels are: {}",
                    self.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        if !self.console.enabled && !self.file.enabled {
            return Err(ConfigError::validation(
                "logger",
                "At least one output (console or file) must be enabled.",
            ));
        }

        self.file.validate()?;

        Ok(())
    }
}

impl DispatcherSettings {
    /// Validate dispatcher settings
    ///
    /// # Validation Rules
    /// - Interval must be greater than 0 seconds
    /// - Max concurrent tasks must be between 1 and 10000
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs == 0 {
            return Err(ConfigError::validation(
                "dispatcher.interval_secs",
                "Dispatch interval must be greater than 0 seconds.",
            ));
        }

        if self.max_concurrent_tasks == 0 || self.max_concurrent_tasks > MAX_CONCURRENT_TASKS {
            return Err(ConfigError::ValidationError {
                field: "dispatcher.max_concurrent_tasks".to_string(),
                message: format!(
                    "Max concurrent tasks must be between 1 and {}.",
                    MAX_CONCURRENT_TASKS
                ),
            });
        }

        Ok(())
    }
}

impl ImageResizeSettings {
    /// Validate image resize settings. Disabled workers are not checked.
    ///
    /// # Validation Rules
    /// - Provider URLs and the callback URL must be http(s) URLs
    /// - Application id and bucket must be set
    /// - Poll interval must be greater than 0 and shorter than the deadline
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }

        for (field, value) in [
            ("image_resize.submit_url", &self.submit_url),
            ("image_resize.poll_url", &self.poll_url),
            ("image_resize.callback_url", &self.callback_url),
        ] {
            if !is_http_url(value) {
                return Err(ConfigError::ValidationError {
                    field: field.to_string(),
                    message: format!("Expected an http(s) URL, got '{}'.", value),
                });
            }
        }

        if self.application_id.trim().is_empty() {
            return Err(ConfigError::validation(
                "image_resize.application_id",
                "Application id is required when image resize is enabled.",
            ));
        }

        if self.bucket.trim().is_empty() {
            return Err(ConfigError::validation(
                "image_resize.bucket",
                "Bucket is required when image resize is enabled.",
            ));
        }

        if self.poll_interval_secs == 0 {
            return Err(ConfigError::validation(
                "image_resize.poll_interval_secs",
                "Poll interval must be greater than 0 seconds.",
            ));
        }

        if self.deadline_secs <= self.poll_interval_secs {
            return Err(ConfigError::ValidationError {
                field: "image_resize.deadline_secs".to_string(),
                message: format!(
                    "Deadline ({}s) must be longer than the poll interval ({}s).",
                    self.deadline_secs, self.poll_interval_secs
                ),
            });
        }

        Ok(())
    }
}

fn is_http_url(value: &str) -> bool {
    let rest = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"));
    rest.is_some_and(|host| !host.is_empty())
}

impl Settings {
    /// Validate all configuration settings
    ///
    /// The database section is only checked when it backs the job store.
    /// Returns the first validation error encountered.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.backend == StoreBackend::Postgres {
            self.database.validate()?;
        }
        self.logger.validate()?;
        self.dispatcher.validate()?;
        self.image_resize.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::{ConsoleSettings, StoreConfig};

    fn enabled_image_resize() -> ImageResizeSettings {
        ImageResizeSettings {
            enabled: true,
            submit_url: "https://provider/api/job".to_string(),
            poll_url: "https://provider/listen".to_string(),
            application_id: "app".to_string(),
            bucket: "media".to_string(),
            callback_url: "https://app/hooks/resize".to_string(),
            ..ImageResizeSettings::default()
        }
    }

    fn field_of(err: ConfigError) -> String {
        match err {
            ConfigError::ValidationError { field, .. } => field,
            other => panic!("Expected ValidationError, got {:?}", other),
        }
    }

    // ========================================================================
    // DatabaseConfig validation tests
    // ========================================================================

    #[test]
    fn test_database_config_valid() {
        let config = DatabaseConfig {
            url: "postgres://localhost/test".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_database_config_empty_url() {
        let err = DatabaseConfig::default().validate().unwrap_err();
        assert_eq!(field_of(err), "database.url");
    }

    #[test]
    fn test_database_config_rejects_other_schemes() {
        let config = DatabaseConfig {
            url: "mysql://localhost/test".to_string(),
            ..Default::default()
        };
        assert_eq!(field_of(config.validate().unwrap_err()), "database.url");
    }

    #[test]
    fn test_database_config_min_exceeds_max() {
        let config = DatabaseConfig {
            url: "postgresql://localhost/test".to_string(),
            max_connections: 2,
            min_connections: 5,
            ..Default::default()
        };
        assert_eq!(
            field_of(config.validate().unwrap_err()),
            "database.min_connections"
        );
    }

    // ========================================================================
    // LoggerSettings validation tests
    // ========================================================================

    #[test]
    fn test_logger_settings_levels() {
        let mut settings = LoggerSettings::default();
        for level in VALID_LOG_LEVELS {
            settings.level = level.to_uppercase();
            assert!(settings.validate().is_ok(), "level {} should be valid", level);
        }

        settings.level = "deferred_rs::jobs=trace,warn".to_string();
        assert!(settings.validate().is_ok());

        settings.level = "chatty".to_string();
        assert_eq!(field_of(settings.validate().unwrap_err()), "logger.level");
    }

    #[test]
    fn test_logger_settings_requires_an_output() {
        let settings = LoggerSettings {
            console: ConsoleSettings {
                enabled: false,
                colored: false,
            },
            ..LoggerSettings::default()
        };
        assert_eq!(field_of(settings.validate().unwrap_err()), "logger");
    }

    #[test]
    fn test_file_settings_empty_path() {
        let settings = FileSettings {
            enabled: true,
            path: "  ".to_string(),
            ..FileSettings::default()
        };
        assert_eq!(field_of(settings.validate().unwrap_err()), "logger.file.path");
    }

    // ========================================================================
    // DispatcherSettings validation tests
    // ========================================================================

    #[test]
    fn test_dispatcher_settings_bounds() {
        assert!(DispatcherSettings::default().validate().is_ok());

        let zero_interval = DispatcherSettings {
            interval_secs: 0,
            ..DispatcherSettings::default()
        };
        assert_eq!(
            field_of(zero_interval.validate().unwrap_err()),
            "dispatcher.interval_secs"
        );

        let no_tasks = DispatcherSettings {
            max_concurrent_tasks: 0,
            ..DispatcherSettings::default()
        };
        assert_eq!(
            field_of(no_tasks.validate().unwrap_err()),
            "dispatcher.max_concurrent_tasks"
        );
    }

    // ========================================================================
    // ImageResizeSettings validation tests
    // ========================================================================

    #[test]
    fn test_image_resize_disabled_is_not_checked() {
        assert!(ImageResizeSettings::default().validate().is_ok());
    }

    #[test]
    fn test_image_resize_enabled_valid() {
        assert!(enabled_image_resize().validate().is_ok());
    }

    #[test]
    fn test_image_resize_bad_urls() {
        let settings = ImageResizeSettings {
            callback_url: "ftp://nowhere".to_string(),
            ..enabled_image_resize()
        };
        assert_eq!(
            field_of(settings.validate().unwrap_err()),
            "image_resize.callback_url"
        );

        let settings = ImageResizeSettings {
            submit_url: "https://".to_string(),
            ..enabled_image_resize()
        };
        assert_eq!(
            field_of(settings.validate().unwrap_err()),
            "image_resize.submit_url"
        );
    }

    #[test]
    fn test_image_resize_deadline_must_exceed_interval() {
        let settings = ImageResizeSettings {
            poll_interval_secs: 10,
            deadline_secs: 10,
            ..enabled_image_resize()
        };
        assert_eq!(
            field_of(settings.validate().unwrap_err()),
            "image_resize.deadline_secs"
        );
    }

    // ========================================================================
    // Settings validation tests
    // ========================================================================

    #[test]
    fn test_memory_store_skips_database() {
        let settings = Settings {
            store: StoreConfig {
                backend: StoreBackend::Memory,
            },
            ..Settings::default()
        };
        assert!(settings.validate().is_ok());

        let postgres = Settings::default();
        assert_eq!(field_of(postgres.validate().unwrap_err()), "database.url");
    }
}
