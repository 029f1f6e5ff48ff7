//! Configuration validation.

use crate::error::ConfigError;
use crate::schema::Config;

const LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// First error as a [`ConfigError`], if any.
    pub fn into_error(self) -> Option<ConfigError> {
        self.errors.into_iter().next().map(|e| ConfigError::InvalidValue {
            field: e.path,
            message: e.message,
        })
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> Result<ValidationResult, ConfigError> {
        let mut result = ValidationResult::default();

        Self::validate_registration(config, &mut result);
        Self::validate_retry(config, &mut result);
        Self::validate_store(config, &mut result);
        Self::validate_http(config, &mut result);
        Self::validate_logging(config, &mut result);

        Ok(result)
    }

    fn validate_registration(config: &Config, result: &mut ValidationResult) {
        if config.registration.installation_id.trim().is_empty() {
            result.add_error(ValidationError::new(
                "registration.installation_id",
                "installation_id cannot be empty",
            ));
        }
    }

    fn validate_retry(config: &Config, result: &mut ValidationResult) {
        let retry = &config.retry;

        if retry.initial_delay_ms == 0 {
            result.add_error(ValidationError::new(
                "retry.initial_delay_ms",
                "initial_delay_ms must be greater than 0",
            ));
        }

        if !retry.exponential_factor.is_finite() || retry.exponential_factor < 1.0 {
            result.add_error(ValidationError::new(
                "retry.exponential_factor",
                "exponential_factor must be a finite number >= 1.0",
            ));
        } else if retry.exponential_factor > 10.0 {
            result.add_warning(ValidationWarning::new(
                "retry.exponential_factor",
                "exponential_factor is very high (>10), delays will grow quickly",
            ));
        }

        if let Some(max_delay_ms) = retry.max_delay_ms {
            if max_delay_ms < retry.initial_delay_ms {
                result.add_error(ValidationError::new(
                    "retry.max_delay_ms",
                    "max_delay_ms cannot be lower than initial_delay_ms",
                ));
            }
        }

        match retry.max_attempts {
            Some(0) => result.add_error(ValidationError::new(
                "retry.max_attempts",
                "max_attempts must be greater than 0",
            )),
            None if retry.max_delay_ms.is_none() => result.add_warning(ValidationWarning::new(
                "retry.max_attempts",
                "Neither max_attempts nor max_delay_ms is set, retries are unbounded and delays grow without limit",
            )),
            None => result.add_warning(ValidationWarning::new(
                "retry.max_attempts",
                "max_attempts is not set, registration retries until it succeeds or is interrupted",
            )),
            Some(_) => {}
        }
    }

    fn validate_store(config: &Config, result: &mut ValidationResult) {
        if config.store.path.trim().is_empty() {
            result.add_error(ValidationError::new("store.path", "Store path cannot be empty"));
        }
    }

    fn validate_http(config: &Config, result: &mut ValidationResult) {
        if config.http.timeout_seconds == Some(0) {
            result.add_error(ValidationError::new(
                "http.timeout_seconds",
                "timeout_seconds must be greater than 0",
            ));
        }
    }

    fn validate_logging(config: &Config, result: &mut ValidationResult) {
        if !Self::is_valid_filter(&config.logging.level) {
            result.add_error(ValidationError::new(
                "logging.level",
                format!(
                    "Unknown log level '{}', valid values: {:?} or target=level directives",
                    config.logging.level, LOG_LEVELS
                ),
            ));
        }
    }

    /// Accepts a bare level or comma separated `target=level` directives.
    fn is_valid_filter(filter: &str) -> bool {
        if filter.trim().is_empty() {
            return false;
        }

        filter.split(',').all(|directive| {
            let level = match directive.rsplit_once('=') {
                Some((target, level)) if !target.trim().is_empty() => level,
                Some(_) => return false,
                None => directive,
            };
            LOG_LEVELS.contains(&level.trim().to_lowercase().as_str())
        })
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
