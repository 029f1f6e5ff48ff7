//! Configuration loader.

use regex::Regex;
use std::fs;
use std::path::Path;

use crate::error::ConfigError;
use crate::schema::Config;

/// Configuration loader with environment variable substitution.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }

        let content = fs::read_to_string(path)?;
        Self::load_str(&content)
    }

    /// Load configuration from a TOML file, falling back to defaults when it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Config, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::NotFound(_)) => Ok(Config::default()),
            other => other,
        }
    }

    /// Load configuration from a string.
    pub fn load_str(content: &str) -> Result<Config, ConfigError> {
        let expanded = Self::expand_env_vars(content)?;
        let config: Config = toml::from_str(&expanded)?;
        Ok(config)
    }

    /// Expand environment variables in the format `${VAR}`.
    fn expand_env_vars(content: &str) -> Result<String, ConfigError> {
        let re = Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| ConfigError::InvalidFormat(e.to_string()))?;

        let mut result = content.to_string();
        for cap in re.captures_iter(content) {
            let var_name = &cap[1];
            let var_value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotSet(var_name.to_string()))?;
            result = result.replace(&cap[0], &var_value);
        }

        Ok(result)
    }

    /// Expand shell-style paths (e.g., `~/.tokensync`).
    pub fn expand_path(path: &str) -> String {
        shellexpand::tilde(path).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_empty_config() {
        let config = ConfigLoader::load_str("").unwrap();
        assert_eq!(config.registration.installation_id, "default");
        assert_eq!(config.retry.initial_delay_ms, 1000);
    }

    #[test]
    fn test_load_full_config() {
        let content = r#"
            [registration]
            installation_id = "phone-1"
            development = true

            [retry]
            initial_delay_ms = 500
            exponential_factor = 1.5
            max_delay_ms = 60000
            max_attempts = 8
            jitter = true

            [store]
            path = "/var/lib/tokensync"

            [http]
            timeout_seconds = 15

            [logging]
            level = "debug"
            dir = "/var/log/tokensync"
        "#;
        let config = ConfigLoader::load_str(content).unwrap();
        assert_eq!(config.registration.installation_id, "phone-1");
        assert!(config.registration.development);
        assert_eq!(config.retry.initial_delay_ms, 500);
        assert_eq!(config.retry.exponential_factor, 1.5);
        assert_eq!(config.retry.max_delay_ms, Some(60000));
        assert_eq!(config.retry.max_attempts, Some(8));
        assert!(config.retry.jitter);
        assert_eq!(config.store.path, "/var/lib/tokensync");
        assert_eq!(config.http.timeout_seconds, Some(15));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.dir.as_deref(), Some("/var/log/tokensync"));
    }

    #[test]
    fn test_load_partial_section_keeps_defaults() {
        let content = r#"
            [retry]
            max_attempts = 3
        "#;
        let config = ConfigLoader::load_str(content).unwrap();
        assert_eq!(config.retry.max_attempts, Some(3));
        assert_eq!(config.retry.initial_delay_ms, 1000);
        assert_eq!(config.retry.exponential_factor, 2.0);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[registration]").unwrap();
        writeln!(file, "installation_id = \"from-file\"").unwrap();

        let config = ConfigLoader::load(file.path()).unwrap();
        assert_eq!(config.registration.installation_id, "from-file");
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = ConfigLoader::load(Path::new("/nonexistent/path/tokensync.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_or_default_nonexistent_file() {
        let config = ConfigLoader::load_or_default(Path::new("/nonexistent/path/tokensync.toml")).unwrap();
        assert_eq!(config.registration.installation_id, "default");
    }

    #[test]
    fn test_load_invalid_toml() {
        let result = ConfigLoader::load_str("retry = [unclosed");
        assert!(matches!(result, Err(ConfigError::TomlParse(_))));
    }

    #[test]
    fn test_load_wrong_type() {
        let content = r#"
            [retry]
            initial_delay_ms = "soon"
        "#;
        assert!(ConfigLoader::load_str(content).is_err());
    }

    #[test]
    fn test_expand_env_vars() {
        // SAFETY: This test runs in isolation and sets a unique test-only env var
        unsafe {
            std::env::set_var("TOKENSYNC_TEST_INSTALLATION", "env-install");
        }
        let content = r#"
            [registration]
            installation_id = "${TOKENSYNC_TEST_INSTALLATION}"
        "#;
        let config = ConfigLoader::load_str(content).unwrap();
        assert_eq!(config.registration.installation_id, "env-install");
        unsafe {
            std::env::remove_var("TOKENSYNC_TEST_INSTALLATION");
        }
    }

    #[test]
    fn test_expand_env_vars_not_set() {
        let content = "value = \"${TOKENSYNC_NONEXISTENT_VAR_12345}\"";
        let result = ConfigLoader::expand_env_vars(content);
        assert!(matches!(result, Err(ConfigError::EnvVarNotSet(_))));
    }

    #[test]
    fn test_expand_env_vars_no_vars() {
        let content = "value = \"no variables here\"";
        let expanded = ConfigLoader::expand_env_vars(content).unwrap();
        assert_eq!(expanded, content);
    }

    #[test]
    fn test_expand_path() {
        assert_eq!(ConfigLoader::expand_path("/usr/local/bin"), "/usr/local/bin");

        let expanded = ConfigLoader::expand_path("~/.tokensync");
        assert!(!expanded.starts_with('~'));
        assert!(expanded.ends_with("/.tokensync"));
    }
}
