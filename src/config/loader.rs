//! Configuration loader with environment variable expansion

use super::{Config, ConfigError};
use lazy_static::lazy_static;
use regex_lite::Regex;
use std::path::Path;

lazy_static! {
    // ${VAR} or ${VAR:-default}
    static ref ENV_VAR: Regex =
        Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").unwrap();
}

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from YAML text
    pub fn parse(content: &str) -> Result<Config, ConfigError> {
        let expanded = Self::expand_env_vars(content);
        let config: Config = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Expand `${VAR_NAME}` and `${VAR_NAME:-default}` placeholders.
    ///
    /// A placeholder with no value and no default is left untouched.
    fn expand_env_vars(content: &str) -> String {
        ENV_VAR
            .replace_all(content, |cap: &regex_lite::Captures<'_>| {
                match std::env::var(&cap[1]) {
                    Ok(value) => value,
                    Err(_) => cap
                        .get(2)
                        .map_or_else(|| cap[0].to_string(), |d| d.as_str().to_string()),
                }
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_expand_env_vars() {
        std::env::set_var("TOS3_TEST_VAR", "test_value");
        let expanded = ConfigLoader::expand_env_vars("key: ${TOS3_TEST_VAR}");
        assert_eq!(expanded, "key: test_value");
        std::env::remove_var("TOS3_TEST_VAR");
    }

    #[test]
    #[serial]
    fn test_expand_default_and_missing() {
        std::env::remove_var("TOS3_MISSING");
        assert_eq!(
            ConfigLoader::expand_env_vars("${TOS3_MISSING:-fallback}"),
            "fallback"
        );
        assert_eq!(
            ConfigLoader::expand_env_vars("${TOS3_MISSING}"),
            "${TOS3_MISSING}"
        );
    }

    #[test]
    #[serial]
    fn test_parse_full_config() {
        std::env::remove_var("TOS3_TEST_REGION");
        std::env::set_var("TOS3_TEST_SECRET", "s3cr3t");
        let yaml = r#"
server:
  address: "127.0.0.1:9000"
upload:
  default_bucket: media
  path_namespace: common
  staging_dir: /var/tmp
  cancellable: false
s3:
  region: ${TOS3_TEST_REGION:-eu-west-1}
  endpoint: http://localhost:9000
  access_key: minio
  secret_key: ${TOS3_TEST_SECRET}
  force_path_style: true
metrics:
  enabled: false
"#;
        let config = ConfigLoader::parse(yaml).unwrap();
        std::env::remove_var("TOS3_TEST_SECRET");

        assert_eq!(config.server.address, "127.0.0.1:9000");
        assert_eq!(config.upload.default_bucket, "media");
        assert_eq!(config.upload.path_namespace.as_deref(), Some("common"));
        assert_eq!(config.upload.staging_dir(), Path::new("/var/tmp"));
        assert!(!config.upload.cancellable);
        assert_eq!(config.s3.region, "eu-west-1");
        assert_eq!(config.s3.secret_key.as_deref(), Some("s3cr3t"));
        assert!(config.s3.force_path_style);
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn test_load_missing_file() {
        let result = ConfigLoader::load("/nonexistent/tos3.yaml");
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_load_invalid_yaml_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "upload: [not, a, map]").unwrap();
        assert!(matches!(
            ConfigLoader::load(&path),
            Err(ConfigError::ParseError(_))
        ));
    }
}
