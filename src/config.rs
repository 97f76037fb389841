//! Service configuration: a TOML file layered with environment overrides.
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 8080
//!
//! [oracle]
//! api_key = "..."
//! vision_model = "gemini-2.0-flash"
//!
//! [scoring]
//! use_blur = true
//! blur_radius = 1.1
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

pub const CONFIG_ENV: &str = "SANDWICH_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "sandwich.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub oracle: OracleConfig,
    pub storage: StorageConfig,
    pub scoring: ScoringConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub vision_model: String,
    pub text_model: String,
    /// Unset means the request waits as long as the oracle takes.
    pub timeout_secs: Option<u64>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            vision_model: "gemini-2.0-flash".to_string(),
            text_model: "gemini-2.0-flash".to_string(),
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
    pub image_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("sandwich_app.db"),
            image_dir: PathBuf::from("user_images"),
        }
    }
}

/// Knobs of the symmetry pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Smooth the grayscale canvas before mirroring.
    pub use_blur: bool,
    /// Gaussian sigma used when `use_blur` is set.
    pub blur_radius: f32,
    /// Clamp the oracle box to the image and pad it by 2% per side.
    pub clamp_bbox: bool,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            use_blur: false,
            blur_radius: 1.1,
            clamp_bbox: true,
        }
    }
}

impl Config {
    /// Load from `path`, else `$SANDWICH_CONFIG`, else `./sandwich.toml` if it
    /// exists, else defaults. Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from));

        let mut config = match explicit {
            Some(path) => Self::from_file(&path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(key) = var("GEMINI_API_KEY")
            && !key.is_empty()
        {
            self.oracle.api_key = Some(key);
        }

        if let Some(host) = var("SANDWICH_HOST")
            && !host.is_empty()
        {
            self.server.host = host;
        }

        if let Some(port_str) = var("SANDWICH_PORT")
            && let Ok(port) = port_str.parse::<u16>()
        {
            self.server.port = port;
        }

        if let Some(db) = var("SANDWICH_DB_PATH")
            && !db.is_empty()
        {
            self.storage.database_path = PathBuf::from(db);
        }

        if let Some(dir) = var("SANDWICH_IMAGE_DIR")
            && !dir.is_empty()
        {
            self.storage.image_dir = PathBuf::from(dir);
        }

        if let Some(flag) = var("SANDWICH_USE_BLUR")
            && let Ok(use_blur) = flag.parse::<bool>()
        {
            self.scoring.use_blur = use_blur;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self
            .oracle
            .api_key
            .as_deref()
            .is_none_or(|key| key.trim().is_empty())
        {
            return Err(ConfigError::Validation(
                "no Gemini API key: set GEMINI_API_KEY or [oracle].api_key".to_string(),
            ));
        }

        let radius = self.scoring.blur_radius;
        if !radius.is_finite() || radius <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "scoring.blur_radius must be a positive number, got {radius}"
            )));
        }

        if self.server.max_upload_bytes == 0 {
            return Err(ConfigError::Validation(
                "server.max_upload_bytes must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn with_key() -> Config {
        let mut config = Config::default();
        config.oracle.api_key = Some("test-key".to_string());
        config
    }

    #[test]
    fn defaults_match_single_user_deployment() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.database_path, PathBuf::from("sandwich_app.db"));
        assert_eq!(config.storage.image_dir, PathBuf::from("user_images"));
        assert!(!config.scoring.use_blur);
        assert!(config.scoring.clamp_bbox);
    }

    #[test]
    fn partial_toml_keeps_remaining_defaults() {
        let config = Config::from_toml(
            r#"
            [scoring]
            use_blur = true

            [oracle]
            api_key = "abc"
            "#,
        )
        .unwrap();

        assert!(config.scoring.use_blur);
        assert!((config.scoring.blur_radius - 1.1).abs() < f32::EPSILON);
        assert_eq!(config.oracle.api_key.as_deref(), Some("abc"));
        assert_eq!(config.oracle.vision_model, "gemini-2.0-flash");
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = Config::from_toml("[server\nport = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("GEMINI_API_KEY", "from-env"),
            ("SANDWICH_PORT", "9090"),
            ("SANDWICH_IMAGE_DIR", "/tmp/pics"),
            ("SANDWICH_USE_BLUR", "true"),
        ]);
        let mut config = Config::default();
        config.apply_env_overrides(|key| env.get(key).map(|v| (*v).to_string()));

        assert_eq!(config.oracle.api_key.as_deref(), Some("from-env"));
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.storage.image_dir, PathBuf::from("/tmp/pics"));
        assert!(config.scoring.use_blur);
    }

    #[test]
    fn invalid_port_override_is_ignored() {
        let mut config = Config::default();
        config.apply_env_overrides(|key| (key == "SANDWICH_PORT").then(|| "nope".to_string()));
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn missing_api_key_fails_validation() {
        let err = Config::default().validate().unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn non_positive_blur_radius_fails_validation() {
        let mut config = with_key();
        config.scoring.blur_radius = 0.0;
        assert!(config.validate().is_err());

        config.scoring.blur_radius = 2.0;
        assert!(config.validate().is_ok());
    }
}
