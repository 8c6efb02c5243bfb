//! Service configuration
//!
//! Sources, lowest precedence first: built-in defaults, an optional TOML
//! file, `RICE_API__*` environment variables, then `FRONTEND_URL`.

use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use config::builder::DefaultState;
use fallback::ModelPaths;
use serde::Deserialize;
use std::path::PathBuf;

/// Config file consulted when `RICE_API_CONFIG` is unset
pub const DEFAULT_CONFIG_FILE: &str = "rice-disease-api.toml";

/// Origins of the local frontend dev and preview servers
pub const DEFAULT_ALLOWED_ORIGINS: [&str; 3] = [
    "http://localhost:5173",
    "http://localhost:3000",
    "http://localhost:4173",
];

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub cors: CorsConfig,
    /// Extra allowed origin for a deployed frontend
    pub frontend_url: Option<String>,
    pub models: ModelsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
    /// Answer request failures with 400/500 instead of 200
    pub strict_status_codes: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_any_origin: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    pub dir: PathBuf,
    pub cnn_file: String,
    pub rf_file: String,
    pub scaler_file: String,
    pub fallback_seed: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Settings {
    /// Load from the file named by `RICE_API_CONFIG` (or the default file)
    /// and the process environment
    pub fn load() -> Result<Self, ConfigError> {
        let file = std::env::var("RICE_API_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

        let frontend_url = std::env::var("FRONTEND_URL").ok().filter(|url| !url.trim().is_empty());

        Self::defaults()?
            .add_source(File::with_name(&file).format(FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix("RICE_API")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("cors.allowed_origins")
                    .try_parsing(true),
            )
            .set_override_option("frontend_url", frontend_url)?
            .build()?
            .try_deserialize()
    }

    /// Defaults overlaid with a TOML document
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        Self::defaults()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8000)?
            .set_default("server.max_upload_bytes", 10 * 1024 * 1024)?
            .set_default("server.strict_status_codes", false)?
            .set_default("cors.allowed_origins", DEFAULT_ALLOWED_ORIGINS.to_vec())?
            .set_default("cors.allow_any_origin", true)?
            .set_default("models.dir", "./Models")?
            .set_default("models.cnn_file", "cnn_model.onnx")?
            .set_default("models.rf_file", "rf_model.onnx")?
            .set_default("models.scaler_file", "scaler.onnx")?
            .set_default("models.fallback_seed", 42)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn model_paths(&self) -> ModelPaths {
        ModelPaths::in_dir(
            &self.models.dir,
            &self.models.cnn_file,
            &self.models.rf_file,
            &self.models.scaler_file,
        )
    }

    /// Configured origins plus the frontend URL, when set
    pub fn allowed_origins(&self) -> Vec<String> {
        let mut origins = self.cors.allowed_origins.clone();
        if let Some(url) = self.frontend_url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            if !origins.iter().any(|o| o == url) {
                origins.push(url.to_string());
            }
        }
        origins
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
                max_upload_bytes: 10 * 1024 * 1024,
                strict_status_codes: false,
            },
            cors: CorsConfig {
                allowed_origins: DEFAULT_ALLOWED_ORIGINS.iter().map(|o| o.to_string()).collect(),
                allow_any_origin: true,
            },
            frontend_url: None,
            models: ModelsConfig {
                dir: PathBuf::from("./Models"),
                cnn_file: "cnn_model.onnx".to_string(),
                rf_file: "rf_model.onnx".to_string(),
                scaler_file: "scaler.onnx".to_string(),
                fallback_seed: 42,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Pretty,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_gives_defaults() {
        let settings = Settings::from_toml("").unwrap();
        let expected = Settings::default();

        assert_eq!(settings.bind_address(), "0.0.0.0:8000");
        assert_eq!(settings.server.max_upload_bytes, expected.server.max_upload_bytes);
        assert!(!settings.server.strict_status_codes);
        assert!(settings.cors.allow_any_origin);
        assert_eq!(settings.cors.allowed_origins, expected.cors.allowed_origins);
        assert_eq!(settings.models.fallback_seed, 42);
        assert_eq!(settings.logging.format, LogFormat::Pretty);
        assert!(settings.frontend_url.is_none());
    }

    #[test]
    fn test_toml_overrides() {
        let settings = Settings::from_toml(
            r#"
            frontend_url = "https://rice.example.org"

            [server]
            port = 9100
            strict_status_codes = true

            [models]
            dir = "/srv/models"

            [logging]
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(settings.server.port, 9100);
        assert!(settings.server.strict_status_codes);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.logging.format, LogFormat::Json);
        assert_eq!(settings.model_paths().cnn, PathBuf::from("/srv/models/cnn_model.onnx"));
        assert_eq!(settings.model_paths().scaler, PathBuf::from("/srv/models/scaler.onnx"));
    }

    #[test]
    fn test_allowed_origins_appends_frontend_once() {
        let mut settings = Settings::default();
        assert_eq!(settings.allowed_origins().len(), 3);

        settings.frontend_url = Some("https://rice.example.org".to_string());
        let origins = settings.allowed_origins();
        assert_eq!(origins.len(), 4);
        assert_eq!(origins[3], "https://rice.example.org");

        settings.frontend_url = Some("http://localhost:3000".to_string());
        assert_eq!(settings.allowed_origins().len(), 3);

        settings.frontend_url = Some("   ".to_string());
        assert_eq!(settings.allowed_origins().len(), 3);
    }

    #[test]
    fn test_unknown_log_format_rejected() {
        assert!(Settings::from_toml("[logging]\nformat = \"xml\"").is_err());
    }
}
