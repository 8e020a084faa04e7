use crate::storage::MediaType;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    pub detection: DetectionConfig,
    pub upload: UploadConfig,
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DetectionConfig {
    /// Skip the cloud call and return the fixed sample detection instead.
    #[serde(default)]
    pub dry_run: bool,
    pub endpoint: Option<String>,
    /// Supplied through the environment (`APP_DETECTION__API_KEY`), never
    /// from the YAML files.
    pub api_key: Option<String>,
    #[serde(default = "default_max_labels")]
    pub max_labels: u32,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
}

fn default_max_labels() -> u32 {
    10
}

fn default_min_confidence() -> f32 {
    70.0
}

impl DetectionConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.dry_run {
            return Ok(());
        }
        match &self.endpoint {
            None => return Err("detection.endpoint is required unless dry_run is set".into()),
            Some(endpoint) if endpoint.is_empty() => {
                return Err("detection.endpoint is required unless dry_run is set".into())
            }
            Some(_) => {}
        }
        match &self.api_key {
            None => Err("detection.api_key is required unless dry_run is set".into()),
            Some(key) if key.is_empty() => {
                Err("detection.api_key is required unless dry_run is set".into())
            }
            Some(_) => Ok(()),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    pub storage_dir: PathBuf,
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: usize,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default = "default_allowed_media_types")]
    pub allowed_media_types: Vec<MediaType>,
}

fn default_max_upload_size() -> usize {
    10 * 1024 * 1024
}

fn default_confidence_threshold() -> f32 {
    50.0
}

fn default_allowed_media_types() -> Vec<MediaType> {
    vec![MediaType::Jpeg, MediaType::Png]
}

impl UploadConfig {
    pub fn is_allowed(&self, media_type: MediaType) -> bool {
        self.allowed_media_types.contains(&media_type)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum LogLevel {
    Debug,
    Info,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            other => Err(format!(
                "{} is not a supported minimum log level. Use either `debug` or `info`.",
                other
            )),
        }
    }
}

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let base_path = std::env::current_dir().expect("Failed to determine the current directory");
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .expect("Failed to parse APP_ENVIRONMENT");

    let config = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(config::File::from(
            configuration_directory.join(format!("{}.yaml", environment.as_str())),
        ))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    let config = config.try_deserialize::<Config>()?;

    if let Err(e) = config.detection.validate() {
        tracing::error!("Configuration validation failed: {}", e);
        return Err(config::ConfigError::Message(e));
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(dry_run: bool, endpoint: Option<&str>, api_key: Option<&str>) -> DetectionConfig {
        DetectionConfig {
            dry_run,
            endpoint: endpoint.map(String::from),
            api_key: api_key.map(String::from),
            max_labels: default_max_labels(),
            min_confidence: default_min_confidence(),
        }
    }

    #[test]
    fn dry_run_needs_no_credentials() {
        assert!(detection(true, None, None).validate().is_ok());
    }

    #[test]
    fn live_mode_requires_endpoint_and_key() {
        assert!(detection(false, None, Some("k")).validate().is_err());
        assert!(detection(false, Some("https://d.example.com"), None)
            .validate()
            .is_err());
        assert!(detection(false, Some("https://d.example.com"), Some(""))
            .validate()
            .is_err());
        assert!(detection(false, Some("https://d.example.com"), Some("k"))
            .validate()
            .is_ok());
    }
}
