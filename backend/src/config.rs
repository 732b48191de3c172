use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "config/server.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Which inference runtime loads the model artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelBackend {
    /// Pick the runtime from the model file extension.
    Auto,
    Onnx,
    Torch,
}

impl FromStr for ModelBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(ModelBackend::Auto),
            "onnx" => Ok(ModelBackend::Onnx),
            "torch" | "torchscript" => Ok(ModelBackend::Torch),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
    pub max_upload_bytes: usize,
    pub request_timeout_secs: u64,
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8081,
            workers: None,
            max_upload_bytes: 16 * 1024 * 1024,
            request_timeout_secs: 30,
            static_dir: PathBuf::from("backend/static"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub path: PathBuf,
    pub backend: ModelBackend,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./model/V2/retinal-octV2-94ACC.onnx"),
            backend: ModelBackend::Auto,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
}

impl AppConfig {
    /// Defaults, then the YAML file named by `RETINA_CONFIG` (or
    /// `config/server.yaml` if it exists), then environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let explicit = std::env::var("RETINA_CONFIG").ok().map(PathBuf::from);
        let mut config = match explicit {
            Some(path) => Self::from_file(&path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("Loading configuration from {}", path.display());
        Self::from_yaml_str(&config_str)
    }

    pub fn from_yaml_str(config_str: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(config_str)?)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = parse_value("PORT", port)?;
        }
        if let Some(workers) = lookup("WORKERS") {
            self.server.workers = Some(parse_value("WORKERS", workers)?);
        }
        if let Some(max) = lookup("MAX_UPLOAD_BYTES") {
            self.server.max_upload_bytes = parse_value("MAX_UPLOAD_BYTES", max)?;
        }
        if let Some(secs) = lookup("REQUEST_TIMEOUT_SECS") {
            self.server.request_timeout_secs = parse_value("REQUEST_TIMEOUT_SECS", secs)?;
        }
        if let Some(dir) = lookup("STATIC_DIR") {
            self.server.static_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup("MODEL_PATH") {
            self.model.path = PathBuf::from(path);
        }
        if let Some(backend) = lookup("MODEL_BACKEND") {
            self.model.backend = backend
                .parse()
                .map_err(|_| ConfigError::InvalidValue {
                    key: "MODEL_BACKEND",
                    value: backend,
                })?;
        }
        self.validate()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.max_upload_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_upload_bytes",
                value: "0".to_string(),
            });
        }
        if self.server.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "request_timeout_secs",
                value: "0".to_string(),
            });
        }
        if self.server.workers == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "workers",
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }
}

fn parse_value<T: FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { key, value })
}
