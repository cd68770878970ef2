use crate::core::errors::ConfigError;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub log_level: Level,
    /// Maximum multipart body size accepted by `/analyze`
    pub max_upload_bytes: usize,
    pub cors: CorsOrigins,
}

/// Which browser origins may call the API
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsOrigins {
    Any,
    List(Vec<String>),
}

/// Gemini API configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
    pub max_retries: u32,
}

/// OCR engine selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrBackend {
    Paddle,
    Tesseract,
}

impl OcrBackend {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_lowercase().as_str() {
            "paddle" | "paddleocr" => Ok(Self::Paddle),
            "tesseract" => Ok(Self::Tesseract),
            other => Err(ConfigError::InvalidOcrBackend(other.to_string())),
        }
    }

    fn default_command(self) -> &'static str {
        match self {
            Self::Paddle => "paddleocr",
            Self::Tesseract => "tesseract",
        }
    }

    fn default_lang(self) -> &'static str {
        match self {
            Self::Paddle => "en",
            Self::Tesseract => "eng",
        }
    }
}

/// OCR configuration
#[derive(Debug, Clone)]
pub struct OcrConfig {
    pub backend: OcrBackend,
    pub command: String,
    pub lang: String,
    /// Keep OCR result artifacts here instead of a throwaway temp dir
    pub output_dir: Option<PathBuf>,
}

impl OcrConfig {
    /// OCR settings alone, for tools that never talk to Gemini.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(&|name: &str| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = match lookup("OCR_BACKEND") {
            Some(raw) => OcrBackend::parse(&raw)?,
            None => OcrBackend::Paddle,
        };

        Ok(Self {
            backend,
            command: lookup("OCR_COMMAND")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| backend.default_command().to_string()),
            lang: lookup("OCR_LANG")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| backend.default_lang().to_string()),
            output_dir: lookup("OCR_OUTPUT_DIR")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
        })
    }
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub api: ApiConfig,
    pub ocr: OcrConfig,
}

impl Config {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let config = Self::from_lookup(|name| env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("GEMINI_API_KEY")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let log_level = match lookup("LOG_LEVEL") {
            Some(raw) => match raw.trim().to_lowercase().as_str() {
                "trace" => Level::TRACE,
                "debug" => Level::DEBUG,
                "info" => Level::INFO,
                "warn" | "warning" => Level::WARN,
                "error" => Level::ERROR,
                _ => {
                    return Err(ConfigError::InvalidServerConfig(format!(
                        "LOG_LEVEL must be trace, debug, info, warn or error, got `{}`",
                        raw
                    )))
                }
            },
            None => Level::INFO,
        };

        let port = match lookup("PORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort(raw.clone()))?,
            None => 8000,
        };

        let cors = parse_cors_origins(lookup("CORS_ALLOWED_ORIGINS").as_deref());

        Ok(Self {
            server: ServerConfig {
                port,
                host: lookup("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                log_level,
                max_upload_bytes: parse_number(
                    &lookup,
                    "MAX_UPLOAD_BYTES",
                    10 * 1024 * 1024,
                    ConfigError::InvalidServerConfig,
                )?,
                cors,
            },
            api: ApiConfig {
                api_key,
                model: lookup("GEMINI_MODEL")
                    .unwrap_or_else(|| "gemini-2.5-flash-lite".to_string()),
                base_url: lookup("GEMINI_BASE_URL")
                    .map(|s| s.trim_end_matches('/').to_string())
                    .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string()),
                timeout: Duration::from_secs(parse_number(
                    &lookup,
                    "API_TIMEOUT_SECONDS",
                    60,
                    ConfigError::InvalidApiConfig,
                )?),
                max_retries: parse_number(
                    &lookup,
                    "GEMINI_MAX_RETRIES",
                    0,
                    ConfigError::InvalidApiConfig,
                )?,
            },
            ocr: OcrConfig::from_lookup(&lookup)?,
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.max_upload_bytes == 0 {
            return Err(ConfigError::InvalidServerConfig(
                "max_upload_bytes must be > 0".to_string(),
            ));
        }

        if let CorsOrigins::List(origins) = &self.server.cors {
            for origin in origins {
                if !(origin.starts_with("http://") || origin.starts_with("https://")) {
                    return Err(ConfigError::InvalidCorsOrigin(origin.clone()));
                }
            }
        }

        if self.api.timeout.is_zero() {
            return Err(ConfigError::InvalidApiConfig(
                "API_TIMEOUT_SECONDS must be > 0".to_string(),
            ));
        }

        if self.api.model.trim().is_empty() {
            return Err(ConfigError::InvalidApiConfig("GEMINI_MODEL is empty".to_string()));
        }

        if let Some(dir) = &self.ocr.output_dir {
            if dir.exists() && !dir.is_dir() {
                return Err(ConfigError::InvalidOcrConfig(format!(
                    "OCR_OUTPUT_DIR is not a directory: {}",
                    dir.display()
                )));
            }
        }

        Ok(())
    }

    pub fn server_port(&self) -> u16 {
        self.server.port
    }

    pub fn server_host(&self) -> &str {
        &self.server.host
    }

    pub fn log_level(&self) -> Level {
        self.server.log_level
    }

    pub fn gemini_model(&self) -> &str {
        &self.api.model
    }
}

/// Parse an optional numeric variable; a value that does not parse is an error.
fn parse_number<T, F>(
    lookup: &F,
    name: &str,
    default: T,
    invalid: fn(String) -> ConfigError,
) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| invalid(format!("{} must be a non-negative integer, got `{}`", name, raw))),
        None => Ok(default),
    }
}

fn parse_cors_origins(raw: Option<&str>) -> CorsOrigins {
    let Some(raw) = raw else {
        return CorsOrigins::Any;
    };

    let origins: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        CorsOrigins::Any
    } else {
        CorsOrigins::List(origins)
    }
}
