use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

use crate::{core::container::Container, core::log::LogLevel, environment::Environment};

pub const DEFAULT_ENV: &str = "local";
pub const PRODUCTION_ENV: &str = "production";

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_LOG_FILE: &str = "logs/app.log";
const DEFAULT_LOG_CHANNEL: &str = "app";
const DEFAULT_PUBLIC_PATH: &str = "public";
const DEFAULT_VIEWS_PATH: &str = "views";
const REDACTED: &str = "********";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read configuration file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unsupported configuration format for {}", path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("failed to parse configuration file {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("required environment variable {0} is not set")]
    MissingVariable(&'static str),
}

/// The application configuration, built once at bootstrap and read-only afterwards.
///
/// The `app` and `database` sections come from the environment, everything else
/// from the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Configuration {
    pub app: AppSettings,
    pub database: DatabaseSettings,
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub paths: PathSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppSettings {
    /// `APP_ENV`, defaults to `local`.
    pub env: String,
    /// `APP_DEBUG`, true only for the exact value `true`.
    pub debug: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseSettings {
    pub dsn: String,
    pub user: String,
    #[serde(serialize_with = "redact")]
    pub password: String,
    pub options: DatabaseOptions,
}

/// Driver attributes applied to every database connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseOptions {
    pub error_mode: ErrorMode,
    pub default_fetch_mode: FetchMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorMode {
    Silent,
    Warning,
    #[default]
    Exception,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    #[default]
    Assoc,
    Num,
    Both,
    Obj,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
    /// Headers added to every response.
    pub headers: BTreeMap<String, String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            workers: None,
            headers: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log file, relative to the application root.
    pub file: PathBuf,
    pub channel: String,
    /// Records below this level are dropped.
    pub level: LogLevel,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            file: PathBuf::from(DEFAULT_LOG_FILE),
            channel: DEFAULT_LOG_CHANNEL.to_string(),
            level: LogLevel::Debug,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub public: PathBuf,
    pub views: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            public: PathBuf::from(DEFAULT_PUBLIC_PATH),
            views: PathBuf::from(DEFAULT_VIEWS_PATH),
        }
    }
}

/// Schema of the configuration file. Every section is optional.
#[derive(Deserialize, Debug, Default, PartialEq)]
#[serde(default)]
pub struct ConfigurationFile {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub paths: PathSettings,
    pub database: DatabaseFileSection,
}

#[derive(Deserialize, Debug, Default, PartialEq)]
#[serde(default)]
pub struct DatabaseFileSection {
    pub options: DatabaseOptions,
}

impl AppSettings {
    pub fn from_environment(environment: &Environment) -> Self {
        Self {
            env: environment.get_or("APP_ENV", DEFAULT_ENV).to_string(),
            debug: environment.get("APP_DEBUG") == Some("true"),
        }
    }

    pub fn is_production(&self) -> bool {
        self.env == PRODUCTION_ENV
    }
}

impl DatabaseSettings {
    pub fn from_environment(
        environment: &Environment,
        options: DatabaseOptions,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            dsn: required(environment, "DB_DSN")?,
            user: required(environment, "DB_USER")?,
            password: required(environment, "DB_PASSWORD")?,
            options,
        })
    }
}

impl Configuration {
    /// Combines the file sections with the values read from the environment.
    pub fn assemble(
        file: ConfigurationFile,
        environment: &Environment,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            app: AppSettings::from_environment(environment),
            database: DatabaseSettings::from_environment(environment, file.database.options)?,
            server: file.server,
            logging: file.logging,
            paths: file.paths,
        })
    }
}

fn required(environment: &Environment, key: &'static str) -> Result<String, ConfigError> {
    environment
        .get(key)
        .map(str::to_string)
        .ok_or(ConfigError::MissingVariable(key))
}

fn redact<S: Serializer>(value: &str, serializer: S) -> Result<S::Ok, S::Error> {
    if value.is_empty() {
        serializer.serialize_str("")
    } else {
        serializer.serialize_str(REDACTED)
    }
}

/// Configuration file formats, picked from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Toml,
    Json,
}

impl Format {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "yaml" | "yml" => Some(Self::Yaml),
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Loads the configuration file and registers the result in the container.
pub struct Loader;

impl Loader {
    /// ``` rust,no_run
    /// use std::path::Path;
    /// use handlr::core::{configuration::Loader, container::Container};
    /// use handlr::environment::Environment;
    ///
    /// let mut container = Container::new();
    /// let environment = Environment::capture();
    /// let config = Loader::load(Path::new("app/config.yaml"), &mut container, &environment)?;
    /// println!("{}", config.app.env);
    /// # Ok::<(), handlr::core::configuration::ConfigError>(())
    /// ```
    pub fn load(
        path: &Path,
        container: &mut Container,
        environment: &Environment,
    ) -> Result<Arc<Configuration>, ConfigError> {
        let file = Self::read_file(path)?;
        let configuration = Arc::new(Configuration::assemble(file, environment)?);
        container.instance(configuration.clone());
        tracing::debug!(
            path = %path.display(),
            env = %configuration.app.env,
            "configuration loaded"
        );
        Ok(configuration)
    }

    pub fn read_file(path: &Path) -> Result<ConfigurationFile, ConfigError> {
        let format = Format::from_path(path).ok_or_else(|| ConfigError::UnsupportedFormat {
            path: path.to_path_buf(),
        })?;
        let content = fs::read_to_string(path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => ConfigError::NotFound {
                path: path.to_path_buf(),
            },
            _ => ConfigError::Io {
                path: path.to_path_buf(),
                source,
            },
        })?;
        Self::parse(&content, format).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn parse(content: &str, format: Format) -> Result<ConfigurationFile, String> {
        // an empty YAML document deserializes to unit, not to a map
        if content.trim().is_empty() {
            return Ok(ConfigurationFile::default());
        }
        match format {
            Format::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
            Format::Toml => toml::from_str(content).map_err(|e| e.to_string()),
            Format::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        }
    }
}
