//! Configuration for quayd

use quay_deployment::EngineConfig;
use quay_supervisor::NativeSupervisorConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Deployment engine configuration
    #[serde(default)]
    pub engine: EngineSettings,

    /// Process supervisor configuration
    #[serde(default)]
    pub supervisor: SupervisorSettings,

    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,

    /// Maximum request body size in bytes, bounds bundle uploads
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            enable_cors: true,
            max_body_size: default_max_body_size(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root of service directories, bundles and working trees
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Delete unreferenced bundles at startup
    #[serde(default = "default_true")]
    pub sweep_orphans: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            sweep_orphans: true,
        }
    }
}

/// Deployment engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Bundle extraction timeout in seconds
    #[serde(default = "default_extract_timeout")]
    pub extract_timeout_secs: u64,

    /// Dependency installation timeout in seconds
    #[serde(default = "default_install_timeout")]
    pub install_timeout_secs: u64,

    /// Installer command run in each working tree; empty disables it
    #[serde(default = "default_install_command")]
    pub install_command: Vec<String>,

    /// Entry point when the manifest declares none
    #[serde(default = "default_entry_point")]
    pub default_entry_point: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            extract_timeout_secs: default_extract_timeout(),
            install_timeout_secs: default_install_timeout(),
            install_command: default_install_command(),
            default_entry_point: default_entry_point(),
        }
    }
}

impl EngineSettings {
    pub fn engine_config(&self, sweep_orphans: bool) -> EngineConfig {
        EngineConfig {
            extract_timeout: Duration::from_secs(self.extract_timeout_secs),
            install_timeout: Duration::from_secs(self.install_timeout_secs),
            default_entry_point: self.default_entry_point.clone(),
            sweep_orphans,
        }
    }
}

/// Process supervisor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorSettings {
    /// Interpreter for entry points; empty runs them directly
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// Output lines buffered per service
    #[serde(default = "default_log_buffer_lines")]
    pub log_buffer_lines: usize,

    /// Seconds to wait for a stopped process to exit
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            log_buffer_lines: default_log_buffer_lines(),
            stop_timeout_secs: default_stop_timeout(),
        }
    }
}

impl SupervisorSettings {
    pub fn native_config(&self) -> NativeSupervisorConfig {
        let interpreter = self.interpreter.trim();
        NativeSupervisorConfig {
            interpreter: (!interpreter.is_empty()).then(|| interpreter.to_string()),
            stop_timeout: Duration::from_secs(self.stop_timeout_secs),
            log_buffer_lines: self.log_buffer_lines,
        }
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared bearer token; the API is open when unset
    #[serde(default)]
    pub token: Option<String>,
}

impl AuthConfig {
    /// The configured token, ignoring blank values
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_max_body_size() -> usize {
    50 * 1024 * 1024
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_extract_timeout() -> u64 {
    60
}

fn default_install_timeout() -> u64 {
    300
}

fn default_install_command() -> Vec<String> {
    vec!["npm".into(), "install".into(), "--omit=dev".into()]
}

fn default_entry_point() -> String {
    "index.js".to_string()
}

fn default_interpreter() -> String {
    "node".to_string()
}

fn default_log_buffer_lines() -> usize {
    1000
}

fn default_stop_timeout() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration from defaults, an optional file and the environment
    ///
    /// Environment variables use the `QUAY_` prefix and `__` between
    /// sections, e.g. `QUAY_AUTH__TOKEN`.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // Add environment variables with QUAY_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("QUAY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.server.listen_addr.port(), 8080);
        assert_eq!(config.server.max_body_size, 50 * 1024 * 1024);
        assert!(config.storage.sweep_orphans);
        assert!(config.auth.token().is_none());
    }

    #[test]
    fn test_engine_defaults() {
        let engine = EngineSettings::default().engine_config(true);
        assert_eq!(engine.install_timeout, Duration::from_secs(300));
        assert_eq!(engine.default_entry_point, "index.js");
        assert_eq!(
            EngineSettings::default().install_command,
            vec!["npm", "install", "--omit=dev"]
        );
    }

    #[test]
    fn test_empty_interpreter_runs_directly() {
        let settings = SupervisorSettings {
            interpreter: "  ".to_string(),
            ..SupervisorSettings::default()
        };
        assert!(settings.native_config().interpreter.is_none());
        assert_eq!(
            SupervisorSettings::default().native_config().interpreter.as_deref(),
            Some("node")
        );
    }

    #[test]
    fn test_blank_token_is_unset() {
        let auth = AuthConfig {
            token: Some("   ".to_string()),
        };
        assert!(auth.token().is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quay.toml");
        std::fs::write(
            &path,
            "[storage]\ndata_dir = \"/srv/quay\"\n\n[auth]\ntoken = \"s3cret\"\n",
        )
        .unwrap();

        let config = DaemonConfig::load(path.to_str()).unwrap();
        assert_eq!(config.storage.data_dir, PathBuf::from("/srv/quay"));
        assert_eq!(config.auth.token(), Some("s3cret"));
        assert_eq!(config.engine.default_entry_point, "index.js");
    }
}
