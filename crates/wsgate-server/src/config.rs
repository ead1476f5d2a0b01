//! Server configuration: TOML file + CLI overrides.

use crate::auth::RetryPolicy;
use crate::session::{HeartbeatConfig, SessionConfig};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use wsgate_core::{GateError, GateResult};

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub heartbeat: HeartbeatSection,
    #[serde(default)]
    pub auth: AuthSection,
}

/// `[server]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

/// `[heartbeat]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatSection {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,
}

impl Default for HeartbeatSection {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            grace_secs: default_grace_secs(),
            write_timeout_secs: default_write_timeout_secs(),
        }
    }
}

/// `[auth]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthSection {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub allow_empty_id: bool,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            max_attempts: default_max_attempts(),
            backoff_secs: default_backoff_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            allow_empty_id: false,
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8889
}
fn default_interval_secs() -> u64 {
    30
}
fn default_grace_secs() -> u64 {
    5
}
fn default_write_timeout_secs() -> u64 {
    2
}
fn default_endpoint() -> String {
    "http://localhost:5000/verify_token".to_string()
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_secs() -> u64 {
    2
}
fn default_request_timeout_secs() -> u64 {
    10
}

/// Values given on the command line; `None` keeps the file value.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub bind: Option<String>,
    pub port: Option<u16>,
    pub verify_url: Option<String>,
}

/// Resolved server configuration (CLI overrides applied, values validated).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub verify_url: String,
    pub request_timeout: Duration,
    pub session: SessionConfig,
}

impl ServerConfig {
    /// Load config from TOML file, then apply CLI overrides.
    pub fn load(config_path: Option<&Path>, overrides: &CliOverrides) -> GateResult<Self> {
        let file_config = match config_path {
            Some(path) => {
                let expanded = expand_tilde(path);
                if expanded.exists() {
                    info!(path = %expanded.display(), "loading config file");
                    let content = std::fs::read_to_string(&expanded)?;
                    parse(&content)?
                } else {
                    info!(path = %expanded.display(), "config file not found, using defaults");
                    ConfigFile::default()
                }
            }
            None => ConfigFile::default(),
        };

        Self::resolve(file_config, overrides)
    }

    /// Merge a parsed file with CLI overrides and validate the result.
    pub fn resolve(file: ConfigFile, overrides: &CliOverrides) -> GateResult<Self> {
        let bind = overrides.bind.clone().unwrap_or(file.server.bind);
        let port = overrides.port.unwrap_or(file.server.port);
        let bind_addr: SocketAddr = format!("{bind}:{port}")
            .parse()
            .map_err(|e| GateError::Config(format!("invalid bind address {bind}:{port}: {e}")))?;

        if file.heartbeat.interval_secs == 0 {
            return Err(GateError::Config("heartbeat.interval_secs must be at least 1".into()));
        }
        if file.heartbeat.write_timeout_secs == 0 {
            return Err(GateError::Config(
                "heartbeat.write_timeout_secs must be at least 1".into(),
            ));
        }
        if file.auth.max_attempts == 0 {
            return Err(GateError::Config("auth.max_attempts must be at least 1".into()));
        }

        let verify_url = overrides.verify_url.clone().unwrap_or(file.auth.endpoint);

        Ok(Self {
            bind_addr,
            verify_url,
            request_timeout: Duration::from_secs(file.auth.request_timeout_secs),
            session: SessionConfig {
                heartbeat: HeartbeatConfig {
                    interval: Duration::from_secs(file.heartbeat.interval_secs),
                    grace: Duration::from_secs(file.heartbeat.grace_secs),
                    write_timeout: Duration::from_secs(file.heartbeat.write_timeout_secs),
                },
                retry: RetryPolicy {
                    max_attempts: file.auth.max_attempts,
                    backoff: Duration::from_secs(file.auth.backoff_secs),
                    allow_empty_id: file.auth.allow_empty_id,
                },
            },
        })
    }
}

fn parse(content: &str) -> GateResult<ConfigFile> {
    toml::from_str::<ConfigFile>(content)
        .map_err(|e| GateError::Config(format!("config parse error: {e}")))
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = ServerConfig::resolve(ConfigFile::default(), &CliOverrides::default()).unwrap();
        assert_eq!(cfg.bind_addr, "0.0.0.0:8889".parse().unwrap());
        assert_eq!(cfg.verify_url, "http://localhost:5000/verify_token");
        assert_eq!(cfg.session.heartbeat.interval, Duration::from_secs(30));
        assert_eq!(cfg.session.heartbeat.grace, Duration::from_secs(5));
        assert_eq!(cfg.session.heartbeat.write_timeout, Duration::from_secs(2));
        assert_eq!(cfg.session.retry.max_attempts, 3);
        assert_eq!(cfg.session.retry.backoff, Duration::from_secs(2));
        assert!(!cfg.session.retry.allow_empty_id);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let file = parse(
            r#"
            [heartbeat]
            interval_secs = 10

            [auth]
            max_attempts = 5
            allow_empty_id = true
            "#,
        )
        .unwrap();
        let cfg = ServerConfig::resolve(file, &CliOverrides::default()).unwrap();
        assert_eq!(cfg.session.heartbeat.interval, Duration::from_secs(10));
        assert_eq!(cfg.session.heartbeat.grace, Duration::from_secs(5));
        assert_eq!(cfg.session.retry.max_attempts, 5);
        assert!(cfg.session.retry.allow_empty_id);
    }

    #[test]
    fn cli_overrides_win() {
        let file = parse(
            r#"
            [server]
            port = 9000

            [auth]
            endpoint = "http://auth.internal/verify_token"
            "#,
        )
        .unwrap();
        let overrides = CliOverrides {
            bind: Some("127.0.0.1".into()),
            port: Some(7000),
            verify_url: Some("http://127.0.0.1:5000/verify_token".into()),
        };
        let cfg = ServerConfig::resolve(file, &overrides).unwrap();
        assert_eq!(cfg.bind_addr, "127.0.0.1:7000".parse().unwrap());
        assert_eq!(cfg.verify_url, "http://127.0.0.1:5000/verify_token");
    }

    #[test]
    fn zero_attempts_rejected() {
        let file = parse("[auth]\nmax_attempts = 0\n").unwrap();
        let err = ServerConfig::resolve(file, &CliOverrides::default()).unwrap_err();
        assert!(matches!(err, GateError::Config(_)));
    }

    #[test]
    fn zero_interval_rejected() {
        let file = parse("[heartbeat]\ninterval_secs = 0\n").unwrap();
        assert!(ServerConfig::resolve(file, &CliOverrides::default()).is_err());
    }

    #[test]
    fn bad_bind_rejected() {
        let overrides = CliOverrides {
            bind: Some("not an address".into()),
            ..Default::default()
        };
        assert!(ServerConfig::resolve(ConfigFile::default(), &overrides).is_err());
    }

    #[test]
    fn malformed_toml_is_config_error() {
        assert!(matches!(parse("[server\nport = 1"), Err(GateError::Config(_))));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = 4444").unwrap();
        let cfg = ServerConfig::load(Some(file.path()), &CliOverrides::default()).unwrap();
        assert_eq!(cfg.bind_addr.port(), 4444);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let path = Path::new("/nonexistent/wsgate/config.toml");
        let cfg = ServerConfig::load(Some(path), &CliOverrides::default()).unwrap();
        assert_eq!(cfg.bind_addr.port(), 8889);
    }
}
