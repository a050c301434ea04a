use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::catalog::PresetId;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Which kind of execution unit the pool should try to build.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPreference {
    /// Isolated worker threads when they pass the capability probe, inline otherwise.
    #[default]
    Auto,
    /// Always run inline on the scheduler's runtime (capacity 1).
    Inline,
    /// Isolated worker threads only; a unit that fails its probe is still
    /// replaced by an inline one, but the pool keeps its isolated capacity.
    Isolated,
}

/// Job queue and executor pool configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    /// Number of execution units (0 = infer from available cores).
    #[serde(default)]
    pub max_concurrency: usize,

    #[serde(default)]
    pub execution: ExecutionPreference,

    /// How long an isolated unit may take to answer its startup probe.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,

    /// Optional deadline for a single pipeline call (unset = no deadline).
    #[serde(default)]
    pub call_timeout_secs: Option<u64>,
}

fn default_probe_timeout() -> u64 {
    500
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 0,
            execution: ExecutionPreference::Auto,
            probe_timeout_ms: default_probe_timeout(),
            call_timeout_secs: None,
        }
    }
}

/// Session defaults
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub default_preset: PresetId,

    /// Overrides the preset's default JPEG quality when set.
    #[serde(default)]
    pub jpeg_quality: Option<f32>,

    /// Maximum accepted size of a single uploaded file.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_max_upload_bytes() -> usize {
    32 * 1024 * 1024
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_preset: PresetId::default(),
            jpeg_quality: None,
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.queue.max_concurrency, 0);
        assert_eq!(config.queue.execution, ExecutionPreference::Auto);
        assert_eq!(config.queue.probe_timeout_ms, 500);
        assert!(config.queue.call_timeout_secs.is_none());
        assert_eq!(config.session.default_preset, PresetId::PhotosRecommended);
        assert_eq!(config.session.max_upload_bytes, 32 * 1024 * 1024);
    }

    #[test]
    fn test_deserialize_full_config() {
        let toml = r#"
[server]
host = "127.0.0.1"
port = 9000

[queue]
max_concurrency = 3
execution = "inline"
probe_timeout_ms = 250
call_timeout_secs = 30

[session]
default_preset = "share_beta"
jpeg_quality = 0.6
max_upload_bytes = 1024
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
        assert_eq!(config.queue.max_concurrency, 3);
        assert_eq!(config.queue.execution, ExecutionPreference::Inline);
        assert_eq!(config.queue.probe_timeout_ms, 250);
        assert_eq!(config.queue.call_timeout_secs, Some(30));
        assert_eq!(config.session.default_preset, PresetId::ShareBeta);
        assert_eq!(config.session.jpeg_quality, Some(0.6));
        assert_eq!(config.session.max_upload_bytes, 1024);
    }

    #[test]
    fn test_deserialize_isolated_execution() {
        let toml = r#"
[queue]
execution = "isolated"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.queue.execution, ExecutionPreference::Isolated);
    }

    #[test]
    fn test_deserialize_unknown_execution_fails() {
        let toml = r#"
[queue]
execution = "gpu"
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }
}
