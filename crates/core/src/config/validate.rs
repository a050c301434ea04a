use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Probe timeout is not 0
/// - JPEG quality override, when set, is within (0, 1]
/// - Upload limit is not 0
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.queue.probe_timeout_ms == 0 {
        return Err(ConfigError::ValidationError(
            "queue.probe_timeout_ms cannot be 0".to_string(),
        ));
    }

    if let Some(quality) = config.session.jpeg_quality {
        if !(quality > 0.0 && quality <= 1.0) {
            return Err(ConfigError::ValidationError(format!(
                "session.jpeg_quality must be in (0, 1], got {}",
                quality
            )));
        }
    }

    if config.session.max_upload_bytes == 0 {
        return Err(ConfigError::ValidationError(
            "session.max_upload_bytes cannot be 0".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{QueueConfig, ServerConfig, SessionConfig};
    use std::net::IpAddr;

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let config = Config {
            server: ServerConfig {
                host: "0.0.0.0".parse::<IpAddr>().unwrap(),
                port: 0,
            },
            ..Default::default()
        };
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_probe_timeout_zero_fails() {
        let config = Config {
            queue: QueueConfig {
                probe_timeout_ms: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_quality_out_of_range_fails() {
        for quality in [0.0, -0.5, 1.5, f32::NAN] {
            let config = Config {
                session: SessionConfig {
                    jpeg_quality: Some(quality),
                    ..Default::default()
                },
                ..Default::default()
            };
            assert!(
                validate_config(&config).is_err(),
                "quality {} should be rejected",
                quality
            );
        }
    }

    #[test]
    fn test_validate_quality_upper_bound_inclusive() {
        let config = Config {
            session: SessionConfig {
                jpeg_quality: Some(1.0),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(validate_config(&config).is_ok());
    }
}
