//! Configuration validation

use super::schema::{Config, ServerConfig, StreamConfig};
use crate::error::{Result, ValidationError};
use std::net::IpAddr;

pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate entire configuration
    pub fn validate(config: &Config) -> Result<()> {
        Self::validate_server(&config.server)?;
        Self::validate_stream(&config.stream)?;
        Ok(())
    }

    fn validate_server(server: &ServerConfig) -> Result<()> {
        if server.port == 0 {
            return Err(ValidationError::InvalidPort.into());
        }

        // Bound as-is, so it must be an address literal rather than a name
        if server.host.parse::<IpAddr>().is_err() {
            return Err(ValidationError::InvalidHost {
                host: server.host.clone(),
            }
            .into());
        }

        let path = &server.base_path;
        if path.chars().any(|c| c.is_whitespace() || c == '?' || c == '#') {
            return Err(ValidationError::InvalidBasePath { path: path.clone() }.into());
        }

        Ok(())
    }

    fn validate_stream(stream: &StreamConfig) -> Result<()> {
        let sizes = [
            ("geo_history", stream.geo_history),
            ("log_history", stream.log_history),
            ("subscriber_queue", stream.subscriber_queue),
            ("max_inflight_lookups", stream.max_inflight_lookups),
        ];

        for (field, value) in sizes {
            if value == 0 {
                return Err(ValidationError::InvalidCapacity { field, value }.into());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MaptailError;

    #[test]
    fn test_default_is_valid() {
        assert!(ConfigValidator::validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut config = Config::default();
        config.stream.log_history = 0;

        match ConfigValidator::validate(&config) {
            Err(MaptailError::Validation(err)) => assert_eq!(
                err,
                ValidationError::InvalidCapacity {
                    field: "log_history",
                    value: 0
                }
            ),
            other => panic!("Expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_base_path_rejected() {
        let mut config = Config::default();
        config.server.base_path = "/map tail".to_string();
        assert!(ConfigValidator::validate(&config).is_err());

        config.server.base_path = "/maptail?x=1".to_string();
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_host_must_be_address_literal() {
        let mut config = Config::default();
        for host in ["::", "127.0.0.1", "::1"] {
            config.server.host = host.to_string();
            assert!(ConfigValidator::validate(&config).is_ok(), "{}", host);
        }

        for host in ["localhost", "", "0.0.0.0:3000", "[::]"] {
            config.server.host = host.to_string();
            match ConfigValidator::validate(&config) {
                Err(MaptailError::Validation(err)) => assert_eq!(
                    err,
                    ValidationError::InvalidHost {
                        host: host.to_string()
                    }
                ),
                other => panic!("Expected invalid host for {:?}, got {:?}", host, other),
            }
        }
    }

    #[test]
    fn test_zero_port_rejected() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(ConfigValidator::validate(&config).is_err());
    }
}
