//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (port, rotation interval, limits)
//! - Check the destination is an absolute http(s) URL
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before a server is started with the config

use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::upstream::Destination;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("destination is not set")]
    MissingDestination,

    #[error("destination is invalid: {0}")]
    InvalidDestination(String),

    #[error("proxy port {0} is outside 1-65535")]
    InvalidPort(u32),

    #[error("token rotation interval must be at least 1 minute")]
    RotationTooShort,

    #[error("bind host is empty")]
    EmptyBindHost,

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.destination.trim().is_empty() {
        errors.push(ValidationError::MissingDestination);
    } else if let Err(e) = Destination::parse(&config.destination) {
        errors.push(ValidationError::InvalidDestination(e.to_string()));
    }

    if config.proxy_port == 0 || config.proxy_port > u32::from(u16::MAX) {
        errors.push(ValidationError::InvalidPort(config.proxy_port));
    }

    if config.token_rotation_minutes < 1 {
        errors.push(ValidationError::RotationTooShort);
    }

    if config.bind_host.trim().is_empty() {
        errors.push(ValidationError::EmptyBindHost);
    }

    if config.timeouts.upstream_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.upstream_secs"));
    }
    if config.timeouts.command_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.command_secs"));
    }
    if config.limits.max_connections == 0 {
        errors.push(ValidationError::Zero("limits.max_connections"));
    }
    if config.limits.max_upstream_connections == 0 {
        errors.push(ValidationError::Zero("limits.max_upstream_connections"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        let config = ProxyConfig::new("https://api.example.com/v1", 8080);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_missing_destination() {
        let config = ProxyConfig::default();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::MissingDestination]);
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = ProxyConfig::new("ftp://files.example.com", 8080);
        config.proxy_port = 123_456;
        config.token_rotation_minutes = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(matches!(errors[0], ValidationError::InvalidDestination(_)));
        assert_eq!(errors[1], ValidationError::InvalidPort(123_456));
        assert_eq!(errors[2], ValidationError::RotationTooShort);
    }

    #[test]
    fn test_port_zero_rejected() {
        let mut config = ProxyConfig::new("http://localhost:3000", 8080);
        config.proxy_port = 0;
        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::InvalidPort(0)]
        );
    }
}
