//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (tries, timeouts, degradation share)
//! - Check server addresses and detect duplicates
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: FileConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use thiserror::Error;

use crate::config::schema::FileConfig;
use crate::load_balancer::server::parse_address;

/// A single semantic problem in a config file.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("allowed_degradation_part must be within 0.0..=1.0, got {0}")]
    DegradationOutOfRange(f64),

    #[error("timeout_multiplier must be positive, got {0}")]
    InvalidTimeoutMultiplier(f64),

    #[error("upstream '{upstream}' profile '{profile}': {reason}")]
    InvalidProfile {
        upstream: String,
        profile: String,
        reason: String,
    },

    #[error("upstream '{upstream}': invalid server address '{address}'")]
    InvalidServerAddress { upstream: String, address: String },

    #[error("upstream '{upstream}': server '{address}' listed more than once")]
    DuplicateServer { upstream: String, address: String },

    #[error("upstream '{upstream}': server '{address}' has zero weight")]
    ZeroWeight { upstream: String, address: String },
}

/// Validate `config`, collecting every problem found.
pub fn validate_config(config: &FileConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let degradation = config.balancer.allowed_degradation_part;
    if !(0.0..=1.0).contains(&degradation) {
        errors.push(ValidationError::DegradationOutOfRange(degradation));
    }
    let multiplier = config.balancer.timeout_multiplier;
    if multiplier.is_nan() || multiplier <= 0.0 {
        errors.push(ValidationError::InvalidTimeoutMultiplier(multiplier));
    }

    let mut names: Vec<&String> = config.upstreams.keys().collect();
    names.sort();
    for name in names {
        let entry = &config.upstreams[name];

        let mut profiles: Vec<_> = entry.profiles.iter().collect();
        profiles.sort_by(|a, b| a.0.cmp(b.0));
        for (profile, upstream_config) in profiles {
            let invalid = |reason: &str| ValidationError::InvalidProfile {
                upstream: name.clone(),
                profile: profile.clone(),
                reason: reason.to_string(),
            };
            if upstream_config.max_tries == 0 {
                errors.push(invalid("max_tries must be at least 1"));
            }
            if upstream_config.request_timeout_ms == 0 {
                errors.push(invalid("request_timeout_ms must be positive"));
            }
            if upstream_config.fail_timeout_ms == 0 && upstream_config.max_fails > 0 {
                errors.push(invalid("fail_timeout_ms must be positive when max_fails is set"));
            }
        }

        let mut seen = HashSet::new();
        for server in &entry.servers {
            if parse_address(&server.address).is_err() {
                errors.push(ValidationError::InvalidServerAddress {
                    upstream: name.clone(),
                    address: server.address.clone(),
                });
            }
            if server.weight == 0 {
                errors.push(ValidationError::ZeroWeight {
                    upstream: name.clone(),
                    address: server.address.clone(),
                });
            }
            if !seen.insert(server.address.as_str()) {
                errors.push(ValidationError::DuplicateServer {
                    upstream: name.clone(),
                    address: server.address.clone(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
