//! Configuration validation.
//!
//! Cross-field checks that serde cannot express. Run after parsing,
//! before the config is handed to the pipeline.

use url::Url;

use crate::config::schema::{GuardConfig, KeyStrategy};

/// A single validation failure with the offending field.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration, collecting all failures.
pub fn validate_config(config: &GuardConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (i, policy) in config.rate_limit.policies.iter().enumerate() {
        let field = format!("rate_limit.policies[{}] ({})", i, policy.name);

        if policy.max == 0 {
            errors.push(ValidationError {
                field: field.clone(),
                message: "max must be greater than zero".to_string(),
            });
        }
        if policy.window_ms == 0 {
            errors.push(ValidationError {
                field: field.clone(),
                message: "window_ms must be greater than zero".to_string(),
            });
        }
        if policy.path_prefix.is_empty() {
            errors.push(ValidationError {
                field: field.clone(),
                message: "path_prefix must not be empty".to_string(),
            });
        }
        if policy.key_by == KeyStrategy::IdentityHeader && policy.identity_header.is_none() {
            errors.push(ValidationError {
                field,
                message: "identity-header key strategy requires identity_header".to_string(),
            });
        }
    }

    for origin in &config.csrf.allowed_origins {
        if Url::parse(origin).is_err() {
            errors.push(ValidationError {
                field: "csrf.allowed_origins".to_string(),
                message: format!("'{}' is not a valid origin URL", origin),
            });
        }
    }

    if config.store.op_timeout_ms == 0 {
        errors.push(ValidationError {
            field: "store.op_timeout_ms".to_string(),
            message: "store timeout must be greater than zero".to_string(),
        });
    }

    let risk = &config.risk;
    if !(risk.medium_score < risk.high_score && risk.high_score < risk.critical_score) {
        errors.push(ValidationError {
            field: "risk".to_string(),
            message: "score thresholds must be strictly increasing (medium < high < critical)"
                .to_string(),
        });
    }
    if risk.max_tracked_ips == 0 {
        errors.push(ValidationError {
            field: "risk.max_tracked_ips".to_string(),
            message: "tracked IP bound must be greater than zero".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
