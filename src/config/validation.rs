use std::collections::HashSet;

use eyre::Result;
use tracing_subscriber::EnvFilter;

use crate::{
    config::models::{EngineConfig, RouteDefinition},
    core::registry::parse_scheme,
};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid URI '{uri}' in {location}: {reason}")]
    InvalidUri {
        uri: String,
        location: String,
        reason: String,
    },

    #[error("Duplicate route id '{id}'")]
    DuplicateRouteId { id: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Engine configuration validator
pub struct EngineConfigValidator;

impl EngineConfigValidator {
    /// Validate against the built-in components enabled by the configuration itself.
    pub fn validate(config: &EngineConfig) -> ValidationResult<()> {
        Self::validate_with_schemes(config, &config.enabled_schemes())
    }

    /// Validate the entire configuration, accepting URIs whose scheme is in `schemes`.
    ///
    /// All problems are collected and reported together.
    pub fn validate_with_schemes(config: &EngineConfig, schemes: &[&str]) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_log_level(&config.logging.level) {
            errors.push(e);
        }

        if config.routes.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "routes".to_string(),
            });
        }

        let mut seen_ids = HashSet::new();
        for (index, route) in config.routes.iter().enumerate() {
            if !route.id.is_empty() && !seen_ids.insert(route.id.as_str()) {
                errors.push(ValidationError::DuplicateRouteId {
                    id: route.id.clone(),
                });
            }
            if let Err(mut route_errors) = Self::validate_route(index, route, schemes) {
                errors.append(&mut route_errors);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    fn validate_log_level(level: &str) -> ValidationResult<()> {
        if level.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "logging.level".to_string(),
            });
        }
        EnvFilter::try_new(level).map_err(|e| ValidationError::InvalidField {
            field: "logging.level".to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    fn validate_route(
        index: usize,
        route: &RouteDefinition,
        schemes: &[&str],
    ) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        let label = if route.id.is_empty() {
            format!("route #{}", index + 1)
        } else {
            format!("route '{}'", route.id)
        };

        if route.id.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: format!("{label} id"),
            });
        }

        if let Err(e) = Self::validate_uri(&route.from, &format!("{label} from"), schemes) {
            errors.push(e);
        }

        for (step_index, step) in route.steps.iter().enumerate() {
            if let Some(uri) = step.uri() {
                let location = format!("{label} step {}", step_index + 1);
                if let Err(e) = Self::validate_uri(uri, &location, schemes) {
                    errors.push(e);
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_uri(uri: &str, location: &str, schemes: &[&str]) -> ValidationResult<()> {
        let scheme = parse_scheme(uri).map_err(|_| ValidationError::InvalidUri {
            uri: uri.to_string(),
            location: location.to_string(),
            reason: "URIs must look like '<scheme>:<rest>'".to_string(),
        })?;

        if !schemes.contains(&scheme) {
            return Err(ValidationError::InvalidUri {
                uri: uri.to_string(),
                location: location.to_string(),
                reason: format!(
                    "no component for scheme '{scheme}' (available: {})",
                    schemes.join(", ")
                ),
            });
        }
        Ok(())
    }

    /// Format multiple validation errors into a readable message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::StepConfig;

    fn route(id: &str, from: &str) -> RouteDefinition {
        RouteDefinition {
            id: id.to_string(),
            from: from.to_string(),
            ..RouteDefinition::default()
        }
    }

    fn minimal_valid_config() -> EngineConfig {
        let mut r = route("uppercase", "mem:in");
        r.steps.push(StepConfig::To {
            uri: "mem:out".to_string(),
        });
        EngineConfig {
            routes: vec![r],
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(EngineConfigValidator::validate(&minimal_valid_config()).is_ok());
    }

    #[test]
    fn test_no_routes() {
        let config = EngineConfig::default();
        let err = EngineConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("routes"));
    }

    #[test]
    fn test_collects_every_problem() {
        let mut config = minimal_valid_config();
        config.routes.push(route("uppercase", "mem:other"));
        config.routes.push(route("", "no-scheme-here"));
        config.routes.push(route("ghost", "ghost:queue"));
        config.logging.level = "  ".to_string();

        let message = EngineConfigValidator::validate(&config)
            .unwrap_err()
            .to_string();
        assert!(message.contains("Duplicate route id 'uppercase'"));
        assert!(message.contains("route #3 id"));
        assert!(message.contains("no-scheme-here"));
        assert!(message.contains("no component for scheme 'ghost'"));
        assert!(message.contains("logging.level"));
    }

    #[test]
    fn test_destination_scheme_checked() {
        let mut config = minimal_valid_config();
        config.routes[0].steps.push(StepConfig::To {
            uri: "kafka:orders".to_string(),
        });
        assert!(EngineConfigValidator::validate(&config).is_err());
        assert!(
            EngineConfigValidator::validate_with_schemes(&config, &["mem", "kafka"]).is_ok()
        );
    }

    #[test]
    fn test_disabled_component_scheme_rejected() {
        let mut config = minimal_valid_config();
        config.components.memory = false;
        assert!(EngineConfigValidator::validate(&config).is_err());
    }
}
