//! Configuration data structures for Courier.
//!
//! These types map directly to YAML (also JSON / TOML) configuration files. Everything
//! except the routes themselves has a default so that minimal configs remain concise.
use serde::{Deserialize, Serialize};

fn default_engine_name() -> String {
    "courier".to_string()
}

fn default_true() -> bool {
    true
}

/// Top-level engine configuration.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EngineConfig {
    /// Name of the context, used in log output
    #[serde(default = "default_engine_name")]
    pub name: String,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub components: ComponentsConfig,
    #[serde(default)]
    pub routes: Vec<RouteDefinition>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: default_engine_name(),
            logging: LoggingConfig::default(),
            components: ComponentsConfig::default(),
            routes: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Schemes of the built-in components this configuration enables.
    pub fn enabled_schemes(&self) -> Vec<&'static str> {
        self.components.enabled_schemes()
    }
}

/// Logging output settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `courier=debug,info`
    pub level: String,
    /// Emit JSON lines instead of human readable output
    pub json: bool,
    /// Attach span context to JSON events
    pub include_spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            include_spans: true,
        }
    }
}

/// Which built-in components get registered.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ComponentsConfig {
    #[serde(default = "default_true")]
    pub memory: bool,
    #[serde(default = "default_true")]
    pub file: bool,
    /// Registers both `http` and `https`
    #[serde(default = "default_true")]
    pub http: bool,
}

impl Default for ComponentsConfig {
    fn default() -> Self {
        Self {
            memory: true,
            file: true,
            http: true,
        }
    }
}

impl ComponentsConfig {
    pub fn enabled_schemes(&self) -> Vec<&'static str> {
        let mut schemes = Vec::new();
        if self.memory {
            schemes.push("mem");
        }
        if self.file {
            schemes.push("file");
        }
        if self.http {
            schemes.extend(["http", "https"]);
        }
        schemes
    }
}

/// One route: a source URI and the ordered steps applied to every exchange.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct RouteDefinition {
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub group: Option<String>,
    pub from: String,
    #[serde(default)]
    pub steps: Vec<StepConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum StepConfig {
    SetBody {
        value: serde_json::Value,
    },
    SetHeader {
        name: String,
        value: serde_json::Value,
    },
    RemoveHeader {
        name: String,
    },
    SetProperty {
        name: String,
        value: serde_json::Value,
    },
    Log {
        message: String,
    },
    LogBody,
    LogHeaders,
    To {
        uri: String,
    },
}

impl StepConfig {
    /// Destination URI for `to` steps.
    pub fn uri(&self) -> Option<&str> {
        match self {
            StepConfig::To { uri } => Some(uri),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.name, "courier");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.enabled_schemes(), vec!["mem", "file", "http", "https"]);
    }

    #[test]
    fn test_step_tagging() {
        let steps: Vec<StepConfig> = serde_json::from_str(
            r#"[
                {"type": "set_header", "name": "x", "value": 1},
                {"type": "log_body"},
                {"type": "to", "uri": "mem:out"}
            ]"#,
        )
        .unwrap();

        assert_eq!(
            steps[0],
            StepConfig::SetHeader {
                name: "x".to_string(),
                value: serde_json::json!(1)
            }
        );
        assert_eq!(steps[1], StepConfig::LogBody);
        assert_eq!(steps[2].uri(), Some("mem:out"));
    }

    #[test]
    fn test_partial_components_section() {
        let config: EngineConfig = serde_json::from_str(
            r#"{"components": {"http": false}, "routes": []}"#,
        )
        .unwrap();
        assert!(config.components.memory);
        assert!(!config.components.http);
        assert_eq!(config.enabled_schemes(), vec!["mem", "file"]);
    }
}
