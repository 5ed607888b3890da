//! Configuration management for the rollup pipeline
//!
//! TOML files describe pipeline defaults, logging and a set of named result
//! descriptors. Environment variables override the pipeline defaults.
//!
//! ```toml
//! [pipeline]
//! counter_wrap = "wrap"
//! heartbeat_multiplier = 2
//! default_xff = 0.5
//! default_step = "300s"
//!
//! [monitoring]
//! log_level = "info"
//!
//! [[descriptors]]
//! name = "traffic"
//! step = "300s"
//! exports = ["in", "bits"]
//!
//!   [[descriptors.datasources]]
//!   label = "in"
//!   source = "ifInOctets"
//!   function = "AVERAGE"
//!
//!   [[descriptors.expressions]]
//!   label = "bits"
//!   expression = "in * 8"
//! ```

use serde::{Deserialize, Serialize};

use crate::aggregation::ConsolidationFunction;
use crate::error::DescriptorError;
use crate::query::descriptor::{
    ResultDescriptor, DEFAULT_HEARTBEAT_MULTIPLIER, DEFAULT_STEP, DEFAULT_XFF,
};
use crate::query::operators::CounterWrap;
use crate::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Pipeline defaults
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Logging
    #[serde(default)]
    pub monitoring: MonitoringConfig,

    /// Named result descriptors
    #[serde(default)]
    pub descriptors: Vec<DescriptorConfig>,
}

/// Defaults applied to every descriptor and query
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// What a counter that moved backwards produces
    #[serde(default)]
    pub counter_wrap: CounterWrap,

    /// Default heartbeat as a multiple of the step
    #[serde(default = "default_heartbeat_multiplier")]
    pub heartbeat_multiplier: i64,

    /// Default XFF for datasources that set none
    #[serde(default = "default_xff")]
    pub default_xff: f64,

    /// Step for descriptors that set none
    #[serde(default = "default_step")]
    pub default_step: Duration,
}

/// Logging settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitoringConfig {
    /// Log level or filter directive, used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// A named result descriptor
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DescriptorConfig {
    /// Lookup name
    pub name: String,

    /// Primary interval; the pipeline default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<Duration>,

    /// Datasources, in definition order
    #[serde(default)]
    pub datasources: Vec<DatasourceConfig>,

    /// Calculated labels, defined after all datasources
    #[serde(default)]
    pub expressions: Vec<ExpressionConfig>,

    /// Exported labels
    #[serde(default)]
    pub exports: Vec<String>,
}

/// One datasource of a descriptor
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatasourceConfig {
    /// Output label
    pub label: String,

    /// Source metric name
    pub source: String,

    /// Consolidation function
    #[serde(default = "default_function")]
    pub function: ConsolidationFunction,

    /// Heartbeat; step times the multiplier when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat: Option<Duration>,

    /// XFF; the pipeline default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xff: Option<f64>,
}

/// One expression calculation of a descriptor
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExpressionConfig {
    /// Output label
    pub label: String,

    /// Arithmetic over earlier labels, e.g. `in * 8`
    pub expression: String,
}

fn default_heartbeat_multiplier() -> i64 { DEFAULT_HEARTBEAT_MULTIPLIER }
fn default_xff() -> f64 { DEFAULT_XFF }
fn default_step() -> Duration { DEFAULT_STEP }
fn default_log_level() -> String { "info".to_string() }
fn default_function() -> ConsolidationFunction { ConsolidationFunction::Average }

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            counter_wrap: CounterWrap::default(),
            heartbeat_multiplier: default_heartbeat_multiplier(),
            default_xff: default_xff(),
            default_step: default_step(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> Result<Self, String> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {}", path, e))?;

        toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config file {}: {}", path, e))
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env(path: &str) -> Result<Self, String> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from environment variables only
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        // Pipeline
        if let Ok(policy) = std::env::var("ROLLUP_COUNTER_WRAP") {
            match policy.to_ascii_lowercase().as_str() {
                "wrap" => self.pipeline.counter_wrap = CounterWrap::Wrap,
                "unknown" => self.pipeline.counter_wrap = CounterWrap::Unknown,
                _ => {}
            }
        }
        if let Ok(multiplier) = std::env::var("ROLLUP_HEARTBEAT_MULTIPLIER") {
            if let Ok(m) = multiplier.parse() {
                self.pipeline.heartbeat_multiplier = m;
            }
        }
        if let Ok(xff) = std::env::var("ROLLUP_DEFAULT_XFF") {
            if let Ok(x) = xff.parse() {
                self.pipeline.default_xff = x;
            }
        }

        // Monitoring
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            self.monitoring.log_level = log_level;
        }
    }

    /// Validate configuration, including every descriptor
    pub fn validate(&self) -> Result<(), String> {
        if self.pipeline.heartbeat_multiplier < 1 {
            return Err("Heartbeat multiplier must be >= 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.pipeline.default_xff) {
            return Err("Default XFF must be within [0, 1]".to_string());
        }
        if self.pipeline.default_step.is_zero() {
            return Err("Default step must be > 0".to_string());
        }

        for (index, descriptor) in self.descriptors.iter().enumerate() {
            if descriptor.name.is_empty() {
                return Err(format!("Descriptor #{} has no name", index + 1));
            }
            if self.descriptors[..index]
                .iter()
                .any(|earlier| earlier.name == descriptor.name)
            {
                return Err(format!("Duplicate descriptor '{}'", descriptor.name));
            }
            self.build_descriptor(descriptor)
                .map_err(|e| format!("Descriptor '{}': {}", descriptor.name, e))?;
        }

        Ok(())
    }

    /// Build the named descriptor
    pub fn descriptor(&self, name: &str) -> Result<ResultDescriptor, DescriptorError> {
        let config = self
            .descriptors
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| DescriptorError::NotFound(name.to_string()))?;
        self.build_descriptor(config)
    }

    fn build_descriptor(&self, config: &DescriptorConfig) -> Result<ResultDescriptor, DescriptorError> {
        let mut builder = ResultDescriptor::builder()
            .step(config.step.unwrap_or(self.pipeline.default_step))
            .heartbeat_multiplier(self.pipeline.heartbeat_multiplier)
            .default_xff(self.pipeline.default_xff);

        for ds in &config.datasources {
            builder = builder.datasource_with_options(
                ds.label.as_str(),
                ds.source.as_str(),
                ds.heartbeat,
                ds.xff,
                ds.function,
            );
        }
        for expr in &config.expressions {
            builder = builder.expression(expr.label.as_str(), &expr.expression);
        }

        builder.export(config.exports.iter()).build()
    }

    /// Save configuration to TOML file
    pub fn save_to_file(&self, path: &str) -> Result<(), String> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        std::fs::write(path, contents)
            .map_err(|e| format!("Failed to write config file {}: {}", path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TRAFFIC: &str = r#"
        [pipeline]
        counter_wrap = "unknown"

        [monitoring]
        log_level = "debug"

        [[descriptors]]
        name = "traffic"
        exports = ["in", "bits"]

          [[descriptors.datasources]]
          label = "in"
          source = "ifInOctets"
          function = "MAX"
          heartbeat = "15m"

          [[descriptors.expressions]]
          label = "bits"
          expression = "in * 8"
    "#;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.pipeline.counter_wrap, CounterWrap::Wrap);
        assert_eq!(config.pipeline.heartbeat_multiplier, 2);
        assert_eq!(config.pipeline.default_step, Duration::seconds(300));
        assert_eq!(config.monitoring.log_level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_descriptor() {
        let config: Config = toml::from_str(TRAFFIC).unwrap();
        assert_eq!(config.pipeline.counter_wrap, CounterWrap::Unknown);
        assert!(config.validate().is_ok());

        let descriptor = config.descriptor("traffic").unwrap();
        assert_eq!(descriptor.step(), Duration::seconds(300));
        let ds = descriptor.datasource("in").unwrap();
        assert_eq!(ds.heartbeat(), Duration::minutes(15));
        assert_eq!(ds.function(), ConsolidationFunction::Max);
        assert_eq!(ds.xff(), 0.5);
        assert_eq!(descriptor.exports(), &["in".to_string(), "bits".to_string()]);
        assert_eq!(descriptor.calculations().len(), 1);
    }

    #[test]
    fn test_unknown_descriptor() {
        let config: Config = toml::from_str(TRAFFIC).unwrap();
        assert!(matches!(
            config.descriptor("cpu"),
            Err(DescriptorError::NotFound(name)) if name == "cpu"
        ));
    }

    #[test]
    fn test_invalid_descriptor_fails_validation() {
        let mut config: Config = toml::from_str(TRAFFIC).unwrap();
        config.descriptors[0].exports.push("missing".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.contains("traffic"));
        assert!(err.contains("missing"));
    }

    #[test]
    fn test_duplicate_descriptor_names() {
        let mut config: Config = toml::from_str(TRAFFIC).unwrap();
        let copy = config.descriptors[0].clone();
        config.descriptors.push(copy);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_pipeline_defaults() {
        let mut config = Config::default();
        config.pipeline.default_xff = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pipeline.heartbeat_multiplier = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_round_trip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TRAFFIC.as_bytes()).unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let config = Config::from_file(&path).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let saved = dir.path().join("saved.toml");
        let saved = saved.to_str().unwrap();
        config.save_to_file(saved).unwrap();

        let reloaded = Config::from_file(saved).unwrap();
        assert_eq!(reloaded.descriptors.len(), 1);
        assert_eq!(reloaded.descriptors[0].datasources[0].heartbeat, Some(Duration::minutes(15)));
        assert!(reloaded.descriptor("traffic").is_ok());
    }

    #[test]
    fn test_missing_file() {
        assert!(Config::from_file("/nonexistent/rollup.toml").is_err());
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("ROLLUP_HEARTBEAT_MULTIPLIER", "3");
        let config = Config::from_env();
        assert_eq!(config.pipeline.heartbeat_multiplier, 3);
        std::env::remove_var("ROLLUP_HEARTBEAT_MULTIPLIER");
    }
}
