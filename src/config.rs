//! Configuration for the numbatch pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Input configuration
    #[serde(default)]
    pub input: InputConfig,

    /// Buffer stage configuration
    #[serde(default)]
    pub buffer: BufferConfig,

    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,

    /// Processing configuration
    #[serde(default)]
    pub processing: ProcessingConfig,
}

/// Line input configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Line that ends the input cleanly
    #[serde(default = "default_quit_sentinel")]
    pub quit_sentinel: String,

    /// Prompt printed before reading. Set to null to disable.
    #[serde(default = "default_prompt")]
    pub prompt: Option<String>,

    /// Message shown when a line is not an integer
    #[serde(default = "default_invalid_input_message")]
    pub invalid_input_message: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            quit_sentinel: default_quit_sentinel(),
            prompt: default_prompt(),
            invalid_input_message: default_invalid_input_message(),
        }
    }
}

/// Buffer stage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Number of elements that triggers a capacity flush
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Periodic flush interval in milliseconds
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

impl BufferConfig {
    /// Flush interval as a `Duration`.
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

/// Sink output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Label printed before every emitted value
    #[serde(default = "default_label")]
    pub label: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            label: default_label(),
        }
    }
}

/// Processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Number of Tokio worker threads
    #[serde(default)]
    pub worker_threads: Option<usize>,

    /// Enable periodic metrics reporting and the final summary
    #[serde(default)]
    pub enable_metrics: bool,

    /// Metrics reporting interval in seconds
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval_secs: u64,

    /// Optional path to save metrics JSON after run completes
    #[serde(default)]
    pub metrics_output_path: Option<String>,

    /// How long to wait for blocked I/O when shutting the runtime down
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            worker_threads: None,
            enable_metrics: false,
            metrics_interval_secs: default_metrics_interval(),
            metrics_output_path: None,
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML or JSON file.
    /// Format is auto-detected from file extension (.yaml, .yml, or .json).
    pub fn from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let config: Config = match ext {
            "yaml" | "yml" => serde_yaml::from_str(&contents)?,
            "json" => serde_json::from_str(&contents)?,
            _ => serde_yaml::from_str(&contents)?,
        };
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Load configuration from a JSON string.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        Ok(config)
    }

    /// Serialize configuration to YAML.
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.buffer.capacity == 0 {
            anyhow::bail!("Buffer capacity must be > 0");
        }
        if self.buffer.flush_interval_ms == 0 {
            anyhow::bail!("Flush interval must be > 0");
        }
        // Input lines are compared verbatim, so no trimming here either
        if self.input.quit_sentinel.is_empty() {
            anyhow::bail!("Quit sentinel must not be empty");
        }
        if self.input.quit_sentinel.parse::<i64>().is_ok() {
            anyhow::bail!(
                "Quit sentinel {:?} would shadow an integer input",
                self.input.quit_sentinel
            );
        }
        if self.processing.enable_metrics && self.processing.metrics_interval_secs == 0 {
            anyhow::bail!("Metrics interval must be > 0 when metrics are enabled");
        }
        Ok(())
    }
}

// Default value functions for serde
fn default_quit_sentinel() -> String { "q".to_string() }
fn default_prompt() -> Option<String> { Some("Enter integers (type 'q' to quit):".to_string()) }
fn default_invalid_input_message() -> String { "Invalid input. Please enter an integer.".to_string() }
fn default_capacity() -> usize { 5 }
fn default_flush_interval_ms() -> u64 { 2000 }
fn default_label() -> String { "Received".to_string() }
fn default_metrics_interval() -> u64 { 10 }
fn default_shutdown_timeout_ms() -> u64 { 100 }

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.buffer.capacity, 5);
        assert_eq!(config.buffer.flush_interval(), Duration::from_secs(2));
        assert_eq!(config.input.quit_sentinel, "q");
        assert_eq!(config.output.label, "Received");
        assert!(!config.processing.enable_metrics);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config = Config::from_yaml("buffer:\n  capacity: 3\n").unwrap();
        assert_eq!(config.buffer.capacity, 3);
        assert_eq!(config.buffer.flush_interval_ms, 2000);
        assert_eq!(config.input.quit_sentinel, "q");
    }

    #[test]
    fn test_json_config() {
        let config = Config::from_json(
            r#"{"output": {"label": "out"}, "buffer": {"flush_interval_ms": 500}}"#,
        )
        .unwrap();
        assert_eq!(config.output.label, "out");
        assert_eq!(config.buffer.flush_interval(), Duration::from_millis(500));
        assert_eq!(config.buffer.capacity, 5);
    }

    #[test]
    fn test_prompt_can_be_disabled() {
        let config = Config::from_yaml("input:\n  prompt: null\n").unwrap();
        assert!(config.input.prompt.is_none());
    }

    #[test]
    fn test_yaml_roundtrip_preserves_overrides() {
        let mut config = Config::default();
        config.buffer.capacity = 7;
        config.output.label = "batch".to_string();

        let yaml = config.to_yaml().unwrap();
        let parsed = Config::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.buffer.capacity, 7);
        assert_eq!(parsed.output.label, "batch");
    }

    #[test]
    fn test_from_file_detects_format() {
        let mut yaml = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(yaml, "buffer:\n  capacity: 9").unwrap();
        let config = Config::from_file(&yaml.path().to_path_buf()).unwrap();
        assert_eq!(config.buffer.capacity, 9);

        let mut json = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(json, r#"{{"buffer": {{"capacity": 4}}}}"#).unwrap();
        let config = Config::from_file(&json.path().to_path_buf()).unwrap();
        assert_eq!(config.buffer.capacity, 4);
    }

    #[test]
    fn test_config_validation_invalid() {
        let mut config = Config::default();
        config.buffer.capacity = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.buffer.flush_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.input.quit_sentinel = String::new();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.input.quit_sentinel = "0".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.processing.enable_metrics = true;
        config.processing.metrics_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_padded_sentinel_is_taken_verbatim() {
        let mut config = Config::default();
        config.input.quit_sentinel = " 7".to_string();
        assert!(config.validate().is_ok());

        config.input.quit_sentinel = "q ".to_string();
        assert!(config.validate().is_ok());
    }
}
