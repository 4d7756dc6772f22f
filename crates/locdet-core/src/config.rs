use crate::error::{DetectError, Result};
use crate::paths;
use crate::postprocess::OutputFormat;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ServiceConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// LimitsConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_model_version")]
    pub model_version: String,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default)]
    pub output_format: OutputFormat,
    #[serde(default = "default_stage_timeout")]
    pub stage_timeout_seconds: u64,
    #[serde(default = "default_preview_cache_ttl")]
    pub preview_cache_ttl_seconds: u64,
}

fn default_model_version() -> String {
    "1.0.0".to_string()
}

fn default_confidence_threshold() -> f64 {
    0.7
}

fn default_stage_timeout() -> u64 {
    300
}

fn default_preview_cache_ttl() -> u64 {
    3600
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_version: default_model_version(),
            confidence_threshold: default_confidence_threshold(),
            output_format: OutputFormat::default(),
            stage_timeout_seconds: default_stage_timeout(),
            preview_cache_ttl_seconds: default_preview_cache_ttl(),
        }
    }
}

// ---------------------------------------------------------------------------
// EndpointsConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointsConfig {
    /// Layout-analysis service base URL.
    #[serde(default)]
    pub analyzer_url: String,
    /// Intermediate room-detection model endpoint.
    #[serde(default)]
    pub intermediate_url: String,
    /// Final refinement model endpoint.
    #[serde(default)]
    pub final_url: String,
    /// Environment variable holding the bearer token for both services.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

impl EndpointsConfig {
    /// Resolve the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|v| !v.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    pub service: ServiceConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub endpoints: EndpointsConfig,
}

fn default_version() -> u32 {
    1
}

impl Config {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            version: 1,
            service: ServiceConfig {
                name: service_name.into(),
                description: None,
            },
            limits: LimitsConfig::default(),
            pipeline: PipelineConfig::default(),
            endpoints: EndpointsConfig::default(),
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(DetectError::Config(format!(
                "config not found at {}; run 'locdet init'",
                path.display()
            )));
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// Load the config, falling back to defaults when no file exists.
    pub fn load_or_default(root: &Path, service_name: &str) -> Self {
        Self::load(root).unwrap_or_else(|_| Self::new(service_name))
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if !(0.0..=1.0).contains(&self.pipeline.confidence_threshold) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "confidence_threshold {} is outside 0..1",
                    self.pipeline.confidence_threshold
                ),
            });
        }

        if self.pipeline.stage_timeout_seconds == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "stage_timeout_seconds must be greater than zero".to_string(),
            });
        }

        if self.limits.max_upload_bytes == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "max_upload_bytes must be greater than zero".to_string(),
            });
        }

        for (name, url) in [
            ("analyzer_url", &self.endpoints.analyzer_url),
            ("intermediate_url", &self.endpoints.intermediate_url),
            ("final_url", &self.endpoints.final_url),
        ] {
            if url.trim().is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("endpoints.{name} is not set — pipeline stages will fail"),
                });
            }
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::new("locdet");
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.service.name, "locdet");
        assert_eq!(parsed.version, 1);
        assert_eq!(parsed.limits.max_upload_bytes, 50 * 1024 * 1024);
        assert_eq!(parsed.pipeline.model_version, "1.0.0");
    }

    #[test]
    fn minimal_yaml_uses_defaults() {
        let yaml = "version: 1\nservice:\n  name: locdet\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.pipeline.confidence_threshold, 0.7);
        assert_eq!(cfg.pipeline.stage_timeout_seconds, 300);
        assert_eq!(cfg.pipeline.preview_cache_ttl_seconds, 3600);
        assert!(cfg.endpoints.analyzer_url.is_empty());
    }

    #[test]
    fn output_format_parses_from_yaml() {
        let yaml = "version: 1\nservice:\n  name: locdet\npipeline:\n  output_format: growth\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            cfg.pipeline.output_format,
            crate::postprocess::OutputFormat::Growth
        );
    }

    #[test]
    fn save_and_load() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::new("locdet");
        cfg.endpoints.analyzer_url = "http://localhost:9000".to_string();
        cfg.save(dir.path()).unwrap();
        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.endpoints.analyzer_url, "http://localhost:9000");
    }

    #[test]
    fn load_missing_is_config_error() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Config::load(dir.path()),
            Err(DetectError::Config(_))
        ));
    }

    #[test]
    fn validate_flags_missing_endpoints() {
        let cfg = Config::new("locdet");
        let warnings = cfg.validate();
        assert_eq!(
            warnings
                .iter()
                .filter(|w| w.level == WarnLevel::Warning)
                .count(),
            3
        );
    }

    #[test]
    fn validate_flags_bad_threshold() {
        let mut cfg = Config::new("locdet");
        cfg.pipeline.confidence_threshold = 1.5;
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("confidence_threshold")));
    }

    #[test]
    fn api_key_resolves_from_env() {
        let mut cfg = Config::new("locdet");
        cfg.endpoints.api_key_env = Some("LOCDET_TEST_API_KEY".to_string());
        std::env::set_var("LOCDET_TEST_API_KEY", "sekrit");
        assert_eq!(cfg.endpoints.api_key().as_deref(), Some("sekrit"));
        std::env::remove_var("LOCDET_TEST_API_KEY");
        assert!(cfg.endpoints.api_key().is_none());
    }
}
