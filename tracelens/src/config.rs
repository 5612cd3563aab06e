use std::path::Path;

use serde::{Deserialize, Serialize};
use timeline_model::{JsFrameOptions, Thresholds};

#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    /// Used when `RUST_LOG` is not set.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    #[serde(default)]
    pub thresholds: Thresholds,

    #[serde(default)]
    pub js_frames: JsFrameOptions,

    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default)]
    pub pretty: bool,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            thresholds: Thresholds::default(),
            js_frames: JsFrameOptions::default(),
            report: ReportConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.thresholds, Thresholds::default());
        assert_eq!(config.js_frames, JsFrameOptions::default());
        assert!(!config.report.pretty);
    }

    #[test]
    fn sections_override_defaults() {
        let config: Config = toml::from_str(
            r#"
log_filter = "timeline_model=debug"

[thresholds]
long_task = 100.0

[js_frames]
show_native_functions = true

[report]
pretty = true
"#,
        )
        .unwrap();
        assert_eq!(config.log_filter, "timeline_model=debug");
        assert_eq!(config.thresholds.long_task, 100.0);
        assert_eq!(config.thresholds.recurring_handler, 50.0);
        assert!(config.js_frames.show_native_functions);
        assert!(!config.js_frames.show_all_events);
        assert!(config.report.pretty);
    }
}
