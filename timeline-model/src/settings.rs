use serde::{Deserialize, Serialize};

/// Durations in milliseconds past which an event gets a warning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default = "default_long_task")]
    pub long_task: f64,
    #[serde(default = "default_recurring_handler")]
    pub recurring_handler: f64,
    #[serde(default = "default_forced_layout")]
    pub forced_layout: f64,
    #[serde(default = "default_idle_callback_addon")]
    pub idle_callback_addon: f64,
}

fn default_long_task() -> f64 {
    200.0
}

fn default_recurring_handler() -> f64 {
    50.0
}

fn default_forced_layout() -> f64 {
    30.0
}

fn default_idle_callback_addon() -> f64 {
    5.0
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            long_task: default_long_task(),
            recurring_handler: default_recurring_handler(),
            forced_layout: default_forced_layout(),
            idle_callback_addon: default_idle_callback_addon(),
        }
    }
}

/// Switches for the JS frame reconstruction from profiler samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsFrameOptions {
    /// Skip stack frame filtering entirely.
    #[serde(default)]
    pub show_all_events: bool,
    /// Keep V8 runtime call stats frames.
    #[serde(default)]
    pub show_runtime_call_stats: bool,
    /// Keep native frames that are not V8 runtime frames.
    #[serde(default)]
    pub show_native_functions: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_thresholds_keep_defaults() {
        let thresholds: Thresholds = serde_json::from_str(r#"{"long_task": 100}"#).unwrap();
        assert_eq!(thresholds.long_task, 100.0);
        assert_eq!(thresholds.forced_layout, 30.0);
        assert_eq!(thresholds.idle_callback_addon, 5.0);
    }
}
