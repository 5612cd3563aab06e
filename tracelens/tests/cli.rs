use eyre::Result;
use rstest::{fixture, rstest};
use serde_json::{json, Value};
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

struct TestSetup {
    _temp_dir: TempDir,
    trace_path: PathBuf,
    config_path: PathBuf,
    output_path: PathBuf,
}

impl TestSetup {
    fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let trace_path = temp_dir.path().join("trace.json");
        let config_path = temp_dir.path().join("config.toml");
        let output_path = temp_dir.path().join("report.json");

        let trace = json!({
            "traceEvents": [
                {"name": "thread_name", "ph": "M", "pid": 1, "tid": 1, "args": {"name": "CrRendererMain"}},
                {"name": "RunTask", "cat": "disabled-by-default-devtools.timeline", "ph": "X",
                 "pid": 1, "tid": 1, "ts": 1000, "dur": 120000},
                {"name": "RunTask", "cat": "disabled-by-default-devtools.timeline", "ph": "X",
                 "pid": 1, "tid": 1, "ts": 200000, "dur": 5000},
                {"name": "not a record"}
            ]
        });
        fs::write(&trace_path, serde_json::to_vec(&trace)?)?;

        let config_content = r#"
log_filter = "warn"

[thresholds]
long_task = 100.0
"#;
        fs::write(&config_path, config_content)?;

        Ok(TestSetup {
            _temp_dir: temp_dir,
            trace_path,
            config_path,
            output_path,
        })
    }

    fn run(&self, extra: &[&str]) -> Result<std::process::Output> {
        let output = Command::new(env!("CARGO_BIN_EXE_tracelens"))
            .arg(&self.trace_path)
            .args(extra)
            .env_remove("RUST_LOG")
            .output()?;
        Ok(output)
    }
}

#[fixture]
fn setup() -> TestSetup {
    TestSetup::new().expect("failed to create test setup")
}

#[rstest]
fn writes_report_with_configured_thresholds(setup: TestSetup) {
    let output = setup
        .run(&[
            "-c",
            setup.config_path.to_str().unwrap(),
            "-o",
            setup.output_path.to_str().unwrap(),
        ])
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let report: Value = serde_json::from_slice(&fs::read(&setup.output_path).unwrap()).unwrap();
    assert_eq!(report["generic_trace"], true);
    assert_eq!(report["minimum_record_time"], 1.0);
    assert_eq!(report["maximum_record_time"], 205.0);
    assert_eq!(report["main_thread"]["tasks"], 2);
    assert_eq!(report["main_thread"]["long_tasks"], 1);
    assert_eq!(report["tracks"][0]["warnings"]["LongTask"], 1);
}

#[rstest]
fn prints_report_to_stdout(setup: TestSetup) {
    let output = setup.run(&["--pretty"]).unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("\n  \"tracks\""));
    let report: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["main_thread"]["long_tasks"], 0);
}

#[rstest]
fn missing_trace_fails(setup: TestSetup) {
    fs::remove_file(&setup.trace_path).unwrap();
    let output = setup.run(&[]).unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to open trace"));
}
