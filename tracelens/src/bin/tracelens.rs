use chrome_trace_format::TraceFile;
use clap::Parser;
use eyre::{Context, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::sync::OnceLock;
use timeline_model::{PerformanceModel, TracingModel};
use tracelens::config::Config;
use tracelens::report::Report;
use tracing_subscriber::EnvFilter;

static LONG_VERSION: OnceLock<String> = OnceLock::new();

fn get_long_version() -> &'static str {
    LONG_VERSION.get_or_init(|| {
        format!(
            "{} (commit: {})",
            env!("CARGO_PKG_VERSION"),
            env!("GIT_REVISION", "unknown"),
        )
    })
}

#[derive(Parser)]
#[command(name = "tracelens")]
#[command(about = "performance timeline analysis of chrome traces")]
#[command(version = None, long_version = get_long_version())]
struct Args {
    #[arg(help = "trace file (json array, traceEvents object or .cpuprofile)")]
    trace: PathBuf,

    #[arg(short, long, help = "configuration file path (toml format)")]
    config: Option<PathBuf>,

    #[arg(short, long, help = "report output file, stdout when omitted")]
    output: Option<PathBuf>,

    #[arg(long, help = "pretty-print the json report")]
    pretty: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config path={}", path.display()))?,
        None => Config::default(),
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let file = File::open(&args.trace)
        .with_context(|| format!("failed to open trace path={}", args.trace.display()))?;
    let trace = TraceFile::from_reader(BufReader::new(file))
        .with_context(|| format!("failed to parse trace path={}", args.trace.display()))?;
    let tracing_model = TracingModel::from_trace_file(trace);

    let model = PerformanceModel::builder()
        .tracing_model(tracing_model)
        .thresholds(config.thresholds)
        .js_frame_options(config.js_frames)
        .build()
        .context("failed to build timeline")?;

    let report = Report::build(&model);
    let pretty = args.pretty || config.report.pretty;
    match &args.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create report path={}", path.display()))?;
            let mut writer = BufWriter::new(file);
            report.write(&mut writer, pretty)?;
            writer.flush()?;
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            report.write(&mut stdout, pretty)?;
            writeln!(stdout)?;
        }
    }

    tracing::info!(
        tracks = report.tracks.len(),
        frames = report.frames.count,
        "trace analyzed"
    );
    Ok(())
}
