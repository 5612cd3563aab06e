use chrome_trace_format::FormatError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("cpu profile has neither hit counts nor samples")]
    MissingHitCountsAndSamples,

    #[error("invalid cpu profile: {0}")]
    InvalidProfile(String),

    #[error("trace events were already classified by a timeline pass")]
    EventsAlreadyProcessed,

    #[error("no main thread track for the main frame")]
    MainTrackMissing,

    #[error("trace format error: {0}")]
    Format(#[from] FormatError),
}

pub type Result<T> = std::result::Result<T, ModelError>;
