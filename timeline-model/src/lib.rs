//! # Timeline Model
//!
//! Turns the flat record stream of a Chrome trace into a performance
//! timeline.
//!
//! - [`TracingModel`] groups records into processes and threads, pairs
//!   begin/end records and reconstructs async spans.
//! - [`CpuProfileModel`] rebuilds a V8 sampling profile into a call tree
//!   with per-node self and total times.
//! - [`TimelineModel`] classifies events into tracks, attaches warnings,
//!   initiators and page frames, and synthesizes JS frames from samples.
//! - [`FrameModel`] segments the trace into rendered frames.
//! - [`PerformanceModel`] ties the above together for one recording.
//!
//! All times are milliseconds.

pub mod async_tracker;
pub mod cpu_profile;
pub mod error;
pub mod event_walk;
pub mod frame_model;
pub mod invalidation;
pub mod js_profile;
pub mod performance;
pub mod record_type;
pub mod settings;
pub mod timeline;
pub mod tracing_model;
pub mod util;

pub use cpu_profile::{CpuProfileModel, CpuProfileNode};
pub use error::{ModelError, Result};
pub use frame_model::{CategoryMapper, DefaultCategoryMapper, FrameModel, TimelineFrame};
pub use performance::PerformanceModel;
pub use settings::{JsFrameOptions, Thresholds};
pub use timeline::{TimelineModel, Track, TrackType};
pub use tracing_model::{Event, EventId, ThreadKey, TracingModel};
