use bon::bon;

use crate::error::{ModelError, Result};
use crate::frame_model::{FrameModel, TimelineFrame};
use crate::settings::{JsFrameOptions, Thresholds};
use crate::timeline::{TimelineModel, Track, TrackType};
use crate::tracing_model::{EventId, ThreadKey, TracingModel};

/// A trace recorded by some other tool, shown next to the main one.
#[derive(Debug)]
pub struct ExtensionTrace {
    pub title: String,
    pub model: TracingModel,
    /// Offset of the extension's clock from the recording start, in µs.
    pub time_offset: f64,
}

/// An ingested trace together with its timeline and frames.
#[derive(Debug)]
pub struct PerformanceModel {
    tracing_model: TracingModel,
    timeline_model: TimelineModel,
    frame_model: FrameModel,
    record_start_time: Option<f64>,
    extensions: Vec<ExtensionTrace>,
}

#[bon]
impl PerformanceModel {
    /// Classifies `tracing_model` and segments its frames. The model is
    /// completed first if that has not happened yet.
    #[builder]
    pub fn new(
        tracing_model: TracingModel,
        #[builder(default)] thresholds: Thresholds,
        #[builder(default)] js_frame_options: JsFrameOptions,
        record_start_time: Option<f64>,
    ) -> Result<Self> {
        let mut tracing_model = tracing_model;
        if !tracing_model.is_complete() {
            tracing_model.tracing_complete();
        }
        let mut timeline_model = TimelineModel::new(thresholds, js_frame_options);
        timeline_model.set_events(&mut tracing_model)?;

        let main_threads: Vec<(ThreadKey, f64)> = timeline_model
            .tracks()
            .iter()
            .filter(|track| track.kind == TrackType::MainThread && track.for_main_frame)
            .filter_map(|track| track.events.first())
            .map(|id| {
                let event = tracing_model.event(*id);
                (event.thread, event.start_time)
            })
            .collect();
        let mut frame_model = FrameModel::default();
        frame_model.add_trace_events(
            &tracing_model,
            timeline_model.data_table(),
            timeline_model.inspected_target_events(),
            &main_threads,
        );

        Ok(Self {
            tracing_model,
            timeline_model,
            frame_model,
            record_start_time,
            extensions: Vec::new(),
        })
    }
}

impl PerformanceModel {
    pub fn tracing_model(&self) -> &TracingModel {
        &self.tracing_model
    }

    pub fn timeline_model(&self) -> &TimelineModel {
        &self.timeline_model
    }

    pub fn frame_model(&self) -> &FrameModel {
        &self.frame_model
    }

    pub fn frames(&self) -> &[TimelineFrame] {
        self.frame_model.frames()
    }

    pub fn minimum_record_time(&self) -> f64 {
        self.timeline_model.minimum_record_time()
    }

    pub fn maximum_record_time(&self) -> f64 {
        self.timeline_model.maximum_record_time()
    }

    pub fn record_start_time(&self) -> Option<f64> {
        self.record_start_time
    }

    /// Re-aligns every extension trace to a new recording start.
    pub fn set_record_start_time(&mut self, time: f64) {
        self.record_start_time = Some(time);
        for index in 0..self.extensions.len() {
            self.align_extension(index);
        }
    }

    /// The main thread track of the main frame.
    pub fn main_track(&self) -> Result<&Track> {
        self.timeline_model
            .tracks()
            .iter()
            .find(|track| track.kind == TrackType::MainThread && track.for_main_frame)
            .ok_or(ModelError::MainTrackMissing)
    }

    /// Top-level tasks of the main track.
    pub fn main_thread_tasks(&self) -> Result<&[EventId]> {
        Ok(&self.main_track()?.tasks)
    }

    /// Main-track tasks longer than the long-task threshold.
    pub fn long_tasks(&self) -> Result<Vec<EventId>> {
        let threshold = self.timeline_model.thresholds().long_task;
        Ok(self
            .main_thread_tasks()?
            .iter()
            .copied()
            .filter(|id| {
                self.tracing_model
                    .event(*id)
                    .duration
                    .is_some_and(|duration| duration > threshold)
            })
            .collect())
    }

    pub fn add_extension_events(&mut self, title: impl Into<String>, model: TracingModel, time_offset: f64) {
        self.extensions.push(ExtensionTrace {
            title: title.into(),
            model,
            time_offset,
        });
        self.align_extension(self.extensions.len() - 1);
    }

    pub fn extensions(&self) -> &[ExtensionTrace] {
        &self.extensions
    }

    fn align_extension(&mut self, index: usize) {
        let Some(record_start_time) = self.record_start_time else {
            tracing::debug!("no recording start time, extension trace left unaligned");
            return;
        };
        let minimum_record_time = self.tracing_model.minimum_record_time();
        let extension = &mut self.extensions[index];
        extension
            .model
            .adjust_time(minimum_record_time + extension.time_offset / 1000.0 - record_start_time);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrome_trace_format::{Phase, TraceRecord};

    fn task(pid: u32, tid: u32, ts: f64, dur: f64) -> TraceRecord {
        TraceRecord::builder()
            .name("RunTask")
            .cat("disabled-by-default-devtools.timeline")
            .ph(Phase::Complete)
            .pid(pid)
            .tid(tid)
            .ts(ts)
            .dur(dur)
            .build()
    }

    #[test]
    fn empty_trace_has_no_main_track() {
        let model = PerformanceModel::builder()
            .tracing_model(TracingModel::new())
            .build()
            .unwrap();
        assert!(model.timeline_model().tracks().is_empty());
        assert!(matches!(model.main_track(), Err(ModelError::MainTrackMissing)));
        assert!(matches!(model.long_tasks(), Err(ModelError::MainTrackMissing)));
    }

    #[test]
    fn extension_traces_follow_record_start() {
        let mut tracing_model = TracingModel::new();
        tracing_model.add_records([task(1, 1, 5_000.0, 100.0)]);
        let mut model = PerformanceModel::builder()
            .tracing_model(tracing_model)
            .build()
            .unwrap();

        let mut extension = TracingModel::new();
        extension.add_records([task(9, 1, 1_000.0, 100.0)]);
        extension.tracing_complete();
        model.add_extension_events("extension", extension, 2_000.0);
        assert_eq!(model.extensions()[0].model.minimum_record_time(), 1.0);

        model.set_record_start_time(3.0);
        // 1 + (5 + 2 - 3)
        assert_eq!(model.extensions()[0].model.minimum_record_time(), 5.0);
    }
}
