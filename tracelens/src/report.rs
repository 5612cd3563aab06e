use std::collections::BTreeMap;
use std::io::Write;

use serde::Serialize;
use timeline_model::record_type::WarningType;
use timeline_model::{ModelError, PerformanceModel, Track, TrackType};

/// JSON summary of one analyzed trace.
#[derive(Debug, Serialize)]
pub struct Report {
    pub minimum_record_time: f64,
    pub maximum_record_time: f64,
    pub generic_trace: bool,
    pub page_url: String,
    pub main_thread: Option<MainThreadSummary>,
    pub tracks: Vec<TrackSummary>,
    pub frames: FrameSummary,
    pub cpu_profiles: Vec<ProfileSummary>,
}

#[derive(Debug, Serialize)]
pub struct MainThreadSummary {
    pub tasks: usize,
    pub long_tasks: usize,
    pub busy_time: f64,
}

#[derive(Debug, Serialize)]
pub struct TrackSummary {
    pub name: String,
    pub kind: TrackType,
    pub for_main_frame: bool,
    pub url: String,
    pub events: usize,
    pub async_events: usize,
    pub tasks: usize,
    pub warnings: BTreeMap<WarningType, usize>,
}

#[derive(Debug, Default, Serialize)]
pub struct FrameSummary {
    pub count: usize,
    pub idle: usize,
    pub average_duration: f64,
    pub longest_duration: f64,
    pub time_by_category: BTreeMap<&'static str, f64>,
}

#[derive(Debug, Serialize)]
pub struct ProfileSummary {
    pub pid: u32,
    pub tid: u32,
    pub nodes: usize,
    pub samples: usize,
    pub total_hit_count: u64,
    pub duration: f64,
}

impl Report {
    pub fn build(model: &PerformanceModel) -> Self {
        let timeline = model.timeline_model();
        let main_thread = match model.main_thread_tasks() {
            Ok(tasks) => {
                let tracing_model = model.tracing_model();
                let long_tasks = model.long_tasks().map_or(0, |tasks| tasks.len());
                Some(MainThreadSummary {
                    tasks: tasks.len(),
                    long_tasks,
                    busy_time: tasks
                        .iter()
                        .filter_map(|id| tracing_model.event(*id).duration)
                        .sum(),
                })
            }
            Err(ModelError::MainTrackMissing) => {
                tracing::debug!("no main track, main thread summary omitted");
                None
            }
            Err(error) => {
                tracing::warn!(%error, "failed to summarize main thread");
                None
            }
        };

        Self {
            minimum_record_time: model.minimum_record_time(),
            maximum_record_time: model.maximum_record_time(),
            generic_trace: timeline.is_generic_trace(),
            page_url: timeline.page_url().to_string(),
            main_thread,
            tracks: timeline
                .tracks()
                .iter()
                .map(|track| TrackSummary::build(model, track))
                .collect(),
            frames: FrameSummary::build(model),
            cpu_profiles: timeline
                .cpu_profiles()
                .iter()
                .map(|thread_profile| {
                    let profile = &thread_profile.profile;
                    ProfileSummary {
                        pid: thread_profile.thread.pid,
                        tid: thread_profile.thread.tid,
                        nodes: profile.nodes().len(),
                        samples: profile.samples.as_ref().map_or(0, Vec::len),
                        total_hit_count: profile.total_hit_count,
                        duration: profile.profile_end_time - profile.profile_start_time,
                    }
                })
                .collect(),
        }
    }

    pub fn write<W: Write>(&self, writer: W, pretty: bool) -> eyre::Result<()> {
        if pretty {
            serde_json::to_writer_pretty(writer, self)?;
        } else {
            serde_json::to_writer(writer, self)?;
        }
        Ok(())
    }
}

impl TrackSummary {
    fn build(model: &PerformanceModel, track: &Track) -> Self {
        let data = model.timeline_model().data_table();
        let mut warnings = BTreeMap::new();
        for id in &track.events {
            if let Some(warning) = data.get(*id).and_then(|d| d.warning) {
                *warnings.entry(warning).or_default() += 1;
            }
        }
        Self {
            name: track.name.clone(),
            kind: track.kind,
            for_main_frame: track.for_main_frame,
            url: track.url.clone(),
            events: track.events.len(),
            async_events: track.async_events.len(),
            tasks: track.tasks.len(),
            warnings,
        }
    }
}

impl FrameSummary {
    fn build(model: &PerformanceModel) -> Self {
        let frames = model.frames();
        if frames.is_empty() {
            return Self::default();
        }
        let mut summary = Self {
            count: frames.len(),
            ..Self::default()
        };
        let mut total = 0.0;
        for frame in frames {
            total += frame.duration;
            summary.longest_duration = summary.longest_duration.max(frame.duration);
            if frame.idle {
                summary.idle += 1;
            }
            for (category, time) in &frame.time_by_category {
                *summary.time_by_category.entry(*category).or_default() += time;
            }
        }
        summary.average_duration = total / frames.len() as f64;
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrome_trace_format::TraceFile;
    use serde_json::{json, Value};
    use timeline_model::TracingModel;

    fn analyze(events: Value) -> PerformanceModel {
        let file: TraceFile = serde_json::from_value(events).unwrap();
        PerformanceModel::builder()
            .tracing_model(TracingModel::from_trace_file(file))
            .build()
            .unwrap()
    }

    #[test]
    fn long_tasks_are_counted_per_track() {
        let model = analyze(json!([
            {"name": "thread_name", "ph": "M", "pid": 1, "tid": 1, "args": {"name": "CrRendererMain"}},
            {"name": "RunTask", "cat": "disabled-by-default-devtools.timeline", "ph": "X",
             "pid": 1, "tid": 1, "ts": 1000, "dur": 300000},
            {"name": "RunTask", "cat": "disabled-by-default-devtools.timeline", "ph": "X",
             "pid": 1, "tid": 1, "ts": 400000, "dur": 1000}
        ]));
        let report = Report::build(&model);
        assert!(report.generic_trace);
        let main = report.main_thread.as_ref().unwrap();
        assert_eq!(main.tasks, 2);
        assert_eq!(main.long_tasks, 1);
        assert_eq!(main.busy_time, 301.0);
        assert_eq!(report.tracks[0].warnings.get(&WarningType::LongTask), Some(&1));

        let mut out = Vec::new();
        report.write(&mut out, false).unwrap();
        let value: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["tracks"][0]["kind"], "MainThread");
        assert_eq!(value["tracks"][0]["warnings"]["LongTask"], 1);
    }

    #[test]
    fn empty_trace_has_no_main_thread() {
        let report = Report::build(&analyze(json!([])));
        assert!(report.main_thread.is_none());
        assert!(report.tracks.is_empty());
        assert_eq!(report.frames.count, 0);
    }
}
