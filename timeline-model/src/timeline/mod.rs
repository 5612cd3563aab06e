//! Classification of a loaded trace into tracks, tasks and page frames.

mod data;
mod page_frame;
mod track;

pub use data::{TimelineData, TimelineDataTable};
pub use page_frame::{PageFrame, PageFrameProcess, PageFrameTree};
pub use track::{SyncEvents, Track, TrackType};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrome_trace_format::{Phase, Profile, ProfileNode};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::async_tracker::{AsyncEventTracker, Correlation};
use crate::cpu_profile::CpuProfileModel;
use crate::error::{ModelError, Result};
use crate::invalidation::{InvalidationRecord, InvalidationTracker};
use crate::js_profile;
use crate::record_type::{self as rt, category, devtools_metadata, thread_name, WarningType};
use crate::settings::{JsFrameOptions, Thresholds};
use crate::tracing_model::{is_truthy, value_key, Event, EventData, EventId, Thread, ThreadKey, TracingModel};
use crate::util::{lower_bound, merge_ordered};

#[derive(Debug, Clone, Copy)]
struct TimeRange {
    from: f64,
    to: f64,
}

impl TimeRange {
    const ALL: TimeRange = TimeRange {
        from: f64::NEG_INFINITY,
        to: f64::INFINITY,
    };
}

/// How a thread's events are presented.
#[derive(Debug, Default)]
struct ThreadRole {
    is_main_thread: bool,
    is_worker: bool,
    for_main_frame: bool,
    url: Option<String>,
}

struct MetadataEvents {
    page: Vec<EventId>,
    workers: Vec<EventId>,
}

/// Where a frame's process lived, used to bound renderer threads.
struct FrameSpan {
    from: f64,
    to: f64,
    main: bool,
    url: String,
}

/// A CPU profile recovered from one thread's trace events.
#[derive(Debug, Clone)]
pub struct ThreadProfile {
    pub thread: ThreadKey,
    pub profile: CpuProfileModel,
}

/// Scratch state of one classification pass.
#[derive(Debug, Default)]
struct ProcessingState {
    async_tracker: AsyncEventTracker,
    event_stack: Vec<EventId>,
    current_script_event: Option<EventId>,
    current_task_layout_and_recalc: Vec<EventId>,
    last_recalculate_styles: Option<EventId>,
    layout_invalidate: HashMap<String, Option<EventId>>,
    last_schedule_style_recalculation: HashMap<String, EventId>,
    paint_image_by_pixel_ref: HashMap<String, EventId>,
    last_paint_for_layer: HashMap<String, EventId>,
    known_input_events: HashSet<String>,
    browser_frame_tracking: bool,
    persistent_ids: bool,
    legacy_current_page: Option<Value>,
}

#[derive(Debug)]
pub struct TimelineModel {
    thresholds: Thresholds,
    js_frame_options: JsFrameOptions,
    is_generic_trace: bool,
    tracks: Vec<Track>,
    named_tracks: HashMap<TrackType, usize>,
    inspected_target_events: Vec<EventId>,
    time_marker_events: Vec<EventId>,
    session_id: Option<String>,
    main_frame_node_id: Option<Value>,
    main_frame_layer_tree_id: Option<Value>,
    cpu_profiles: Vec<ThreadProfile>,
    worker_id_by_thread: HashMap<ThreadKey, String>,
    page_frames: PageFrameTree,
    main_frame: Option<usize>,
    minimum_record_time: f64,
    maximum_record_time: f64,
    data: TimelineDataTable,
    invalidations: InvalidationTracker,
    state: ProcessingState,
}

impl Default for TimelineModel {
    fn default() -> Self {
        Self::new(Thresholds::default(), JsFrameOptions::default())
    }
}

impl TimelineModel {
    pub fn new(thresholds: Thresholds, js_frame_options: JsFrameOptions) -> Self {
        Self {
            thresholds,
            js_frame_options,
            is_generic_trace: false,
            tracks: Vec::new(),
            named_tracks: HashMap::new(),
            inspected_target_events: Vec::new(),
            time_marker_events: Vec::new(),
            session_id: None,
            main_frame_node_id: None,
            main_frame_layer_tree_id: None,
            cpu_profiles: Vec::new(),
            worker_id_by_thread: HashMap::new(),
            page_frames: PageFrameTree::default(),
            main_frame: None,
            minimum_record_time: 0.0,
            maximum_record_time: 0.0,
            data: TimelineDataTable::default(),
            invalidations: InvalidationTracker::new(),
            state: ProcessingState::default(),
        }
    }

    /// Classifies every event of `model`. A tracing model can be classified
    /// once; its events get their self times and line numbers adjusted.
    pub fn set_events(&mut self, model: &mut TracingModel) -> Result<()> {
        if !model.mark_classified() {
            return Err(ModelError::EventsAlreadyProcessed);
        }
        self.reset();
        self.minimum_record_time = model.minimum_record_time();
        self.maximum_record_time = model.maximum_record_time();

        self.process_sync_browser_events(model);
        if self.state.browser_frame_tracking {
            self.process_threads_for_browser_frames(model);
        } else if let Some(metadata) = self.process_metadata_events(model) {
            self.process_metadata_and_threads(model, &metadata);
        } else {
            self.is_generic_trace = true;
            self.process_generic_trace(model);
        }

        let mut seen = HashSet::new();
        self.inspected_target_events.retain(|id| seen.insert(*id));
        self.inspected_target_events
            .sort_by(|a, b| Event::compare_start_time(model.event(*a), model.event(*b)));

        self.process_async_browser_events(model);
        self.build_gpu_events(model);
        self.state = ProcessingState::default();

        tracing::info!(
            tracks = self.tracks.len(),
            inspected = self.inspected_target_events.len(),
            frames = self.page_frames.len(),
            profiles = self.cpu_profiles.len(),
            generic = self.is_generic_trace,
            "timeline classified"
        );
        Ok(())
    }

    fn reset(&mut self) {
        self.is_generic_trace = false;
        self.tracks.clear();
        self.named_tracks.clear();
        self.inspected_target_events.clear();
        self.time_marker_events.clear();
        self.session_id = None;
        self.main_frame_node_id = None;
        self.main_frame_layer_tree_id = None;
        self.cpu_profiles.clear();
        self.worker_id_by_thread.clear();
        self.page_frames = PageFrameTree::default();
        self.main_frame = None;
        self.minimum_record_time = 0.0;
        self.maximum_record_time = 0.0;
        self.data = TimelineDataTable::default();
        self.invalidations = InvalidationTracker::new();
        self.state = ProcessingState::default();
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn is_generic_trace(&self) -> bool {
        self.is_generic_trace
    }

    pub fn minimum_record_time(&self) -> f64 {
        self.minimum_record_time
    }

    pub fn maximum_record_time(&self) -> f64 {
        self.maximum_record_time
    }

    pub fn is_empty(&self) -> bool {
        self.minimum_record_time == 0.0 && self.maximum_record_time == 0.0
    }

    /// Every event kept on a thread track, ordered by start time.
    pub fn inspected_target_events(&self) -> &[EventId] {
        &self.inspected_target_events
    }

    pub fn time_marker_events(&self) -> &[EventId] {
        &self.time_marker_events
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn named_track(&self, kind: TrackType) -> Option<&Track> {
        self.named_tracks.get(&kind).map(|index| &self.tracks[*index])
    }

    pub fn cpu_profiles(&self) -> &[ThreadProfile] {
        &self.cpu_profiles
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn worker_id(&self, thread: ThreadKey) -> Option<&str> {
        self.worker_id_by_thread.get(&thread).map(String::as_str)
    }

    pub fn page_frames(&self) -> &PageFrameTree {
        &self.page_frames
    }

    pub fn root_frames(&self) -> impl Iterator<Item = &PageFrame> {
        self.page_frames.root_frames()
    }

    pub fn page_frame_by_id(&self, frame_id: &str) -> Option<&PageFrame> {
        self.page_frames.get(frame_id)
    }

    pub fn main_frame(&self) -> Option<&PageFrame> {
        self.main_frame.map(|index| self.page_frames.frame(index))
    }

    pub fn main_frame_id(&self) -> &str {
        self.main_frame().map_or("", |frame| frame.frame_id.as_str())
    }

    /// Url of the main frame, empty when unknown.
    pub fn page_url(&self) -> &str {
        self.main_frame().map_or("", |frame| frame.url.as_str())
    }

    pub fn timeline_data(&self, id: EventId) -> Option<&TimelineData> {
        self.data.get(id)
    }

    pub fn data_table(&self) -> &TimelineDataTable {
        &self.data
    }

    pub fn invalidations_for(&self, id: EventId) -> impl Iterator<Item = &InvalidationRecord> {
        self.invalidations.invalidations_for(id)
    }

    /// Whether the event belongs on the timings track as a page marker.
    pub fn is_marker_event(&self, event: &Event) -> bool {
        match event.name.as_str() {
            rt::TIME_STAMP => true,
            rt::MARK_FIRST_PAINT | rt::MARK_FCP | rt::MARK_FMP => {
                let main_frame = self.main_frame_id();
                !main_frame.is_empty()
                    && event.args.get("frame").and_then(Value::as_str) == Some(main_frame)
                    && event.args.get("data").is_some_and(is_truthy)
            }
            rt::MARK_DOM_CONTENT | rt::MARK_LOAD => event.data().is_true("isMainFrame"),
            _ => false,
        }
    }

    fn ensure_named_track(&mut self, kind: TrackType) -> usize {
        if let Some(index) = self.named_tracks.get(&kind) {
            return *index;
        }
        let index = self.tracks.len();
        self.tracks.push(Track::new(kind));
        self.named_tracks.insert(kind, index);
        index
    }

    fn process_sync_browser_events(&mut self, model: &TracingModel) {
        let Some(thread) = model.browser_main_thread().and_then(|key| model.thread(key)) else {
            return;
        };
        for id in thread.events() {
            self.process_browser_event(model.event(*id));
        }
    }

    fn process_browser_event(&mut self, event: &Event) {
        if event.name == rt::LATENCY_INFO_FLOW {
            let frame_node = event.args.get("frameTreeNodeId").filter(|v| v.is_number());
            if frame_node.is_some() && frame_node == self.main_frame_node_id.as_ref() {
                if let Some(bind_id) = &event.bind_id {
                    self.state.known_input_events.insert(bind_id.clone());
                }
            }
            return;
        }
        if !event.has_category(category::DEVTOOLS_METADATA) {
            return;
        }
        let Some(data) = event.data().map() else {
            return;
        };
        let tracking = self.state.browser_frame_tracking;
        match event.name.as_str() {
            devtools_metadata::TRACING_STARTED_IN_BROWSER => {
                if !data.get("persistentIds").is_some_and(is_truthy) {
                    return;
                }
                self.state.browser_frame_tracking = true;
                self.main_frame_node_id = data.get("frameTreeNodeId").cloned();
                let frames = data.get("frames").and_then(Value::as_array);
                for payload in frames.into_iter().flatten().filter_map(Value::as_object) {
                    if let Some((index, true)) = self.upsert_page_frame(self.minimum_record_time, payload) {
                        if self.page_frames.frame(index).is_root() {
                            self.main_frame = Some(index);
                        }
                    }
                }
            }
            devtools_metadata::FRAME_COMMITTED_IN_BROWSER if tracking => {
                if let Some(frame_id) = data.get("frame").and_then(value_key) {
                    if !self.page_frames.contains(&frame_id) && !data.get("parent").is_some_and(is_truthy) {
                        return;
                    }
                }
                self.upsert_page_frame(event.start_time, data);
            }
            devtools_metadata::PROCESS_READY_IN_BROWSER if tracking => {
                let frame_id = data.get("frame").and_then(value_key).unwrap_or_default();
                if let Some(frame) = self.page_frames.get_mut(&frame_id) {
                    let pseudo_id = data.get("processPseudoId").and_then(Value::as_str).unwrap_or("");
                    let process_id = data.get("processId").and_then(Value::as_i64).unwrap_or(-1);
                    frame.process_ready(pseudo_id, process_id);
                }
            }
            devtools_metadata::FRAME_DELETED_IN_BROWSER if tracking => {
                let frame_id = data.get("frame").and_then(value_key).unwrap_or_default();
                if let Some(frame) = self.page_frames.get_mut(&frame_id) {
                    frame.deleted_time = Some(event.start_time);
                }
            }
            _ => {}
        }
    }

    /// Creates the frame described by `payload` if needed and records the
    /// commit at `time`. `None` when the payload names an unknown parent;
    /// otherwise the frame index and whether it was created.
    fn upsert_page_frame(&mut self, time: f64, payload: &Map<String, Value>) -> Option<(usize, bool)> {
        let parent = match payload.get("parent").and_then(value_key) {
            Some(parent_id) => Some(self.page_frames.index_of(&parent_id)?),
            None => None,
        };
        let frame_id = payload.get("frame").and_then(value_key).unwrap_or_default();
        let (index, created) = match self.page_frames.index_of(&frame_id) {
            Some(index) => (index, false),
            None => (self.page_frames.insert(PageFrame::new(payload), parent), true),
        };
        self.page_frames.frame_mut(index).update(time, payload);
        Some((index, created))
    }

    fn process_threads_for_browser_frames(&mut self, model: &mut TracingModel) {
        let mut process_data: HashMap<i64, Vec<FrameSpan>> = HashMap::new();
        for frame in self.page_frames.iter() {
            for (i, process) in frame.processes.iter().enumerate() {
                let to = match frame.processes.get(i + 1) {
                    Some(next) => next.time,
                    None => frame
                        .deleted_time
                        .filter(|t| *t != 0.0)
                        .unwrap_or(self.maximum_record_time),
                };
                process_data.entry(process.process_id).or_default().push(FrameSpan {
                    from: process.time,
                    to,
                    main: frame.is_root(),
                    url: process.url.clone(),
                });
            }
        }

        let workers: Vec<EventId> = model
            .devtools_metadata_events()
            .iter()
            .copied()
            .filter(|id| model.event(*id).name == devtools_metadata::TRACING_SESSION_ID_FOR_WORKER)
            .collect();
        for (pid, threads) in sorted_thread_keys(model) {
            let Some(spans) = process_data.get_mut(&i64::from(pid)) else {
                continue;
            };
            spans.sort_by(|a, b| a.from.total_cmp(&b.from).then(a.to.total_cmp(&b.to)));
            let mut ranges: Vec<TimeRange> = Vec::new();
            let mut has_main = false;
            let mut last_url = None;
            let mut last_main_url = None;
            for span in spans.iter() {
                match ranges.last_mut() {
                    Some(last) if span.from <= last.to => last.to = last.to.max(span.to),
                    _ => ranges.push(TimeRange {
                        from: span.from,
                        to: span.to,
                    }),
                }
                has_main |= span.main;
                if !span.url.is_empty() {
                    if span.main {
                        last_main_url = Some(span.url.clone());
                    }
                    last_url = Some(span.url.clone());
                }
            }

            for thread in threads {
                let name = model.thread_name(thread).to_string();
                let role = if name == thread_name::RENDERER_MAIN {
                    ThreadRole {
                        is_main_thread: true,
                        for_main_frame: has_main,
                        url: if has_main { last_main_url.clone() } else { last_url.clone() },
                        ..ThreadRole::default()
                    }
                } else if is_worker_thread(&name) {
                    let worker = workers.iter().map(|id| model.event(*id)).find(|event| {
                        event.thread.pid == pid
                            && event.data().number("workerThreadId") == Some(f64::from(thread.tid))
                            && self.page_frames.contains(event.frame_id())
                    });
                    let Some((worker_id, url)) = worker.map(worker_identity) else {
                        continue;
                    };
                    self.worker_id_by_thread.insert(thread, worker_id);
                    ThreadRole {
                        is_worker: true,
                        url: Some(url),
                        ..ThreadRole::default()
                    }
                } else {
                    ThreadRole::default()
                };
                self.process_thread_events(model, &ranges, thread, role);
            }
        }
    }

    fn process_metadata_events(&mut self, model: &TracingModel) -> Option<MetadataEvents> {
        let mut page = Vec::new();
        let mut workers = Vec::new();
        for &id in model.devtools_metadata_events() {
            let event = model.event(id);
            match event.name.as_str() {
                devtools_metadata::TRACING_STARTED_IN_PAGE => {
                    page.push(id);
                    let data = event.data();
                    if data.is_true("persistentIds") {
                        self.state.persistent_ids = true;
                    }
                    let frames = data.value("frames").and_then(Value::as_array);
                    for payload in frames.into_iter().flatten().filter_map(Value::as_object) {
                        self.upsert_page_frame(event.start_time, payload);
                    }
                    self.main_frame = self.page_frames.first_root();
                }
                devtools_metadata::TRACING_SESSION_ID_FOR_WORKER => workers.push(id),
                devtools_metadata::TRACING_STARTED_IN_BROWSER => {
                    if self.main_frame_node_id.is_some() {
                        tracing::warn!("trace contains multiple browser main frames");
                    }
                    self.main_frame_node_id = event.args.get("frameTreeNodeId").cloned();
                }
                _ => {}
            }
        }
        let first = model.event(*page.first()?);
        self.session_id = first
            .args
            .get("sessionId")
            .and_then(value_key)
            .or_else(|| first.data().key("sessionId"));

        let session_id = self.session_id.clone();
        let mut mismatching = HashSet::new();
        page.retain(|id| {
            let event = model.event(*id);
            let args = event
                .args
                .get("data")
                .filter(|v| is_truthy(v))
                .and_then(Value::as_object)
                .unwrap_or(&event.args);
            let event_session = args.get("sessionId").and_then(value_key);
            if event_session == session_id {
                return true;
            }
            if let Some(other) = event_session {
                mismatching.insert(other);
            }
            false
        });
        if !mismatching.is_empty() {
            tracing::warn!(
                session = ?session_id,
                ignored = ?mismatching,
                "trace contains multiple inspected sessions, using the first one"
            );
        }
        let by_start = |a: &EventId, b: &EventId| Event::compare_start_time(model.event(*a), model.event(*b));
        page.sort_by(by_start);
        workers.sort_by(by_start);
        Some(MetadataEvents { page, workers })
    }

    fn process_metadata_and_threads(&mut self, model: &mut TracingModel, metadata: &MetadataEvents) {
        let mut start_time = 0.0;
        for (i, &meta_id) in metadata.page.iter().enumerate() {
            let meta = model.event(meta_id);
            let meta_thread = meta.thread;
            let end_time = metadata
                .page
                .get(i + 1)
                .map_or(f64::INFINITY, |next| model.event(*next).start_time);
            if start_time == end_time {
                continue;
            }
            self.state.legacy_current_page = meta.data().value("page").cloned();
            let threads: Vec<(ThreadKey, String)> = model
                .process_by_id(meta_thread.pid)
                .map(|process| {
                    process
                        .sorted_threads()
                        .into_iter()
                        .map(|t| (t.key(), t.name().to_string()))
                        .collect()
                })
                .unwrap_or_default();
            for (thread, name) in threads {
                let mut worker_url = None;
                if is_worker_thread(&name) {
                    let worker = metadata.workers.iter().map(|id| model.event(*id)).find(|event| {
                        let data = event.data();
                        data.number("workerThreadId") == Some(f64::from(thread.tid))
                            && (data.key("sessionId") == self.session_id
                                || self.page_frames.contains(event.frame_id()))
                    });
                    let Some((worker_id, url)) = worker.map(worker_identity) else {
                        continue;
                    };
                    self.worker_id_by_thread.insert(thread, worker_id);
                    worker_url = Some(url);
                }
                let role = ThreadRole {
                    is_main_thread: thread == meta_thread,
                    is_worker: worker_url.as_deref().is_some_and(|url| !url.is_empty()),
                    for_main_frame: true,
                    url: worker_url,
                };
                let range = TimeRange {
                    from: start_time,
                    to: end_time,
                };
                self.process_thread_events(model, &[range], thread, role);
            }
            start_time = end_time;
        }
    }

    fn process_generic_trace(&mut self, model: &mut TracingModel) {
        let threads = sorted_thread_keys(model);
        let browser_main = model
            .browser_main_thread()
            .or_else(|| threads.first().and_then(|(_, threads)| threads.first().copied()));
        for thread in threads.into_iter().flat_map(|(_, threads)| threads) {
            let role = ThreadRole {
                is_main_thread: Some(thread) == browser_main,
                for_main_frame: true,
                ..ThreadRole::default()
            };
            self.process_thread_events(model, &[TimeRange::ALL], thread, role);
        }
    }

    fn process_thread_events(
        &mut self,
        model: &mut TracingModel,
        ranges: &[TimeRange],
        thread: ThreadKey,
        role: ThreadRole,
    ) {
        let name = match model.thread_name(thread) {
            "" => format!("Thread {}", thread.tid),
            name => name.to_string(),
        };
        let kind = if role.is_main_thread {
            TrackType::MainThread
        } else if role.is_worker {
            TrackType::Worker
        } else if name.starts_with(thread_name::COMPOSITOR_TILE_WORKER_PREFIX) {
            TrackType::Raster
        } else {
            TrackType::Other
        };
        let mut track = Track::new(kind);
        track.name = name;
        track.thread = Some(thread);
        if matches!(kind, TrackType::MainThread | TrackType::Worker) {
            track.url = role.url.unwrap_or_default();
            track.for_main_frame = role.is_main_thread && role.for_main_frame;
        }
        let track_index = self.tracks.len();
        self.tracks.push(track);

        let events = self.inject_js_frame_events(model, thread);
        self.state.event_stack.clear();
        for range in ranges {
            let first = lower_bound(&events, range.from, |id| model.event(*id).start_time);
            for &id in &events[first..] {
                let start = model.event(id).start_time;
                if start >= range.to {
                    break;
                }
                while let Some(&top) = self.state.event_stack.last() {
                    if !model.event(top).end_time.is_some_and(|end| end <= start) {
                        break;
                    }
                    self.state.event_stack.pop();
                }
                if !self.process_event(model, id) {
                    continue;
                }
                let event = model.event(id);
                if !event.phase.is_async() && event.has_duration() {
                    let duration = event.duration.unwrap_or(0.0);
                    if let Some(&parent) = self.state.event_stack.last() {
                        fix_parent_self_time(model.event_mut(parent), duration);
                    }
                    model.event_mut(id).self_time = duration;
                    if self.state.event_stack.is_empty() {
                        self.tracks[track_index].tasks.push(id);
                    }
                    self.state.event_stack.push(id);
                }
                if self.is_marker_event(model.event(id)) {
                    self.time_marker_events.push(id);
                }
                self.tracks[track_index].events.push(id);
                self.inspected_target_events.push(id);
            }
        }
        self.process_async_events(model, thread, ranges);
    }

    /// The thread's events with synthetic `JSSample` and `JSFrame` events
    /// from its CPU profile merged in by start time.
    fn inject_js_frame_events(&mut self, model: &mut TracingModel, thread: ThreadKey) -> Vec<EventId> {
        let mut events = model
            .thread(thread)
            .map(|t| t.events().to_vec())
            .unwrap_or_default();
        let profile = self.extract_cpu_profile(model, thread, &events);
        let categories = model.categories(category::DEVTOOLS_TIMELINE);

        if let Some(index) = profile {
            let samples = js_profile::generate_js_samples(
                &self.cpu_profiles[index].profile,
                thread,
                Arc::clone(&categories),
            );
            let samples: Vec<EventId> = samples.into_iter().map(|e| model.alloc_event(e)).collect();
            if !samples.is_empty() {
                events = merge_ordered(&events, &samples, |a, b| {
                    Event::compare_start_time(model.event(*a), model.event(*b))
                });
            }
        }
        let has_samples = profile.is_some()
            || events.iter().any(|id| model.event(*id).name == rt::JS_SAMPLE);
        if has_samples {
            let frames =
                js_profile::generate_js_frame_events(model, &events, categories, self.js_frame_options);
            let frames: Vec<EventId> = frames.into_iter().map(|e| model.alloc_event(e)).collect();
            if !frames.is_empty() {
                events = merge_ordered(&frames, &events, |a, b| {
                    Event::compare_start_time(model.event(*a), model.event(*b))
                });
            }
        }
        events
    }

    /// Recovers the thread's CPU profile, either from a legacy `CpuProfile`
    /// event closing the thread or from `Profile`/`ProfileChunk` samples.
    fn extract_cpu_profile(
        &mut self,
        model: &TracingModel,
        thread: ThreadKey,
        events: &[EventId],
    ) -> Option<usize> {
        let legacy = events
            .last()
            .map(|id| model.event(*id))
            .filter(|event| event.name == rt::CPU_PROFILE)
            .and_then(|event| event.data().value("cpuProfile"))
            .filter(|value| is_truthy(value));
        let profile = match legacy {
            Some(value) => parse_value::<Profile>(Some(value)),
            None => {
                let head = events
                    .iter()
                    .copied()
                    .find(|id| model.event(*id).name == rt::PROFILE)?;
                match model.profile_group(head) {
                    Some(group) => assemble_profile(model, head, group),
                    None => Err(ModelError::InvalidProfile("profile event without samples".into())),
                }
            }
        };
        match profile.and_then(CpuProfileModel::new) {
            Ok(profile) => {
                self.cpu_profiles.push(ThreadProfile { thread, profile });
                Some(self.cpu_profiles.len() - 1)
            }
            Err(error) => {
                tracing::warn!(pid = thread.pid, tid = thread.tid, %error, "failed to parse cpu profile");
                None
            }
        }
    }

    fn process_async_events(&mut self, model: &TracingModel, thread: ThreadKey, ranges: &[TimeRange]) {
        let Some(async_events) = model.thread(thread).map(Thread::async_events) else {
            return;
        };
        let mut groups: Vec<(TrackType, Vec<EventId>)> = Vec::new();
        for range in ranges {
            let first = lower_bound(async_events, range.from, |id| model.event(*id).start_time);
            for &id in &async_events[first..] {
                if model.event(id).start_time >= range.to {
                    break;
                }
                let Some(kind) = self.async_track_type(model, id) else {
                    continue;
                };
                match groups.iter_mut().find(|(group, _)| *group == kind) {
                    Some((_, events)) => events.push(id),
                    None => groups.push((kind, vec![id])),
                }
            }
        }
        for (kind, events) in groups {
            let index = self.ensure_named_track(kind);
            let track = &mut self.tracks[index];
            track.thread = Some(thread);
            track.async_events = merge_ordered(&track.async_events, &events, |a, b| {
                Event::compare_start_time(model.event(*a), model.event(*b))
            });
        }
    }

    fn async_track_type(&mut self, model: &TracingModel, id: EventId) -> Option<TrackType> {
        let event = model.event(id);
        if event.has_category(category::CONSOLE) {
            return Some(TrackType::Console);
        }
        if event.has_category(category::USER_TIMING) {
            return Some(TrackType::Timings);
        }
        if event.name == rt::ANIMATION {
            return Some(TrackType::Animation);
        }
        let is_latency = event.has_category(category::LATENCY_INFO);
        if !is_latency && event.name != rt::IMPL_SIDE_FLING {
            return None;
        }
        let last_step = model.event(*event.steps().last()?);
        if last_step.phase != Phase::AsyncEnd {
            return None;
        }
        let data = EventData::from_value(last_step.args.get("data"));
        let caused_frame = data.is_true("INPUT_EVENT_LATENCY_RENDERER_SWAP_COMPONENT");
        if is_latency {
            let known = last_step
                .id
                .as_ref()
                .is_some_and(|step_id| self.state.known_input_events.contains(step_id));
            if !known || (event.name == rt::INPUT_LATENCY_MOUSE_MOVE && !caused_frame) {
                return None;
            }
        }
        self.data.for_event(id).caused_frame = caused_frame;
        let renderer_main = EventData::from_value(data.value("INPUT_EVENT_LATENCY_RENDERER_MAIN_COMPONENT"));
        if let (Some(time), Some(&first)) = (renderer_main.number("time"), event.steps().first()) {
            let waiting = time / 1000.0 - model.event(first).start_time;
            self.data.for_event(first).time_waiting_for_main_thread = Some(waiting);
        }
        Some(TrackType::Input)
    }

    fn process_async_browser_events(&mut self, model: &TracingModel) {
        if let Some(thread) = model.browser_main_thread() {
            self.process_async_events(model, thread, &[TimeRange::ALL]);
        }
    }

    fn build_gpu_events(&mut self, model: &TracingModel) {
        let Some(thread) = model.thread_by_name(thread_name::GPU_PROCESS, thread_name::GPU_MAIN) else {
            return;
        };
        let events: Vec<EventId> = thread
            .events()
            .iter()
            .copied()
            .filter(|id| model.event(*id).name == rt::GPU_TASK)
            .collect();
        let index = self.ensure_named_track(TrackType::Gpu);
        let track = &mut self.tracks[index];
        track.thread = Some(thread.key());
        track.events = events;
    }

    fn find_ancestor(&self, model: &TracingModel, name: &str) -> Option<EventId> {
        self.state
            .event_stack
            .iter()
            .rev()
            .copied()
            .find(|id| model.event(*id).name == name)
    }

    fn flag_forced_layout(&mut self, model: &TracingModel) {
        let pending = std::mem::take(&mut self.state.current_task_layout_and_recalc);
        let total: f64 = pending
            .iter()
            .map(|id| model.event(*id).duration.unwrap_or(0.0))
            .sum();
        if total <= self.thresholds.forced_layout {
            return;
        }
        for id in pending {
            let warning = if model.event(id).name == rt::LAYOUT {
                WarningType::ForcedLayout
            } else {
                WarningType::ForcedStyle
            };
            self.data.for_event(id).warning = Some(warning);
        }
    }

    fn warn_if_longer(&mut self, model: &TracingModel, id: EventId, threshold: f64, warning: WarningType) {
        if model.event(id).duration.is_some_and(|d| d > threshold) {
            self.data.for_event(id).warning = Some(warning);
        }
    }

    fn track_script_work(&mut self, id: EventId) {
        if self.state.current_script_event.is_some() {
            self.state.current_task_layout_and_recalc.push(id);
        }
    }

    /// Derives the timeline data of one event. Returns false when the event
    /// does not belong to the inspected page and should be dropped.
    fn process_event(&mut self, model: &mut TracingModel, id: EventId) -> bool {
        if self.state.event_stack.is_empty() {
            self.flag_forced_layout(model);
        }
        let event = model.event(id);
        if let Some(script) = self.state.current_script_event {
            if model.event(script).end_time.is_some_and(|end| event.start_time > end) {
                self.state.current_script_event = None;
            }
        }

        let mut stack_trace = event.data().stack_trace().cloned();
        if event.name != rt::JS_SAMPLE {
            for frame in stack_trace.iter_mut().flatten() {
                if let Some(frame) = frame.as_object_mut() {
                    decrement_position(frame, "lineNumber");
                    decrement_position(frame, "columnNumber");
                }
            }
        }
        let mut frame_id = event.frame_id().to_string();
        if frame_id.is_empty() {
            if let Some(&top) = self.state.event_stack.last() {
                frame_id = self.data.frame_id(top).to_string();
            }
        }
        if frame_id.is_empty() {
            frame_id = self.main_frame_id().to_string();
        }
        let correlation = self.state.async_tracker.process_event(id, event);
        let data = self.data.for_event(id);
        if stack_trace.is_some() {
            data.stack_trace = stack_trace;
        }
        data.frame_id = frame_id;
        if let Correlation::Cause(initiator) = correlation {
            self.data.set_initiator(id, initiator);
            if let Some(initiator) = initiator {
                if self.data.frame_id(id).is_empty() {
                    self.data.for_event(id).frame_id = model.event(initiator).frame_id().to_string();
                }
            }
        }
        if self.is_marker_event(event) {
            self.ensure_named_track(TrackType::Timings);
        }

        let name = event.name.clone();
        match name.as_str() {
            rt::RESOURCE_SEND_REQUEST | rt::WEB_SOCKET_CREATE => {
                let top = self.state.event_stack.last().copied();
                self.data.set_initiator(id, top);
                self.data.for_event(id).url = event.data().url().map(str::to_string);
            }
            rt::SCHEDULE_STYLE_RECALCULATION => {
                let frame = event.data().str("frame").unwrap_or("").to_string();
                self.state.last_schedule_style_recalculation.insert(frame, id);
            }
            rt::UPDATE_LAYOUT_TREE | rt::RECALCULATE_STYLES => {
                self.invalidations.did_recalc_style(id, event);
                if let Some(begin) = event.args.get("beginData").filter(|v| is_truthy(v)) {
                    let frame = EventData::from_value(Some(begin)).str("frame").unwrap_or("");
                    let initiator = self.state.last_schedule_style_recalculation.get(frame).copied();
                    self.data.set_initiator(id, initiator);
                }
                self.state.last_recalculate_styles = Some(id);
                self.track_script_work(id);
            }
            rt::SCHEDULE_STYLE_INVALIDATION_TRACKING
            | rt::STYLE_RECALC_INVALIDATION_TRACKING
            | rt::STYLE_INVALIDATOR_INVALIDATION_TRACKING
            | rt::LAYOUT_INVALIDATION_TRACKING => {
                if let Some(record) = InvalidationRecord::from_event(id, event) {
                    self.invalidations.add_invalidation(record);
                }
            }
            rt::INVALIDATE_LAYOUT => {
                let frame = event.data().str("frame").unwrap_or("").to_string();
                let mut initiator = Some(id);
                let pending = self.state.layout_invalidate.get(&frame).copied().flatten();
                if pending.is_none() {
                    if let Some(recalc) = self.state.last_recalculate_styles {
                        if model.event(recalc).end_time.is_some_and(|end| end > event.start_time) {
                            initiator = self.data.initiator(recalc);
                        }
                    }
                }
                self.state.layout_invalidate.insert(frame, initiator);
            }
            rt::LAYOUT => {
                self.invalidations.did_layout(id, event);
                let frame = EventData::from_value(event.args.get("beginData"))
                    .str("frame")
                    .unwrap_or("")
                    .to_string();
                let initiator = self.state.layout_invalidate.get(&frame).copied().flatten();
                self.data.set_initiator(id, initiator);
                if let Some(root) = EventData::from_value(event.args.get("endData")).value("rootNode") {
                    self.data.for_event(id).backend_node_id = root.as_i64();
                }
                self.state.layout_invalidate.insert(frame, None);
                self.track_script_work(id);
            }
            rt::TASK => {
                self.warn_if_longer(model, id, self.thresholds.long_task, WarningType::LongTask);
            }
            rt::EVENT_DISPATCH => {
                let threshold = self.thresholds.recurring_handler;
                self.warn_if_longer(model, id, threshold, WarningType::LongHandler);
            }
            rt::TIMER_FIRE | rt::FIRE_ANIMATION_FRAME => {
                let threshold = self.thresholds.recurring_handler;
                self.warn_if_longer(model, id, threshold, WarningType::LongRecurringHandler);
            }
            rt::FUNCTION_CALL | rt::EVALUATE_SCRIPT | rt::COMPILE_SCRIPT | rt::RUN_MICROTASKS => {
                if name != rt::RUN_MICROTASKS {
                    normalize_script_location(&mut model.event_mut(id).args, name == rt::FUNCTION_CALL);
                }
                if self.state.current_script_event.is_none() {
                    self.state.current_script_event = Some(id);
                }
            }
            rt::SET_LAYER_TREE_ID => {
                let data = event.data();
                let layer_tree_id = data.value("layerTreeId").cloned();
                let same_session =
                    self.session_id.is_some() && data.key("sessionId") == self.session_id;
                if !same_session && !self.page_frames.get(event.frame_id()).is_some_and(PageFrame::is_root) {
                    return false;
                }
                self.main_frame_layer_tree_id = layer_tree_id;
            }
            rt::PAINT => {
                self.invalidations.did_paint();
                let data = event.data();
                self.data.for_event(id).backend_node_id = data.value("nodeId").and_then(Value::as_i64);
                if let Some(layer_id) = data.key("layerId") {
                    self.state.last_paint_for_layer.insert(layer_id, id);
                }
            }
            rt::DISPLAY_ITEM_LIST_SNAPSHOT | rt::PICTURE_SNAPSHOT => self.link_picture(model, id),
            rt::SCROLL_LAYER => {
                self.data.for_event(id).backend_node_id =
                    event.data().value("nodeId").and_then(Value::as_i64);
            }
            rt::PAINT_IMAGE => {
                let data = event.data();
                let backend_node_id = data.value("nodeId").and_then(Value::as_i64);
                let url = data.url().map(str::to_string);
                let timeline = self.data.for_event(id);
                timeline.backend_node_id = backend_node_id;
                timeline.url = url;
            }
            rt::DECODE_IMAGE | rt::RESIZE_IMAGE => {
                let paint_image = self.find_ancestor(model, rt::PAINT_IMAGE).or_else(|| {
                    let decode = self.find_ancestor(model, rt::DECODE_LAZY_PIXEL_REF)?;
                    let pixel_ref = model.event(decode).args.get(rt::LAZY_PIXEL_REF).and_then(value_key)?;
                    self.state.paint_image_by_pixel_ref.get(&pixel_ref).copied()
                });
                if let Some(paint_image) = paint_image {
                    self.copy_image_source(id, paint_image);
                }
            }
            rt::DRAW_LAZY_PIXEL_REF => {
                if let Some(paint_image) = self.find_ancestor(model, rt::PAINT_IMAGE) {
                    if let Some(pixel_ref) = event.args.get(rt::LAZY_PIXEL_REF).and_then(value_key) {
                        self.state.paint_image_by_pixel_ref.insert(pixel_ref, paint_image);
                    }
                    self.copy_image_source(id, paint_image);
                }
            }
            rt::FRAME_STARTED_LOADING => {
                let frame = event.args.get("frame").and_then(Value::as_str);
                if frame != Some(self.data.frame_id(id)) {
                    return false;
                }
            }
            rt::MARK_DOM_CONTENT | rt::MARK_LOAD => {
                if !self.page_frames.contains(event.frame_id()) {
                    return false;
                }
            }
            rt::COMMIT_LOAD => {
                if !self.state.browser_frame_tracking && !self.commit_load(event) {
                    return false;
                }
            }
            rt::FIRE_IDLE_CALLBACK => {
                let allotted = event.data().number("allottedMilliseconds");
                if let Some(allotted) = allotted {
                    let threshold = allotted + self.thresholds.idle_callback_addon;
                    self.warn_if_longer(model, id, threshold, WarningType::IdleDeadlineExceeded);
                }
            }
            _ => {}
        }
        true
    }

    /// Attaches a picture snapshot to the last paint of its layer on the
    /// main frame's layer tree.
    fn link_picture(&mut self, model: &TracingModel, id: EventId) {
        let Some(layer_update) = self.find_ancestor(model, rt::UPDATE_LAYER) else {
            return;
        };
        let layer_update = model.event(layer_update);
        if layer_update.args.get("layerTreeId") != self.main_frame_layer_tree_id.as_ref() {
            return;
        }
        let paint = layer_update
            .args
            .get("layerId")
            .and_then(value_key)
            .and_then(|layer_id| self.state.last_paint_for_layer.get(&layer_id).copied());
        if let Some(paint) = paint {
            self.data.for_event(paint).picture = Some(id);
        }
    }

    fn copy_image_source(&mut self, id: EventId, paint_image: EventId) {
        let (backend_node_id, url) = self
            .data
            .get(paint_image)
            .map(|data| (data.backend_node_id, data.url.clone()))
            .unwrap_or_default();
        let data = self.data.for_event(id);
        data.backend_node_id = backend_node_id;
        data.url = url;
    }

    /// Tracks main frame navigations of traces without browser frame
    /// tracking. Returns false for commits of other pages.
    fn commit_load(&mut self, event: &Event) -> bool {
        let data = event.data();
        let frame_id = event.frame_id().to_string();
        let is_main_frame = data.is_true("isMainFrame");
        if let Some(frame) = self.page_frames.get_mut(&frame_id) {
            if let Some(payload) = data.map() {
                frame.update(event.start_time, payload);
            }
        } else if !self.state.persistent_ids {
            let page = data.value("page").filter(|v| is_truthy(v));
            if page.is_some() && page != self.state.legacy_current_page.as_ref() {
                return false;
            }
        } else if is_main_frame {
            return false;
        } else {
            let upserted = data
                .map()
                .and_then(|payload| self.upsert_page_frame(event.start_time, payload));
            if upserted.is_none() {
                return false;
            }
        }
        if is_main_frame {
            self.main_frame = self.page_frames.index_of(&frame_id);
        }
        true
    }
}

fn is_worker_thread(name: &str) -> bool {
    name == thread_name::WORKER || name == thread_name::WORKER_LEGACY
}

fn worker_identity(event: &Event) -> (String, String) {
    let data = event.data();
    (
        data.key("workerId").unwrap_or_default(),
        data.url().unwrap_or("").to_string(),
    )
}

fn sorted_thread_keys(model: &TracingModel) -> Vec<(u32, Vec<ThreadKey>)> {
    model
        .sorted_processes()
        .into_iter()
        .map(|process| {
            let threads = process.sorted_threads().into_iter().map(Thread::key).collect();
            (process.id(), threads)
        })
        .collect()
}

fn fix_parent_self_time(parent: &mut Event, child_duration: f64) {
    parent.self_time -= child_duration;
    if parent.self_time < 0.0 {
        if parent.self_time < -1e-3 {
            tracing::warn!(
                parent = %parent.name,
                start = parent.start_time,
                self_time = parent.self_time,
                "children are longer than parent"
            );
        }
        parent.self_time = 0.0;
    }
}

fn decrement_position(map: &mut Map<String, Value>, key: &str) {
    let Some(value) = map.get(key) else {
        return;
    };
    let decremented = if let Some(n) = value.as_i64() {
        Value::from(n - 1)
    } else if let Some(n) = value.as_f64() {
        Value::from(n - 1.0)
    } else {
        return;
    };
    map.insert(key.to_string(), decremented);
}

/// Moves a script event's location to 0-based numbering, taking
/// `scriptName`/`scriptLine` of function calls as the location.
fn normalize_script_location(args: &mut Map<String, Value>, is_function_call: bool) {
    let key = if args.get("data").is_some_and(is_truthy) {
        "data"
    } else {
        "beginData"
    };
    let Some(data) = args.get_mut(key).and_then(Value::as_object_mut) else {
        return;
    };
    if is_function_call {
        if let Some(name) = data.get("scriptName").filter(|v| v.is_string()).cloned() {
            data.insert("url".to_string(), name);
        }
        if let Some(line) = data.get("scriptLine").filter(|v| v.is_number()).cloned() {
            data.insert("lineNumber".to_string(), line);
        }
    }
    decrement_position(data, "lineNumber");
    decrement_position(data, "columnNumber");
}

fn parse_value<T: DeserializeOwned + Default>(value: Option<&Value>) -> Result<T> {
    match value {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => {
            serde_json::from_value(value.clone()).map_err(|e| ModelError::InvalidProfile(e.to_string()))
        }
    }
}

/// Joins the chunks of a streamed profile into one [`Profile`].
fn assemble_profile(model: &TracingModel, head: EventId, group: &[EventId]) -> Result<Profile> {
    let mut start_time = model.event(head).data().number("startTime").unwrap_or(0.0);
    let mut end_time = 0.0;
    let mut nodes: Vec<ProfileNode> = Vec::new();
    let mut samples: Vec<u32> = Vec::new();
    let mut time_deltas: Vec<f64> = Vec::new();
    let mut lines: Vec<i64> = Vec::new();
    for &id in group {
        let data = model.event(id).data();
        if let Some(start) = data.number("startTime") {
            start_time = start;
        }
        if let Some(end) = data.number("endTime") {
            end_time = end;
        }
        let cpu_profile = EventData::from_value(data.value("cpuProfile"));
        let chunk_samples: Vec<u32> = parse_value(cpu_profile.value("samples"))?;
        let chunk_lines: Vec<i64> = match data.value("lines") {
            Some(value) => parse_value(Some(value))?,
            None => vec![0; chunk_samples.len()],
        };
        nodes.extend(parse_value::<Vec<ProfileNode>>(cpu_profile.value("nodes"))?);
        samples.extend(chunk_samples);
        lines.extend(chunk_lines);
        time_deltas.extend(parse_value::<Vec<f64>>(data.value("timeDeltas"))?);
        if samples.len() != time_deltas.len() {
            return Err(ModelError::InvalidProfile(format!(
                "{} samples but {} time deltas",
                samples.len(),
                time_deltas.len()
            )));
        }
    }
    if end_time == 0.0 {
        end_time = start_time + time_deltas.iter().sum::<f64>();
    }
    Ok(Profile::builder()
        .start_time(start_time)
        .end_time(end_time)
        .nodes(nodes)
        .samples(samples)
        .time_deltas(time_deltas)
        .lines(lines)
        .build())
}
