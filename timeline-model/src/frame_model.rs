//! Segmentation of the classified event stream into rendering frames.
//!
//! Compositor signals (`BeginFrame`, `DrawFrame`, `ActivateLayerTree`,
//! `RequestMainThreadFrame`, `NeedsBeginFrameChanged`) open and close
//! frames. Main-thread work between a frame marker and `CompositeLayers` is
//! held in a pending frame and committed to the frame that activates it.

use std::collections::{BTreeMap, HashMap};

use chrome_trace_format::Phase;
use serde::Serialize;
use serde_json::Value;

use crate::record_type::{self as rt, category};
use crate::timeline::TimelineDataTable;
use crate::tracing_model::{Event, EventData, EventId, ThreadKey, TracingModel};
use crate::util::lower_bound;

pub type TimeByCategory = BTreeMap<&'static str, f64>;

/// Names the accounting category of an event.
pub trait CategoryMapper {
    fn category(&self, event: &Event) -> &'static str;
}

impl<F> CategoryMapper for F
where
    F: Fn(&Event) -> &'static str,
{
    fn category(&self, event: &Event) -> &'static str {
        self(event)
    }
}

/// Buckets record names into `loading`, `scripting`, `rendering`,
/// `painting`, `gpu`, `async` and `other`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCategoryMapper;

impl DefaultCategoryMapper {
    pub const LOADING: &'static str = "loading";
    pub const SCRIPTING: &'static str = "scripting";
    pub const RENDERING: &'static str = "rendering";
    pub const PAINTING: &'static str = "painting";
    pub const GPU: &'static str = "gpu";
    pub const ASYNC: &'static str = "async";
    pub const OTHER: &'static str = "other";
}

impl CategoryMapper for DefaultCategoryMapper {
    fn category(&self, event: &Event) -> &'static str {
        if event.has_category(category::CONSOLE)
            || event.has_category(category::USER_TIMING)
            || event.has_category(category::LATENCY_INFO)
        {
            return Self::SCRIPTING;
        }
        match event.name.as_str() {
            rt::PARSE_HTML
            | rt::PARSE_AUTHOR_STYLE_SHEET
            | rt::RESOURCE_SEND_REQUEST
            | rt::RESOURCE_RECEIVE_RESPONSE
            | rt::RESOURCE_RECEIVED_DATA
            | rt::RESOURCE_FINISH
            | rt::FRAME_STARTED_LOADING
            | rt::COMMIT_LOAD => Self::LOADING,
            rt::FUNCTION_CALL
            | rt::EVALUATE_SCRIPT
            | rt::COMPILE_SCRIPT
            | rt::COMPILE_MODULE
            | rt::EVALUATE_MODULE
            | rt::PARSE_SCRIPT_ON_BACKGROUND
            | rt::RUN_MICROTASKS
            | rt::EVENT_DISPATCH
            | rt::TIMER_INSTALL
            | rt::TIMER_REMOVE
            | rt::TIMER_FIRE
            | rt::XHR_READY_STATE_CHANGE
            | rt::XHR_LOAD
            | rt::REQUEST_ANIMATION_FRAME
            | rt::CANCEL_ANIMATION_FRAME
            | rt::FIRE_ANIMATION_FRAME
            | rt::REQUEST_IDLE_CALLBACK
            | rt::CANCEL_IDLE_CALLBACK
            | rt::FIRE_IDLE_CALLBACK
            | rt::WEB_SOCKET_CREATE
            | rt::WEB_SOCKET_SEND_HANDSHAKE_REQUEST
            | rt::WEB_SOCKET_RECEIVE_HANDSHAKE_RESPONSE
            | rt::WEB_SOCKET_DESTROY
            | rt::EMBEDDER_CALLBACK
            | rt::GC_EVENT
            | rt::MAJOR_GC
            | rt::MINOR_GC
            | rt::GC_COLLECT_GARBAGE
            | rt::JS_FRAME
            | rt::JS_SAMPLE
            | rt::TIME_STAMP
            | rt::CONSOLE_TIME => Self::SCRIPTING,
            rt::SCHEDULE_STYLE_RECALCULATION
            | rt::RECALCULATE_STYLES
            | rt::UPDATE_LAYOUT_TREE
            | rt::INVALIDATE_LAYOUT
            | rt::LAYOUT
            | rt::UPDATE_LAYER_TREE
            | rt::HIT_TEST
            | rt::SCROLL_LAYER
            | rt::ANIMATION => Self::RENDERING,
            rt::PAINT
            | rt::PAINT_SETUP
            | rt::PAINT_IMAGE
            | rt::UPDATE_LAYER
            | rt::COMPOSITE_LAYERS
            | rt::RASTERIZE
            | rt::RASTER_TASK
            | rt::DECODE_IMAGE
            | rt::RESIZE_IMAGE
            | rt::DRAW_LAZY_PIXEL_REF
            | rt::DECODE_LAZY_PIXEL_REF => Self::PAINTING,
            rt::GPU_TASK => Self::GPU,
            rt::ASYNC_TASK => Self::ASYNC,
            _ => Self::OTHER,
        }
    }
}

/// A paint captured for a frame, with the picture snapshot made for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerPaintEvent {
    pub event: EventId,
    pub layer_id: String,
    pub picture: EventId,
}

/// Layer rectangle and serialized Skia picture of a paint.
#[derive(Debug, Clone, PartialEq)]
pub struct PaintPicture {
    pub rect: Vec<f64>,
    pub serialized_picture: String,
}

impl LayerPaintEvent {
    pub fn picture(&self, model: &TracingModel) -> Option<PaintPicture> {
        let object = model.event(self.picture).snapshot_object()?;
        let rect = object
            .get("params")
            .and_then(|params| params.get("layer_rect"))
            .and_then(Value::as_array)?
            .iter()
            .filter_map(Value::as_f64)
            .collect();
        let serialized_picture = object.get("skp64").and_then(Value::as_str)?.to_string();
        Some(PaintPicture {
            rect,
            serialized_picture,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineFrame {
    pub start_time: f64,
    /// Start relative to the first recorded event.
    pub start_time_offset: f64,
    pub end_time: f64,
    pub duration: f64,
    pub time_by_category: TimeByCategory,
    pub cpu_time: f64,
    pub idle: bool,
    /// Layer tree snapshot event current when the frame closed.
    pub layer_tree: Option<EventId>,
    pub paints: Vec<LayerPaintEvent>,
    pub main_frame_id: Option<i64>,
}

impl TimelineFrame {
    fn new(start_time: f64, start_time_offset: f64) -> Self {
        Self {
            start_time,
            start_time_offset,
            end_time: start_time,
            duration: 0.0,
            time_by_category: TimeByCategory::new(),
            cpu_time: 0.0,
            idle: false,
            layer_tree: None,
            paints: Vec::new(),
            main_frame_id: None,
        }
    }

    fn set_end_time(&mut self, end_time: f64) {
        self.end_time = end_time;
        self.duration = end_time - self.start_time;
    }

    pub fn add_time_for_category(&mut self, category: &'static str, time: f64) {
        *self.time_by_category.entry(category).or_default() += time;
        self.cpu_time += time;
    }

    fn add_time_for_categories(&mut self, times: &TimeByCategory) {
        for (category, time) in times {
            self.add_time_for_category(*category, *time);
        }
    }
}

#[derive(Debug)]
struct PendingFrame {
    trigger_time: f64,
    time_by_category: TimeByCategory,
    paints: Vec<LayerPaintEvent>,
    main_frame_id: Option<i64>,
}

impl PendingFrame {
    fn new(trigger_time: f64, time_by_category: TimeByCategory) -> Self {
        Self {
            trigger_time,
            time_by_category,
            paints: Vec::new(),
            main_frame_id: None,
        }
    }
}

/// Main-thread events that start a main frame's pending commit.
const MAIN_FRAME_MARKERS: &[&str] = &[
    rt::SCHEDULE_STYLE_RECALCULATION,
    rt::INVALIDATE_LAYOUT,
    rt::BEGIN_MAIN_THREAD_FRAME,
    rt::SCROLL_LAYER,
];

#[derive(Debug)]
pub struct FrameModel<M = DefaultCategoryMapper> {
    mapper: M,
    frames: Vec<TimelineFrame>,
    frame_by_id: HashMap<i64, usize>,
    minimum_record_time: f64,
    last_frame: Option<TimelineFrame>,
    last_layer_tree: Option<EventId>,
    main_frame_committed: bool,
    main_frame_requested: bool,
    frame_pending_commit: Option<PendingFrame>,
    frame_pending_activation: Option<PendingFrame>,
    last_begin_frame: Option<f64>,
    last_needs_begin_frame: Option<f64>,
    last_task_begin_time: Option<f64>,
    layer_tree_id: Option<Value>,
    current_task_time_by_category: TimeByCategory,
}

impl Default for FrameModel {
    fn default() -> Self {
        Self::new(DefaultCategoryMapper)
    }
}

impl<M: CategoryMapper> FrameModel<M> {
    pub fn new(mapper: M) -> Self {
        Self {
            mapper,
            frames: Vec::new(),
            frame_by_id: HashMap::new(),
            minimum_record_time: f64::INFINITY,
            last_frame: None,
            last_layer_tree: None,
            main_frame_committed: false,
            main_frame_requested: false,
            frame_pending_commit: None,
            frame_pending_activation: None,
            last_begin_frame: None,
            last_needs_begin_frame: None,
            last_task_begin_time: None,
            layer_tree_id: None,
            current_task_time_by_category: TimeByCategory::new(),
        }
    }

    /// Drops every frame and the segmentation state, keeping the mapper.
    pub fn reset(&mut self) {
        self.frames.clear();
        self.frame_by_id.clear();
        self.minimum_record_time = f64::INFINITY;
        self.last_frame = None;
        self.last_layer_tree = None;
        self.main_frame_committed = false;
        self.main_frame_requested = false;
        self.frame_pending_commit = None;
        self.frame_pending_activation = None;
        self.last_begin_frame = None;
        self.last_needs_begin_frame = None;
        self.last_task_begin_time = None;
        self.layer_tree_id = None;
        self.current_task_time_by_category.clear();
    }

    /// Closed frames in order.
    pub fn frames(&self) -> &[TimelineFrame] {
        &self.frames
    }

    /// Frames overlapping `[start_time, end_time)`.
    pub fn frames_in(&self, start_time: f64, end_time: f64) -> &[TimelineFrame] {
        let first = lower_bound(&self.frames, start_time, |frame| frame.end_time);
        let last = lower_bound(&self.frames, end_time, |frame| frame.start_time);
        &self.frames[first..last.max(first)]
    }

    pub fn frame_by_main_frame_id(&self, id: i64) -> Option<&TimelineFrame> {
        self.frame_by_id.get(&id).map(|index| &self.frames[*index])
    }

    /// Whether the raster task belongs to a frame with a layer tree.
    pub fn has_raster_tile(&self, raster_task: &Event) -> bool {
        let tile = EventData::from_value(raster_task.args.get("tileData"));
        tile.value("sourceFrameNumber")
            .and_then(Value::as_i64)
            .filter(|id| *id != 0)
            .and_then(|id| self.frame_by_main_frame_id(id))
            .is_some_and(|frame| frame.layer_tree.is_some())
    }

    /// Feeds classified events in start-time order. `main_threads` lists the
    /// main-frame main thread active from each time on.
    pub fn add_trace_events(
        &mut self,
        model: &TracingModel,
        data: &TimelineDataTable,
        events: &[EventId],
        main_threads: &[(ThreadKey, f64)],
    ) {
        let mut current = 0;
        let mut main_thread = main_threads.first().map(|(thread, _)| *thread);
        for &id in events {
            let event = model.event(id);
            while current + 1 < main_threads.len() && main_threads[current + 1].1 <= event.start_time {
                current += 1;
                main_thread = Some(main_threads[current].0);
            }
            self.add_trace_event(id, event, data, main_thread);
        }
        tracing::debug!(frames = self.frames.len(), "frames segmented");
    }

    fn add_trace_event(
        &mut self,
        id: EventId,
        event: &Event,
        data: &TimelineDataTable,
        main_thread: Option<ThreadKey>,
    ) {
        if event.start_time != 0.0 && event.start_time < self.minimum_record_time {
            self.minimum_record_time = event.start_time;
        }
        if event.name == rt::SET_LAYER_TREE_ID {
            self.layer_tree_id = event
                .args
                .get("layerTreeId")
                .filter(|v| !v.is_null())
                .or_else(|| EventData::from_value(event.args.get("data")).value("layerTreeId"))
                .cloned();
            return;
        }
        if event.phase == Phase::ObjectSnapshot && event.name == rt::LAYER_TREE_HOST_IMPL_SNAPSHOT {
            let snapshot_id = event.id.as_deref().and_then(parse_int);
            let layer_tree_id = self.layer_tree_id.as_ref().and_then(Value::as_i64);
            if snapshot_id.is_some() && snapshot_id == layer_tree_id {
                self.last_layer_tree = Some(id);
                return;
            }
        }
        self.process_compositor_event(event);
        if Some(event.thread) == main_thread {
            self.add_main_thread_event(id, event, data);
        } else if event.self_time != 0.0 && !event.is_top_level() {
            if let Some(frame) = self.last_frame.as_mut() {
                frame.add_time_for_category(self.mapper.category(event), event.self_time);
            }
        }
    }

    fn is_current_layer_tree(&self, event: &Event) -> bool {
        self.layer_tree_id.is_some() && event.args.get("layerTreeId") == self.layer_tree_id.as_ref()
    }

    fn process_compositor_event(&mut self, event: &Event) {
        if !self.is_current_layer_tree(event) {
            return;
        }
        let timestamp = event.start_time;
        match event.name.as_str() {
            rt::BEGIN_FRAME => self.handle_begin_frame(timestamp),
            rt::DRAW_FRAME => self.handle_draw_frame(timestamp),
            rt::ACTIVATE_LAYER_TREE => self.handle_activate_layer_tree(),
            rt::REQUEST_MAIN_THREAD_FRAME => self.handle_request_main_thread_frame(),
            rt::NEEDS_BEGIN_FRAME_CHANGED => {
                if event.data().is_true("needsBeginFrame") {
                    self.last_needs_begin_frame = Some(timestamp);
                }
            }
            _ => {}
        }
    }

    fn add_main_thread_event(&mut self, id: EventId, event: &Event, data: &TimelineDataTable) {
        if event.is_top_level() {
            self.current_task_time_by_category.clear();
            self.last_task_begin_time = Some(event.start_time);
        }
        if self.frame_pending_commit.is_none() && MAIN_FRAME_MARKERS.contains(&event.name.as_str()) {
            let trigger_time = self
                .last_task_begin_time
                .filter(|t| *t != 0.0)
                .unwrap_or(event.start_time);
            let times = std::mem::take(&mut self.current_task_time_by_category);
            self.frame_pending_commit = Some(PendingFrame::new(trigger_time, times));
        }
        let category = self.mapper.category(event);
        let Some(pending) = self.frame_pending_commit.as_mut() else {
            add_self_time(&mut self.current_task_time_by_category, category, event);
            return;
        };
        add_self_time(&mut pending.time_by_category, category, event);

        let event_data = EventData::from_value(event.args.get("data"));
        if event.name == rt::BEGIN_MAIN_THREAD_FRAME {
            if let Some(frame_id) = event_data.value("frameId").and_then(Value::as_i64).filter(|id| *id != 0) {
                pending.main_frame_id = Some(frame_id);
            }
        }
        if event.name == rt::PAINT {
            let layer_id = event_data.key("layerId");
            let picture = data.get(id).and_then(|d| d.picture);
            if let (Some(layer_id), Some(picture)) = (layer_id, picture) {
                pending.paints.push(LayerPaintEvent {
                    event: id,
                    layer_id,
                    picture,
                });
            }
        }
        if event.name == rt::COMPOSITE_LAYERS && self.is_current_layer_tree(event) {
            self.handle_composite_layers();
        }
    }

    fn handle_begin_frame(&mut self, start_time: f64) {
        if self.last_frame.is_none() {
            self.start_frame(start_time);
        }
        self.last_begin_frame = Some(start_time);
    }

    fn handle_draw_frame(&mut self, start_time: f64) {
        let Some(last_start) = self.last_frame.as_ref().map(|frame| frame.start_time) else {
            self.start_frame(start_time);
            return;
        };
        // Frames waiting on the main thread are only shown once committed.
        if self.main_frame_committed || !self.main_frame_requested {
            if let Some(needs_begin_frame) = self.last_needs_begin_frame.take() {
                let idle_end = match &self.frame_pending_activation {
                    Some(pending) => pending.trigger_time,
                    None => self.last_begin_frame.unwrap_or(needs_begin_frame),
                };
                if idle_end > last_start {
                    if let Some(frame) = self.last_frame.as_mut() {
                        frame.idle = true;
                    }
                    self.start_frame(idle_end);
                    if self.frame_pending_activation.is_some() {
                        self.commit_pending_frame();
                    }
                    self.last_begin_frame = None;
                }
            }
            self.start_frame(start_time);
        }
        self.main_frame_committed = false;
    }

    fn handle_activate_layer_tree(&mut self) {
        if self.last_frame.is_none() {
            return;
        }
        if self.frame_pending_activation.is_some() && self.last_needs_begin_frame.is_none() {
            self.commit_pending_frame();
        }
    }

    fn handle_request_main_thread_frame(&mut self) {
        if self.last_frame.is_some() {
            self.main_frame_requested = true;
        }
    }

    fn handle_composite_layers(&mut self) {
        let Some(pending) = self.frame_pending_commit.take() else {
            return;
        };
        self.frame_pending_activation = Some(pending);
        self.main_frame_requested = false;
        self.main_frame_committed = true;
    }

    fn start_frame(&mut self, start_time: f64) {
        if let Some(frame) = self.last_frame.take() {
            self.flush_frame(frame, start_time);
        }
        self.last_frame = Some(TimelineFrame::new(
            start_time,
            start_time - self.minimum_record_time,
        ));
    }

    fn flush_frame(&mut self, mut frame: TimelineFrame, end_time: f64) {
        frame.layer_tree = self.last_layer_tree;
        frame.set_end_time(end_time);
        if let Some(previous) = self.frames.last() {
            if frame.start_time != previous.end_time || frame.start_time > frame.end_time {
                tracing::warn!(
                    index = self.frames.len(),
                    start = frame.start_time,
                    end = frame.end_time,
                    "inconsistent frame time"
                );
            }
        }
        if let Some(id) = frame.main_frame_id {
            self.frame_by_id.insert(id, self.frames.len());
        }
        self.frames.push(frame);
    }

    fn commit_pending_frame(&mut self) {
        let (Some(pending), Some(frame)) = (self.frame_pending_activation.take(), self.last_frame.as_mut())
        else {
            return;
        };
        frame.add_time_for_categories(&pending.time_by_category);
        frame.paints = pending.paints;
        frame.main_frame_id = pending.main_frame_id;
    }
}

fn add_self_time(times: &mut TimeByCategory, category: &'static str, event: &Event) {
    if event.self_time != 0.0 {
        *times.entry(category).or_default() += event.self_time;
    }
}

/// Integer prefix of a decimal or `0x` hexadecimal id.
fn parse_int(id: &str) -> Option<i64> {
    let id = id.trim();
    if let Some(hex) = id.strip_prefix("0x").or_else(|| id.strip_prefix("0X")) {
        let digits: String = hex.chars().take_while(char::is_ascii_hexdigit).collect();
        return i64::from_str_radix(&digits, 16).ok();
    }
    let digits: String = id
        .char_indices()
        .take_while(|(i, c)| c.is_ascii_digit() || (*i == 0 && *c == '-'))
        .map(|(_, c)| c)
        .collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrome_trace_format::TraceRecord;
    use rstest::rstest;
    use serde_json::json;
    use std::sync::Arc;

    use crate::tracing_model::Categories;

    fn compositor(name: &str, ts_ms: f64, args: Value) -> TraceRecord {
        TraceRecord::builder()
            .name(name)
            .cat("disabled-by-default-devtools.timeline.frame")
            .ph(Phase::Instant)
            .pid(1)
            .tid(2)
            .ts(ts_ms * 1000.0)
            .args(args)
            .build()
    }

    fn segment(records: Vec<TraceRecord>) -> FrameModel {
        let mut model = TracingModel::new();
        model.add_records(records);
        model.tracing_complete();
        let events = model.thread(ThreadKey::new(1, 2)).unwrap().events().to_vec();
        let mut frames = FrameModel::default();
        frames.add_trace_events(&model, &TimelineDataTable::default(), &events, &[]);
        frames
    }

    #[test]
    fn idle_period_splits_frames() {
        let tree = json!({"layerTreeId": 1});
        let frames = segment(vec![
            compositor(rt::SET_LAYER_TREE_ID, 1.0, json!({"data": {"layerTreeId": 1}})),
            compositor(rt::BEGIN_FRAME, 10.0, tree.clone()),
            compositor(rt::DRAW_FRAME, 20.0, tree.clone()),
            compositor(rt::DRAW_FRAME, 36.0, tree.clone()),
            compositor(
                rt::NEEDS_BEGIN_FRAME_CHANGED,
                40.0,
                json!({"layerTreeId": 1, "data": {"needsBeginFrame": 1}}),
            ),
            compositor(rt::BEGIN_FRAME, 50.0, tree.clone()),
            compositor(rt::DRAW_FRAME, 60.0, tree),
        ]);
        let spans: Vec<(f64, f64, bool)> = frames
            .frames()
            .iter()
            .map(|f| (f.start_time, f.end_time, f.idle))
            .collect();
        assert_eq!(
            spans,
            vec![
                (10.0, 20.0, false),
                (20.0, 36.0, false),
                (36.0, 50.0, true),
                (50.0, 60.0, false)
            ]
        );
        assert_eq!(frames.frames()[1].start_time_offset, 19.0);
        assert_eq!(frames.frames_in(25.0, 55.0).len(), 3);
        assert_eq!(frames.frames_in(0.0, 5.0).len(), 0);
    }

    fn main_thread(name: &str, ts_ms: f64, dur_ms: f64, args: Value) -> TraceRecord {
        TraceRecord::builder()
            .name(name)
            .cat("disabled-by-default-devtools.timeline")
            .ph(Phase::Complete)
            .pid(1)
            .tid(1)
            .ts(ts_ms * 1000.0)
            .dur(dur_ms * 1000.0)
            .args(args)
            .build()
    }

    #[test]
    fn committed_main_frame_work_lands_in_the_activated_frame() {
        let tree = json!({"layerTreeId": 1});
        let mut model = TracingModel::new();
        model.add_records(vec![
            compositor(rt::SET_LAYER_TREE_ID, 1.0, json!({"data": {"layerTreeId": 1}})),
            compositor(rt::BEGIN_FRAME, 10.0, tree.clone()),
            main_thread(rt::TASK, 11.0, 5.0, json!({})),
            main_thread(rt::BEGIN_MAIN_THREAD_FRAME, 11.5, 0.5, json!({"data": {"frameId": 42}})),
            main_thread(rt::LAYOUT, 12.0, 2.0, json!({})),
            main_thread(rt::PAINT, 14.0, 0.5, json!({"data": {"layerId": 5}})),
            main_thread(rt::COMPOSITE_LAYERS, 15.0, 0.5, json!({"layerTreeId": 1})),
            compositor(rt::ACTIVATE_LAYER_TREE, 17.0, tree.clone()),
            compositor(rt::DRAW_FRAME, 20.0, tree.clone()),
            compositor(rt::BEGIN_FRAME, 30.0, tree.clone()),
            compositor(rt::DRAW_FRAME, 40.0, tree),
            TraceRecord::builder()
                .name(rt::PICTURE_SNAPSHOT)
                .ph(Phase::Instant)
                .pid(1)
                .tid(3)
                .ts(14_200.0)
                .build(),
        ]);
        model.tracing_complete();

        let main = ThreadKey::new(1, 1);
        let main_events = model.thread(main).unwrap().events().to_vec();
        for &id in &main_events {
            let event = model.event_mut(id);
            event.self_time = if event.name == rt::TASK {
                1.5
            } else {
                event.duration.unwrap_or(0.0)
            };
        }
        let paint = main_events[3];
        let picture = model.thread(ThreadKey::new(1, 3)).unwrap().events()[0];
        let mut data = TimelineDataTable::default();
        data.for_event(paint).picture = Some(picture);

        let mut events: Vec<EventId> = main_events
            .iter()
            .chain(model.thread(ThreadKey::new(1, 2)).unwrap().events())
            .copied()
            .collect();
        events.sort_by(|a, b| Event::compare_start_time(model.event(*a), model.event(*b)));
        let mut frames = FrameModel::default();
        frames.add_trace_events(&model, &data, &events, &[(main, 0.0)]);

        let spans: Vec<(f64, f64)> = frames.frames().iter().map(|f| (f.start_time, f.end_time)).collect();
        assert_eq!(spans, vec![(10.0, 20.0), (20.0, 40.0)]);

        let frame = &frames.frames()[0];
        assert!(!frame.idle);
        assert_eq!(frame.main_frame_id, Some(42));
        assert_eq!(
            frame.time_by_category,
            TimeByCategory::from([("other", 2.0), ("painting", 1.0), ("rendering", 2.0)])
        );
        assert_eq!(frame.cpu_time, 5.0);
        assert_eq!(
            frame.paints,
            vec![LayerPaintEvent {
                event: paint,
                layer_id: "5".to_string(),
                picture,
            }]
        );
        assert_eq!(frames.frame_by_main_frame_id(42).map(|f| f.start_time), Some(10.0));
        assert!(frames.frames()[1].time_by_category.is_empty());
    }

    #[test]
    fn other_layer_trees_are_ignored() {
        let frames = segment(vec![
            compositor(rt::SET_LAYER_TREE_ID, 1.0, json!({"layerTreeId": 7})),
            compositor(rt::BEGIN_FRAME, 10.0, json!({"layerTreeId": 3})),
            compositor(rt::DRAW_FRAME, 20.0, json!({"layerTreeId": 3})),
        ]);
        assert!(frames.frames().is_empty());
    }

    #[rstest]
    #[case("", rt::LAYOUT, "rendering")]
    #[case("", rt::FUNCTION_CALL, "scripting")]
    #[case("", rt::PAINT, "painting")]
    #[case("", rt::PARSE_HTML, "loading")]
    #[case("", rt::GPU_TASK, "gpu")]
    #[case("blink.user_timing", "mark", "scripting")]
    #[case("", "SomethingElse", "other")]
    fn default_categories(#[case] cat: &str, #[case] name: &str, #[case] expected: &str) {
        let event = Event::new(
            Arc::new(Categories::parse(cat)),
            name,
            Phase::Complete,
            0.0,
            ThreadKey::new(1, 1),
        );
        assert_eq!(DefaultCategoryMapper.category(&event), expected);
    }

    #[rstest]
    #[case("12", Some(12))]
    #[case("0x1f", Some(31))]
    #[case("7abc", Some(7))]
    #[case("xyz", None)]
    fn parses_snapshot_ids(#[case] id: &str, #[case] expected: Option<i64>) {
        assert_eq!(parse_int(id), expected);
    }
}
