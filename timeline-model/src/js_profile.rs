//! Synthetic trace events derived from CPU profiles.
//!
//! Profiles become `JSSample` instants, samples become `JSFrame` complete
//! events, and a standalone `.cpuprofile` becomes a small synthetic trace the
//! normal pipeline can ingest.

use std::collections::HashMap;
use std::sync::Arc;

use chrome_trace_format::{Phase, Profile, TraceRecord};
use serde_json::{json, Value};

use crate::cpu_profile::{CpuProfileModel, CpuProfileNode, IDLE_FUNCTION_NAME, PROGRAM_FUNCTION_NAME};
use crate::event_walk::{for_each_event, EventVisitor};
use crate::record_type::{self, category, devtools_metadata};
use crate::settings::JsFrameOptions;
use crate::tracing_model::{Categories, Event, EventId, ThreadKey, TracingModel};

const NATIVE_RUNTIME_URL: &str = "native V8Runtime";

static NO_DATA: Value = Value::Null;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeGroup {
    Compile,
    Parse,
}

pub fn native_group(name: &str) -> Option<NativeGroup> {
    if name.starts_with("Parse") {
        Some(NativeGroup::Parse)
    } else if name.starts_with("Compile") || name.starts_with("Recompile") {
        Some(NativeGroup::Compile)
    } else {
        None
    }
}

pub fn is_native_runtime_frame(frame: &Value) -> bool {
    frame.get("url").and_then(Value::as_str) == Some(NATIVE_RUNTIME_URL)
}

fn call_frame_value(node: &CpuProfileNode) -> Value {
    json!({
        "functionName": node.function_name(),
        "scriptId": node.script_id(),
        "url": node.url(),
        "lineNumber": node.line_number(),
        "columnNumber": node.column_number(),
    })
}

/// One `JSSample` instant per profile sample, carrying the sampled stack leaf
/// first. GC and idle samples are skipped; program samples get an empty stack.
pub fn generate_js_samples(
    profile: &CpuProfileModel,
    thread: ThreadKey,
    categories: Arc<Categories>,
) -> Vec<Event> {
    let Some(samples) = profile.samples.as_ref() else {
        return Vec::new();
    };
    let mut stacks: HashMap<usize, Value> = HashMap::new();
    if let Some(program) = profile.program_node {
        stacks.insert(program, Value::Array(Vec::new()));
    }
    let mut events = Vec::with_capacity(samples.len());
    for (index, sample) in samples.iter().enumerate() {
        let Some(node) = profile.node_by_index(index) else {
            tracing::warn!(node = sample, index, "sample refers to an unknown node");
            continue;
        };
        if Some(node.id) == profile.gc_node || Some(node.id) == profile.idle_node {
            continue;
        }
        let Some(timestamp) = profile.timestamps.get(index).copied() else {
            continue;
        };
        let stack = stacks
            .entry(node.id)
            .or_insert_with(|| {
                let mut frames = Vec::new();
                let mut current = Some(node);
                while let Some(frame) = current.filter(|n| n.parent.is_some()) {
                    frames.push(call_frame_value(frame));
                    current = frame.parent.and_then(|parent| profile.node(parent));
                }
                Value::Array(frames)
            })
            .clone();
        let mut event = Event::new(
            Arc::clone(&categories),
            record_type::JS_SAMPLE,
            Phase::Instant,
            timestamp,
            thread,
        );
        event
            .args
            .insert("data".to_string(), json!({ "stackTrace": stack }));
        events.push(event);
    }
    events
}

/// Rebuilds `JSFrame` complete events from the `JSSample` instants and JS
/// invocation events of one thread's merged, ordered event list.
pub fn generate_js_frame_events(
    model: &TracingModel,
    events: &[EventId],
    categories: Arc<Categories>,
    options: JsFrameOptions,
) -> Vec<Event> {
    let start_time = events
        .iter()
        .map(|id| model.event(*id))
        .find(|event| event.is_top_level())
        .map_or(0.0, |event| event.start_time);
    let mut builder = JsFrameBuilder {
        categories,
        options,
        frames: Vec::new(),
        stack: Vec::new(),
        locked_depth: Vec::new(),
        ordinal: 0,
    };
    for_each_event(model, events, &mut builder, start_time, None);
    builder.frames
}

fn is_js_invocation_event(event: &Event) -> bool {
    matches!(
        event.name.as_str(),
        record_type::RUN_MICROTASKS
            | record_type::FUNCTION_CALL
            | record_type::EVALUATE_SCRIPT
            | record_type::EVALUATE_MODULE
            | record_type::EVENT_DISPATCH
            | record_type::V8_EXECUTE
    )
}

fn equal_frames(a: &Value, b: &Value) -> bool {
    ["scriptId", "functionName", "lineNumber"]
        .iter()
        .all(|key| a.get(key) == b.get(key))
}

struct JsFrameBuilder {
    categories: Arc<Categories>,
    options: JsFrameOptions,
    frames: Vec<Event>,
    /// Open frames, as indices into `frames`.
    stack: Vec<usize>,
    /// Stack depth an enclosing event pins while it is open.
    locked_depth: Vec<usize>,
    ordinal: usize,
}

impl JsFrameBuilder {
    fn frame_data(&self, index: usize) -> &Value {
        self.frames[self.stack[index]]
            .args
            .get("data")
            .unwrap_or(&NO_DATA)
    }

    fn extract_stack_trace(&mut self, event: &Event) {
        let mut call_frames: Vec<Value> = if event.name == record_type::JS_SAMPLE {
            event
                .data()
                .stack_trace()
                .map(|stack| stack.iter().rev().cloned().collect())
                .unwrap_or_default()
        } else {
            (0..self.stack.len())
                .map(|i| self.frame_data(i).clone())
                .collect()
        };
        filter_stack_frames(&mut call_frames, self.options);

        let end_time = event.end_or_start();
        let min_frames = call_frames.len().min(self.stack.len());
        let mut i = self.locked_depth.last().copied().unwrap_or(0);
        while i < min_frames {
            if !equal_frames(&call_frames[i], self.frame_data(i)) {
                break;
            }
            let frame = &mut self.frames[self.stack[i]];
            let extended = frame.end_or_start().max(end_time);
            frame.set_end_time(extended);
            i += 1;
        }
        self.truncate_stack(i, event.start_time);
        for frame_data in call_frames.into_iter().skip(i) {
            let mut frame = Event::new(
                Arc::clone(&self.categories),
                record_type::JS_FRAME,
                Phase::Complete,
                event.start_time,
                event.thread,
            );
            frame.ordinal = self.ordinal;
            frame.args.insert("data".to_string(), frame_data);
            frame.set_end_time(end_time);
            self.stack.push(self.frames.len());
            self.frames.push(frame);
        }
    }

    fn truncate_stack(&mut self, mut depth: usize, time: f64) {
        if let Some(&locked) = self.locked_depth.last() {
            if depth < locked {
                tracing::warn!(depth, locked, time, "child stack is shallower than the parent stack");
                depth = locked;
            }
        }
        if self.stack.len() < depth {
            tracing::warn!(depth, size = self.stack.len(), time, "truncating above the current stack size");
            depth = self.stack.len();
        }
        for index in &self.stack {
            self.frames[*index].set_end_time(time);
        }
        self.stack.truncate(depth);
    }
}

impl EventVisitor for JsFrameBuilder {
    fn on_start(&mut self, _id: EventId, event: &Event) {
        self.ordinal += 1;
        self.extract_stack_trace(event);
        // The stack may not shrink below this depth while the event is open.
        self.locked_depth.push(self.stack.len());
    }

    fn on_end(&mut self, _id: EventId, event: &Event) {
        let depth = self.locked_depth.pop().unwrap_or(0);
        self.truncate_stack(depth, event.end_or_start());
    }

    fn on_instant(&mut self, _id: EventId, event: &Event, parent: Option<&Event>) {
        self.ordinal += 1;
        if parent.is_some_and(is_js_invocation_event) {
            self.extract_stack_trace(event);
        }
    }
}

/// Drops native frames per `options` and collapses adjacent runtime frames of
/// the same group.
pub fn filter_stack_frames(stack: &mut Vec<Value>, options: JsFrameOptions) {
    if options.show_all_events {
        return;
    }
    let mut previous_group: Option<NativeGroup> = None;
    stack.retain(|frame| {
        let url = frame.get("url").and_then(Value::as_str).unwrap_or("");
        if !options.show_native_functions && url.starts_with("native ") {
            return false;
        }
        let name = frame.get("functionName").and_then(Value::as_str).unwrap_or("");
        let is_runtime = is_native_runtime_frame(frame);
        let group = if is_runtime { native_group(name) } else { None };
        if is_runtime && !(options.show_runtime_call_stats && group.is_some()) {
            return false;
        }
        if previous_group.is_some() && previous_group == group {
            return false;
        }
        previous_group = group;
        true
    });
}

/// Turns a standalone CPU profile into trace records: thread naming metadata,
/// one top-level task per busy run of samples with a `FunctionCall` per run
/// of JS samples, and a trailing `CpuProfile` event carrying the profile.
pub fn build_trace_from_cpu_profile(
    profile: &Profile,
    tid: u32,
    inject_page_event: bool,
    name: Option<&str>,
) -> Vec<TraceRecord> {
    let mut trace = SyntheticTrace {
        tid,
        records: Vec::new(),
    };
    if inject_page_event {
        trace.append(
            devtools_metadata::TRACING_STARTED_IN_PAGE,
            json!({"data": {"sessionId": "1"}}),
            0.0,
            Phase::Metadata,
            category::DEVTOOLS_TIMELINE,
        );
    }
    let thread_name = name.map_or_else(|| format!("Thread {tid}"), str::to_string);
    trace.append(
        "thread_name",
        json!({ "name": thread_name }),
        0.0,
        Phase::Metadata,
        "__metadata",
    );

    if let Some(nodes) = profile.nodes.as_ref() {
        let names: HashMap<u32, &str> = nodes
            .iter()
            .map(|node| {
                let name = node
                    .call_frame
                    .as_ref()
                    .map_or(node.function_name.as_str(), |frame| frame.function_name.as_str());
                (node.id, name)
            })
            .collect();
        let samples = profile.samples.as_deref().unwrap_or_default();
        let deltas = profile.time_deltas.as_deref().unwrap_or_default();

        let mut task: Option<usize> = None;
        let mut function: Option<usize> = None;
        let mut next_time = profile.start_time;
        let mut current_time = next_time;
        for (i, sample) in samples.iter().enumerate() {
            current_time = next_time;
            next_time += deltas.get(i).copied().unwrap_or(0.0);
            let Some(name) = names.get(sample).copied() else {
                tracing::warn!(node = sample, index = i, "sample refers to an unknown node");
                continue;
            };
            if name == IDLE_FUNCTION_NAME {
                trace.close(&mut task, current_time);
                trace.close(&mut function, current_time);
                continue;
            }
            if task.is_none() {
                task = Some(trace.append(
                    record_type::MESSAGE_LOOP_RUN_TASK,
                    json!({}),
                    current_time,
                    Phase::Complete,
                    category::LEGACY_TOP_LEVEL,
                ));
            }
            if name == PROGRAM_FUNCTION_NAME {
                trace.close(&mut function, current_time);
            } else if function.is_none() {
                function = Some(trace.append(
                    record_type::FUNCTION_CALL,
                    json!({"data": {"sessionId": "1"}}),
                    current_time,
                    Phase::Complete,
                    category::DEVTOOLS_TIMELINE,
                ));
            }
        }
        trace.close(&mut task, current_time);
        trace.close(&mut function, current_time);
    }

    let payload = match serde_json::to_value(profile) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(error = %e, "failed to embed cpu profile");
            Value::Null
        }
    };
    trace.append(
        record_type::CPU_PROFILE,
        json!({"data": {"cpuProfile": payload}}),
        profile.end_time,
        Phase::InstantDeprecated,
        category::DEVTOOLS_TIMELINE,
    );
    trace.records
}

struct SyntheticTrace {
    tid: u32,
    records: Vec<TraceRecord>,
}

impl SyntheticTrace {
    fn append(&mut self, name: &str, args: Value, ts: f64, ph: Phase, cat: &str) -> usize {
        self.records.push(
            TraceRecord::builder()
                .cat(cat)
                .name(name)
                .ph(ph)
                .pid(1)
                .tid(self.tid)
                .ts(ts)
                .args(args)
                .build(),
        );
        self.records.len() - 1
    }

    fn close(&mut self, open: &mut Option<usize>, time: f64) {
        if let Some(index) = open.take() {
            let record = &mut self.records[index];
            record.dur = Some(time - record.ts);
        }
    }
}
