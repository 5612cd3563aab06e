//! Ingestion of raw trace records into a process, thread and event hierarchy.
//!
//! Events are owned by an arena inside [`TracingModel`] and addressed by
//! [`EventId`]. Threads hold ordered id lists; events point back at their
//! thread through a [`ThreadKey`].
//!
//! Ingestion is two-phase: [`TracingModel::add_record`] for every record, then
//! a single [`TracingModel::tracing_complete`] that resolves async state
//! machines, sorts thread event lists and pairs begin/end records.

mod event;
mod snapshot;
mod thread;

use std::collections::HashMap;
use std::sync::Arc;

use chrome_trace_format::{MetadataName, Phase, TraceFile, TraceRecord};
use serde_json::Value;

pub use event::{is_truthy, value_key, Categories, Event, EventData, EventId, EventKind, ThreadKey};
pub use snapshot::{ObjectSnapshot, SnapshotResolver};
pub use thread::{Process, Thread};

use crate::js_profile;
use crate::record_type::{category, devtools_metadata, thread_name};

#[derive(Debug, Default)]
pub struct TracingModel {
    events: Vec<Event>,
    processes: Vec<Process>,
    process_index: HashMap<u32, usize>,
    process_by_name: HashMap<String, u32>,
    minimum_record_time: f64,
    maximum_record_time: f64,
    devtools_metadata_events: Vec<EventId>,
    async_events: Vec<EventId>,
    open_async_events: HashMap<String, EventId>,
    open_nestable_async_events: HashMap<String, Vec<EventId>>,
    profile_groups: HashMap<String, Vec<EventId>>,
    categories: HashMap<String, Arc<Categories>>,
    complete: bool,
    classified: bool,
}

impl TracingModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a finished model from a trace file in any container shape.
    pub fn from_trace_file(file: TraceFile) -> Self {
        let mut model = Self::new();
        model.add_trace_file(file);
        model.tracing_complete();
        model
    }

    /// Adds every record of `file`. Malformed records are logged and skipped;
    /// a bare CPU profile is expanded into an equivalent synthetic trace.
    pub fn add_trace_file(&mut self, file: TraceFile) {
        match file {
            TraceFile::CpuProfile(profile) => {
                let records = js_profile::build_trace_from_cpu_profile(&profile, 1, true, None);
                self.add_records(records);
            }
            other => {
                let mut skipped = 0usize;
                for record in other.into_records() {
                    match record {
                        Ok(record) => self.add_record(record),
                        Err(e) => {
                            skipped += 1;
                            tracing::warn!(error = %e, "skipping malformed trace record");
                        }
                    }
                }
                if skipped > 0 {
                    tracing::info!(skipped, "malformed records dropped");
                }
            }
        }
    }

    pub fn add_records<I: IntoIterator<Item = TraceRecord>>(&mut self, records: I) {
        for record in records {
            self.add_record(record);
        }
    }

    pub fn add_record(&mut self, record: TraceRecord) {
        if self.complete {
            tracing::warn!(name = %record.name, "record added after tracing completed, ignoring");
            return;
        }

        let timestamp = record.ts / 1000.0;
        // Records of unrelated threads may arrive out of order.
        if timestamp != 0.0
            && (self.minimum_record_time == 0.0 || timestamp < self.minimum_record_time)
            && record.ph.starts_work()
        {
            self.minimum_record_time = timestamp;
        }
        let end_timestamp = (record.ts + record.dur.unwrap_or(0.0)) / 1000.0;
        self.maximum_record_time = self.maximum_record_time.max(end_timestamp);

        let thread_key = ThreadKey::new(record.pid, record.tid);
        let event = self.event_from_record(&record, thread_key);

        let last_top_level = self
            .process_mut(record.pid)
            .thread_mut(record.tid)
            .last_top_level;
        if event.is_top_level() {
            if let Some(last) = last_top_level {
                if self.events[last.index()]
                    .end_time
                    .is_some_and(|end| end > event.start_time)
                {
                    tracing::debug!(
                        name = %event.name,
                        ts = event.start_time,
                        "discarding nested top-level event"
                    );
                    return;
                }
            }
        }

        let id = EventId(self.events.len() as u32);
        let is_top_level = event.is_top_level();
        let is_metadata_category = event.has_category(category::DEVTOOLS_METADATA);
        self.events.push(event);
        let thread = self.process_mut(record.pid).thread_mut(record.tid);
        if is_top_level {
            thread.last_top_level = Some(id);
        }
        thread.events.push(id);

        if record.ph == Phase::Sample {
            let key = self.profile_group_key(id);
            self.profile_groups.entry(key).or_default().push(id);
            return;
        }

        // Async events are resolved once every record is in, so they can be
        // processed in chronological order.
        if record.ph.is_async() {
            self.async_events.push(id);
        }
        if is_metadata_category {
            self.devtools_metadata_events.push(id);
        }
        if record.ph == Phase::Metadata {
            self.apply_metadata(&record);
        }
    }

    fn event_from_record(&mut self, record: &TraceRecord, thread: ThreadKey) -> Event {
        let categories = self.categories_for(&record.cat);
        let mut event = Event::new(
            categories,
            record.name.clone(),
            record.ph,
            record.ts / 1000.0,
            thread,
        );
        event.id = extract_id(record);

        if record.ph == Phase::ObjectSnapshot {
            event.kind = EventKind::Snapshot(ObjectSnapshot::new());
            match record.args_object() {
                Some(args) if args.get("snapshot").is_some_and(is_truthy) => event.add_args(args),
                _ => tracing::warn!(
                    name = %record.name,
                    ts = record.ts / 1000.0,
                    "missing mandatory 'snapshot' argument"
                ),
            }
            return event;
        }

        if let Some(args) = record.args_object() {
            event.add_args(args);
        }
        if let Some(dur) = record.dur {
            event.set_end_time((record.ts + dur) / 1000.0);
        }
        event.bind_id = record.bind_id.as_ref().map(ToString::to_string);
        event
    }

    fn apply_metadata(&mut self, record: &TraceRecord) {
        let Some(kind) = MetadataName::parse(&record.name) else {
            return;
        };
        let args = record.args_object();
        let arg_name = args
            .and_then(|a| a.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("");
        let sort_index = args
            .and_then(|a| a.get("sort_index"))
            .and_then(Value::as_f64)
            .unwrap_or(0.0) as i64;
        match kind {
            MetadataName::ProcessSortIndex => self.process_mut(record.pid).set_sort_index(sort_index),
            MetadataName::ProcessName => {
                self.process_mut(record.pid).set_name(arg_name);
                self.process_by_name.insert(arg_name.to_string(), record.pid);
            }
            MetadataName::ThreadSortIndex => self
                .process_mut(record.pid)
                .thread_mut(record.tid)
                .set_sort_index(sort_index),
            MetadataName::ThreadName => self
                .process_mut(record.pid)
                .set_thread_name(record.tid, arg_name),
            _ => {}
        }
    }

    fn categories_for(&mut self, raw: &str) -> Arc<Categories> {
        if let Some(parsed) = self.categories.get(raw) {
            return Arc::clone(parsed);
        }
        let parsed = Arc::new(Categories::parse(raw));
        self.categories.insert(raw.to_string(), Arc::clone(&parsed));
        parsed
    }

    /// Shared category set for `raw`, parsed once per distinct string.
    pub fn categories(&mut self, raw: &str) -> Arc<Categories> {
        self.categories_for(raw)
    }

    fn process_mut(&mut self, pid: u32) -> &mut Process {
        let index = match self.process_index.get(&pid) {
            Some(index) => *index,
            None => {
                self.processes.push(Process::new(pid));
                self.process_index.insert(pid, self.processes.len() - 1);
                self.processes.len() - 1
            }
        };
        &mut self.processes[index]
    }

    fn profile_group_key(&self, id: EventId) -> String {
        let event = &self.events[id.index()];
        format!("{}:{}", event.thread.pid, event.id.as_deref().unwrap_or(""))
    }

    /// Sample-phase events sharing the process and id of `id`, in arrival order.
    pub fn profile_group(&self, id: EventId) -> Option<&[EventId]> {
        self.profile_groups
            .get(&self.profile_group_key(id))
            .map(Vec::as_slice)
    }

    /// Resolves async events and finalizes every thread. Runs once.
    pub fn tracing_complete(&mut self) {
        if self.complete {
            return;
        }
        self.process_pending_async_events();
        let max = self.maximum_record_time;
        for process in self.processes.iter_mut() {
            for thread in process.threads_mut() {
                complete_thread(&mut self.events, thread, max);
            }
        }
        self.complete = true;
        tracing::debug!(
            events = self.events.len(),
            processes = self.processes.len(),
            "tracing complete"
        );
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    fn process_pending_async_events(&mut self) {
        let mut pending = std::mem::take(&mut self.async_events);
        let events = &self.events;
        pending.sort_by(|a, b| Event::compare_start_time(&events[a.index()], &events[b.index()]));
        for id in pending {
            if self.events[id.index()].phase.is_nestable_async() {
                self.add_nestable_async_event(id);
            } else {
                self.add_async_event(id);
            }
        }
        self.close_open_async_events();
    }

    fn add_nestable_async_event(&mut self, id: EventId) {
        let event = &self.events[id.index()];
        let key = format!(
            "{}.{}",
            event.categories_string(),
            event.id.as_deref().unwrap_or("")
        );
        match event.phase {
            Phase::NestableAsyncBegin => {
                let async_id = self.begin_async_event(id);
                self.open_nestable_async_events
                    .entry(key)
                    .or_default()
                    .push(async_id);
            }
            Phase::NestableAsyncInstant => {
                let top = self
                    .open_nestable_async_events
                    .get(&key)
                    .and_then(|stack| stack.last().copied());
                if let Some(top) = top {
                    self.add_async_step(top, id);
                }
            }
            Phase::NestableAsyncEnd => {
                let Some(top) = self
                    .open_nestable_async_events
                    .get_mut(&key)
                    .and_then(Vec::pop)
                else {
                    return;
                };
                let top_name = &self.events[top.index()].name;
                let end_name = &self.events[id.index()].name;
                if top_name != end_name {
                    tracing::warn!(
                        begin = %top_name,
                        end = %end_name,
                        key = %key,
                        "begin/end event mismatch for nestable async event"
                    );
                    return;
                }
                self.add_async_step(top, id);
            }
            _ => {}
        }
    }

    fn add_async_event(&mut self, id: EventId) {
        let event = &self.events[id.index()];
        let key = format!(
            "{}.{}.{}",
            event.categories_string(),
            event.name,
            event.id.as_deref().unwrap_or("")
        );
        let phase = event.phase;
        let open = self.open_async_events.get(&key).copied();

        if phase == Phase::AsyncBegin {
            if open.is_some() {
                tracing::warn!(name = %event.name, ts = event.start_time, "async event has already been started");
                return;
            }
            let async_id = self.begin_async_event(id);
            self.open_async_events.insert(key, async_id);
            return;
        }
        // Stray steps started before the capture window.
        let Some(async_id) = open else {
            return;
        };
        match phase {
            Phase::AsyncEnd => {
                self.add_async_step(async_id, id);
                self.open_async_events.remove(&key);
            }
            Phase::AsyncStepInto | Phase::AsyncStepPast => {
                let last_step = self.events[async_id.index()].steps().last().copied();
                if let Some(last_step) = last_step {
                    let last = &self.events[last_step.index()];
                    if last.phase != Phase::AsyncBegin && last.phase != phase {
                        tracing::warn!(
                            last = %last.phase,
                            last_ts = last.start_time,
                            step = %phase,
                            step_ts = self.events[id.index()].start_time,
                            "async event step phase mismatch"
                        );
                    }
                }
                self.add_async_step(async_id, id);
            }
            _ => tracing::warn!(phase = %phase, "invalid async event phase"),
        }
    }

    /// Creates the async event for `begin` and attaches it to the thread.
    fn begin_async_event(&mut self, begin: EventId) -> EventId {
        let source = &self.events[begin.index()];
        let mut event = Event::new(
            Arc::clone(source.categories()),
            source.name.clone(),
            source.phase,
            source.start_time,
            source.thread,
        );
        event.args = source.args.clone();
        event.id = source.id.clone();
        event.kind = EventKind::Async { steps: vec![begin] };
        let thread = source.thread;
        let id = self.alloc_event(event);
        self.process_mut(thread.pid)
            .thread_mut(thread.tid)
            .async_events
            .push(id);
        id
    }

    fn add_async_step(&mut self, async_id: EventId, step: EventId) {
        let step_event = &self.events[step.index()];
        let step_phase = step_event.phase;
        let step_start = step_event.start_time;
        let first = {
            let EventKind::Async { steps } = &mut self.events[async_id.index()].kind else {
                return;
            };
            steps.push(step);
            steps[0]
        };
        if step_phase.is_async_end() {
            self.events[async_id.index()].set_end_time(step_start);
            // Keeps the async and sync representations interchangeable.
            self.events[first.index()].set_end_time(step_start);
        }
    }

    fn close_open_async_events(&mut self) {
        let max = self.maximum_record_time;
        for (_, id) in std::mem::take(&mut self.open_async_events) {
            self.events[id.index()].set_end_time(max);
            if let Some(first) = self.events[id.index()].steps().first().copied() {
                self.events[first.index()].set_end_time(max);
            }
        }
        for (_, stack) in std::mem::take(&mut self.open_nestable_async_events) {
            for id in stack.into_iter().rev() {
                self.events[id.index()].set_end_time(max);
            }
        }
    }

    /// Adds an event that did not come from the trace, such as events
    /// synthesized from a CPU profile. It is not attached to any thread.
    pub fn alloc_event(&mut self, event: Event) -> EventId {
        let id = EventId(self.events.len() as u32);
        self.events.push(event);
        id
    }

    pub fn event(&self, id: EventId) -> &Event {
        &self.events[id.index()]
    }

    pub fn event_mut(&mut self, id: EventId) -> &mut Event {
        &mut self.events[id.index()]
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn minimum_record_time(&self) -> f64 {
        self.minimum_record_time
    }

    pub fn maximum_record_time(&self) -> f64 {
        self.maximum_record_time
    }

    pub fn devtools_metadata_events(&self) -> &[EventId] {
        &self.devtools_metadata_events
    }

    /// Shifts every event and the record time bounds by `offset` ms.
    pub fn adjust_time(&mut self, offset: f64) {
        self.minimum_record_time += offset;
        self.maximum_record_time += offset;
        for process in &self.processes {
            for thread in process.threads() {
                for id in thread.events.iter().chain(thread.async_events.iter()) {
                    let event = &mut self.events[id.index()];
                    event.start_time += offset;
                    if let Some(end) = event.end_time.as_mut() {
                        *end += offset;
                    }
                }
            }
        }
    }

    /// Processes ordered by sort index, then name.
    pub fn sorted_processes(&self) -> Vec<&Process> {
        let mut processes: Vec<&Process> = self.processes.iter().collect();
        processes.sort_by(|a, b| Process::compare(a, b));
        processes
    }

    pub fn process_by_id(&self, pid: u32) -> Option<&Process> {
        self.process_index.get(&pid).map(|index| &self.processes[*index])
    }

    pub fn process_by_name(&self, name: &str) -> Option<&Process> {
        self.process_by_name
            .get(name)
            .and_then(|pid| self.process_by_id(*pid))
    }

    pub fn thread_by_name(&self, process_name: &str, thread_name: &str) -> Option<&Thread> {
        self.process_by_name(process_name)?.thread_by_name(thread_name)
    }

    pub fn thread(&self, key: ThreadKey) -> Option<&Thread> {
        self.process_by_id(key.pid)?.thread(key.tid)
    }

    pub fn thread_name(&self, key: ThreadKey) -> &str {
        self.thread(key).map_or("", Thread::name)
    }

    /// Finds the browser's main thread: the single `CrBrowserMain` thread,
    /// else the main thread of the single browser process, else the thread
    /// that emitted the single `TracingStartedInBrowser` event.
    pub fn browser_main_thread(&self) -> Option<ThreadKey> {
        let processes = self.sorted_processes();
        if processes.is_empty() {
            return None;
        }
        let mut browser_processes = Vec::new();
        let mut browser_main_threads = Vec::new();
        for process in &processes {
            if process.name().to_lowercase().ends_with("browser") {
                browser_processes.push(*process);
            }
            browser_main_threads.extend(
                process
                    .sorted_threads()
                    .into_iter()
                    .filter(|t| t.name() == thread_name::BROWSER_MAIN),
            );
        }
        if browser_main_threads.len() == 1 {
            return Some(browser_main_threads[0].key());
        }
        if browser_processes.len() == 1 {
            return browser_processes[0]
                .thread_by_name(thread_name::BROWSER_MAIN)
                .map(Thread::key);
        }
        let started: Vec<_> = self
            .devtools_metadata_events
            .iter()
            .filter(|id| self.event(**id).name == devtools_metadata::TRACING_STARTED_IN_BROWSER)
            .collect();
        if started.len() == 1 {
            return Some(self.event(*started[0]).thread);
        }
        tracing::warn!("failed to find browser main thread in trace, some timeline features may be unavailable");
        None
    }

    /// Marks the events as classified by a timeline pass. Returns false when
    /// that already happened.
    pub(crate) fn mark_classified(&mut self) -> bool {
        !std::mem::replace(&mut self.classified, true)
    }
}

/// Sorts a thread, pairs its begin/end records and drops the end records.
fn complete_thread(events: &mut [Event], thread: &mut Thread, maximum_record_time: f64) {
    thread
        .async_events
        .sort_by(|a, b| Event::compare_start_time(&events[a.index()], &events[b.index()]));
    thread
        .events
        .sort_by(|a, b| Event::compare_start_time(&events[a.index()], &events[b.index()]));

    let mut stack: Vec<EventId> = Vec::new();
    let mut kept = Vec::with_capacity(thread.events.len());
    for (ordinal, id) in thread.events.iter().copied().enumerate() {
        events[id.index()].ordinal = ordinal;
        match events[id.index()].phase {
            Phase::DurationEnd => {
                // Unbalanced ends are legitimate when the begin predates the capture.
                let Some(top) = stack.pop() else {
                    continue;
                };
                let (begin, end) = (&events[top.index()], &events[id.index()]);
                if begin.name != end.name || begin.categories_string() != end.categories_string() {
                    tracing::warn!(
                        begin = %begin.name,
                        begin_ts = begin.start_time,
                        end = %end.name,
                        end_ts = end.start_time,
                        "begin/end events mismatch"
                    );
                } else {
                    let args = end.args.clone();
                    let end_time = end.start_time;
                    let begin = &mut events[top.index()];
                    begin.add_args(&args);
                    begin.set_end_time(end_time);
                }
                continue;
            }
            Phase::DurationBegin => stack.push(id),
            _ => {}
        }
        kept.push(id);
    }
    while let Some(open) = stack.pop() {
        events[open.index()].set_end_time(maximum_record_time);
    }
    thread.events = kept;
}

/// Correlation id of a record, folding in `scope` and `id2`.
pub fn extract_id(record: &TraceRecord) -> Option<String> {
    let scope = record.scope.as_deref().unwrap_or("");
    let Some(id2) = record.id2.as_ref() else {
        return record.id.as_ref().map(|id| {
            if scope.is_empty() {
                id.to_string()
            } else {
                format!("{scope}@{id}")
            }
        });
    };
    match (&id2.global, &id2.local) {
        (Some(global), None) => Some(format!(":{scope}:{global}")),
        (None, Some(local)) => Some(format!(":{scope}:{}:{local}", record.pid)),
        _ => {
            tracing::warn!(
                ts = record.ts / 1000.0,
                "unexpected id2 field, one and only one of 'local' and 'global' should be present"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrome_trace_format::{Id, Id2};
    use rstest::{fixture, rstest};
    use serde_json::json;

    fn record(name: &str, ph: Phase, ts: f64) -> TraceRecord {
        TraceRecord::builder()
            .name(name)
            .cat("test")
            .ph(ph)
            .pid(1)
            .tid(1)
            .ts(ts)
            .build()
    }

    fn names(model: &TracingModel, ids: &[EventId]) -> Vec<String> {
        ids.iter().map(|id| model.event(*id).name.clone()).collect()
    }

    #[fixture]
    fn model() -> TracingModel {
        TracingModel::new()
    }

    #[rstest]
    fn begin_end_pairs_are_resolved(mut model: TracingModel) {
        model.add_records([
            TraceRecord::builder()
                .name("outer")
                .cat("test")
                .ph(Phase::DurationBegin)
                .pid(1)
                .tid(1)
                .ts(1000.0)
                .args(json!({"a": 1}))
                .build(),
            record("inner", Phase::DurationBegin, 2000.0),
            record("inner", Phase::DurationEnd, 3000.0),
            TraceRecord::builder()
                .name("outer")
                .cat("test")
                .ph(Phase::DurationEnd)
                .pid(1)
                .tid(1)
                .ts(5000.0)
                .args(json!({"b": 2}))
                .build(),
        ]);
        model.tracing_complete();
        let thread = model.thread(ThreadKey::new(1, 1)).unwrap();
        assert_eq!(names(&model, thread.events()), vec!["outer", "inner"]);
        let outer = model.event(thread.events()[0]);
        assert_eq!(outer.end_time, Some(5.0));
        assert_eq!(outer.args["a"], 1);
        assert_eq!(outer.args["b"], 2);
        assert_eq!(model.event(thread.events()[1]).duration, Some(1.0));
    }

    #[rstest]
    fn unclosed_begin_is_closed_at_maximum(mut model: TracingModel) {
        model.add_records([
            record("open", Phase::DurationBegin, 1000.0),
            TraceRecord::builder()
                .name("later")
                .ph(Phase::Complete)
                .pid(1)
                .tid(2)
                .ts(2000.0)
                .dur(3000.0)
                .build(),
            record("stray", Phase::DurationEnd, 500.0),
        ]);
        model.tracing_complete();
        let thread = model.thread(ThreadKey::new(1, 1)).unwrap();
        assert_eq!(names(&model, thread.events()), vec!["open"]);
        assert_eq!(model.event(thread.events()[0]).end_time, Some(5.0));
        assert_eq!(model.maximum_record_time(), 5.0);
        assert_eq!(model.minimum_record_time(), 1.0);
    }

    #[rstest]
    fn events_are_sorted_and_top_level_overlaps_dropped(mut model: TracingModel) {
        let task = |ts: f64, dur: f64| {
            TraceRecord::builder()
                .name("RunTask")
                .cat("disabled-by-default-devtools.timeline")
                .ph(Phase::Complete)
                .pid(1)
                .tid(1)
                .ts(ts)
                .dur(dur)
                .build()
        };
        model.add_records([
            task(0.0, 1000.0),
            task(500.0, 100.0),
            task(2000.0, 100.0),
            record("early", Phase::Instant, 1500.0),
        ]);
        model.tracing_complete();
        let thread = model.thread(ThreadKey::new(1, 1)).unwrap();
        let starts: Vec<f64> = thread
            .events()
            .iter()
            .map(|id| model.event(*id).start_time)
            .collect();
        assert_eq!(starts, vec![0.0, 1.5, 2.0]);
    }

    #[rstest]
    fn simple_async_steps_share_a_key(mut model: TracingModel) {
        let async_record = |ph: Phase, ts: f64| {
            TraceRecord::builder()
                .name("load")
                .cat("net")
                .ph(ph)
                .pid(1)
                .tid(1)
                .ts(ts)
                .id(Id::from("0x1"))
                .build()
        };
        model.add_records([
            async_record(Phase::AsyncEnd, 4000.0),
            async_record(Phase::AsyncBegin, 1000.0),
            async_record(Phase::AsyncStepInto, 2000.0),
            async_record(Phase::AsyncStepPast, 3000.0),
        ]);
        model.tracing_complete();
        let thread = model.thread(ThreadKey::new(1, 1)).unwrap();
        assert_eq!(thread.async_events().len(), 1);
        let async_event = model.event(thread.async_events()[0]);
        assert_eq!(async_event.steps().len(), 4);
        assert_eq!(async_event.end_time, Some(4.0));
        assert_eq!(model.event(async_event.steps()[0]).end_time, Some(4.0));
    }

    #[rstest]
    fn duplicate_async_begin_is_dropped(mut model: TracingModel) {
        let begin = |ts: f64| {
            TraceRecord::builder()
                .name("load")
                .ph(Phase::AsyncBegin)
                .pid(1)
                .tid(1)
                .ts(ts)
                .id(Id::from(7u64))
                .build()
        };
        model.add_records([begin(1000.0), begin(2000.0)]);
        model.tracing_complete();
        let thread = model.thread(ThreadKey::new(1, 1)).unwrap();
        assert_eq!(thread.async_events().len(), 1);
        assert_eq!(model.event(thread.async_events()[0]).end_time, Some(2.0));
    }

    #[rstest]
    fn nestable_async_uses_a_stack(mut model: TracingModel) {
        let nested = |name: &str, ph: Phase, ts: f64| {
            TraceRecord::builder()
                .name(name)
                .cat("blink.user_timing")
                .ph(ph)
                .pid(1)
                .tid(1)
                .ts(ts)
                .id(Id::from("a"))
                .build()
        };
        model.add_records([
            nested("outer", Phase::NestableAsyncBegin, 1000.0),
            nested("inner", Phase::NestableAsyncBegin, 2000.0),
            nested("inner", Phase::NestableAsyncInstant, 2500.0),
            nested("inner", Phase::NestableAsyncEnd, 3000.0),
            nested("outer", Phase::NestableAsyncEnd, 4000.0),
            nested("left-open", Phase::NestableAsyncBegin, 6000.0),
        ]);
        model.tracing_complete();
        let thread = model.thread(ThreadKey::new(1, 1)).unwrap();
        let asyncs: Vec<_> = thread.async_events().iter().map(|id| model.event(*id)).collect();
        assert_eq!(asyncs.len(), 3);
        assert_eq!(asyncs[0].name, "outer");
        assert_eq!(asyncs[0].end_time, Some(4.0));
        assert_eq!(asyncs[1].steps().len(), 3);
        assert_eq!(asyncs[1].end_time, Some(3.0));
        assert_eq!(asyncs[2].end_time, Some(6.0));
    }

    #[rstest]
    fn metadata_names_processes_and_threads(mut model: TracingModel) {
        model.add_records([
            TraceRecord::builder()
                .name("process_name")
                .ph(Phase::Metadata)
                .pid(3)
                .args(json!({"name": "Browser"}))
                .build(),
            TraceRecord::builder()
                .name("thread_name")
                .ph(Phase::Metadata)
                .pid(3)
                .tid(4)
                .args(json!({"name": "CrBrowserMain"}))
                .build(),
        ]);
        model.tracing_complete();
        let thread = model.thread_by_name("Browser", "CrBrowserMain").unwrap();
        assert_eq!(thread.key(), ThreadKey::new(3, 4));
        assert_eq!(model.browser_main_thread(), Some(ThreadKey::new(3, 4)));
    }

    #[rstest]
    fn sample_events_are_grouped(mut model: TracingModel) {
        let sample = |name: &str, pid: u32| {
            TraceRecord::builder()
                .name(name)
                .ph(Phase::Sample)
                .pid(pid)
                .tid(1)
                .id(Id::from("0x1"))
                .build()
        };
        model.add_records([
            sample("Profile", 1),
            sample("ProfileChunk", 1),
            sample("ProfileChunk", 2),
        ]);
        model.tracing_complete();
        let first = model.thread(ThreadKey::new(1, 1)).unwrap().events()[0];
        let group = model.profile_group(first).unwrap();
        assert_eq!(names(&model, group), vec!["Profile", "ProfileChunk"]);
    }

    #[rstest]
    fn adjust_time_shifts_everything(mut model: TracingModel) {
        model.add_records([TraceRecord::builder()
            .name("x")
            .ph(Phase::Complete)
            .pid(1)
            .tid(1)
            .ts(1000.0)
            .dur(1000.0)
            .build()]);
        model.tracing_complete();
        model.adjust_time(-1.0);
        let id = model.thread(ThreadKey::new(1, 1)).unwrap().events()[0];
        assert_eq!(model.event(id).start_time, 0.0);
        assert_eq!(model.event(id).end_time, Some(1.0));
        assert_eq!(model.minimum_record_time(), 0.0);
    }

    #[rstest]
    #[case(None, Some(Id::from("5")), None, Some("5"))]
    #[case(Some("s"), Some(Id::from(5u64)), None, Some("s@5"))]
    #[case(Some("s"), None, Some(Id2 { global: Some(Id::from("g")), local: None }), Some(":s:g"))]
    #[case(None, None, Some(Id2 { global: None, local: Some(Id::from("l")) }), Some("::9:l"))]
    #[case(None, None, Some(Id2 { global: Some(Id::from("g")), local: Some(Id::from("l")) }), None)]
    fn id_extraction(
        #[case] scope: Option<&str>,
        #[case] id: Option<Id>,
        #[case] id2: Option<Id2>,
        #[case] expected: Option<&str>,
    ) {
        let record = TraceRecord {
            cat: String::new(),
            name: "x".into(),
            ph: Phase::NestableAsyncBegin,
            pid: 9,
            tid: 1,
            ts: 0.0,
            dur: None,
            args: None,
            id,
            id2,
            scope: scope.map(str::to_string),
            bind_id: None,
        };
        assert_eq!(extract_id(&record).as_deref(), expected);
    }

    #[rstest]
    fn snapshot_without_payload_still_produces_event(mut model: TracingModel) {
        model.add_records([
            TraceRecord::builder()
                .name("cc::Picture")
                .ph(Phase::ObjectSnapshot)
                .pid(1)
                .tid(1)
                .ts(1000.0)
                .build(),
            TraceRecord::builder()
                .name("cc::Picture")
                .ph(Phase::ObjectSnapshot)
                .pid(1)
                .tid(1)
                .ts(2000.0)
                .args(json!({"snapshot": {"skp64": "abc"}}))
                .build(),
        ]);
        model.tracing_complete();
        let events = model.thread(ThreadKey::new(1, 1)).unwrap().events().to_vec();
        assert!(model.event(events[0]).snapshot_object().is_none());
        assert_eq!(
            model.event(events[1]).snapshot_object(),
            Some(&json!({"skp64": "abc"}))
        );
    }
}
