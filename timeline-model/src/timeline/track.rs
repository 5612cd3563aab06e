use std::sync::{Arc, OnceLock};

use chrome_trace_format::Phase;
use serde::Serialize;

use crate::tracing_model::{Event, EventId, ThreadKey, TracingModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TrackType {
    MainThread,
    Worker,
    Input,
    Animation,
    Timings,
    Console,
    Raster,
    Gpu,
    Other,
}

/// A group of events presented together.
#[derive(Debug)]
pub struct Track {
    pub name: String,
    pub kind: TrackType,
    pub for_main_frame: bool,
    pub url: String,
    pub thread: Option<ThreadKey>,
    pub events: Vec<EventId>,
    pub async_events: Vec<EventId>,
    /// Top-level events with a duration.
    pub tasks: Vec<EventId>,
    converted: OnceLock<Vec<Event>>,
}

/// Events of a track as synchronous spans.
#[derive(Debug, Clone, Copy)]
pub enum SyncEvents<'a> {
    Recorded(&'a [EventId]),
    /// Complete events built from properly nested async events.
    Converted(&'a [Event]),
}

impl SyncEvents<'_> {
    pub fn len(&self) -> usize {
        match self {
            SyncEvents::Recorded(events) => events.len(),
            SyncEvents::Converted(events) => events.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Track {
    pub fn new(kind: TrackType) -> Self {
        Self {
            name: String::new(),
            kind,
            for_main_frame: false,
            url: String::new(),
            thread: None,
            events: Vec::new(),
            async_events: Vec::new(),
            tasks: Vec::new(),
            converted: OnceLock::new(),
        }
    }

    /// The recorded events, or the async events turned into complete events
    /// when the track has no synchronous ones. Improperly overlapping async
    /// events yield nothing.
    pub fn sync_events<'a>(&'a self, model: &TracingModel) -> SyncEvents<'a> {
        if !self.events.is_empty() {
            return SyncEvents::Recorded(&self.events);
        }
        SyncEvents::Converted(self.converted.get_or_init(|| self.convert_async(model)))
    }

    fn convert_async(&self, model: &TracingModel) -> Vec<Event> {
        let mut stack: Vec<f64> = Vec::new();
        let mut events = Vec::with_capacity(self.async_events.len());
        for id in &self.async_events {
            let source = model.event(*id);
            let start = source.start_time;
            let end = source.end_or_start();
            while stack.last().is_some_and(|top| start >= *top) {
                stack.pop();
            }
            if stack.last().is_some_and(|top| end > *top) {
                return Vec::new();
            }
            let mut event = Event::new(
                Arc::clone(source.categories()),
                source.name.clone(),
                Phase::Complete,
                start,
                source.thread,
            );
            event.set_end_time(end);
            event.add_args(&source.args);
            events.push(event);
            stack.push(end);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrome_trace_format::{Id, TraceRecord};

    fn model(spans: &[(&str, f64, f64)]) -> (TracingModel, Vec<EventId>) {
        let mut model = TracingModel::new();
        for (index, (name, start, end)) in spans.iter().enumerate() {
            let record = |ph: Phase, ts: f64| {
                TraceRecord::builder()
                    .name(*name)
                    .cat("blink.user_timing")
                    .ph(ph)
                    .pid(1)
                    .tid(1)
                    .ts(ts)
                    .id(Id::from(index as u64))
                    .build()
            };
            model.add_records([
                record(Phase::NestableAsyncBegin, start * 1000.0),
                record(Phase::NestableAsyncEnd, end * 1000.0),
            ]);
        }
        model.tracing_complete();
        let ids = model.thread(ThreadKey::new(1, 1)).unwrap().async_events().to_vec();
        (model, ids)
    }

    #[test]
    fn nested_async_events_convert() {
        let (model, ids) = model(&[("outer", 1.0, 10.0), ("inner", 2.0, 5.0), ("next", 10.0, 12.0)]);
        let mut track = Track::new(TrackType::Timings);
        track.async_events = ids;
        let SyncEvents::Converted(events) = track.sync_events(&model) else {
            panic!("expected converted events");
        };
        let spans: Vec<(&str, Option<f64>)> =
            events.iter().map(|e| (e.name.as_str(), e.duration)).collect();
        assert_eq!(spans, vec![("outer", Some(9.0)), ("inner", Some(3.0)), ("next", Some(2.0))]);
        assert!(events.iter().all(|e| e.phase == Phase::Complete));
    }

    #[test]
    fn overlapping_async_events_yield_nothing() {
        let (model, ids) = model(&[("a", 1.0, 5.0), ("b", 2.0, 8.0)]);
        let mut track = Track::new(TrackType::Timings);
        track.async_events = ids;
        assert!(track.sync_events(&model).is_empty());
    }
}
