//! Nesting-aware traversal of a thread's ordered event list.

use crate::tracing_model::{Event, EventId, TracingModel};
use crate::util::upper_bound;

/// Callbacks for [`for_each_event`].
pub trait EventVisitor {
    /// An event with a duration starts; it stays open until its end passes.
    fn on_start(&mut self, id: EventId, event: &Event);

    fn on_end(&mut self, id: EventId, event: &Event);

    /// A zero-duration event, with the innermost open event if any.
    fn on_instant(&mut self, _id: EventId, _event: &Event, _parent: Option<&Event>) {}
}

/// Walks `events` (sorted by start time) from the top-level event that
/// contains `start_time` up to `end_time`, reporting starts, ends and
/// instants in nesting order. Async and flow events are skipped.
pub fn for_each_event<V: EventVisitor>(
    model: &TracingModel,
    events: &[EventId],
    visitor: &mut V,
    start_time: f64,
    end_time: Option<f64>,
) {
    let end_time = end_time.unwrap_or(f64::INFINITY);
    let mut stack: Vec<EventId> = Vec::new();
    let first = top_level_event_ending_after(model, events, start_time);

    for &id in &events[first..] {
        let event = model.event(id);
        if event.end_or_start() < start_time {
            continue;
        }
        if event.start_time >= end_time {
            break;
        }
        if event.phase.is_async() || event.phase.is_flow() {
            continue;
        }
        while let Some(&top) = stack.last() {
            let open = model.event(top);
            if !open.end_time.is_some_and(|end| end <= event.start_time) {
                break;
            }
            stack.pop();
            visitor.on_end(top, open);
        }
        if event.has_duration() {
            visitor.on_start(id, event);
            stack.push(id);
        } else {
            let parent = stack.last().map(|top| model.event(*top));
            visitor.on_instant(id, event, parent);
        }
    }
    while let Some(top) = stack.pop() {
        visitor.on_end(top, model.event(top));
    }
}

fn top_level_event_ending_after(model: &TracingModel, events: &[EventId], time: f64) -> usize {
    let mut index = upper_bound(events, time, |id| model.event(*id).start_time) as isize - 1;
    while index > 0 && !model.event(events[index as usize]).is_top_level() {
        index -= 1;
    }
    index.max(0) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrome_trace_format::{Phase, TraceRecord};
    use crate::tracing_model::ThreadKey;

    #[derive(Default)]
    struct Recorder(Vec<String>);

    impl EventVisitor for Recorder {
        fn on_start(&mut self, _id: EventId, event: &Event) {
            self.0.push(format!("+{}", event.name));
        }

        fn on_end(&mut self, _id: EventId, event: &Event) {
            self.0.push(format!("-{}", event.name));
        }

        fn on_instant(&mut self, _id: EventId, event: &Event, parent: Option<&Event>) {
            let parent = parent.map_or("none", |p| p.name.as_str());
            self.0.push(format!("{}@{}", event.name, parent));
        }
    }

    fn complete(name: &str, ts: f64, dur: f64) -> TraceRecord {
        TraceRecord::builder()
            .name(name)
            .cat("disabled-by-default-devtools.timeline")
            .ph(Phase::Complete)
            .pid(1)
            .tid(1)
            .ts(ts)
            .dur(dur)
            .build()
    }

    fn model() -> TracingModel {
        let mut model = TracingModel::new();
        model.add_records([
            complete("RunTask", 0.0, 10_000.0),
            complete("FunctionCall", 1_000.0, 5_000.0),
            TraceRecord::builder()
                .name("mark")
                .ph(Phase::Instant)
                .pid(1)
                .tid(1)
                .ts(2_000.0)
                .build(),
            complete("RunTask", 20_000.0, 1_000.0),
            TraceRecord::builder()
                .name("async")
                .ph(Phase::AsyncBegin)
                .pid(1)
                .tid(1)
                .ts(20_500.0)
                .id("1".into())
                .build(),
        ]);
        model.tracing_complete();
        model
    }

    #[test]
    fn reports_nesting_order() {
        let model = model();
        let events = model.thread(ThreadKey::new(1, 1)).unwrap().events().to_vec();
        let mut recorder = Recorder::default();
        for_each_event(&model, &events, &mut recorder, 0.0, None);
        assert_eq!(
            recorder.0,
            vec![
                "+RunTask",
                "+FunctionCall",
                "mark@FunctionCall",
                "-FunctionCall",
                "-RunTask",
                "+RunTask",
                "-RunTask"
            ]
        );
    }

    #[test]
    fn starts_from_enclosing_top_level_event() {
        let model = model();
        let events = model.thread(ThreadKey::new(1, 1)).unwrap().events().to_vec();
        let mut recorder = Recorder::default();
        for_each_event(&model, &events, &mut recorder, 3.0, Some(15.0));
        assert_eq!(
            recorder.0,
            vec!["+RunTask", "+FunctionCall", "-FunctionCall", "-RunTask"]
        );
    }
}
