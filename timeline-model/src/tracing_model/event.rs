use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrome_trace_format::Phase;
use serde::Serialize;
use serde_json::{Map, Value};

use super::snapshot::ObjectSnapshot;
use crate::record_type::{self, category};

/// Stable identity of an event inside its [`TracingModel`](super::TracingModel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EventId(pub(crate) u32);

impl EventId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Back-reference from an event to the thread that emitted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadKey {
    pub pid: u32,
    pub tid: u32,
}

impl ThreadKey {
    pub fn new(pid: u32, tid: u32) -> Self {
        Self { pid, tid }
    }
}

/// Parsed form of a comma-separated category string, shared between every
/// event that carries the same string.
#[derive(Debug, PartialEq, Eq)]
pub struct Categories {
    raw: String,
    set: HashSet<String>,
}

impl Categories {
    pub fn parse(raw: &str) -> Self {
        let set = if raw.is_empty() {
            HashSet::new()
        } else {
            raw.split(',').map(str::to_string).collect()
        };
        Self {
            raw: raw.to_string(),
            set,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.set.contains(name)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

#[derive(Debug)]
pub enum EventKind {
    Plain,
    /// An async operation resolved from its begin/step/end records.
    Async { steps: Vec<EventId> },
    Snapshot(ObjectSnapshot),
}

#[derive(Debug)]
pub struct Event {
    pub(crate) categories: Arc<Categories>,
    pub name: String,
    pub phase: Phase,
    pub start_time: f64,
    pub end_time: Option<f64>,
    pub duration: Option<f64>,
    pub self_time: f64,
    pub thread: ThreadKey,
    pub args: Map<String, Value>,
    pub id: Option<String>,
    pub bind_id: Option<String>,
    /// Position in the owning thread's sorted event list.
    pub ordinal: usize,
    pub kind: EventKind,
}

impl Event {
    pub fn new(
        categories: Arc<Categories>,
        name: impl Into<String>,
        phase: Phase,
        start_time: f64,
        thread: ThreadKey,
    ) -> Self {
        Self {
            categories,
            name: name.into(),
            phase,
            start_time,
            end_time: None,
            duration: None,
            self_time: 0.0,
            thread,
            args: Map::new(),
            id: None,
            bind_id: None,
            ordinal: 0,
            kind: EventKind::Plain,
        }
    }

    pub fn has_category(&self, name: &str) -> bool {
        self.categories.contains(name)
    }

    pub fn categories_string(&self) -> &str {
        self.categories.as_str()
    }

    pub fn categories(&self) -> &Arc<Categories> {
        &self.categories
    }

    /// Rejects an end before the start, leaving the event unchanged.
    pub fn set_end_time(&mut self, end_time: f64) {
        if end_time < self.start_time {
            tracing::warn!(
                name = %self.name,
                start = self.start_time,
                end = end_time,
                "event out of order"
            );
            return;
        }
        self.end_time = Some(end_time);
        self.duration = Some(end_time - self.start_time);
    }

    /// Copies `args` into the event. A key that is already present is
    /// reported and then overwritten.
    pub fn add_args(&mut self, args: &Map<String, Value>) {
        for (key, value) in args {
            if self.args.contains_key(key) {
                tracing::warn!(
                    name = %self.name,
                    arg = %key,
                    "same argument name is used for begin and end phases"
                );
            }
            self.args.insert(key.clone(), value.clone());
        }
    }

    /// `end_time` when known, else `start_time`.
    pub fn end_or_start(&self) -> f64 {
        self.end_time.unwrap_or(self.start_time)
    }

    pub fn has_duration(&self) -> bool {
        self.duration.is_some_and(|d| d != 0.0)
    }

    pub fn is_async(&self) -> bool {
        matches!(self.kind, EventKind::Async { .. })
    }

    pub fn steps(&self) -> &[EventId] {
        match &self.kind {
            EventKind::Async { steps } => steps,
            _ => &[],
        }
    }

    pub fn snapshot(&self) -> Option<&ObjectSnapshot> {
        match &self.kind {
            EventKind::Snapshot(snapshot) => Some(snapshot),
            _ => None,
        }
    }

    /// Resolved snapshot payload for snapshot events.
    pub fn snapshot_object(&self) -> Option<&Value> {
        self.snapshot().and_then(|s| s.object(&self.args))
    }

    /// Whether this event is a root unit of work on its thread.
    pub fn is_top_level(&self) -> bool {
        (self.has_category(category::DEVTOOLS_TIMELINE) && self.name == record_type::TASK)
            || self.has_category(category::LEGACY_TOP_LEVEL)
            || (self.has_category(category::DEVTOOLS_METADATA) && self.name == record_type::PROGRAM)
    }

    /// `args.data`, falling back to `args.beginData`.
    pub fn data(&self) -> EventData<'_> {
        EventData::of(&self.args)
    }

    /// The page frame this event belongs to, empty when unknown.
    pub fn frame_id(&self) -> &str {
        self.data().str("frame").unwrap_or("")
    }

    /// Orders by start time. Equal starts compare equal so stable sorts
    /// keep arrival order.
    pub fn compare_start_time(a: &Event, b: &Event) -> std::cmp::Ordering {
        a.start_time.total_cmp(&b.start_time)
    }
}

/// Typed read access to the loosely shaped `data` payload of an event.
#[derive(Debug, Clone, Copy)]
pub struct EventData<'a>(Option<&'a Map<String, Value>>);

impl<'a> EventData<'a> {
    pub fn of(args: &'a Map<String, Value>) -> Self {
        let data = args
            .get("data")
            .filter(|v| is_truthy(v))
            .or_else(|| args.get("beginData"))
            .and_then(Value::as_object);
        Self(data)
    }

    pub fn from_value(value: Option<&'a Value>) -> Self {
        Self(value.and_then(Value::as_object))
    }

    pub fn is_present(&self) -> bool {
        self.0.is_some()
    }

    pub fn map(&self) -> Option<&'a Map<String, Value>> {
        self.0
    }

    pub fn value(&self, key: &str) -> Option<&'a Value> {
        self.0.and_then(|m| m.get(key))
    }

    pub fn str(&self, key: &str) -> Option<&'a str> {
        self.value(key).and_then(Value::as_str)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.value(key).and_then(Value::as_f64)
    }

    pub fn is_true(&self, key: &str) -> bool {
        self.value(key).is_some_and(is_truthy)
    }

    /// Key form of a field, `None` for missing or falsy values.
    pub fn key(&self, key: &str) -> Option<String> {
        self.value(key).and_then(value_key)
    }

    pub fn stack_trace(&self) -> Option<&'a Vec<Value>> {
        self.value("stackTrace").and_then(Value::as_array)
    }

    pub fn url(&self) -> Option<&'a str> {
        self.str("url")
    }
}

/// Loose truthiness of a JSON value: null, false, zero and "" are false.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// String form of a truthy JSON value, used to build join keys.
pub fn value_key(value: &Value) -> Option<String> {
    if !is_truthy(value) {
        return None;
    }
    Some(match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        other => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn event(cat: &str, name: &str) -> Event {
        Event::new(
            Arc::new(Categories::parse(cat)),
            name,
            Phase::Complete,
            10.0,
            ThreadKey::new(1, 1),
        )
    }

    #[test]
    fn rejects_end_before_start() {
        let mut e = event("", "a");
        e.set_end_time(5.0);
        assert_eq!(e.end_time, None);
        e.set_end_time(12.5);
        assert_eq!(e.end_time, Some(12.5));
        assert_eq!(e.duration, Some(2.5));
    }

    #[test]
    fn duplicate_args_take_later_value() {
        let mut e = event("", "a");
        e.add_args(json!({"x": 1, "y": 2}).as_object().unwrap());
        e.add_args(json!({"x": 3}).as_object().unwrap());
        assert_eq!(e.args["x"], 3);
        assert_eq!(e.args["y"], 2);
    }

    #[rstest]
    #[case("disabled-by-default-devtools.timeline", "RunTask", true)]
    #[case("disabled-by-default-devtools.timeline", "Layout", false)]
    #[case("foo,toplevel", "anything", true)]
    #[case("disabled-by-default-devtools.timeline", "Program", true)]
    #[case("v8", "RunTask", false)]
    fn top_level_detection(#[case] cat: &str, #[case] name: &str, #[case] expected: bool) {
        assert_eq!(event(cat, name).is_top_level(), expected);
    }

    #[test]
    fn data_falls_back_to_begin_data() {
        let mut e = event("", "Layout");
        e.add_args(json!({"beginData": {"frame": "F1"}}).as_object().unwrap());
        assert_eq!(e.frame_id(), "F1");
    }

    #[rstest]
    #[case(json!(5), Some("5"))]
    #[case(json!("abc"), Some("abc"))]
    #[case(json!(0), None)]
    #[case(json!(""), None)]
    #[case(json!(null), None)]
    fn value_keys(#[case] value: Value, #[case] expected: Option<&str>) {
        assert_eq!(value_key(&value).as_deref(), expected);
    }
}
