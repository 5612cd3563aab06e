use std::collections::HashMap;

use serde_json::Value;

use crate::record_type::WarningType;
use crate::tracing_model::EventId;

/// Per-event facts derived while classifying a trace.
#[derive(Debug, Clone, Default)]
pub struct TimelineData {
    pub warning: Option<WarningType>,
    pub url: Option<String>,
    pub backend_node_id: Option<i64>,
    /// Captured stack, 0-based line and column numbers.
    pub stack_trace: Option<Vec<Value>>,
    /// Picture snapshot produced for a paint.
    pub picture: Option<EventId>,
    pub frame_id: String,
    pub time_waiting_for_main_thread: Option<f64>,
    /// Input async events only: whether the input led to a new frame.
    pub caused_frame: bool,
    initiator: Option<EventId>,
}

impl TimelineData {
    pub fn initiator(&self) -> Option<EventId> {
        self.initiator
    }
}

/// Side table from event to its [`TimelineData`].
#[derive(Debug, Default)]
pub struct TimelineDataTable {
    entries: HashMap<EventId, TimelineData>,
}

impl TimelineDataTable {
    pub fn get(&self, id: EventId) -> Option<&TimelineData> {
        self.entries.get(&id)
    }

    pub fn for_event(&mut self, id: EventId) -> &mut TimelineData {
        self.entries.entry(id).or_default()
    }

    /// Sets the initiator of `id`; the event inherits the initiator's url
    /// when it has none of its own.
    pub fn set_initiator(&mut self, id: EventId, initiator: Option<EventId>) {
        let inherited = initiator
            .and_then(|i| self.entries.get(&i))
            .and_then(|data| data.url.clone())
            .filter(|url| !url.is_empty());
        let data = self.for_event(id);
        data.initiator = initiator;
        if data.url.as_deref().is_some_and(|url| !url.is_empty()) {
            return;
        }
        if let Some(url) = inherited {
            data.url = Some(url);
        }
    }

    pub fn initiator(&self, id: EventId) -> Option<EventId> {
        self.get(id).and_then(TimelineData::initiator)
    }

    pub fn frame_id(&self, id: EventId) -> &str {
        self.get(id).map_or("", |data| data.frame_id.as_str())
    }

    pub fn stack_trace_for_self_or_initiator(&self, id: EventId) -> Option<&[Value]> {
        let data = self.get(id)?;
        data.stack_trace.as_deref().or_else(|| {
            data.initiator
                .and_then(|i| self.get(i))
                .and_then(|initiator| initiator.stack_trace.as_deref())
        })
    }

    pub fn top_frame(&self, id: EventId) -> Option<&Value> {
        self.stack_trace_for_self_or_initiator(id)?.first()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EventId, &TimelineData)> {
        self.entries.iter().map(|(id, data)| (*id, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn initiator_url_is_inherited_once() {
        let mut table = TimelineDataTable::default();
        table.for_event(EventId(0)).url = Some("https://a.test/".into());
        table.set_initiator(EventId(1), Some(EventId(0)));
        assert_eq!(table.get(EventId(1)).unwrap().url.as_deref(), Some("https://a.test/"));

        table.for_event(EventId(2)).url = Some("own".into());
        table.set_initiator(EventId(2), Some(EventId(0)));
        assert_eq!(table.get(EventId(2)).unwrap().url.as_deref(), Some("own"));
    }

    #[test]
    fn stack_falls_back_to_initiator() {
        let mut table = TimelineDataTable::default();
        table.for_event(EventId(0)).stack_trace = Some(vec![json!({"functionName": "install"})]);
        table.set_initiator(EventId(1), Some(EventId(0)));
        assert_eq!(
            table.top_frame(EventId(1)),
            Some(&json!({"functionName": "install"}))
        );
        assert_eq!(table.top_frame(EventId(5)), None);
    }
}
