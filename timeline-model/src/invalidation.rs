//! Links style and layout invalidation records to the recalc/layout pass that
//! consumes them.
//!
//! State is kept per rendering frame: the buffers reset on the first
//! invalidation after a paint.

use std::collections::HashMap;

use serde_json::Value;

use crate::record_type;
use crate::tracing_model::{Event, EventData, EventId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvalidationKind {
    ScheduleStyle,
    StyleRecalc,
    StyleInvalidator,
    Layout,
}

impl InvalidationKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            record_type::SCHEDULE_STYLE_INVALIDATION_TRACKING => Some(Self::ScheduleStyle),
            record_type::STYLE_RECALC_INVALIDATION_TRACKING => Some(Self::StyleRecalc),
            record_type::STYLE_INVALIDATOR_INVALIDATION_TRACKING => Some(Self::StyleInvalidator),
            record_type::LAYOUT_INVALIDATION_TRACKING => Some(Self::Layout),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ScheduleStyle => record_type::SCHEDULE_STYLE_INVALIDATION_TRACKING,
            Self::StyleRecalc => record_type::STYLE_RECALC_INVALIDATION_TRACKING,
            Self::StyleInvalidator => record_type::STYLE_INVALIDATOR_INVALIDATION_TRACKING,
            Self::Layout => record_type::LAYOUT_INVALIDATION_TRACKING,
        }
    }

    fn is_style(self) -> bool {
        !matches!(self, Self::Layout)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvalidationCause {
    pub reason: Option<String>,
    pub stack_trace: Option<Vec<Value>>,
}

#[derive(Debug, Clone)]
pub struct InvalidationRecord {
    pub kind: InvalidationKind,
    pub start_time: f64,
    /// The trace event the record was read from.
    pub event: EventId,
    pub frame: String,
    pub node_id: Option<i64>,
    pub node_name: Option<String>,
    pub invalidation_set: Option<String>,
    pub invalidated_selector_id: Option<String>,
    pub changed_id: Option<String>,
    pub changed_class: Option<String>,
    pub changed_attribute: Option<String>,
    pub changed_pseudo: Option<String>,
    pub selector_part: Option<String>,
    pub extra_data: Option<String>,
    pub invalidation_list: Option<Vec<Value>>,
    pub cause: InvalidationCause,
    linked_to_recalc: bool,
    linked_to_layout: bool,
}

impl InvalidationRecord {
    /// Reads an invalidation-tracking event; `None` for any other event name.
    pub fn from_event(id: EventId, event: &Event) -> Option<Self> {
        let kind = InvalidationKind::from_name(&event.name)?;
        let data = event.data();
        let string = |key: &str| data.str(key).map(str::to_string);
        let mut cause = InvalidationCause {
            reason: string("reason").filter(|r| !r.is_empty()),
            stack_trace: data.stack_trace().cloned(),
        };
        if cause.reason.is_none() && cause.stack_trace.is_some() && kind == InvalidationKind::Layout {
            cause.reason = Some("Layout forced".to_string());
        }
        Some(Self {
            kind,
            start_time: event.start_time,
            event: id,
            frame: string("frame").unwrap_or_default(),
            node_id: data.value("nodeId").and_then(Value::as_i64).filter(|n| *n != 0),
            node_name: string("nodeName"),
            invalidation_set: data.key("invalidationSet"),
            invalidated_selector_id: string("invalidatedSelectorId"),
            changed_id: string("changedId"),
            changed_class: string("changedClass"),
            changed_attribute: string("changedAttribute"),
            changed_pseudo: string("changedPseudo"),
            selector_part: string("selectorPart"),
            extra_data: string("extraData"),
            invalidation_list: data.value("invalidationList").and_then(Value::as_array).cloned(),
            cause,
            linked_to_recalc: false,
            linked_to_layout: false,
        })
    }

    pub fn linked_to_recalc(&self) -> bool {
        self.linked_to_recalc
    }

    pub fn linked_to_layout(&self) -> bool {
        self.linked_to_layout
    }
}

/// The style or layout pass invalidations are linked against.
#[derive(Debug, Clone, Copy)]
struct Pass<'a> {
    id: EventId,
    start_time: f64,
    end_time: f64,
    frame: &'a str,
}

#[derive(Debug, Clone)]
struct RecalcPass {
    id: EventId,
    start_time: f64,
    end_time: f64,
    frame: String,
}

impl<'a> Pass<'a> {
    fn of(id: EventId, event: &'a Event) -> Self {
        Self {
            id,
            start_time: event.start_time,
            end_time: event.end_or_start(),
            frame: pass_frame(event),
        }
    }
}

/// Frame of a recalc/layout pass, taken from its begin payload.
fn pass_frame(event: &Event) -> &str {
    EventData::from_value(event.args.get("beginData"))
        .str("frame")
        .or_else(|| event.data().str("frame"))
        .unwrap_or("")
}

#[derive(Debug, Default)]
pub struct InvalidationTracker {
    /// Every record of the trace. Only the lookup indexes are per frame;
    /// `links` keeps pointing here after the frame ends.
    records: Vec<InvalidationRecord>,
    by_kind: HashMap<InvalidationKind, Vec<usize>>,
    by_node: HashMap<i64, Vec<usize>>,
    last_recalc_style: Option<RecalcPass>,
    did_paint: bool,
    links: HashMap<EventId, Vec<usize>>,
}

impl InvalidationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers an invalidation for the current frame. Records without a node
    /// id are dropped.
    pub fn add_invalidation(&mut self, record: InvalidationRecord) {
        let index = self.push(record);
        self.track(index);
    }

    fn push(&mut self, record: InvalidationRecord) -> usize {
        self.records.push(record);
        self.records.len() - 1
    }

    fn track(&mut self, index: usize) {
        self.start_new_frame_if_needed();

        let record = &self.records[index];
        let Some(node_id) = record.node_id else {
            tracing::warn!(
                kind = record.kind.as_str(),
                ts = record.start_time,
                "invalidation lacks node information"
            );
            return;
        };
        // Handled through the matching StyleInvalidatorInvalidationTracking.
        if record.kind == InvalidationKind::StyleRecalc
            && record.cause.reason.as_deref() == Some("StyleInvalidator")
        {
            return;
        }

        // Style invalidations emitted while a recalc runs belong to it.
        if record.kind.is_style() {
            let during_recalc = self.last_recalc_style.as_ref().is_some_and(|pass| {
                record.start_time != 0.0
                    && record.start_time >= pass.start_time
                    && record.start_time <= pass.end_time
            });
            if during_recalc {
                self.associate_with_last_recalc_style(index);
            }
        }

        let kind = self.records[index].kind;
        self.by_kind.entry(kind).or_default().push(index);
        self.by_node.entry(node_id).or_default().push(index);
    }

    pub fn did_recalc_style(&mut self, id: EventId, event: &Event) {
        let pass = Pass::of(id, event);
        self.last_recalc_style = Some(RecalcPass {
            id: pass.id,
            start_time: pass.start_time,
            end_time: pass.end_time,
            frame: pass.frame.to_string(),
        });
        for kind in [
            InvalidationKind::ScheduleStyle,
            InvalidationKind::StyleInvalidator,
            InvalidationKind::StyleRecalc,
        ] {
            // Synthetic records may be appended while walking.
            let mut i = 0;
            while let Some(index) = self.by_kind.get(&kind).and_then(|list| list.get(i)).copied() {
                self.associate_with_last_recalc_style(index);
                i += 1;
            }
        }
    }

    fn associate_with_last_recalc_style(&mut self, index: usize) {
        if self.records[index].linked_to_recalc {
            return;
        }
        let Some(pass) = self.last_recalc_style.clone() else {
            return;
        };
        match self.records[index].kind {
            InvalidationKind::StyleInvalidator => {
                self.add_synthetic_style_recalc_invalidations(&pass, index)
            }
            // Only used to enrich invalidator records.
            InvalidationKind::ScheduleStyle => {}
            _ => self.link(pass.id, &pass.frame, index),
        }
        self.records[index].linked_to_recalc = true;
    }

    fn add_synthetic_style_recalc_invalidations(&mut self, pass: &RecalcPass, index: usize) {
        let invalidator = &self.records[index];
        let Some(list) = invalidator.invalidation_list.clone() else {
            self.add_synthetic_style_recalc_invalidation(index, index);
            return;
        };
        let Some(node_id) = invalidator.node_id else {
            tracing::warn!(ts = invalidator.start_time, "invalidation lacks node information");
            return;
        };
        for entry in &list {
            let set_id = entry.get("id").and_then(crate::tracing_model::value_key);
            let schedule = self.by_node.get(&node_id).and_then(|candidates| {
                candidates.iter().rev().copied().find(|candidate| {
                    let c = &self.records[*candidate];
                    c.kind == InvalidationKind::ScheduleStyle
                        && c.frame == pass.frame
                        && c.invalidation_set == set_id
                })
            });
            match schedule {
                Some(schedule) => self.add_synthetic_style_recalc_invalidation(schedule, index),
                None => tracing::warn!(
                    ts = self.records[index].start_time,
                    "failed to look up the event that scheduled a style invalidator invalidation"
                ),
            }
        }
    }

    fn add_synthetic_style_recalc_invalidation(&mut self, base: usize, invalidator: usize) {
        let mut synthetic = self.records[base].clone();
        synthetic.kind = InvalidationKind::StyleRecalc;
        synthetic.linked_to_recalc = false;
        synthetic.linked_to_layout = false;
        let source = &self.records[invalidator];
        if let Some(reason) = &source.cause.reason {
            synthetic.cause.reason = Some(reason.clone());
        }
        if let Some(part) = &source.selector_part {
            synthetic.selector_part = Some(part.clone());
        }
        let index = self.push(synthetic);
        self.track(index);
        self.associate_with_last_recalc_style(index);
    }

    pub fn did_layout(&mut self, id: EventId, event: &Event) {
        let pass = Pass::of(id, event);
        let pending = self
            .by_kind
            .get(&InvalidationKind::Layout)
            .cloned()
            .unwrap_or_default();
        for index in pending {
            if self.records[index].linked_to_layout {
                continue;
            }
            self.link(pass.id, pass.frame, index);
            self.records[index].linked_to_layout = true;
        }
    }

    pub fn did_paint(&mut self) {
        self.did_paint = true;
    }

    fn link(&mut self, event: EventId, frame: &str, index: usize) {
        if self.records[index].frame != frame {
            return;
        }
        self.links.entry(event).or_default().push(index);
    }

    /// Invalidations linked to a style recalc or layout event, in link order.
    pub fn invalidations_for(&self, event: EventId) -> impl Iterator<Item = &InvalidationRecord> {
        self.links
            .get(&event)
            .into_iter()
            .flatten()
            .map(|index| &self.records[*index])
    }

    fn start_new_frame_if_needed(&mut self) {
        if !self.did_paint {
            return;
        }
        self.by_kind.clear();
        self.by_node.clear();
        self.last_recalc_style = None;
        self.did_paint = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracing_model::{Categories, ThreadKey};
    use chrome_trace_format::Phase;
    use rstest::{fixture, rstest};
    use serde_json::json;
    use std::sync::Arc;

    fn event(name: &str, start: f64, end: Option<f64>, args: Value) -> Event {
        let mut event = Event::new(
            Arc::new(Categories::parse("disabled-by-default-devtools.timeline.invalidationTracking")),
            name,
            Phase::Instant,
            start,
            ThreadKey::new(1, 1),
        );
        event.add_args(args.as_object().unwrap());
        if let Some(end) = end {
            event.set_end_time(end);
        }
        event
    }

    fn record(id: u32, name: &str, start: f64, data: Value) -> InvalidationRecord {
        InvalidationRecord::from_event(EventId(id), &event(name, start, None, json!({ "data": data })))
            .unwrap()
    }

    fn recalc(start: f64, end: f64) -> Event {
        event(
            "UpdateLayoutTree",
            start,
            Some(end),
            json!({"beginData": {"frame": "F"}}),
        )
    }

    #[fixture]
    fn tracker() -> InvalidationTracker {
        InvalidationTracker::new()
    }

    #[rstest]
    fn layout_reason_is_synthesized_from_stack() {
        let forced = record(
            0,
            "LayoutInvalidationTracking",
            1.0,
            json!({"nodeId": 3, "frame": "F", "stackTrace": [{"functionName": "f"}]}),
        );
        assert_eq!(forced.cause.reason.as_deref(), Some("Layout forced"));

        let style = record(
            0,
            "StyleRecalcInvalidationTracking",
            1.0,
            json!({"nodeId": 3, "frame": "F", "stackTrace": [{"functionName": "f"}]}),
        );
        assert_eq!(style.cause.reason, None);
    }

    #[rstest]
    fn style_invalidations_link_once(mut tracker: InvalidationTracker) {
        tracker.add_invalidation(record(
            0,
            "StyleRecalcInvalidationTracking",
            1.0,
            json!({"nodeId": 3, "frame": "F", "reason": "Class change"}),
        ));
        let pass = recalc(2.0, 3.0);
        tracker.did_recalc_style(EventId(10), &pass);
        tracker.did_recalc_style(EventId(10), &pass);
        let linked: Vec<_> = tracker.invalidations_for(EventId(10)).collect();
        assert_eq!(linked.len(), 1);
        assert!(linked[0].linked_to_recalc());
        assert_eq!(linked[0].cause.reason.as_deref(), Some("Class change"));
    }

    #[rstest]
    fn other_frames_are_not_linked(mut tracker: InvalidationTracker) {
        tracker.add_invalidation(record(
            0,
            "StyleRecalcInvalidationTracking",
            1.0,
            json!({"nodeId": 3, "frame": "other"}),
        ));
        tracker.did_recalc_style(EventId(10), &recalc(2.0, 3.0));
        assert_eq!(tracker.invalidations_for(EventId(10)).count(), 0);
    }

    #[rstest]
    fn records_without_node_are_dropped(mut tracker: InvalidationTracker) {
        tracker.add_invalidation(record(
            0,
            "LayoutInvalidationTracking",
            1.0,
            json!({"frame": "F"}),
        ));
        let layout = event("Layout", 2.0, Some(3.0), json!({"beginData": {"frame": "F"}}));
        tracker.did_layout(EventId(11), &layout);
        assert_eq!(tracker.invalidations_for(EventId(11)).count(), 0);
    }

    #[rstest]
    fn layout_links_pending_records(mut tracker: InvalidationTracker) {
        tracker.add_invalidation(record(
            0,
            "LayoutInvalidationTracking",
            1.0,
            json!({"nodeId": 4, "frame": "F", "reason": "Added"}),
        ));
        let layout = event("Layout", 2.0, Some(3.0), json!({"beginData": {"frame": "F"}}));
        tracker.did_layout(EventId(11), &layout);
        tracker.did_layout(EventId(12), &layout);
        assert_eq!(tracker.invalidations_for(EventId(11)).count(), 1);
        assert_eq!(tracker.invalidations_for(EventId(12)).count(), 0);
    }

    #[rstest]
    fn invalidator_records_become_synthetic_recalc_records(mut tracker: InvalidationTracker) {
        tracker.add_invalidation(record(
            0,
            "ScheduleStyleInvalidationTracking",
            1.0,
            json!({"nodeId": 5, "frame": "F", "invalidationSet": 77, "changedClass": "active"}),
        ));
        tracker.add_invalidation(record(
            1,
            "StyleInvalidatorInvalidationTracking",
            1.5,
            json!({
                "nodeId": 5,
                "frame": "F",
                "reason": "Invalidation set matched class",
                "selectorPart": ".active",
                "invalidationList": [{"id": 77}]
            }),
        ));
        tracker.did_recalc_style(EventId(10), &recalc(2.0, 3.0));
        let linked: Vec<_> = tracker.invalidations_for(EventId(10)).collect();
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].kind, InvalidationKind::StyleRecalc);
        assert_eq!(linked[0].event, EventId(0));
        assert_eq!(linked[0].changed_class.as_deref(), Some("active"));
        assert_eq!(linked[0].selector_part.as_deref(), Some(".active"));
        assert_eq!(
            linked[0].cause.reason.as_deref(),
            Some("Invalidation set matched class")
        );
    }

    #[rstest]
    fn paint_starts_a_new_frame(mut tracker: InvalidationTracker) {
        tracker.add_invalidation(record(
            0,
            "LayoutInvalidationTracking",
            1.0,
            json!({"nodeId": 4, "frame": "F"}),
        ));
        tracker.did_paint();
        tracker.add_invalidation(record(
            1,
            "LayoutInvalidationTracking",
            5.0,
            json!({"nodeId": 4, "frame": "F"}),
        ));
        let layout = event("Layout", 6.0, Some(7.0), json!({"beginData": {"frame": "F"}}));
        tracker.did_layout(EventId(11), &layout);
        let linked: Vec<_> = tracker.invalidations_for(EventId(11)).map(|r| r.event).collect();
        assert_eq!(linked, vec![EventId(1)]);
    }

    #[rstest]
    fn links_outlive_their_frame(mut tracker: InvalidationTracker) {
        tracker.add_invalidation(record(
            0,
            "StyleRecalcInvalidationTracking",
            1.0,
            json!({"nodeId": 3, "frame": "F"}),
        ));
        tracker.did_recalc_style(EventId(10), &recalc(2.0, 3.0));
        tracker.did_paint();
        tracker.add_invalidation(record(
            1,
            "StyleRecalcInvalidationTracking",
            5.0,
            json!({"nodeId": 3, "frame": "F"}),
        ));
        tracker.did_recalc_style(EventId(20), &recalc(6.0, 7.0));

        let first: Vec<_> = tracker.invalidations_for(EventId(10)).map(|r| r.event).collect();
        let second: Vec<_> = tracker.invalidations_for(EventId(20)).map(|r| r.event).collect();
        assert_eq!(first, vec![EventId(0)]);
        assert_eq!(second, vec![EventId(1)]);
    }
}
