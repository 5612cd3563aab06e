//! Initiator/cause correlation for asynchronous operations.
//!
//! An initiator (`TimerInstall`, `ResourceSendRequest`, ...) is remembered
//! under the value of its join field; a later cause carrying the same value is
//! linked back to it.

use std::collections::HashMap;

use crate::record_type;
use crate::tracing_model::{Event, EventId};

/// One initiator kind: the cause names it triggers and the `data` field that
/// joins them.
#[derive(Debug, Clone)]
pub struct AsyncPairing {
    pub initiator: &'static str,
    pub causes: &'static [&'static str],
    pub join_by: &'static str,
}

pub const DEFAULT_PAIRINGS: &[AsyncPairing] = &[
    AsyncPairing {
        initiator: record_type::TIMER_INSTALL,
        causes: &[record_type::TIMER_FIRE],
        join_by: "timerId",
    },
    AsyncPairing {
        initiator: record_type::RESOURCE_SEND_REQUEST,
        causes: &[
            record_type::RESOURCE_RECEIVE_RESPONSE,
            record_type::RESOURCE_RECEIVED_DATA,
            record_type::RESOURCE_FINISH,
        ],
        join_by: "requestId",
    },
    AsyncPairing {
        initiator: record_type::REQUEST_ANIMATION_FRAME,
        causes: &[record_type::FIRE_ANIMATION_FRAME],
        join_by: "id",
    },
    AsyncPairing {
        initiator: record_type::REQUEST_IDLE_CALLBACK,
        causes: &[record_type::FIRE_IDLE_CALLBACK],
        join_by: "id",
    },
    AsyncPairing {
        initiator: record_type::WEB_SOCKET_CREATE,
        causes: &[
            record_type::WEB_SOCKET_SEND_HANDSHAKE_REQUEST,
            record_type::WEB_SOCKET_RECEIVE_HANDSHAKE_RESPONSE,
            record_type::WEB_SOCKET_DESTROY,
        ],
        join_by: "identifier",
    },
];

/// Outcome of feeding one event to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correlation {
    /// Not part of any known pairing, or missing its join field.
    Unrelated,
    /// Remembered as an initiator.
    Initiator,
    /// A cause; carries the matching initiator when one was seen.
    Cause(Option<EventId>),
}

#[derive(Debug)]
pub struct AsyncEventTracker {
    pairings: HashMap<&'static str, &'static AsyncPairing>,
    cause_to_initiator: HashMap<&'static str, &'static str>,
    initiator_by_type: HashMap<&'static str, HashMap<String, EventId>>,
}

impl Default for AsyncEventTracker {
    fn default() -> Self {
        Self::new(DEFAULT_PAIRINGS)
    }
}

impl AsyncEventTracker {
    pub fn new(pairings: &'static [AsyncPairing]) -> Self {
        let mut by_initiator = HashMap::new();
        let mut cause_to_initiator = HashMap::new();
        let mut initiator_by_type = HashMap::new();
        for pairing in pairings {
            by_initiator.insert(pairing.initiator, pairing);
            initiator_by_type.insert(pairing.initiator, HashMap::new());
            for cause in pairing.causes {
                cause_to_initiator.insert(*cause, pairing.initiator);
            }
        }
        Self {
            pairings: by_initiator,
            cause_to_initiator,
            initiator_by_type,
        }
    }

    pub fn process_event(&mut self, id: EventId, event: &Event) -> Correlation {
        let cause_of = self.cause_to_initiator.get(event.name.as_str()).copied();
        let initiator_type = cause_of.unwrap_or(event.name.as_str());
        let Some(pairing) = self.pairings.get(initiator_type).copied() else {
            return Correlation::Unrelated;
        };
        let Some(key) = global_event_id(event, pairing.join_by) else {
            return Correlation::Unrelated;
        };
        let Some(initiators) = self.initiator_by_type.get_mut(pairing.initiator) else {
            return Correlation::Unrelated;
        };
        if cause_of.is_none() {
            initiators.insert(key, id);
            return Correlation::Initiator;
        }
        Correlation::Cause(initiators.get(&key).copied())
    }
}

/// `"{pid}.{value}"` for the `field` of the event's data payload, `None` when
/// the field is missing or falsy.
pub fn global_event_id(event: &Event, field: &str) -> Option<String> {
    let value = event.data().key(field)?;
    Some(format!("{}.{}", event.thread.pid, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracing_model::{Categories, ThreadKey};
    use chrome_trace_format::Phase;
    use rstest::rstest;
    use serde_json::json;
    use std::sync::Arc;

    fn event(name: &str, pid: u32, data: serde_json::Value) -> Event {
        let mut event = Event::new(
            Arc::new(Categories::parse("devtools.timeline")),
            name,
            Phase::Complete,
            0.0,
            ThreadKey::new(pid, 1),
        );
        event.add_args(json!({ "data": data }).as_object().unwrap());
        event
    }

    #[test]
    fn timer_fire_links_to_install() {
        let mut tracker = AsyncEventTracker::default();
        let install = event("TimerInstall", 1, json!({"timerId": 5}));
        let unrelated = event("TimerInstall", 1, json!({"timerId": 6}));
        let fire = event("TimerFire", 1, json!({"timerId": 5}));
        assert_eq!(tracker.process_event(EventId(0), &install), Correlation::Initiator);
        assert_eq!(tracker.process_event(EventId(1), &unrelated), Correlation::Initiator);
        assert_eq!(
            tracker.process_event(EventId(2), &fire),
            Correlation::Cause(Some(EventId(0)))
        );
    }

    #[test]
    fn join_key_is_scoped_by_process() {
        let mut tracker = AsyncEventTracker::default();
        tracker.process_event(
            EventId(0),
            &event("ResourceSendRequest", 1, json!({"requestId": "r1"})),
        );
        let other_process = event("ResourceFinish", 2, json!({"requestId": "r1"}));
        assert_eq!(
            tracker.process_event(EventId(1), &other_process),
            Correlation::Cause(None)
        );
    }

    #[rstest]
    #[case("Layout", json!({"id": 1}))]
    #[case("TimerFire", json!({}))]
    #[case("TimerInstall", json!({"timerId": 0}))]
    fn unknown_or_keyless_events_are_ignored(#[case] name: &str, #[case] data: serde_json::Value) {
        let mut tracker = AsyncEventTracker::default();
        assert_eq!(
            tracker.process_event(EventId(0), &event(name, 1, data)),
            Correlation::Unrelated
        );
    }

    #[test]
    fn global_id_uses_begin_data_fallback() {
        let mut e = Event::new(
            Arc::new(Categories::parse("")),
            "ResourceSendRequest",
            Phase::Instant,
            0.0,
            ThreadKey::new(7, 1),
        );
        e.add_args(json!({"beginData": {"requestId": 12}}).as_object().unwrap());
        assert_eq!(global_event_id(&e, "requestId").as_deref(), Some("7.12"));
    }
}
