use std::fmt;
use std::sync::OnceLock;

use serde_json::{Map, Value};

/// Turns the argument bag of a snapshot event into its payload.
pub type SnapshotResolver = fn(&Map<String, Value>) -> Option<Value>;

/// Deferred payload of an object snapshot event.
///
/// The payload is resolved on first access and cached; a failed resolution
/// is cached as `None`.
pub struct ObjectSnapshot {
    resolver: SnapshotResolver,
    cached: OnceLock<Option<Value>>,
}

impl ObjectSnapshot {
    pub fn new() -> Self {
        Self::with_resolver(resolve_snapshot_arg)
    }

    pub fn with_resolver(resolver: SnapshotResolver) -> Self {
        Self {
            resolver,
            cached: OnceLock::new(),
        }
    }

    pub fn object(&self, args: &Map<String, Value>) -> Option<&Value> {
        self.cached.get_or_init(|| (self.resolver)(args)).as_ref()
    }

    pub fn is_resolved(&self) -> bool {
        self.cached.get().is_some()
    }
}

impl Default for ObjectSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ObjectSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectSnapshot")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// Reads `args.snapshot`; string payloads hold serialized JSON.
fn resolve_snapshot_arg(args: &Map<String, Value>) -> Option<Value> {
    match args.get("snapshot")? {
        Value::String(text) => match serde_json::from_str(text) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(error = %e, "unparsable snapshot payload");
                None
            }
        },
        Value::Null => None,
        other => Some(other.clone()),
    }
}
