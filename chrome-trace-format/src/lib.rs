// Copyright (C) 2025 Category Labs, Inc.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! # Chrome Trace Format
//!
//! Input types for the Chrome Trace Event Format as captured by Chrome's
//! performance panel and `chrome://tracing`.
//!
//! ## Containers
//!
//! A captured trace arrives in one of three shapes, all handled by [`TraceFile`]:
//! - **JSON Array Format**: a bare array of trace events
//! - **JSON Object Format**: an object whose `traceEvents` holds the events
//! - **CPU profile**: a standalone V8 `.cpuprofile` object (see [`cpu_profile`])
//!
//! ## Records
//!
//! Every event is read into a flat [`TraceRecord`]. Conversion happens one
//! record at a time so a single malformed entry produces a [`FormatError`]
//! for that entry only and the rest of the trace stays usable.
//!
//! ## Timestamps
//!
//! `ts` and `dur` are microseconds and may carry a fractional part.

pub mod cpu_profile;

use std::fmt;
use std::io::Read;

use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use cpu_profile::{CallFrame, LegacyProfileNode, PositionTick, Profile, ProfileNode};

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("json parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed trace record at index {index}: {reason}")]
    MalformedRecord { index: usize, reason: String },

    #[error("unrecognized trace container: expected an event array, a traceEvents object or a cpu profile")]
    UnrecognizedContainer,
}

/// A captured trace file in any of the supported container shapes.
///
/// Events are kept as raw JSON values until [`TraceFile::into_records`] so
/// that one bad record does not reject the whole file.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TraceFile {
    /// JSON Array Format.
    Events(Vec<Value>),
    /// JSON Object Format.
    Object(ChromeTrace),
    /// Standalone V8 CPU profile.
    CpuProfile(Profile),
}

/// The JSON Object Format container.
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
pub struct ChromeTrace {
    /// The array of trace events. Events need not be sorted.
    #[serde(rename = "traceEvents")]
    pub trace_events: Vec<Value>,

    /// Unit for displaying timestamps ("ms" or "ns").
    #[serde(rename = "displayTimeUnit", skip_serializing_if = "Option::is_none")]
    pub display_time_unit: Option<String>,

    /// General metadata for the trace.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl TraceFile {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, FormatError> {
        let file: TraceFile = serde_json::from_slice(bytes)?;
        file.validated()
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, FormatError> {
        let file: TraceFile = serde_json::from_reader(reader)?;
        file.validated()
    }

    fn validated(self) -> Result<Self, FormatError> {
        match &self {
            TraceFile::CpuProfile(profile) if profile.nodes.is_none() && profile.head.is_none() => {
                Err(FormatError::UnrecognizedContainer)
            }
            _ => Ok(self),
        }
    }

    /// Raw event values, empty for a standalone CPU profile.
    pub fn into_events(self) -> Vec<Value> {
        match self {
            TraceFile::Events(events) => events,
            TraceFile::Object(trace) => trace.trace_events,
            TraceFile::CpuProfile(_) => Vec::new(),
        }
    }

    /// Converts every raw event into a [`TraceRecord`], keeping per-record errors.
    pub fn into_records(self) -> impl Iterator<Item = Result<TraceRecord, FormatError>> {
        self.into_events()
            .into_iter()
            .enumerate()
            .map(|(index, value)| TraceRecord::from_value(index, value))
    }
}

/// One flat entry of a captured trace.
///
/// The record is never mutated after parsing; the analysis layer copies what
/// it needs into its own event objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
pub struct TraceRecord {
    /// Comma-separated category list.
    #[serde(default)]
    #[builder(default, into)]
    pub cat: String,
    /// Event name.
    #[serde(default)]
    #[builder(default, into)]
    pub name: String,
    /// Event phase.
    pub ph: Phase,
    /// Process ID.
    pub pid: u32,
    /// Thread ID.
    #[serde(default)]
    #[builder(default)]
    pub tid: u32,
    /// Timestamp in microseconds.
    #[serde(default)]
    #[builder(default)]
    pub ts: f64,
    /// Duration in microseconds, complete events only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dur: Option<f64>,
    /// Free-form argument bag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
    /// Correlation id for async, sample and object events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
    /// Explicitly scoped id, exactly one of `global` or `local`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id2: Option<Id2>,
    /// Namespace for `id`/`id2`.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[builder(into)]
    pub scope: Option<String>,
    /// Flow binding id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_id: Option<Id>,
}

impl TraceRecord {
    /// Parses a raw event value; `index` is only used for error reporting.
    pub fn from_value(index: usize, value: Value) -> Result<Self, FormatError> {
        serde_json::from_value(value).map_err(|e| FormatError::MalformedRecord {
            index,
            reason: e.to_string(),
        })
    }

    /// The argument bag as an object, if it is one.
    pub fn args_object(&self) -> Option<&serde_json::Map<String, Value>> {
        self.args.as_ref().and_then(Value::as_object)
    }
}

/// Event phase types that determine the kind of event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Begin phase of a duration event, paired with `E`.
    #[serde(rename = "B")]
    DurationBegin,
    /// End phase of a duration event.
    #[serde(rename = "E")]
    DurationEnd,
    /// Begin and end in one record, with `dur`.
    #[serde(rename = "X")]
    Complete,
    /// Instant event.
    #[serde(rename = "i")]
    Instant,
    /// Legacy instant event phase, still emitted by Blink.
    #[serde(rename = "I")]
    InstantDeprecated,
    /// Counter sample.
    #[serde(rename = "C")]
    Counter,
    /// Legacy async begin, keyed by category, name and id.
    #[serde(rename = "S")]
    AsyncBegin,
    /// Legacy async step into.
    #[serde(rename = "T")]
    AsyncStepInto,
    /// Legacy async step past.
    #[serde(rename = "p")]
    AsyncStepPast,
    /// Legacy async end.
    #[serde(rename = "F")]
    AsyncEnd,
    /// Nestable async begin, keyed by category and id.
    #[serde(rename = "b")]
    NestableAsyncBegin,
    /// Nestable async instant.
    #[serde(rename = "n")]
    NestableAsyncInstant,
    /// Nestable async end.
    #[serde(rename = "e")]
    NestableAsyncEnd,
    /// Flow start.
    #[serde(rename = "s")]
    FlowBegin,
    /// Flow step.
    #[serde(rename = "t")]
    FlowStep,
    /// Flow end.
    #[serde(rename = "f")]
    FlowEnd,
    /// Sampling profiler payload (`Profile` and `ProfileChunk`).
    #[serde(rename = "P")]
    Sample,
    /// Object creation.
    #[serde(rename = "N")]
    ObjectCreated,
    /// Object destruction.
    #[serde(rename = "D")]
    ObjectDestroyed,
    /// Object snapshot, carries `args.snapshot`.
    #[serde(rename = "O")]
    ObjectSnapshot,
    /// Process and thread metadata.
    #[serde(rename = "M")]
    Metadata,
    /// Global memory dump.
    #[serde(rename = "V")]
    GlobalMemoryDump,
    /// Process memory dump.
    #[serde(rename = "v")]
    ProcessMemoryDump,
    /// Navigation timing mark.
    #[serde(rename = "R")]
    Mark,
    /// Clock synchronization.
    #[serde(rename = "c")]
    ClockSync,
    /// Enter a context.
    #[serde(rename = "(")]
    ContextEnter,
    /// Leave a context.
    #[serde(rename = ")")]
    ContextLeave,
    /// Link two ids together.
    #[serde(rename = "=")]
    LinkedId,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::DurationBegin => "B",
            Phase::DurationEnd => "E",
            Phase::Complete => "X",
            Phase::Instant => "i",
            Phase::InstantDeprecated => "I",
            Phase::Counter => "C",
            Phase::AsyncBegin => "S",
            Phase::AsyncStepInto => "T",
            Phase::AsyncStepPast => "p",
            Phase::AsyncEnd => "F",
            Phase::NestableAsyncBegin => "b",
            Phase::NestableAsyncInstant => "n",
            Phase::NestableAsyncEnd => "e",
            Phase::FlowBegin => "s",
            Phase::FlowStep => "t",
            Phase::FlowEnd => "f",
            Phase::Sample => "P",
            Phase::ObjectCreated => "N",
            Phase::ObjectDestroyed => "D",
            Phase::ObjectSnapshot => "O",
            Phase::Metadata => "M",
            Phase::GlobalMemoryDump => "V",
            Phase::ProcessMemoryDump => "v",
            Phase::Mark => "R",
            Phase::ClockSync => "c",
            Phase::ContextEnter => "(",
            Phase::ContextLeave => ")",
            Phase::LinkedId => "=",
        }
    }

    pub fn is_instant(self) -> bool {
        matches!(self, Phase::Instant | Phase::InstantDeprecated)
    }

    pub fn is_nestable_async(self) -> bool {
        matches!(
            self,
            Phase::NestableAsyncBegin | Phase::NestableAsyncInstant | Phase::NestableAsyncEnd
        )
    }

    pub fn is_async(self) -> bool {
        self.is_nestable_async()
            || matches!(
                self,
                Phase::AsyncBegin | Phase::AsyncStepInto | Phase::AsyncStepPast | Phase::AsyncEnd
            )
    }

    pub fn is_async_begin(self) -> bool {
        matches!(self, Phase::AsyncBegin | Phase::NestableAsyncBegin)
    }

    pub fn is_async_end(self) -> bool {
        matches!(self, Phase::AsyncEnd | Phase::NestableAsyncEnd)
    }

    pub fn is_flow(self) -> bool {
        matches!(self, Phase::FlowBegin | Phase::FlowStep | Phase::FlowEnd)
    }

    /// Phases whose timestamp marks real work starting on a thread.
    pub fn starts_work(self) -> bool {
        matches!(self, Phase::DurationBegin | Phase::Complete) || self.is_instant()
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event identifier, either a string (often a hex address) or a number.
/// Numbers keep their JSON form, so negative and fractional ids survive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    String(String),
    Number(serde_json::Number),
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::String(s) => f.write_str(s),
            Id::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for Id {
    fn from(value: &str) -> Self {
        Id::String(value.to_string())
    }
}

impl From<u64> for Id {
    fn from(value: u64) -> Self {
        Id::Number(value.into())
    }
}

impl From<i64> for Id {
    fn from(value: i64) -> Self {
        Id::Number(value.into())
    }
}

/// Explicitly scoped id. Exactly one of the two components is expected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Builder)]
pub struct Id2 {
    /// Shared across processes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global: Option<Id>,
    /// Local to the emitting process.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local: Option<Id>,
}

/// Metadata event names for process and thread information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataName {
    #[serde(rename = "thread_name")]
    ThreadName,
    #[serde(rename = "thread_sort_index")]
    ThreadSortIndex,
    #[serde(rename = "process_name")]
    ProcessName,
    #[serde(rename = "process_labels")]
    ProcessLabels,
    #[serde(rename = "process_sort_index")]
    ProcessSortIndex,
    #[serde(rename = "process_uptime_seconds")]
    ProcessUptimeSeconds,
}

impl MetadataName {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "thread_name" => Some(MetadataName::ThreadName),
            "thread_sort_index" => Some(MetadataName::ThreadSortIndex),
            "process_name" => Some(MetadataName::ProcessName),
            "process_labels" => Some(MetadataName::ProcessLabels),
            "process_sort_index" => Some(MetadataName::ProcessSortIndex),
            "process_uptime_seconds" => Some(MetadataName::ProcessUptimeSeconds),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn parses_array_container() {
        let bytes = br#"[
            {"name": "RunTask", "cat": "toplevel", "ph": "X", "ts": 10.5, "dur": 4, "pid": 1, "tid": 2},
            {"name": "thread_name", "ph": "M", "pid": 1, "tid": 2, "args": {"name": "CrRendererMain"}}
        ]"#;
        let records: Vec<_> = TraceFile::from_slice(bytes)
            .unwrap()
            .into_records()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].ph, Phase::Complete);
        assert_eq!(records[0].ts, 10.5);
        assert_eq!(records[0].dur, Some(4.0));
        assert_eq!(records[1].ph, Phase::Metadata);
        assert_eq!(records[1].args_object().unwrap()["name"], "CrRendererMain");
    }

    #[test]
    fn parses_object_container() {
        let bytes = br#"{"traceEvents": [{"name": "a", "ph": "B", "ts": 1, "pid": 1, "tid": 1}], "metadata": {"source": "test"}}"#;
        let file = TraceFile::from_slice(bytes).unwrap();
        assert!(matches!(file, TraceFile::Object(_)));
        assert_eq!(file.into_events().len(), 1);
    }

    #[test]
    fn parses_cpu_profile_container() {
        let bytes = br#"{"nodes": [{"id": 1, "callFrame": {"functionName": "(root)", "scriptId": 0, "url": "", "lineNumber": -1, "columnNumber": -1}}], "startTime": 0, "endTime": 10, "samples": [1], "timeDeltas": [5]}"#;
        let file = TraceFile::from_slice(bytes).unwrap();
        let TraceFile::CpuProfile(profile) = file else {
            panic!("expected cpu profile container");
        };
        assert_eq!(profile.nodes.unwrap()[0].call_frame.as_ref().unwrap().script_id, "0");
    }

    #[test]
    fn rejects_unknown_object() {
        let result = TraceFile::from_slice(br#"{"something": 1}"#);
        assert!(matches!(result, Err(FormatError::UnrecognizedContainer)));
    }

    #[test]
    fn malformed_record_is_isolated() {
        let file = TraceFile::Events(vec![
            json!({"name": "ok", "ph": "X", "ts": 0, "dur": 1, "pid": 1, "tid": 1}),
            json!({"name": "no phase", "ts": 0, "pid": 1, "tid": 1}),
            json!({"name": "ok too", "ph": "i", "ts": 2, "pid": 1, "tid": 1}),
        ]);
        let results: Vec<_> = file.into_records().collect();
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(FormatError::MalformedRecord { index: 1, .. })
        ));
        assert!(results[2].is_ok());
    }

    #[test]
    fn signed_and_fractional_ids_keep_the_record() {
        let file = TraceFile::Events(vec![
            json!({"name": "a", "ph": "b", "cat": "c", "ts": 0, "pid": 1, "tid": 1, "id": -7}),
            json!({"name": "b", "ph": "O", "ts": 1, "pid": 1, "tid": 1, "id": 2.5}),
        ]);
        let ids: Vec<String> = file
            .into_records()
            .map(|record| record.unwrap().id.unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["-7", "2.5"]);
    }

    #[rstest]
    #[case(json!("0x1f"), Id::String("0x1f".into()), "0x1f")]
    #[case(json!(42), Id::from(42u64), "42")]
    #[case(json!(-3), Id::from(-3i64), "-3")]
    #[case(json!(1.5), Id::Number(serde_json::Number::from_f64(1.5).unwrap()), "1.5")]
    fn id_accepts_string_or_number(#[case] raw: Value, #[case] expected: Id, #[case] shown: &str) {
        let id: Id = serde_json::from_value(raw).unwrap();
        assert_eq!(id, expected);
        assert_eq!(id.to_string(), shown);
    }

    #[rstest]
    #[case(Phase::AsyncBegin, true, false, true)]
    #[case(Phase::AsyncStepPast, true, false, false)]
    #[case(Phase::NestableAsyncBegin, true, true, true)]
    #[case(Phase::NestableAsyncInstant, true, true, false)]
    #[case(Phase::Complete, false, false, false)]
    #[case(Phase::FlowBegin, false, false, false)]
    fn phase_classification(
        #[case] phase: Phase,
        #[case] is_async: bool,
        #[case] nestable: bool,
        #[case] begin: bool,
    ) {
        assert_eq!(phase.is_async(), is_async);
        assert_eq!(phase.is_nestable_async(), nestable);
        assert_eq!(phase.is_async_begin(), begin);
    }

    #[test]
    fn builder_fills_defaults() {
        let record = TraceRecord::builder()
            .name("Layout")
            .ph(Phase::DurationBegin)
            .pid(3)
            .build();
        assert_eq!(record.cat, "");
        assert_eq!(record.tid, 0);
        assert_eq!(record.ts, 0.0);
        assert!(record.args.is_none());
    }

    #[test]
    fn metadata_names() {
        assert_eq!(
            MetadataName::parse("thread_name"),
            Some(MetadataName::ThreadName)
        );
        assert_eq!(MetadataName::parse("stackFrames"), None);
    }
}
