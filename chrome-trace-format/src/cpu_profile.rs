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

//! V8 CPU profile payloads.
//!
//! Two layouts exist in the wild:
//! - the current flat layout, with `nodes` carrying `callFrame` and either
//!   `children` or `parent` links, timestamps in microseconds and sample
//!   spacing in `timeDeltas`
//! - the legacy layout, with a nested `head` tree, times in seconds and
//!   absolute `timestamps`
//!
//! Both deserialize into [`Profile`]; interpretation is left to the analysis
//! layer.

use bon::Builder;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Builder)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default)]
    #[builder(default)]
    pub start_time: f64,
    #[serde(default)]
    #[builder(default)]
    pub end_time: f64,
    /// Flat node list, current layout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<ProfileNode>>,
    /// Nested root, legacy layout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head: Option<LegacyProfileNode>,
    /// Leaf node id per sample.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub samples: Option<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_deltas: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamps: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines: Option<Vec<i64>>,
}

/// A node of the flat layout.
///
/// Older flat profiles put the frame fields directly on the node instead of
/// under `callFrame`; both are accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Builder)]
#[serde(rename_all = "camelCase")]
pub struct ProfileNode {
    pub id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_frame: Option<CallFrame>,
    #[serde(default)]
    #[builder(default, into)]
    pub function_name: String,
    #[serde(default, deserialize_with = "deserialize_script_id")]
    #[builder(default, into)]
    pub script_id: String,
    #[serde(default)]
    #[builder(default, into)]
    pub url: String,
    #[serde(default)]
    #[builder(default)]
    pub line_number: i64,
    #[serde(default)]
    #[builder(default)]
    pub column_number: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hit_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_ticks: Option<Vec<PositionTick>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deopt_reason: Option<String>,
}

/// A node of the legacy nested layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyProfileNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_frame: Option<CallFrame>,
    #[serde(default)]
    pub function_name: String,
    #[serde(default, deserialize_with = "deserialize_script_id")]
    pub script_id: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub line_number: i64,
    #[serde(default)]
    pub column_number: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hit_count: Option<u32>,
    #[serde(default)]
    pub children: Vec<LegacyProfileNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deopt_reason: Option<String>,
}

/// Source location of a profiled function. Line and column are zero-based,
/// `-1` when unknown.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Builder)]
#[serde(rename_all = "camelCase")]
pub struct CallFrame {
    #[builder(into)]
    pub function_name: String,
    #[serde(default, deserialize_with = "deserialize_script_id")]
    #[builder(default, into)]
    pub script_id: String,
    #[serde(default)]
    #[builder(default, into)]
    pub url: String,
    #[serde(default = "default_line")]
    #[builder(default = -1)]
    pub line_number: i64,
    #[serde(default = "default_line")]
    #[builder(default = -1)]
    pub column_number: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionTick {
    pub line: i64,
    pub ticks: u64,
}

fn default_line() -> i64 {
    -1
}

fn deserialize_script_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value: Value = Deserialize::deserialize(deserializer)?;
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        _ => Err(D::Error::custom("expected string or number for scriptId")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flat_profile_with_parent_links() {
        let profile: Profile = serde_json::from_value(json!({
            "startTime": 1000,
            "endTime": 11000,
            "nodes": [
                {"id": 1, "callFrame": {"functionName": "(root)", "scriptId": "0", "url": ""}},
                {"id": 2, "parent": 1, "callFrame": {"functionName": "main", "scriptId": 7, "url": "a.js", "lineNumber": 3, "columnNumber": 1}}
            ],
            "samples": [2, 2],
            "timeDeltas": [0, 100]
        }))
        .unwrap();
        let nodes = profile.nodes.unwrap();
        assert_eq!(nodes[1].parent, Some(1));
        let frame = nodes[1].call_frame.as_ref().unwrap();
        assert_eq!(frame.script_id, "7");
        assert_eq!(frame.line_number, 3);
        assert_eq!(nodes[0].call_frame.as_ref().unwrap().line_number, -1);
        assert_eq!(profile.time_deltas.unwrap(), vec![0.0, 100.0]);
    }

    #[test]
    fn legacy_profile_with_nested_head() {
        let profile: Profile = serde_json::from_value(json!({
            "startTime": 1.5,
            "endTime": 2.5,
            "head": {
                "functionName": "(root)",
                "scriptId": 0,
                "children": [{"functionName": "(program)", "hitCount": 4}]
            }
        }))
        .unwrap();
        let head = profile.head.unwrap();
        assert_eq!(head.children.len(), 1);
        assert_eq!(head.children[0].hit_count, Some(4));
        assert!(profile.nodes.is_none());
    }

    #[test]
    fn rejects_bad_script_id() {
        let result: Result<CallFrame, _> =
            serde_json::from_value(json!({"functionName": "f", "scriptId": [1]}));
        assert!(result.is_err());
    }
}
