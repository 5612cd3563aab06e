use std::collections::HashMap;

use serde_json::{Map, Value};

/// One process that hosted a frame from `time` on.
#[derive(Debug, Clone, PartialEq)]
pub struct PageFrameProcess {
    pub time: f64,
    /// `-1` until a pseudo id is resolved by a process-ready notification.
    pub process_id: i64,
    pub process_pseudo_id: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct PageFrame {
    pub frame_id: String,
    pub url: String,
    pub name: Option<String>,
    pub processes: Vec<PageFrameProcess>,
    pub deleted_time: Option<f64>,
    parent: Option<usize>,
    children: Vec<usize>,
}

fn str_field(payload: &Map<String, Value>, key: &str) -> Option<String> {
    payload.get(key).and_then(Value::as_str).map(str::to_string)
}

impl PageFrame {
    pub fn new(payload: &Map<String, Value>) -> Self {
        Self {
            frame_id: str_field(payload, "frame").unwrap_or_default(),
            url: str_field(payload, "url").unwrap_or_default(),
            name: str_field(payload, "name"),
            processes: Vec::new(),
            deleted_time: None,
            parent: None,
            children: Vec::new(),
        }
    }

    /// Records that the frame was (re)committed at `time`.
    pub fn update(&mut self, time: f64, payload: &Map<String, Value>) {
        self.url = str_field(payload, "url").unwrap_or_default();
        self.name = str_field(payload, "name");
        let process_id = payload
            .get("processId")
            .and_then(Value::as_i64)
            .filter(|pid| *pid != 0);
        self.processes.push(PageFrameProcess {
            time,
            process_id: process_id.unwrap_or(-1),
            process_pseudo_id: if process_id.is_some() {
                String::new()
            } else {
                str_field(payload, "processPseudoId").unwrap_or_default()
            },
            url: self.url.clone(),
        });
    }

    /// Resolves a pending pseudo process id to the real process id.
    pub fn process_ready(&mut self, process_pseudo_id: &str, process_id: i64) {
        for process in &mut self.processes {
            if process.process_pseudo_id == process_pseudo_id {
                process.process_pseudo_id.clear();
                process.process_id = process_id;
            }
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Frames indexed by id, with parent/child links by position.
#[derive(Debug, Default)]
pub struct PageFrameTree {
    frames: Vec<PageFrame>,
    by_id: HashMap<String, usize>,
}

impl PageFrameTree {
    pub fn insert(&mut self, frame: PageFrame, parent: Option<usize>) -> usize {
        let index = self.frames.len();
        self.by_id.insert(frame.frame_id.clone(), index);
        self.frames.push(frame);
        if let Some(parent) = parent {
            self.frames[index].parent = Some(parent);
            self.frames[parent].children.push(index);
        }
        index
    }

    pub fn index_of(&self, frame_id: &str) -> Option<usize> {
        self.by_id.get(frame_id).copied()
    }

    pub fn contains(&self, frame_id: &str) -> bool {
        self.by_id.contains_key(frame_id)
    }

    pub fn get(&self, frame_id: &str) -> Option<&PageFrame> {
        self.index_of(frame_id).map(|index| &self.frames[index])
    }

    pub fn get_mut(&mut self, frame_id: &str) -> Option<&mut PageFrame> {
        self.index_of(frame_id).map(|index| &mut self.frames[index])
    }

    pub fn frame(&self, index: usize) -> &PageFrame {
        &self.frames[index]
    }

    pub fn frame_mut(&mut self, index: usize) -> &mut PageFrame {
        &mut self.frames[index]
    }

    pub fn parent(&self, frame: &PageFrame) -> Option<&PageFrame> {
        frame.parent.map(|index| &self.frames[index])
    }

    pub fn children<'a>(&'a self, frame: &'a PageFrame) -> impl Iterator<Item = &'a PageFrame> {
        frame.children.iter().map(|index| &self.frames[*index])
    }

    /// Frames in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &PageFrame> {
        self.frames.iter()
    }

    pub fn root_frames(&self) -> impl Iterator<Item = &PageFrame> {
        self.frames.iter().filter(|frame| frame.is_root())
    }

    pub fn first_root(&self) -> Option<usize> {
        self.frames.iter().position(PageFrame::is_root)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn pseudo_process_ids_resolve() {
        let mut frame = PageFrame::new(&payload(json!({"frame": "F1", "url": "a"})));
        frame.update(1.0, &payload(json!({"frame": "F1", "url": "a", "processPseudoId": "0x1"})));
        frame.update(2.0, &payload(json!({"frame": "F1", "url": "b", "processId": 7})));
        frame.process_ready("0x1", 9);
        assert_eq!(frame.url, "b");
        let pids: Vec<i64> = frame.processes.iter().map(|p| p.process_id).collect();
        assert_eq!(pids, vec![9, 7]);
        assert!(frame.processes.iter().all(|p| p.process_pseudo_id.is_empty()));
    }

    #[test]
    fn tree_links_parents_and_children() {
        let mut tree = PageFrameTree::default();
        let root = tree.insert(PageFrame::new(&payload(json!({"frame": "main"}))), None);
        tree.insert(PageFrame::new(&payload(json!({"frame": "child"}))), Some(root));
        let child = tree.get("child").unwrap();
        assert_eq!(tree.parent(child).unwrap().frame_id, "main");
        let roots: Vec<&str> = tree.root_frames().map(|f| f.frame_id.as_str()).collect();
        assert_eq!(roots, vec!["main"]);
        assert_eq!(tree.children(tree.frame(root)).count(), 1);
    }
}
