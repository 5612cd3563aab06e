//! Call tree and per-sample attribution rebuilt from a V8 CPU profile.
//!
//! Nodes live in an arena; a node's `id` is its index there. Parents always
//! precede their children, which lets totals be accumulated with a single
//! reverse sweep.

use std::collections::HashMap;

use chrome_trace_format::{CallFrame, LegacyProfileNode, PositionTick, Profile, ProfileNode};

use crate::error::{ModelError, Result};

pub const GC_FUNCTION_NAME: &str = "(garbage collector)";
pub const PROGRAM_FUNCTION_NAME: &str = "(program)";
pub const IDLE_FUNCTION_NAME: &str = "(idle)";
pub const ROOT_FUNCTION_NAME: &str = "(root)";

#[derive(Debug, Clone)]
pub struct CpuProfileNode {
    /// Arena index.
    pub id: usize,
    /// Id the node carried in the input profile.
    pub source_id: u32,
    pub call_frame: CallFrame,
    pub call_uid: String,
    pub self_time: f64,
    pub total: f64,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// Root is -1.
    pub depth: i32,
    pub position_ticks: Option<Vec<PositionTick>>,
    pub deopt_reason: Option<String>,
}

impl CpuProfileNode {
    fn new(id: usize, source: &ProfileNode, sample_time: f64, parent: Option<usize>) -> Self {
        let call_frame = source.call_frame.clone().unwrap_or_else(|| CallFrame {
            function_name: source.function_name.clone(),
            script_id: source.script_id.clone(),
            url: source.url.clone(),
            line_number: source.line_number - 1,
            column_number: source.column_number - 1,
        });
        let call_uid = format!(
            "{}@{}:{}:{}",
            call_frame.function_name,
            call_frame.script_id,
            call_frame.line_number,
            call_frame.column_number
        );
        Self {
            id,
            source_id: source.id,
            call_frame,
            call_uid,
            self_time: f64::from(source.hit_count.unwrap_or(0)) * sample_time,
            total: 0.0,
            parent,
            children: Vec::new(),
            depth: 0,
            position_ticks: source.position_ticks.clone(),
            deopt_reason: source
                .deopt_reason
                .clone()
                .filter(|reason| !reason.is_empty() && reason != "no reason"),
        }
    }

    pub fn function_name(&self) -> &str {
        &self.call_frame.function_name
    }

    pub fn script_id(&self) -> &str {
        &self.call_frame.script_id
    }

    pub fn url(&self) -> &str {
        &self.call_frame.url
    }

    pub fn line_number(&self) -> i64 {
        self.call_frame.line_number
    }

    pub fn column_number(&self) -> i64 {
        self.call_frame.column_number
    }
}

/// Receives frames opened and closed by [`CpuProfileModel::for_each_frame`].
pub trait FrameVisitor {
    fn open_frame(&mut self, depth: i32, node: &CpuProfileNode, start_time: f64);

    fn close_frame(
        &mut self,
        depth: i32,
        node: &CpuProfileNode,
        start_time: f64,
        duration: f64,
        self_time: f64,
    );
}

#[derive(Debug, Clone)]
pub struct CpuProfileModel {
    nodes: Vec<CpuProfileNode>,
    pub profile_start_time: f64,
    pub profile_end_time: f64,
    /// Sample times in milliseconds, one more than the samples when known.
    pub timestamps: Vec<f64>,
    /// Leaf node per sample, as arena indices.
    pub samples: Option<Vec<usize>>,
    pub lines: Option<Vec<i64>>,
    pub total_hit_count: u64,
    pub max_depth: i32,
    pub total: f64,
    pub gc_node: Option<usize>,
    pub program_node: Option<usize>,
    pub idle_node: Option<usize>,
}

impl CpuProfileModel {
    pub fn new(mut profile: Profile) -> Result<Self> {
        let legacy = profile.head.is_some();
        let (start, end, timestamps) = if legacy {
            // Legacy profiles use seconds and absolute timestamps.
            flatten_legacy_head(&mut profile);
            (
                profile.start_time * 1000.0,
                profile.end_time * 1000.0,
                profile.timestamps.take(),
            )
        } else {
            (
                profile.start_time / 1000.0,
                profile.end_time / 1000.0,
                convert_time_deltas(&profile),
            )
        };

        let source_nodes = profile.nodes.take().unwrap_or_default();
        if source_nodes.is_empty() {
            return Err(ModelError::InvalidProfile("profile has no nodes".to_string()));
        }

        let mut model = Self {
            nodes: Vec::with_capacity(source_nodes.len()),
            profile_start_time: start,
            profile_end_time: end,
            timestamps: Vec::new(),
            samples: None,
            lines: profile.lines.take(),
            total_hit_count: 0,
            max_depth: 0,
            total: 0.0,
            gc_node: None,
            program_node: None,
            idle_node: None,
        };

        let source_samples = profile.samples.take();
        model.translate_profile_tree(source_nodes, source_samples)?;
        model.assign_depths();
        model.calculate_totals();
        model.extract_meta_nodes();

        if let Some(samples) = model.samples.take() {
            let (samples, timestamps) = sort_samples(samples, timestamps);
            model.samples = Some(samples);
            model.normalize_timestamps(timestamps);
            model.fix_missing_samples();
        }
        Ok(model)
    }

    fn translate_profile_tree(
        &mut self,
        mut nodes: Vec<ProfileNode>,
        samples: Option<Vec<u32>>,
    ) -> Result<()> {
        let by_id: HashMap<u32, usize> = nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (node.id, index))
            .collect();

        if nodes[0].hit_count.is_none() {
            let Some(samples) = samples.as_ref() else {
                return Err(ModelError::MissingHitCountsAndSamples);
            };
            for node in nodes.iter_mut() {
                node.hit_count = Some(0);
            }
            for id in samples {
                match by_id.get(id) {
                    Some(index) => {
                        let node = &mut nodes[*index];
                        node.hit_count = Some(node.hit_count.unwrap_or(0) + 1);
                    }
                    None => tracing::warn!(id, "sample refers to an unknown profile node"),
                }
            }
        }

        if nodes[0].children.is_none() {
            nodes[0].children = Some(Vec::new());
            for index in 1..nodes.len() {
                let id = nodes[index].id;
                let Some(parent) = nodes[index].parent.and_then(|p| by_id.get(&p).copied()) else {
                    tracing::warn!(id, "profile node has no known parent");
                    continue;
                };
                nodes[parent].children.get_or_insert_with(Vec::new).push(id);
            }
        }

        self.total_hit_count = nodes
            .iter()
            .map(|node| u64::from(node.hit_count.unwrap_or(0)))
            .sum();
        let sample_time = if self.total_hit_count > 0 {
            (self.profile_end_time - self.profile_start_time) / self.total_hit_count as f64
        } else {
            0.0
        };

        let mut id_map: HashMap<u32, usize> = HashMap::with_capacity(nodes.len());
        self.nodes.push(CpuProfileNode::new(0, &nodes[0], sample_time, None));
        id_map.insert(nodes[0].id, 0);

        // (source index, parent arena index); reversed so pops follow input order.
        let mut stack: Vec<(usize, usize)> = Vec::new();
        push_children(&mut stack, &nodes[0], &by_id, 0);
        while let Some((source, parent)) = stack.pop() {
            if id_map.contains_key(&nodes[source].id) {
                tracing::warn!(id = nodes[source].id, "profile node reachable twice, skipping");
                continue;
            }
            let id = self.nodes.len();
            self.nodes
                .push(CpuProfileNode::new(id, &nodes[source], sample_time, Some(parent)));
            self.nodes[parent].children.push(id);
            id_map.insert(nodes[source].id, id);
            push_children(&mut stack, &nodes[source], &by_id, id);
        }

        self.samples = samples.map(|samples| {
            samples
                .into_iter()
                .map(|id| {
                    id_map.get(&id).copied().unwrap_or_else(|| {
                        tracing::warn!(id, "sample attributed to root, node id unknown");
                        0
                    })
                })
                .collect()
        });
        Ok(())
    }

    fn assign_depths(&mut self) {
        self.nodes[0].depth = -1;
        self.max_depth = 0;
        for index in 1..self.nodes.len() {
            let depth = self.nodes[index]
                .parent
                .map_or(0, |parent| self.nodes[parent].depth + 1);
            self.nodes[index].depth = depth;
            self.max_depth = self.max_depth.max(depth);
        }
    }

    fn calculate_totals(&mut self) {
        for node in self.nodes.iter_mut() {
            node.total = node.self_time;
        }
        for index in (1..self.nodes.len()).rev() {
            if let Some(parent) = self.nodes[index].parent {
                let total = self.nodes[index].total;
                self.nodes[parent].total += total;
            }
        }
        self.total = self.nodes[0].total;
    }

    fn extract_meta_nodes(&mut self) {
        for &child in &self.nodes[0].children {
            if self.gc_node.is_some() && self.program_node.is_some() && self.idle_node.is_some() {
                break;
            }
            match self.nodes[child].function_name() {
                GC_FUNCTION_NAME => self.gc_node = Some(child),
                PROGRAM_FUNCTION_NAME => self.program_node = Some(child),
                IDLE_FUNCTION_NAME => self.idle_node = Some(child),
                _ => {}
            }
        }
    }

    fn normalize_timestamps(&mut self, timestamps: Option<Vec<f64>>) {
        let sample_count = self.samples.as_ref().map_or(0, Vec::len);
        match timestamps {
            Some(mut timestamps) if !timestamps.is_empty() => {
                for t in timestamps.iter_mut() {
                    *t /= 1000.0;
                }
                if sample_count == timestamps.len() {
                    // No trailing timestamp; extend by the average spacing.
                    let last = timestamps[timestamps.len() - 1];
                    let average = if timestamps.len() > 1 {
                        (last - timestamps[0]) / (timestamps.len() - 1) as f64
                    } else {
                        0.0
                    };
                    timestamps.push(last + average);
                }
                self.profile_start_time = timestamps[0];
                self.profile_end_time = timestamps[timestamps.len() - 1];
                self.timestamps = timestamps;
            }
            _ => {
                // Old profiles without timestamps: spread samples evenly.
                let start = self.profile_start_time;
                if sample_count == 0 {
                    self.timestamps = vec![start];
                    return;
                }
                let interval = (self.profile_end_time - start) / sample_count as f64;
                self.timestamps = (0..=sample_count)
                    .map(|i| start + i as f64 * interval)
                    .collect();
            }
        }
    }

    /// Replaces a lone `(program)` sample between two samples that share the
    /// same bottom frame with the preceding sample. Runs of several program
    /// samples are left alone.
    fn fix_missing_samples(&mut self) {
        let Some(program) = self.program_node else {
            return;
        };
        let gc = self.gc_node;
        let idle = self.idle_node;
        let is_system = |id: usize| id == program || Some(id) == gc || Some(id) == idle;

        let nodes = &self.nodes;
        let bottom_node = |mut id: usize| {
            while let Some(parent) = nodes[id].parent {
                if nodes[parent].parent.is_none() {
                    break;
                }
                id = parent;
            }
            id
        };

        let Some(samples) = self.samples.as_mut() else {
            return;
        };
        if samples.len() < 3 {
            return;
        }

        let mut count = 0;
        let mut prev = samples[0];
        let mut current = samples[1];
        for index in 1..samples.len() - 1 {
            let next = samples[index + 1];
            if current == program
                && !is_system(prev)
                && !is_system(next)
                && bottom_node(prev) == bottom_node(next)
            {
                count += 1;
                samples[index] = prev;
            }
            prev = current;
            current = next;
        }
        if count > 0 {
            tracing::warn!(count, "cpu profile parser is fixing missing samples");
        }
    }

    pub fn root(&self) -> &CpuProfileNode {
        &self.nodes[0]
    }

    pub fn node(&self, id: usize) -> Option<&CpuProfileNode> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> &[CpuProfileNode] {
        &self.nodes
    }

    /// Leaf node of the sample at `index`.
    pub fn node_by_index(&self, index: usize) -> Option<&CpuProfileNode> {
        let id = *self.samples.as_ref()?.get(index)?;
        self.nodes.get(id)
    }

    pub fn is_gc(&self, id: usize) -> bool {
        self.gc_node == Some(id)
    }

    /// Walks samples in time order, opening and closing frames as the sampled
    /// stack changes. Samples before `start_time` are skipped and the walk
    /// stops at `stop_time`.
    pub fn for_each_frame<V: FrameVisitor>(
        &self,
        visitor: &mut V,
        start_time: Option<f64>,
        stop_time: Option<f64>,
    ) {
        let Some(samples) = self.samples.as_ref() else {
            return;
        };
        let start_time = start_time.unwrap_or(0.0);
        let stop_time = stop_time.unwrap_or(f64::INFINITY);
        let timestamps = &self.timestamps;
        let start_index = timestamps.partition_point(|t| *t < start_time);

        let mut stack = FrameStack::new(self.max_depth);
        let mut stack_nodes: Vec<usize> = Vec::new();
        let mut prev_id = 0usize;
        let mut gc_parent: Option<usize> = None;
        let mut sample_index = start_index;

        while sample_index < samples.len() {
            let sample_time = timestamps
                .get(sample_index)
                .copied()
                .unwrap_or(self.profile_end_time);
            if sample_time >= stop_time {
                break;
            }
            let id = samples[sample_index];
            sample_index += 1;
            if id == prev_id {
                continue;
            }

            let mut node = id;
            let mut prev_node = prev_id;

            // GC samples carry no stack; stack the gc node on the last sample.
            if self.is_gc(id) {
                gc_parent = Some(prev_node);
                visitor.open_frame(self.nodes[prev_node].depth + 1, &self.nodes[id], sample_time);
                stack.open(sample_time);
                prev_id = id;
                continue;
            }

            if self.is_gc(prev_node) {
                let parent = gc_parent.take().unwrap_or(0);
                let (start, duration, self_time) = stack.close(sample_time);
                visitor.close_frame(
                    self.nodes[parent].depth + 1,
                    &self.nodes[prev_node],
                    start,
                    duration,
                    self_time,
                );
                prev_node = parent;
            }

            while self.nodes[node].depth > self.nodes[prev_node].depth {
                stack_nodes.push(node);
                node = self.nodes[node].parent.unwrap_or(0);
            }

            // Close frames down to the common ancestor.
            while prev_node != node {
                let (start, duration, self_time) = stack.close(sample_time);
                visitor.close_frame(
                    self.nodes[prev_node].depth,
                    &self.nodes[prev_node],
                    start,
                    duration,
                    self_time,
                );
                if self.nodes[node].depth == self.nodes[prev_node].depth {
                    stack_nodes.push(node);
                    node = self.nodes[node].parent.unwrap_or(0);
                }
                prev_node = self.nodes[prev_node].parent.unwrap_or(0);
            }

            while let Some(open) = stack_nodes.pop() {
                visitor.open_frame(self.nodes[open].depth, &self.nodes[open], sample_time);
                stack.open(sample_time);
            }
            prev_id = id;
        }

        let sample_time = timestamps
            .get(sample_index)
            .copied()
            .unwrap_or(self.profile_end_time);
        if self.is_gc(prev_id) {
            let parent = gc_parent.take().unwrap_or(0);
            let (start, duration, self_time) = stack.close(sample_time);
            visitor.close_frame(
                self.nodes[parent].depth + 1,
                &self.nodes[prev_id],
                start,
                duration,
                self_time,
            );
            prev_id = parent;
        }

        let mut node = prev_id;
        while let Some(parent) = self.nodes[node].parent {
            let (start, duration, self_time) = stack.close(sample_time);
            visitor.close_frame(
                self.nodes[node].depth,
                &self.nodes[node],
                start,
                duration,
                self_time,
            );
            node = parent;
        }
    }
}

/// Start times and accumulated child durations of the open frames.
struct FrameStack {
    start_times: Vec<f64>,
    children_duration: Vec<f64>,
    top: usize,
}

impl FrameStack {
    fn new(max_depth: i32) -> Self {
        // Extra slots for gc on top and one below the root.
        let depth = max_depth.max(0) as usize + 3;
        Self {
            start_times: vec![0.0; depth],
            children_duration: vec![0.0; depth],
            top: 0,
        }
    }

    fn open(&mut self, time: f64) {
        self.top = (self.top + 1).min(self.start_times.len() - 1);
        self.start_times[self.top] = time;
        self.children_duration[self.top] = 0.0;
    }

    /// Returns start, duration and self time of the closed frame.
    fn close(&mut self, time: f64) -> (f64, f64, f64) {
        let top = self.top;
        let start = self.start_times[top];
        let duration = time - start;
        if top > 0 {
            self.children_duration[top - 1] += duration;
        }
        self.top = top.saturating_sub(1);
        (start, duration, duration - self.children_duration[top])
    }
}

fn push_children(
    stack: &mut Vec<(usize, usize)>,
    source: &ProfileNode,
    by_id: &HashMap<u32, usize>,
    parent: usize,
) {
    let Some(children) = source.children.as_ref() else {
        return;
    };
    for child in children.iter().rev() {
        match by_id.get(child) {
            Some(index) => stack.push((*index, parent)),
            None => tracing::warn!(id = child, "profile node child is unknown"),
        }
    }
}

/// Running sum of the deltas, still in microseconds.
fn convert_time_deltas(profile: &Profile) -> Option<Vec<f64>> {
    let deltas = profile.time_deltas.as_ref()?;
    let mut last = profile.start_time;
    Some(
        deltas
            .iter()
            .map(|delta| {
                last += delta;
                last
            })
            .collect(),
    )
}

fn sort_samples(samples: Vec<usize>, timestamps: Option<Vec<f64>>) -> (Vec<usize>, Option<Vec<f64>>) {
    let Some(timestamps) = timestamps else {
        return (samples, None);
    };
    if timestamps.len() != samples.len() {
        tracing::debug!(
            samples = samples.len(),
            timestamps = timestamps.len(),
            "sample and timestamp counts differ, keeping recorded order"
        );
        return (samples, Some(timestamps));
    }
    let mut pairs: Vec<(f64, usize)> = timestamps.into_iter().zip(samples).collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
    let (timestamps, samples) = pairs.into_iter().unzip();
    (samples, Some(timestamps))
}

/// Rewrites a nested legacy `head` into the flat node layout.
fn flatten_legacy_head(profile: &mut Profile) {
    let Some(head) = profile.head.take() else {
        return;
    };
    if profile.nodes.is_some() {
        return;
    }
    let mut next_id = max_legacy_id(&head) + 1;
    let mut nodes = Vec::new();
    let mut stack: Vec<(LegacyProfileNode, usize)> = vec![(head, usize::MAX)];
    while let Some((mut legacy, parent)) = stack.pop() {
        let id = legacy.id.unwrap_or_else(|| {
            let id = next_id;
            next_id += 1;
            id
        });
        let index = nodes.len();
        if parent != usize::MAX {
            let siblings: &mut ProfileNode = &mut nodes[parent];
            siblings.children.get_or_insert_with(Vec::new).push(id);
        }
        let children = std::mem::take(&mut legacy.children);
        nodes.push(ProfileNode {
            id,
            call_frame: legacy.call_frame,
            function_name: legacy.function_name,
            script_id: legacy.script_id,
            url: legacy.url,
            line_number: legacy.line_number,
            column_number: legacy.column_number,
            hit_count: legacy.hit_count,
            children: Some(Vec::new()),
            parent: None,
            position_ticks: None,
            deopt_reason: legacy.deopt_reason,
        });
        for child in children.into_iter().rev() {
            stack.push((child, index));
        }
    }
    profile.nodes = Some(nodes);
}

fn max_legacy_id(head: &LegacyProfileNode) -> u32 {
    let mut max = 0;
    let mut stack = vec![head];
    while let Some(node) = stack.pop() {
        max = max.max(node.id.unwrap_or(0));
        stack.extend(node.children.iter());
    }
    max
}
