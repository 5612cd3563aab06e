use std::cmp::Ordering;
use std::collections::HashMap;

use super::event::{EventId, ThreadKey};

fn compare_named(a_index: i64, a_name: &str, b_index: i64, b_name: &str) -> Ordering {
    a_index.cmp(&b_index).then_with(|| a_name.cmp(b_name))
}

#[derive(Debug)]
pub struct Thread {
    key: ThreadKey,
    name: String,
    sort_index: i64,
    pub(crate) events: Vec<EventId>,
    pub(crate) async_events: Vec<EventId>,
    pub(crate) last_top_level: Option<EventId>,
}

impl Thread {
    fn new(key: ThreadKey) -> Self {
        Self {
            key,
            name: String::new(),
            sort_index: 0,
            events: Vec::new(),
            async_events: Vec::new(),
            last_top_level: None,
        }
    }

    pub fn id(&self) -> u32 {
        self.key.tid
    }

    pub fn pid(&self) -> u32 {
        self.key.pid
    }

    pub fn key(&self) -> ThreadKey {
        self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sort_index(&self) -> i64 {
        self.sort_index
    }

    /// Events sorted by start time once tracing is complete.
    pub fn events(&self) -> &[EventId] {
        &self.events
    }

    pub fn async_events(&self) -> &[EventId] {
        &self.async_events
    }

    pub(crate) fn set_sort_index(&mut self, sort_index: i64) {
        self.sort_index = sort_index;
    }
}

/// A traced process. Threads are created on first reference and kept in
/// arrival order.
#[derive(Debug)]
pub struct Process {
    id: u32,
    name: String,
    sort_index: i64,
    threads: Vec<Thread>,
    thread_index: HashMap<u32, usize>,
    thread_by_name: HashMap<String, u32>,
}

impl Process {
    pub(crate) fn new(id: u32) -> Self {
        Self {
            id,
            name: String::new(),
            sort_index: 0,
            threads: Vec::new(),
            thread_index: HashMap::new(),
            thread_by_name: HashMap::new(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sort_index(&self) -> i64 {
        self.sort_index
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub(crate) fn set_sort_index(&mut self, sort_index: i64) {
        self.sort_index = sort_index;
    }

    pub(crate) fn thread_mut(&mut self, tid: u32) -> &mut Thread {
        let index = match self.thread_index.get(&tid) {
            Some(index) => *index,
            None => {
                self.threads.push(Thread::new(ThreadKey::new(self.id, tid)));
                self.thread_index.insert(tid, self.threads.len() - 1);
                self.threads.len() - 1
            }
        };
        &mut self.threads[index]
    }

    pub(crate) fn set_thread_name(&mut self, tid: u32, name: &str) {
        self.thread_mut(tid).name = name.to_string();
        self.thread_by_name.insert(name.to_string(), tid);
    }

    pub fn thread(&self, tid: u32) -> Option<&Thread> {
        self.thread_index.get(&tid).map(|index| &self.threads[*index])
    }

    pub fn thread_by_name(&self, name: &str) -> Option<&Thread> {
        self.thread_by_name.get(name).and_then(|tid| self.thread(*tid))
    }

    pub fn threads(&self) -> impl Iterator<Item = &Thread> {
        self.threads.iter()
    }

    pub(crate) fn threads_mut(&mut self) -> impl Iterator<Item = &mut Thread> {
        self.threads.iter_mut()
    }

    /// Threads ordered by sort index, then name.
    pub fn sorted_threads(&self) -> Vec<&Thread> {
        let mut threads: Vec<&Thread> = self.threads.iter().collect();
        threads.sort_by(|a, b| compare_named(a.sort_index, &a.name, b.sort_index, &b.name));
        threads
    }

    pub(crate) fn compare(a: &Process, b: &Process) -> Ordering {
        compare_named(a.sort_index, &a.name, b.sort_index, &b.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threads_sort_by_index_then_name() {
        let mut process = Process::new(1);
        process.set_thread_name(3, "b");
        process.set_thread_name(1, "c");
        process.set_thread_name(2, "a");
        process.thread_mut(1).set_sort_index(-1);
        let names: Vec<_> = process.sorted_threads().iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[test]
    fn lookup_by_name() {
        let mut process = Process::new(4);
        process.set_thread_name(9, "CrRendererMain");
        let thread = process.thread_by_name("CrRendererMain").unwrap();
        assert_eq!(thread.key(), ThreadKey::new(4, 9));
        assert!(process.thread_by_name("missing").is_none());
    }
}
