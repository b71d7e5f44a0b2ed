//! Crawl frontier
//!
//! Priority queue of pending crawl tasks. Lower priority values are crawled
//! first; among equal priorities, insertion order wins, so the frontier is
//! deterministic regardless of heap internals.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A URL queued for crawling
#[derive(Debug, Clone)]
pub struct CrawlTask {
    pub url: String,
    /// 1 = highest, 10 = lowest
    pub priority: u32,
    pub depth: u32,
    /// What the link pointing here claimed to be (api, registry, rss, ...)
    pub source_type: Option<String>,
}

#[derive(Debug)]
struct QueuedTask {
    task: CrawlTask,
    seq: u64,
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse comparison so lower priority values come first, then
        // lower sequence numbers (FIFO within a priority band)
        other
            .task
            .priority
            .cmp(&self.task.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.task.priority == other.task.priority && self.seq == other.seq
    }
}

impl Eq for QueuedTask {}

/// Priority frontier with deterministic FIFO tie-breaking
#[derive(Debug, Default)]
pub struct Frontier {
    heap: BinaryHeap<QueuedTask>,
    next_seq: u64,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, task: CrawlTask) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(QueuedTask { task, seq });
    }

    pub fn pop(&mut self) -> Option<CrawlTask> {
        self.heap.pop().map(|queued| queued.task)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(url: &str, priority: u32) -> CrawlTask {
        CrawlTask {
            url: url.to_string(),
            priority,
            depth: 0,
            source_type: None,
        }
    }

    #[test]
    fn test_lower_priority_value_pops_first() {
        let mut frontier = Frontier::new();
        frontier.push(task("https://e/low", 7));
        frontier.push(task("https://e/high", 1));
        frontier.push(task("https://e/mid", 3));

        assert_eq!(frontier.pop().unwrap().url, "https://e/high");
        assert_eq!(frontier.pop().unwrap().url, "https://e/mid");
        assert_eq!(frontier.pop().unwrap().url, "https://e/low");
    }

    #[test]
    fn test_equal_priority_is_fifo() {
        let mut frontier = Frontier::new();
        frontier.push(task("https://e/first", 5));
        frontier.push(task("https://e/second", 5));
        frontier.push(task("https://e/third", 5));

        assert_eq!(frontier.pop().unwrap().url, "https://e/first");
        assert_eq!(frontier.pop().unwrap().url, "https://e/second");
        assert_eq!(frontier.pop().unwrap().url, "https://e/third");
    }

    #[test]
    fn test_fifo_survives_interleaved_priorities() {
        let mut frontier = Frontier::new();
        frontier.push(task("https://e/a", 5));
        frontier.push(task("https://e/urgent", 1));
        frontier.push(task("https://e/b", 5));

        assert_eq!(frontier.pop().unwrap().url, "https://e/urgent");
        assert_eq!(frontier.pop().unwrap().url, "https://e/a");
        assert_eq!(frontier.pop().unwrap().url, "https://e/b");
    }

    #[test]
    fn test_empty_frontier() {
        let mut frontier = Frontier::new();
        assert!(frontier.is_empty());
        assert!(frontier.pop().is_none());
    }
}
