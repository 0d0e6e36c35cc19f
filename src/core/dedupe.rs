//! 去重：记录本进程内已分发过的提及 ID
//!
//! 轮询窗口会重叠，同一条提及可能在后续拉取中再次出现；已记录的 ID 不再分发。
//! 只增不删，超过容量时按插入顺序淘汰最旧的 ID（容量应大于任何现实的重叠窗口）。

use std::collections::{HashSet, VecDeque};

/// 默认容量
pub const DEFAULT_CAPACITY: usize = 10_000;

/// 已处理提及 ID 集合（有界，FIFO 淘汰）
#[derive(Debug, Clone)]
pub struct DedupeTracker {
    seen: HashSet<String>,
    order: VecDeque<String>,
    /// None 表示不淘汰
    capacity: Option<usize>,
}

impl DedupeTracker {
    /// 最多保留 capacity 个 ID
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: HashSet::new(),
            order: VecDeque::new(),
            capacity: Some(capacity.max(1)),
        }
    }

    /// 不设上限，随进程生命周期增长
    pub fn unbounded() -> Self {
        Self {
            seen: HashSet::new(),
            order: VecDeque::new(),
            capacity: None,
        }
    }

    pub fn has_seen(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// 幂等：已存在的 ID 不会重复入队
    pub fn mark_seen(&mut self, id: impl Into<String>) {
        let id = id.into();
        if self.seen.contains(&id) {
            return;
        }
        self.seen.insert(id.clone());
        self.order.push_back(id);

        if let Some(cap) = self.capacity {
            while self.order.len() > cap {
                if let Some(oldest) = self.order.pop_front() {
                    self.seen.remove(&oldest);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

impl Default for DedupeTracker {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmarked_id_not_seen() {
        let tracker = DedupeTracker::default();
        assert!(!tracker.has_seen("1"));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_marked_id_stays_seen() {
        let mut tracker = DedupeTracker::default();
        tracker.mark_seen("42");
        for _ in 0..5 {
            assert!(tracker.has_seen("42"));
        }
        assert!(!tracker.has_seen("43"));
    }

    #[test]
    fn test_mark_seen_is_idempotent() {
        let mut once = DedupeTracker::new(8);
        once.mark_seen("a");

        let mut twice = DedupeTracker::new(8);
        twice.mark_seen("a");
        twice.mark_seen("a");

        assert_eq!(once.has_seen("a"), twice.has_seen("a"));
        assert_eq!(once.len(), twice.len());
    }

    #[test]
    fn test_eviction_drops_oldest_first() {
        let mut tracker = DedupeTracker::new(3);
        for id in ["1", "2", "3", "4"] {
            tracker.mark_seen(id);
        }
        assert_eq!(tracker.len(), 3);
        assert!(!tracker.has_seen("1"));
        assert!(tracker.has_seen("2"));
        assert!(tracker.has_seen("4"));
    }

    #[test]
    fn test_remarking_does_not_refresh_position() {
        let mut tracker = DedupeTracker::new(2);
        tracker.mark_seen("1");
        tracker.mark_seen("2");
        tracker.mark_seen("1");
        tracker.mark_seen("3");
        assert!(!tracker.has_seen("1"));
        assert!(tracker.has_seen("2"));
        assert!(tracker.has_seen("3"));
    }

    #[test]
    fn test_unbounded_never_evicts() {
        let mut tracker = DedupeTracker::unbounded();
        for i in 0..1000 {
            tracker.mark_seen(i.to_string());
        }
        assert_eq!(tracker.len(), 1000);
        assert!(tracker.has_seen("0"));
        assert_eq!(tracker.capacity(), None);
    }
}
