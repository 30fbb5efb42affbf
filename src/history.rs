use std::collections::VecDeque;

pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Bounded snapshot timeline with a cursor. Snapshots are cloned in on
/// `record` and cloned out on `undo`/`redo`, so callers never alias history.
#[derive(Debug, Clone)]
pub struct History<T> {
    entries: VecDeque<T>,
    index: usize,
    limit: usize,
}

impl<T: Clone> History<T> {
    pub fn new(initial: T, limit: usize) -> Self {
        let mut entries = VecDeque::with_capacity(limit.min(64));
        entries.push_back(initial);
        Self {
            entries,
            index: 0,
            limit: limit.max(1),
        }
    }

    pub fn record(&mut self, snapshot: &T) {
        self.entries.truncate(self.index + 1);
        self.entries.push_back(snapshot.clone());
        while self.entries.len() > self.limit {
            self.entries.pop_front();
        }
        self.index = self.entries.len() - 1;
    }

    pub fn undo(&mut self) -> Option<T> {
        if self.index == 0 {
            return None;
        }
        self.index -= 1;
        self.entries.get(self.index).cloned()
    }

    pub fn redo(&mut self) -> Option<T> {
        if self.index + 1 >= self.entries.len() {
            return None;
        }
        self.index += 1;
        self.entries.get(self.index).cloned()
    }

    pub fn current(&self) -> Option<&T> {
        self.entries.get(self.index)
    }

    /// Drops every entry and starts over from `initial`.
    pub fn reset(&mut self, initial: T) {
        self.entries.clear();
        self.entries.push_back(initial);
        self.index = 0;
    }

    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.index + 1 < self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undo_and_redo_stop_at_boundaries() {
        let mut history = History::new(0, 10);
        assert_eq!(history.undo(), None);
        assert_eq!(history.redo(), None);

        history.record(&1);
        history.record(&2);
        assert_eq!(history.undo(), Some(1));
        assert_eq!(history.undo(), Some(0));
        assert_eq!(history.undo(), None);
        assert_eq!(history.redo(), Some(1));
        assert_eq!(history.redo(), Some(2));
        assert_eq!(history.redo(), None);
    }

    #[test]
    fn recording_after_undo_discards_redo_tail() {
        let mut history = History::new(vec!["a"], 10);
        history.record(&vec!["a", "b"]);
        history.record(&vec!["a", "b", "c"]);
        history.undo();
        history.record(&vec!["a", "d"]);
        assert_eq!(history.redo(), None);
        assert_eq!(history.current(), Some(&vec!["a", "d"]));
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn oldest_entries_are_evicted_at_limit() {
        let mut history = History::new(0, 3);
        for value in 1..=5 {
            history.record(&value);
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.index(), 2);
        assert_eq!(history.undo(), Some(4));
        assert_eq!(history.undo(), Some(3));
        assert_eq!(history.undo(), None);
    }

    #[test]
    fn snapshots_are_copied_out() {
        let mut history = History::new(vec![1], 5);
        history.record(&vec![1, 2]);
        let mut restored = history.undo().unwrap();
        restored.push(99);
        assert_eq!(history.current(), Some(&vec![1]));
        assert_eq!(history.redo(), Some(vec![1, 2]));
    }

    #[test]
    fn undo_then_redo_is_a_no_op() {
        let mut history = History::new(String::from("start"), DEFAULT_HISTORY_LIMIT);
        history.record(&String::from("edited"));
        let before = history.current().cloned();
        history.undo();
        history.redo();
        assert_eq!(history.current().cloned(), before);
    }

    #[test]
    fn reset_starts_a_new_timeline() {
        let mut history = History::new(1, 5);
        history.record(&2);
        history.reset(7);
        assert_eq!(history.len(), 1);
        assert!(!history.can_undo());
        assert_eq!(history.current(), Some(&7));
    }
}
