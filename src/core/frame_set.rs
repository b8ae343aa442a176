//! Resident frame set: admission order plus O(1) membership.
//!
//! The deque records which side a frame was admitted on (back while playing
//! forward, front while playing backward); eviction pops from the opposite end.

use std::collections::{HashSet, VecDeque};

#[derive(Debug, Default, Clone)]
pub struct FrameSet {
    order: VecDeque<i32>,
    members: HashSet<i32>,
}

impl FrameSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, frame: i32) -> bool {
        self.members.contains(&frame)
    }

    pub fn front(&self) -> Option<i32> {
        self.order.front().copied()
    }

    pub fn back(&self) -> Option<i32> {
        self.order.back().copied()
    }

    /// Returns false if the frame is already present.
    pub fn push_back(&mut self, frame: i32) -> bool {
        if !self.members.insert(frame) {
            return false;
        }
        self.order.push_back(frame);
        true
    }

    /// Returns false if the frame is already present.
    pub fn push_front(&mut self, frame: i32) -> bool {
        if !self.members.insert(frame) {
            return false;
        }
        self.order.push_front(frame);
        true
    }

    pub fn pop_front(&mut self) -> Option<i32> {
        let frame = self.order.pop_front()?;
        self.members.remove(&frame);
        Some(frame)
    }

    pub fn pop_back(&mut self) -> Option<i32> {
        let frame = self.order.pop_back()?;
        self.members.remove(&frame);
        Some(frame)
    }

    /// Remove an arbitrary frame. O(n) in the deque, only used off the hot path.
    pub fn remove(&mut self, frame: i32) -> bool {
        if !self.members.remove(&frame) {
            return false;
        }
        if let Some(pos) = self.order.iter().position(|&f| f == frame) {
            self.order.remove(pos);
        }
        true
    }

    /// Empty the set, returning frames in admission order.
    pub fn drain(&mut self) -> Vec<i32> {
        self.members.clear();
        self.order.drain(..).collect()
    }

    /// Frames in deque order (front to back).
    pub fn iter(&self) -> impl Iterator<Item = i32> + '_ {
        self.order.iter().copied()
    }

    /// Sorted copy, handy for assertions and status displays.
    pub fn sorted(&self) -> Vec<i32> {
        let mut frames: Vec<i32> = self.order.iter().copied().collect();
        frames.sort_unstable();
        frames
    }

    /// Both views hold exactly the same frames.
    pub fn is_consistent(&self) -> bool {
        self.order.len() == self.members.len()
            && self.order.iter().all(|f| self.members.contains(f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_both_ends() {
        let mut set = FrameSet::new();
        assert!(set.push_back(2));
        assert!(set.push_back(3));
        assert!(set.push_front(1));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![1, 2, 3]);

        assert_eq!(set.pop_front(), Some(1));
        assert_eq!(set.pop_back(), Some(3));
        assert!(!set.contains(1));
        assert!(!set.contains(3));
        assert!(set.contains(2));
        assert!(set.is_consistent());
    }

    #[test]
    fn test_duplicates_rejected() {
        let mut set = FrameSet::new();
        assert!(set.push_back(5));
        assert!(!set.push_back(5));
        assert!(!set.push_front(5));
        assert_eq!(set.len(), 1);
        assert!(set.is_consistent());
    }

    #[test]
    fn test_remove_and_drain_keep_views_consistent() {
        let mut set = FrameSet::new();
        for f in [10, 11, 12, 13] {
            set.push_back(f);
        }
        assert!(set.remove(12));
        assert!(!set.remove(12));
        assert!(set.is_consistent());
        assert_eq!(set.sorted(), vec![10, 11, 13]);

        assert_eq!(set.drain(), vec![10, 11, 13]);
        assert!(set.is_empty());
        assert!(set.is_consistent());
        assert_eq!(set.pop_front(), None);
    }
}
