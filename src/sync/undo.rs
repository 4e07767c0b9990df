//! Bounded undo history
//!
//! Full snapshots of the record set, captured immediately before each
//! mutation. The stack holds at most ten snapshots; the oldest is evicted
//! on overflow.

use crate::records::LeaveRecord;
use std::collections::VecDeque;

/// Maximum number of snapshots kept
pub const DEFAULT_UNDO_DEPTH: usize = 10;

/// Bounded snapshot stack
#[derive(Debug, Default)]
pub struct UndoManager {
    stack: VecDeque<Vec<LeaveRecord>>,
    depth: usize,
}

impl UndoManager {
    /// Create a manager with the default depth
    pub fn new() -> Self {
        Self::with_depth(DEFAULT_UNDO_DEPTH)
    }

    /// Create a manager with a custom depth
    pub fn with_depth(depth: usize) -> Self {
        Self {
            stack: VecDeque::with_capacity(depth),
            depth,
        }
    }

    /// Push a pre-mutation snapshot, evicting the oldest beyond capacity
    pub fn record(&mut self, previous_state: Vec<LeaveRecord>) {
        if self.stack.len() == self.depth {
            self.stack.pop_front();
        }
        self.stack.push_back(previous_state);
    }

    /// Pop the most recent snapshot
    pub fn undo(&mut self) -> Option<Vec<LeaveRecord>> {
        self.stack.pop_back()
    }

    /// Number of snapshots currently held
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    /// Whether the history is empty
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}
