// ============================================================================
// UNDO HISTORY - recorded cell changes replayed against a pattern store
// ============================================================================

use std::collections::VecDeque;

use crate::engine::{ChangeRecorder, PatternStore};

// ============================================================================
// COMMAND TRAIT
// ============================================================================

/// Trait for undoable/redoable commands on one pattern.
pub trait Command: Send + Sync {
    fn undo(&self, store: &mut dyn PatternStore);
    fn redo(&self, store: &mut dyn PatternStore);
    fn description(&self) -> String;
    fn memory_size(&self) -> usize;
}

// ============================================================================
// CELL CHANGE LOG - records every cell a paste touches
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CellChange {
    pub x: i32,
    pub y: i32,
    pub old: u8,
    pub new: u8,
}

/// Change recorder that keeps the changes in order.
#[derive(Clone, Debug, Default)]
pub struct CellChangeLog {
    changes: Vec<CellChange>,
}

impl CellChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn changes(&self) -> &[CellChange] {
        &self.changes
    }

    pub fn into_changes(self) -> Vec<CellChange> {
        self.changes
    }
}

impl ChangeRecorder for CellChangeLog {
    fn record_cell_change(&mut self, x: i32, y: i32, old: u8, new: u8) {
        self.changes.push(CellChange { x, y, old, new });
    }
}

// ============================================================================
// PASTE COMMAND - replays recorded cell changes
// ============================================================================

pub struct PasteCommand {
    description: String,
    changes: Vec<CellChange>,
}

impl PasteCommand {
    pub fn new(description: String, log: CellChangeLog) -> Self {
        Self {
            description,
            changes: log.into_changes(),
        }
    }

    pub fn changed_cells(&self) -> usize {
        self.changes.len()
    }
}

impl Command for PasteCommand {
    fn undo(&self, store: &mut dyn PatternStore) {
        // newest first, so a cell written twice ends at its first old state
        for c in self.changes.iter().rev() {
            store.set_cell(c.x, c.y, c.old);
        }
        store.commit_changes();
    }

    fn redo(&self, store: &mut dyn PatternStore) {
        for c in &self.changes {
            store.set_cell(c.x, c.y, c.new);
        }
        store.commit_changes();
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn memory_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.changes.len() * std::mem::size_of::<CellChange>()
    }
}

// ============================================================================
// HISTORY MANAGER - Manages undo/redo stacks with memory limits
// ============================================================================

/// Undo/redo history manager with memory limits.
pub struct HistoryManager {
    undo_stack: VecDeque<Box<dyn Command>>,
    redo_stack: VecDeque<Box<dyn Command>>,
    max_history_size: usize,
    /// Optional memory cap in bytes.
    max_memory_bytes: Option<usize>,
    /// Running memory total across both stacks.
    total_memory: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(100)
    }
}

impl HistoryManager {
    pub fn new(max_history_size: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            max_history_size: max_history_size.max(1),
            max_memory_bytes: Some(64 * 1024 * 1024),
            total_memory: 0,
        }
    }

    pub fn with_memory_limit(mut self, max_bytes: Option<usize>) -> Self {
        self.max_memory_bytes = max_bytes;
        self.prune();
        self
    }

    /// Change the depth limit, dropping the oldest steps that no longer fit.
    pub fn set_max_history(&mut self, max_history_size: usize) {
        self.max_history_size = max_history_size.max(1);
        self.prune();
    }

    pub fn max_history(&self) -> usize {
        self.max_history_size
    }

    pub fn push(&mut self, command: Box<dyn Command>) {
        // a new action invalidates everything that could be redone
        for cmd in self.redo_stack.drain(..) {
            self.total_memory = self.total_memory.saturating_sub(cmd.memory_size());
        }
        self.total_memory += command.memory_size();
        self.undo_stack.push_back(command);
        self.prune();
    }

    pub fn undo(&mut self, store: &mut dyn PatternStore) -> Option<String> {
        let command = self.undo_stack.pop_back()?;
        let description = command.description();
        command.undo(store);
        log::debug!("undo: {}", description);
        self.redo_stack.push_back(command);
        Some(description)
    }

    pub fn redo(&mut self, store: &mut dyn PatternStore) -> Option<String> {
        let command = self.redo_stack.pop_back()?;
        let description = command.description();
        command.redo(store);
        log::debug!("redo: {}", description);
        self.undo_stack.push_back(command);
        Some(description)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_description(&self) -> Option<String> {
        self.undo_stack.back().map(|c| c.description())
    }

    pub fn redo_description(&self) -> Option<String> {
        self.redo_stack.back().map(|c| c.description())
    }

    /// All undo descriptions, most recent first.
    pub fn undo_history(&self) -> Vec<String> {
        self.undo_stack.iter().rev().map(|c| c.description()).collect()
    }

    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    fn prune(&mut self) {
        while self.undo_stack.len() > self.max_history_size {
            if let Some(removed) = self.undo_stack.pop_front() {
                self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
            }
        }
        if let Some(max_bytes) = self.max_memory_bytes {
            while self.total_memory > max_bytes && self.undo_stack.len() > 1 {
                if let Some(removed) = self.undo_stack.pop_front() {
                    self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.total_memory = 0;
    }

    /// Undo `count` steps, stopping early when the stack runs out.
    pub fn undo_to(&mut self, count: usize, store: &mut dyn PatternStore) {
        for _ in 0..count {
            if self.undo(store).is_none() {
                break;
            }
        }
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::SparseGrid;

    fn paste_of(changes: &[(i32, i32, u8, u8)]) -> Box<PasteCommand> {
        let mut log = CellChangeLog::new();
        for &(x, y, old, new) in changes {
            log.record_cell_change(x, y, old, new);
        }
        Box::new(PasteCommand::new("Paste".into(), log))
    }

    #[test]
    fn undo_and_redo_replay_cell_changes() {
        let mut grid = SparseGrid::from_cells(3, [(0, 0, 1)]);
        grid.set_cell(0, 0, 2);
        grid.set_cell(5, 5, 1);
        let mut history = HistoryManager::new(10);
        history.push(paste_of(&[(0, 0, 1, 2), (5, 5, 0, 1)]));

        assert_eq!(history.undo(&mut grid), Some("Paste".to_string()));
        assert_eq!(grid.get_cell(0, 0), 1);
        assert_eq!(grid.get_cell(5, 5), 0);
        assert!(history.can_redo());

        history.redo(&mut grid);
        assert_eq!(grid.get_cell(0, 0), 2);
        assert_eq!(grid.get_cell(5, 5), 1);
    }

    #[test]
    fn depth_limit_drops_oldest() {
        let mut grid = SparseGrid::new(2);
        let mut history = HistoryManager::new(2);
        for i in 0..3 {
            history.push(paste_of(&[(i, 0, 0, 1)]));
        }
        assert_eq!(history.undo_count(), 2);
        history.undo_to(5, &mut grid);
        assert_eq!(history.redo_count(), 2);
        history.push(paste_of(&[(9, 9, 0, 1)]));
        assert_eq!(history.redo_count(), 0);
    }

    #[test]
    fn memory_limit_keeps_latest() {
        let big: Vec<_> = (0..1000).map(|x| (x, 0, 0, 1)).collect();
        let mut history = HistoryManager::new(10).with_memory_limit(Some(1024));
        history.push(paste_of(&big));
        history.push(paste_of(&big));
        assert_eq!(history.undo_count(), 1);
    }
}
