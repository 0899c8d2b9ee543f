// Copyright 2025 R4U Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use dashmap::DashMap;
use r4u_core::ConversationItem;

/// Per-task optimizer conversation memory (spec §5 "in-process state with
/// process lifetime"). Single-writer per task by convention — the map only
/// guards concurrent access to the map itself, not ordering within one
/// task's history; callers must serialize `run()` calls for the same task.
#[derive(Default)]
pub struct ConversationMemory {
    by_task: DashMap<u64, Vec<ConversationItem>>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears and returns an empty history for `task_id`, matching `run()`'s
    /// "reset at the start" contract.
    pub fn reset(&self, task_id: u64) {
        self.by_task.insert(task_id, Vec::new());
    }

    pub fn push(&self, task_id: u64, item: ConversationItem) {
        self.by_task.entry(task_id).or_default().push(item);
    }

    pub fn history(&self, task_id: u64) -> Vec<ConversationItem> {
        self.by_task.get(&task_id).map(|v| v.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_clears_prior_history() {
        let memory = ConversationMemory::new();
        memory.push(1, ConversationItem::message("user", "hello"));
        assert_eq!(memory.history(1).len(), 1);
        memory.reset(1);
        assert!(memory.history(1).is_empty());
    }

    #[test]
    fn tasks_are_independent() {
        let memory = ConversationMemory::new();
        memory.push(1, ConversationItem::message("user", "a"));
        memory.push(2, ConversationItem::message("user", "b"));
        assert_eq!(memory.history(1).len(), 1);
        assert_eq!(memory.history(2).len(), 1);
    }
}
