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
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// A typed, id-indexed collection backing one entity of the data model.
///
/// Mirrors the `DashMap<K, V>`-keyed registry shape the teacher uses for
/// provider/session registries (`agentreplay-server/src/llm/mod.rs`), but
/// keyed by a server-assigned `u64` id with its own atomic counter rather
/// than a caller-supplied string key.
pub struct Collection<T> {
    rows: DashMap<u64, T>,
    next_id: AtomicU64,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self {
            rows: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }
}

impl<T: Clone> Collection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id without inserting a row (used when a caller
    /// needs the id before the full row is constructed, e.g. to stamp it
    /// into the row itself).
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn insert(&self, id: u64, row: T) {
        self.rows.insert(id, row);
    }

    pub fn get(&self, id: u64) -> Option<T> {
        self.rows.get(&id).map(|r| r.clone())
    }

    pub fn contains(&self, id: u64) -> bool {
        self.rows.contains_key(&id)
    }

    pub fn remove(&self, id: u64) -> Option<T> {
        self.rows.remove(&id).map(|(_, v)| v)
    }

    /// Apply `f` to the row in place, if present. Returns whether a row was
    /// found and updated.
    pub fn update<F: FnOnce(&mut T)>(&self, id: u64, f: F) -> bool {
        if let Some(mut entry) = self.rows.get_mut(&id) {
            f(&mut entry);
            true
        } else {
            false
        }
    }

    pub fn iter(&self) -> Vec<T> {
        self.rows.iter().map(|r| r.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl<T: Clone + Serialize + DeserializeOwned> Collection<T> {
    pub(crate) fn snapshot(&self) -> Vec<(u64, T)> {
        self.rows
            .iter()
            .map(|r| (*r.key(), r.value().clone()))
            .collect()
    }

    pub(crate) fn restore(&self, rows: Vec<(u64, T)>) {
        let mut max_id = 0;
        for (id, row) in rows {
            max_id = max_id.max(id);
            self.rows.insert(id, row);
        }
        self.next_id.store(max_id + 1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_id_is_monotonic() {
        let c: Collection<String> = Collection::new();
        assert_eq!(c.next_id(), 1);
        assert_eq!(c.next_id(), 2);
    }

    #[test]
    fn insert_and_get_round_trip() {
        let c: Collection<String> = Collection::new();
        let id = c.next_id();
        c.insert(id, "hello".to_string());
        assert_eq!(c.get(id), Some("hello".to_string()));
        assert_eq!(c.get(id + 1), None);
    }

    #[test]
    fn restore_advances_counter_past_max_id() {
        let c: Collection<String> = Collection::new();
        c.restore(vec![(5, "a".into()), (2, "b".into())]);
        assert_eq!(c.next_id(), 6);
    }
}
