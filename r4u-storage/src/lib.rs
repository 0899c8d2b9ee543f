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

//! A transactional key→row store with typed collections.
//!
//! Not backed by an external database: every collection is a `DashMap`
//! guarded by its own id counter, snapshotted to disk as newline-delimited
//! JSON so a server restart can recover state (sync I/O, matching the
//! storage-engine convention this workspace's teacher documents). There is
//! no query planner — callers filter with iterator adapters over
//! `Collection::iter()`, which is adequate at the single-writer scale this
//! pipeline targets (spec §5).

mod collection;
mod snapshot;
mod store;

pub use collection::Collection;
pub use store::Storage;
