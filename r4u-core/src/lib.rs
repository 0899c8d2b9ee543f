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

//! Shared domain model for the R4U observability & improvement pipeline.
//!
//! This crate has no I/O and no async runtime dependency: it is the
//! vocabulary every other `r4u-*` crate builds on (entities from the data
//! model, the tagged conversation-item variants, and the error taxonomy).

pub mod error;
pub mod item;
pub mod model;
pub mod time;

pub use error::{CoreError, CoreResult};
pub use item::{ContentPart, ConversationItem};
pub use model::*;
