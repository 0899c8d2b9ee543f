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

//! Optimization Loop (spec §4.I).

mod conversation;
mod persist;
mod run;
mod select;
mod variant;

pub use conversation::ConversationMemory;
pub use run::{run, IterationDetail, OptimizationResult};
pub use select::{EvaluationSummary, GraderSummary};
pub use variant::{ChangeableField, VariantSpec};
