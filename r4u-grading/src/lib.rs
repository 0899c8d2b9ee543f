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

//! Grader Runtime (spec §4.F).

mod context;
mod crud;
mod execute;
mod parse;
mod render;

pub use context::{build_context, GradingTarget};
pub use crud::{create_grader, delete_grader, list_graders, update_grader, GraderUpdate};
pub use execute::execute_grading;
pub use parse::parse_grading_response;
pub use render::render_grading_prompt;
