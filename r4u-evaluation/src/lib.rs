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

//! Evaluation Orchestrator (spec §4.H).

mod config;
mod evaluate;
mod target_metrics;
mod test_case;

pub use config::{
    create_or_update_evaluation_config, get_all_project_graders, get_evaluation_config,
};
pub use evaluate::{create_evaluation, execute_in_background};
pub use target_metrics::calculate_target_metrics;
pub use test_case::{
    create_test_case, delete_test_case, get_test_case, list_test_cases, update_test_case,
    TestCaseUpdate,
};
