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

//! Trace Clusterer & Template Inferrer (§4.C) and Task Auto-Creator (§4.D).

mod autocreate;
mod cluster;

pub use autocreate::auto_create;
pub use cluster::{cluster_candidates, infer_template, ClusterCandidate, MIN_CLUSTER_SIZE};
