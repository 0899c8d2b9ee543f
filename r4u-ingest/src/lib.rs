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

//! Trace Ingest Pipeline (spec §4.J).
//!
//! [`pipeline::ingest_http_trace`] runs the synchronous steps (1-4: persist,
//! parse, match) inline in the request handler; when a trace comes out
//! unmatched, the caller hands its project off to [`actor::IngestionActorHandle`],
//! which runs Cluster+Infer+Auto-Create (§4.C/§4.D) as a background job with
//! its own `Storage` reference, never sharing a request's scope (§5).

mod actor;
mod pipeline;

pub use actor::{run_cluster_and_autocreate, ClusterJob, IngestionActorHandle};
pub use pipeline::{ingest_http_trace, IngestOutcome, IngestRequest};
