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

//! Background dispatch for Cluster + Infer + Auto-Create (spec §4.J step 5,
//! §4.C/§4.D). Modeled on the teacher's `IngestionActor` mpsc-channel
//! actor (`agentreplay-server/src/ingestion/actor.rs`), trimmed to a single
//! job type: this pipeline has no embedding batch or governor stage to
//! amortize, so each job just re-clusters one project.

use r4u_storage::Storage;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// One project's worth of newly-unmatched traces is ready to be
/// reclustered.
#[derive(Debug, Clone, Copy)]
pub struct ClusterJob {
    pub project_id: u64,
}

/// Handle to the background clustering actor. Cloning shares the same
/// channel, so every ingest request in a process can enqueue through one
/// handle.
#[derive(Clone)]
pub struct IngestionActorHandle {
    sender: mpsc::Sender<ClusterJob>,
}

impl IngestionActorHandle {
    /// Spawn the actor loop and return a handle to it. `storage` is the
    /// actor's own reference — it never borrows a request's scope (spec §5
    /// "background work owns its own transaction context").
    pub fn spawn(storage: Arc<Storage>) -> Self {
        let (sender, mut receiver) = mpsc::channel::<ClusterJob>(1024);

        tokio::spawn(async move {
            info!("ingestion clustering actor started");
            while let Some(job) = receiver.recv().await {
                debug!(project_id = job.project_id, "running cluster job");
                run_cluster_and_autocreate(&storage, job.project_id);
            }
            info!("ingestion clustering actor shutting down");
        });

        Self { sender }
    }

    /// Enqueue a re-cluster of `project_id`. Never blocks the caller on
    /// backpressure beyond the channel send itself; a full channel signals
    /// the actor has fallen behind, which is surfaced as a warning rather
    /// than dropped silently.
    pub async fn enqueue_cluster_job(&self, project_id: u64) {
        if self.sender.send(ClusterJob { project_id }).await.is_err() {
            warn!(project_id, "clustering actor channel closed, job dropped");
        }
    }
}

/// Run Cluster (§4.C), Infer (§4.C) and Auto-Create (§4.D) once for every
/// still-unmatched trace in `project_id`.
pub fn run_cluster_and_autocreate(storage: &Storage, project_id: u64) {
    let unmatched: Vec<_> = storage
        .traces
        .iter()
        .into_iter()
        .filter(|t| t.project_id == project_id && t.implementation_id.is_none())
        .collect();
    if unmatched.is_empty() {
        return;
    }

    let candidates = r4u_cluster::cluster_candidates(&unmatched);
    for candidate in &candidates {
        if let Some(task_id) = r4u_cluster::auto_create(storage, candidate) {
            info!(project_id, task_id, traces = candidate.trace_ids.len(), "auto-created/bound task from cluster");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use r4u_core::ConversationItem;
    use r4u_core::Trace;

    fn make_trace(storage: &Storage, project_id: u64, text: &str) -> u64 {
        let id = storage.traces.next_id();
        storage.traces.insert(
            id,
            Trace {
                id,
                project_id,
                model: "gpt-4".to_string(),
                path: Some("/api/greet".to_string()),
                input_items: vec![ConversationItem::message("system", text)],
                output_items: vec![],
                tools: None,
                response_schema: None,
                temperature: None,
                max_tokens: None,
                finish_reason: None,
                prompt_tokens: None,
                completion_tokens: None,
                cached_tokens: None,
                reasoning_tokens: None,
                total_tokens: None,
                system_fingerprint: None,
                started_at: 0,
                completed_at: 1,
                error: None,
                implementation_id: None,
                prompt_variables: None,
            },
        );
        id
    }

    #[test]
    fn three_similar_traces_auto_create_one_task() {
        let storage = Storage::in_memory();
        make_trace(&storage, 1, "Greet user Alice politely.");
        make_trace(&storage, 1, "Greet user Bob politely.");
        make_trace(&storage, 1, "Greet user Charlie politely.");

        run_cluster_and_autocreate(&storage, 1);

        assert_eq!(storage.tasks.len(), 1);
        let traces: Vec<_> = storage.traces.iter().into_iter().collect();
        let matched: Vec<_> = traces.iter().filter(|t| t.implementation_id.is_some()).collect();
        assert_eq!(matched.len(), 3);

        let impl_id = matched[0].implementation_id.unwrap();
        let implementation = storage.implementations.get(impl_id).unwrap();
        assert!(implementation.prompt.contains("{{var_"));

        let alice_trace = traces
            .iter()
            .find(|t| t.first_message_text() == Some("Greet user Alice politely."))
            .unwrap();
        let variables = alice_trace.prompt_variables.as_ref().unwrap();
        assert!(variables.values().any(|v| v == "Alice"));
    }

    #[test]
    fn two_similar_traces_create_no_task() {
        let storage = Storage::in_memory();
        make_trace(&storage, 1, "Greet user Alice politely.");
        make_trace(&storage, 1, "Greet user Bob politely.");

        run_cluster_and_autocreate(&storage, 1);

        assert_eq!(storage.tasks.len(), 0);
    }

    #[tokio::test]
    async fn enqueued_job_runs_through_the_spawned_actor() {
        let storage = Arc::new(Storage::in_memory());
        make_trace(&storage, 7, "Greet user Alice politely.");
        make_trace(&storage, 7, "Greet user Bob politely.");
        make_trace(&storage, 7, "Greet user Charlie politely.");

        let handle = IngestionActorHandle::spawn(storage.clone());
        handle.enqueue_cluster_job(7).await;

        // Give the background task a chance to run.
        for _ in 0..50 {
            if storage.tasks.len() > 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(storage.tasks.len(), 1);
    }
}
