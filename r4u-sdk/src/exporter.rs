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

//! Background batching exporter (spec §4.K): an unbounded, multi-producer
//! single-consumer queue drained roughly every second, submitting each
//! `HTTPTrace` in order and never blocking callers on [`Exporter::submit`].

use crate::types::HttpTracePayload;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

const DRAIN_INTERVAL: Duration = Duration::from_secs(1);
const SHUTDOWN_FLUSH_GRACE: Duration = Duration::from_millis(1100);

/// Configuration for the trace exporter.
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    /// Base URL of the ingest server; traces POST to `{base_url}/http-traces`.
    pub base_url: String,
    pub request_timeout: Duration,
}

impl ExporterConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Handle callers hold to enqueue traces. Cloning shares the same queue —
/// the queue is multi-producer/single-consumer (spec §5).
#[derive(Clone)]
pub struct Exporter {
    sender: mpsc::UnboundedSender<HttpTracePayload>,
}

impl Exporter {
    /// Spawn the background worker and return a handle to it.
    pub fn spawn(config: ExporterConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .expect("failed to build exporter HTTP client");
        tokio::spawn(run_worker(client, config.base_url, receiver));
        Self { sender }
    }

    /// Enqueue a trace. Never blocks: backed by an unbounded channel, so a
    /// slow or unreachable server never stalls the instrumented call site.
    pub fn submit(&self, trace: HttpTracePayload) {
        if self.sender.send(trace).is_err() {
            warn!("exporter worker is gone, trace dropped");
        }
    }

    /// Sleep briefly to let the worker flush whatever is queued, then drop
    /// this handle's sender so the worker's channel closes (spec §4.K "on
    /// process shutdown, sleeps briefly to flush, then stops").
    pub async fn shutdown(self) {
        tokio::time::sleep(SHUTDOWN_FLUSH_GRACE).await;
        drop(self.sender);
    }
}

async fn run_worker(client: reqwest::Client, base_url: String, mut receiver: mpsc::UnboundedReceiver<HttpTracePayload>) {
    let endpoint = format!("{}/http-traces", base_url.trim_end_matches('/'));
    let mut ticker = tokio::time::interval(DRAIN_INTERVAL);

    loop {
        ticker.tick().await;

        let mut drained = Vec::new();
        while let Ok(trace) = receiver.try_recv() {
            drained.push(trace);
        }
        for trace in drained {
            if let Err(err) = client.post(&endpoint).json(&trace).send().await {
                warn!(error = %err, url = %trace.url, "failed to submit trace, dropping");
                continue;
            }
        }

        if receiver.is_closed() && receiver.try_recv().is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn submit_never_blocks_without_a_reachable_server() {
        let exporter = Exporter::spawn(ExporterConfig::new("http://127.0.0.1:1"));
        for i in 0..5 {
            exporter.submit(HttpTracePayload {
                project: "acme".into(),
                url: format!("https://api.openai.com/v1/chat/completions?{i}"),
                method: "POST".into(),
                started_at: 0,
                completed_at: 1,
                status_code: Some(200),
                error: None,
                request: b"{}".to_vec(),
                request_headers: Default::default(),
                response: b"{}".to_vec(),
                response_headers: Default::default(),
                metadata: serde_json::json!({}),
                path: None,
                is_streaming: false,
                streaming_response: None,
                implementation_id: None,
            });
        }
        // submit() returning at all (without hanging) is the property under test.
        exporter.shutdown().await;
    }
}
