// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Off-thread base64 codec (§4.9), modeled as a dedicated single-threaded
//! worker reached only by job-id-correlated message passing, matching the
//! "separate single-threaded context" §5 calls for rather than a shared
//! thread pool. A `HashMap<job id, oneshot::Sender>` plays the role of the
//! postMessage-era id-matching table: replies arrive on one channel and are
//! routed back to the caller awaiting that specific id.

use base64::Engine;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

const JOB_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("worker job timed out")]
    Timeout,
    #[error("worker crashed before replying")]
    Crashed,
    #[error("worker job failed: {0}")]
    Failed(String),
}

#[derive(Debug)]
enum WorkerJob {
    StringToArrayBufferBase64(String),
    ArrayBufferToStringBase64(Vec<u8>),
}

#[derive(Debug)]
enum WorkerValue {
    Bytes(Vec<u8>),
    Text(String),
}

struct WorkerRequest {
    id: Uuid,
    job: WorkerJob,
}

struct WorkerReply {
    id: Uuid,
    result: Result<WorkerValue, String>,
}

type PendingJobs = Arc<Mutex<HashMap<Uuid, oneshot::Sender<Result<WorkerValue, WorkerError>>>>>;

/// Handle to the running worker. Cloning shares the same background thread
/// and pending-job table.
#[derive(Clone)]
pub struct Base64Worker {
    requests: mpsc::UnboundedSender<WorkerRequest>,
    pending: PendingJobs,
}

impl Base64Worker {
    pub fn spawn() -> Self {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        let pending: PendingJobs = Arc::new(Mutex::new(HashMap::new()));

        std::thread::spawn(move || worker_thread_loop(request_rx, reply_tx));

        let router_pending = pending.clone();
        tokio::spawn(route_replies(reply_rx, router_pending));

        Base64Worker {
            requests: request_tx,
            pending,
        }
    }

    pub async fn string_to_array_buffer_base64(
        &self,
        s: impl Into<String>,
    ) -> Result<Vec<u8>, WorkerError> {
        match self
            .call_worker(WorkerJob::StringToArrayBufferBase64(s.into()))
            .await?
        {
            WorkerValue::Bytes(b) => Ok(b),
            WorkerValue::Text(_) => unreachable!("job kind determines reply kind"),
        }
    }

    pub async fn array_buffer_to_string_base64(
        &self,
        bytes: Vec<u8>,
    ) -> Result<String, WorkerError> {
        match self
            .call_worker(WorkerJob::ArrayBufferToStringBase64(bytes))
            .await?
        {
            WorkerValue::Text(s) => Ok(s),
            WorkerValue::Bytes(_) => unreachable!("job kind determines reply kind"),
        }
    }

    async fn call_worker(&self, job: WorkerJob) -> Result<WorkerValue, WorkerError> {
        let id = Uuid::new_v4();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id, reply_tx);

        if self.requests.send(WorkerRequest { id, job }).is_err() {
            self.pending.lock().unwrap().remove(&id);
            return Err(WorkerError::Crashed);
        }

        match tokio::time::timeout(JOB_TIMEOUT, reply_rx).await {
            Ok(Ok(result)) => result,
            // Sender dropped without replying: the router drained this
            // job's slot on worker shutdown.
            Ok(Err(_)) => Err(WorkerError::Crashed),
            // The job entry stays in `pending`; a late reply still routes
            // and is simply dropped since nothing awaits `reply_rx` anymore.
            Err(_) => Err(WorkerError::Timeout),
        }
    }
}

async fn route_replies(mut reply_rx: mpsc::UnboundedReceiver<WorkerReply>, pending: PendingJobs) {
    while let Some(WorkerReply { id, result }) = reply_rx.recv().await {
        if let Some(tx) = pending.lock().unwrap().remove(&id) {
            let _ = tx.send(result.map_err(WorkerError::Failed));
        }
    }

    // The worker thread's sender dropped: it crashed or was torn down.
    // Reject every job still waiting rather than leaving them hanging.
    let stragglers: Vec<_> = pending.lock().unwrap().drain().collect();
    for (_, tx) in stragglers {
        let _ = tx.send(Err(WorkerError::Crashed));
    }
}

fn worker_thread_loop(
    mut requests: mpsc::UnboundedReceiver<WorkerRequest>,
    reply_tx: mpsc::UnboundedSender<WorkerReply>,
) {
    while let Some(WorkerRequest { id, job }) = requests.blocking_recv() {
        let result = match job {
            WorkerJob::StringToArrayBufferBase64(s) => base64::engine::general_purpose::STANDARD
                .decode(s.as_bytes())
                .map(WorkerValue::Bytes)
                .map_err(|e| e.to_string()),
            WorkerJob::ArrayBufferToStringBase64(bytes) => Ok(WorkerValue::Text(
                base64::engine::general_purpose::STANDARD.encode(bytes),
            )),
        };
        if reply_tx.send(WorkerReply { id, result }).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_through_both_directions() {
        let worker = Base64Worker::spawn();
        let bytes = worker
            .string_to_array_buffer_base64("aGVsbG8=")
            .await
            .unwrap();
        assert_eq!(bytes, b"hello");

        let encoded = worker
            .array_buffer_to_string_base64(b"hello".to_vec())
            .await
            .unwrap();
        assert_eq!(encoded, "aGVsbG8=");
    }

    #[tokio::test]
    async fn invalid_base64_surfaces_as_a_failed_job_not_a_panic() {
        let worker = Base64Worker::spawn();
        let err = worker
            .string_to_array_buffer_base64("not valid base64!!")
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Failed(_)));
    }

    #[tokio::test]
    async fn concurrent_jobs_route_replies_back_to_the_right_caller() {
        let worker = Base64Worker::spawn();
        let a = worker.array_buffer_to_string_base64(vec![1, 2, 3]);
        let b = worker.array_buffer_to_string_base64(vec![4, 5, 6]);
        let (a, b) = tokio::join!(a, b);
        assert_eq!(a.unwrap(), base64::engine::general_purpose::STANDARD.encode([1, 2, 3]));
        assert_eq!(b.unwrap(), base64::engine::general_purpose::STANDARD.encode([4, 5, 6]));
    }
}
