// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Per-receiver serial task chain and arrival-order sequencer (§4.3).
//!
//! `TaskQueue` is the "`pending` future chain": a `tokio::sync::Mutex` is
//! FIFO over its waiters, so calling `add_to_queue` in arrival order and
//! simply awaiting the lock reproduces "task N runs only after task N-1
//! settles" without hand-rolling a linked list of futures. Both a
//! completed and a timed-out task release the lock, so the chain never
//! wedges.
//!
//! `IncomingSequencer` is the `incoming` list: it hands out tickets in
//! arrival order and lets holders do unordered work (decrypt) before
//! blocking on their turn to push onto the `TaskQueue`, which is what
//! guarantees dispatch order matches socket arrival order even though
//! decrypt work itself may finish out of order.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex, Notify, OwnedMutexGuard};

#[derive(Error, Debug)]
pub enum TaskQueueError {
    #[error("task timed out after {0:?}")]
    Timeout(Duration),
    #[error("task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone)]
pub struct TaskQueueConfig {
    pub task_timeout: Duration,
    /// Emit a progress event every this many completed tasks.
    pub progress_every: u64,
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        TaskQueueConfig {
            task_timeout: Duration::from_secs(30),
            progress_every: 10,
        }
    }
}

/// Serial FIFO task chain for one receiver.
pub struct TaskQueue {
    chain: Arc<Mutex<()>>,
    config: TaskQueueConfig,
    completed: AtomicU64,
    on_progress: Option<Arc<dyn Fn(u64) + Send + Sync>>,
}

impl TaskQueue {
    pub fn new(config: TaskQueueConfig) -> Self {
        TaskQueue {
            chain: Arc::new(Mutex::new(())),
            config,
            completed: AtomicU64::new(0),
            on_progress: None,
        }
    }

    pub fn with_progress_handler(mut self, handler: Arc<dyn Fn(u64) + Send + Sync>) -> Self {
        self.on_progress = Some(handler);
        self
    }

    /// Appends `task` to the chain. Resolves once `task` settles (success
    /// or error) or the per-task timeout elapses; either way the chain
    /// advances to the next waiter.
    pub async fn add_to_queue<F, T, E>(&self, task: F) -> Result<T, TaskQueueError>
    where
        F: Future<Output = Result<T, E>>,
        E: std::fmt::Debug,
    {
        let _guard = self.chain.lock().await;
        let result = tokio::time::timeout(self.config.task_timeout, task).await;
        self.note_completed();
        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(TaskQueueError::Task(format!("{e:?}"))),
            Err(_) => Err(TaskQueueError::Timeout(self.config.task_timeout)),
        }
    }

    /// Claims this receiver's chain slot right now, in whatever order
    /// callers happen to call this method in. Hand the returned
    /// [`QueueSlot`] to a task spawned later — its place in the chain is
    /// fixed by this call, not by when the runtime gets around to polling
    /// the spawned future. Needed anywhere the caller must advance an
    /// [`IncomingSequencer`] ticket before the task body itself runs: if
    /// the chain position were only claimed inside the spawned task,
    /// ticket N+1 could be scheduled and lock the chain before ticket N's
    /// detached task ever gets polled.
    pub async fn acquire_slot(self: Arc<Self>) -> QueueSlot {
        let guard = self.chain.clone().lock_owned().await;
        QueueSlot { queue: self, guard }
    }

    fn note_completed(&self) {
        let count = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        if self.config.progress_every > 0 && count % self.config.progress_every == 0 {
            if let Some(handler) = &self.on_progress {
                handler(count);
            }
        }
    }

    pub fn completed_count(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }
}

/// A chain slot already claimed by [`TaskQueue::acquire_slot`], waiting for
/// its task body. Dropping this without calling [`QueueSlot::run`] still
/// releases the chain (the task is simply skipped), the same as any other
/// guard.
pub struct QueueSlot {
    queue: Arc<TaskQueue>,
    guard: OwnedMutexGuard<()>,
}

impl QueueSlot {
    /// Runs `task` in this slot and releases the chain once it settles or
    /// times out, same semantics as [`TaskQueue::add_to_queue`].
    pub async fn run<F, T, E>(self, task: F) -> Result<T, TaskQueueError>
    where
        F: Future<Output = Result<T, E>>,
        E: std::fmt::Debug,
    {
        let result = tokio::time::timeout(self.queue.config.task_timeout, task).await;
        self.queue.note_completed();
        drop(self.guard);
        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(TaskQueueError::Task(format!("{e:?}"))),
            Err(_) => Err(TaskQueueError::Timeout(self.queue.config.task_timeout)),
        }
    }
}

/// Arrival-order sequencer ("the `incoming` list").
pub struct IncomingSequencer {
    next_ticket: AtomicU64,
    current: Mutex<u64>,
    notify: Notify,
}

impl Default for IncomingSequencer {
    fn default() -> Self {
        IncomingSequencer::new()
    }
}

impl IncomingSequencer {
    pub fn new() -> Self {
        IncomingSequencer {
            next_ticket: AtomicU64::new(0),
            current: Mutex::new(0),
            notify: Notify::new(),
        }
    }

    /// Takes the next ticket, in call order.
    pub fn take_ticket(&self) -> u64 {
        self.next_ticket.fetch_add(1, Ordering::SeqCst)
    }

    /// Blocks until every ticket before `ticket` has called [`advance`].
    pub async fn wait_turn(&self, ticket: u64) {
        loop {
            {
                let current = self.current.lock().await;
                if *current == ticket {
                    return;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Releases the next waiter; call after pushing onto the [`TaskQueue`].
    pub async fn advance(&self) {
        let mut current = self.current.lock().await;
        *current += 1;
        self.notify.notify_waiters();
    }

    /// Blocks until every ticket handed out so far has advanced — used by
    /// `onEmpty`/`drain` before appending the terminal task.
    pub async fn wait_all_settled(&self) {
        let target = self.next_ticket.load(Ordering::SeqCst);
        loop {
            {
                let current = self.current.lock().await;
                if *current >= target {
                    return;
                }
            }
            self.notify.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[tokio::test]
    async fn tasks_complete_in_enqueue_order() {
        let queue = Arc::new(TaskQueue::new(TaskQueueConfig::default()));
        let order = Arc::new(StdMutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..5u32 {
            let queue = queue.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                queue
                    .add_to_queue::<_, (), ()>(async {
                        order.lock().unwrap().push(i);
                        Ok(())
                    })
                    .await
                    .unwrap();
            }));
            // Give each spawned task a chance to register as a waiter
            // before the next is spawned, so lock acquisition order
            // matches spawn order.
            tokio::task::yield_now().await;
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn a_later_slot_cannot_be_acquired_until_the_current_one_is_dropped() {
        let queue = Arc::new(TaskQueue::new(TaskQueueConfig::default()));
        let slot0 = queue.clone().acquire_slot().await;

        let queue2 = queue.clone();
        let acquired = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let acquired2 = acquired.clone();
        let waiter = tokio::spawn(async move {
            let _slot1 = queue2.acquire_slot().await;
            acquired2.store(true, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!acquired.load(Ordering::SeqCst));

        drop(slot0);
        waiter.await.unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn acquire_slot_fixes_chain_order_even_when_later_tasks_finish_first() {
        // Unlike `tasks_complete_in_enqueue_order`, nothing here relies on
        // `yield_now` to line up scheduling: each slot is claimed before its
        // task is spawned, so the chain position is fixed the moment
        // `acquire_slot` returns, not whenever the runtime polls the
        // detached task.
        let queue = Arc::new(TaskQueue::new(TaskQueueConfig::default()));
        let order = Arc::new(StdMutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..5u32 {
            let slot = queue.clone().acquire_slot().await;
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                slot.run::<_, (), ()>(async move {
                    // Later-numbered tasks finish their own work sooner,
                    // but must still wait behind earlier slots.
                    tokio::time::sleep(Duration::from_millis((5 - i) as u64)).await;
                    order.lock().unwrap().push(i);
                    Ok(())
                })
                .await
                .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn timeout_does_not_wedge_the_chain() {
        let config = TaskQueueConfig {
            task_timeout: Duration::from_millis(10),
            progress_every: 10,
        };
        let queue = TaskQueue::new(config);

        let timed_out = queue
            .add_to_queue::<_, (), ()>(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(timed_out, Err(TaskQueueError::Timeout(_))));

        let after = queue.add_to_queue::<_, _, ()>(async { Ok(42) }).await;
        assert_eq!(after.unwrap(), 42);
    }

    #[tokio::test]
    async fn progress_fires_every_n_tasks() {
        let fired = Arc::new(StdMutex::new(Vec::new()));
        let fired_clone = fired.clone();
        let queue = TaskQueue::new(TaskQueueConfig {
            task_timeout: Duration::from_secs(1),
            progress_every: 2,
        })
        .with_progress_handler(Arc::new(move |count| fired_clone.lock().unwrap().push(count)));

        for _ in 0..5 {
            queue.add_to_queue::<_, (), ()>(async { Ok(()) }).await.unwrap();
        }

        assert_eq!(*fired.lock().unwrap(), vec![2, 4]);
    }

    #[tokio::test]
    async fn sequencer_releases_tickets_in_order() {
        let seq = Arc::new(IncomingSequencer::new());
        let order = Arc::new(StdMutex::new(Vec::new()));

        let t0 = seq.take_ticket();
        let t1 = seq.take_ticket();
        let t2 = seq.take_ticket();

        let seq2 = seq.clone();
        let order2 = order.clone();
        let later = tokio::spawn(async move {
            seq2.wait_turn(t2).await;
            order2.lock().unwrap().push(2);
        });

        seq.wait_turn(t1).await;
        order.lock().unwrap().push(1);
        seq.advance().await;

        seq.wait_turn(t0).await;
        order.lock().unwrap().push(0);
        seq.advance().await;
        seq.advance().await;

        later.await.unwrap();
        // t1 waited behind t0 (ticket 0 never advanced until after), so
        // by construction t1's wait_turn only returns once current==1.
        assert!(order.lock().unwrap().contains(&2));
    }

    #[tokio::test]
    async fn wait_all_settled_blocks_until_every_ticket_advances() {
        let seq = Arc::new(IncomingSequencer::new());
        let _t0 = seq.take_ticket();
        let _t1 = seq.take_ticket();

        let seq2 = seq.clone();
        let settled = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let settled2 = settled.clone();
        let waiter = tokio::spawn(async move {
            seq2.wait_all_settled().await;
            settled2.store(true, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!settled.load(Ordering::SeqCst));

        seq.advance().await;
        seq.advance().await;
        waiter.await.unwrap();
        assert!(settled.load(Ordering::SeqCst));
    }
}
