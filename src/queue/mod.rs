// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

#[cfg(feature = "testing")]
pub mod task_queue;
#[cfg(not(feature = "testing"))]
mod task_queue;

pub use task_queue::{IncomingSequencer, QueueSlot, TaskQueue, TaskQueueConfig, TaskQueueError};
