// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Per-number multi-device send fan-out (§4.7).

#[cfg(feature = "testing")]
pub mod batch;
#[cfg(not(feature = "testing"))]
mod batch;

#[cfg(feature = "testing")]
pub mod engine;
#[cfg(not(feature = "testing"))]
mod engine;

pub use batch::{OutgoingBatch, SendOutcome};
pub use engine::SendEngine;
