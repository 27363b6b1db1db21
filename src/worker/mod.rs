// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Off-thread base64 codec worker (§4.9).

#[cfg(feature = "testing")]
pub mod base64_worker;
#[cfg(not(feature = "testing"))]
mod base64_worker;

pub use base64_worker::{Base64Worker, WorkerError};
