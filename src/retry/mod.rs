// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Identity-key-error retry negotiation (§4.8).

#[cfg(feature = "testing")]
pub mod negotiator;
#[cfg(not(feature = "testing"))]
mod negotiator;

pub use negotiator::{RetryNegotiator, RetryOutcome};
