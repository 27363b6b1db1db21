// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Inbound envelope dispatch (§4.5-§4.6).
//!
//! [`InboundDispatcher`] drives `handleRequest`/`handleEnvelope`/
//! `innerHandleContentMessage`; [`process_decrypted`] is the
//! `processDecrypted` flag/group-reconciliation step it calls on the way to
//! a `message`/`sent` event.

#[cfg(feature = "testing")]
pub mod inbound;
#[cfg(not(feature = "testing"))]
mod inbound;

#[cfg(feature = "testing")]
pub mod process_decrypted;
#[cfg(not(feature = "testing"))]
mod process_decrypted;

pub use inbound::InboundDispatcher;
pub use process_decrypted::{process_decrypted, GroupOutcome};
