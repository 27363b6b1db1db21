// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Push-service transport layer.
//!
//! - [`transport::MessageSocket`]: async socket contract (§6 "Server
//!   contract", `getMessageSocket()`).
//! - [`websocket::WebSocketTransport`]: production implementation over
//!   `tokio-tungstenite`.
//! - [`mock::MockTransport`]: in-process test double.
//! - [`socket_supervisor::SocketSupervisor`]: connect/reconnect/close
//!   lifecycle (§4.4).
//! - [`pinning`]: optional certificate pinning hook, off by default.

#[cfg(feature = "testing")]
pub mod error;
#[cfg(not(feature = "testing"))]
mod error;

#[cfg(feature = "testing")]
pub mod message;
#[cfg(not(feature = "testing"))]
mod message;

#[cfg(feature = "testing")]
pub mod mock;
#[cfg(not(feature = "testing"))]
mod mock;

#[cfg(feature = "testing")]
pub mod socket_supervisor;
#[cfg(not(feature = "testing"))]
mod socket_supervisor;

#[cfg(feature = "testing")]
pub mod transport;
#[cfg(not(feature = "testing"))]
mod transport;

#[cfg(any(feature = "network-native-tls", feature = "network-rustls"))]
#[cfg(feature = "testing")]
pub mod websocket;
#[cfg(any(feature = "network-native-tls", feature = "network-rustls"))]
#[cfg(not(feature = "testing"))]
mod websocket;

pub mod pinning;

pub use error::NetworkError;
pub use message::{WebSocketRequest, WireFrame};
pub use mock::MockTransport;
pub use pinning::{verify_pin, PinnedCertificate};
pub use socket_supervisor::{CloseOutcome, SocketSupervisor};
pub use transport::{MessageSocket, TransportConfig, TransportResult};

#[cfg(any(feature = "network-native-tls", feature = "network-rustls"))]
pub use websocket::WebSocketTransport;
