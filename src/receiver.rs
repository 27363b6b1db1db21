// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Top-level receive-path orchestrator: owns the socket supervisor (§4.4),
//! replays the durable cache on startup (§4.2), and hands every frame to
//! the inbound dispatcher (§4.5) until a terminal close.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};

use crate::dispatch::InboundDispatcher;
use crate::error::{EngineError, EngineResult};
use crate::events::{EngineEvent, EventDispatcher};
use crate::network::{CloseOutcome, MessageSocket, SocketSupervisor, TransportConfig};
use crate::store::{Server, UnprocessedCacheStore};

#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// How long to wait for a server frame before sending a keepalive ping.
    pub keepalive_interval: Duration,
    /// Base delay for the reconnect backoff (§4.4's `base * 2^attempt`).
    pub reconnect_base_delay: Duration,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        ReceiverConfig {
            keepalive_interval: Duration::from_secs(30),
            reconnect_base_delay: Duration::from_secs(1),
        }
    }
}

/// One `MessageReceiver` instance: a single-owner event loop over one
/// WebSocket (§5 "single-threaded cooperative event loop per
/// `MessageReceiver`").
pub struct Receiver<S: MessageSocket> {
    supervisor: SocketSupervisor<S>,
    dispatcher: InboundDispatcher,
    cache: Arc<dyn UnprocessedCacheStore>,
    server: Arc<dyn Server>,
    events: Arc<EventDispatcher>,
    config: ReceiverConfig,
}

impl<S: MessageSocket> Receiver<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        socket: S,
        transport_config: TransportConfig,
        number: impl Into<String>,
        dispatcher: InboundDispatcher,
        cache: Arc<dyn UnprocessedCacheStore>,
        server: Arc<dyn Server>,
        events: Arc<EventDispatcher>,
        config: ReceiverConfig,
    ) -> Self {
        Receiver {
            supervisor: SocketSupervisor::new(socket, transport_config, number),
            dispatcher,
            cache,
            server,
            events,
            config,
        }
    }

    /// Replays whatever the durable cache still holds from a prior run
    /// (constructor-time `retryCached`, §8 scenario 5) before the socket
    /// loop starts accepting new frames. Attempt bookkeeping and the
    /// over-250 purge already happened inside `queue_all_cached`; this
    /// only has to dispatch what survived.
    pub async fn replay_cached(&self) {
        let items = match self.cache.queue_all_cached().await {
            Ok(items) => items,
            Err(e) => {
                error!(error = %e, "startup cache scan failed");
                return;
            }
        };
        for item in items {
            let id = item.id.clone();
            if let Err(e) = self.dispatcher.replay_cached(item).await {
                warn!(error = %e, id = %id, "cached item did not replay cleanly");
            }
        }
    }

    /// Drives the socket until a terminal close: user-initiated (3000),
    /// server-drained (3001), or an unrecoverable connectivity-probe
    /// failure. Transient closes reconnect with backoff and loop.
    pub async fn run(&mut self) -> EngineResult<()> {
        self.replay_cached().await;

        loop {
            let is_reconnect = self.supervisor.connect().await?;
            if is_reconnect {
                self.events.dispatch(EngineEvent::Reconnect);
            }

            self.drive_until_close().await;

            let code = self
                .supervisor
                .socket_mut()
                .and_then(|s| s.close_code())
                .map(|(code, _)| code)
                .unwrap_or(0);

            match self.supervisor.handle_close(code, &*self.server).await {
                CloseOutcome::Terminal => return Ok(()),
                CloseOutcome::ServerDrained => {
                    self.events.dispatch(EngineEvent::Empty);
                    return Ok(());
                }
                CloseOutcome::Reconnect => {
                    let delay = self
                        .supervisor
                        .reconnect_delay(self.config.reconnect_base_delay);
                    tokio::time::sleep(delay).await;
                }
                CloseOutcome::ProbeFailed(e) => {
                    self.events.dispatch(EngineEvent::Error {
                        message: e.to_string(),
                        confirm: None,
                    });
                    return Err(EngineError::Network(e));
                }
            }
        }
    }

    /// Reads frames until the socket closes. A frame arriving within
    /// `keepalive_interval` is handed to the dispatcher; idle past that
    /// interval sends a keepalive ping instead, matching the WSR's
    /// `disconnect=true` semantics — a failed ping is this loop's signal
    /// the connection is already dead.
    async fn drive_until_close(&mut self) {
        loop {
            let socket = match self.supervisor.socket_mut() {
                Some(s) => s,
                None => return,
            };

            match tokio::time::timeout(self.config.keepalive_interval, socket.next_request()).await
            {
                Ok(Ok(Some(req))) => self.dispatcher.handle_request(req).await,
                Ok(Ok(None)) => return,
                Ok(Err(e)) => {
                    warn!(error = %e, "socket read failed");
                    return;
                }
                Err(_elapsed) => {
                    let Some(socket) = self.supervisor.socket_mut() else {
                        return;
                    };
                    if let Err(e) = socket.send_keepalive().await {
                        warn!(error = %e, "keepalive send failed, socket will close");
                        return;
                    }
                }
            }
        }
    }
}
