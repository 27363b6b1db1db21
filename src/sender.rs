// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Public send-path entry point: resolves group membership, then hands the
//! built `DataMessage` to [`SendEngine`] for per-number fan-out (§4.7).

use std::sync::Arc;

use crate::model::{DataMessage, GroupContext, GroupContextType};
use crate::send::{SendEngine, SendOutcome};
use crate::store::GroupStore;

/// Wraps [`SendEngine`] with the group-membership lookup the engine itself
/// has no opinion on — the engine only ever sees a flat number list.
pub struct Sender {
    engine: SendEngine,
    groups: Arc<dyn GroupStore>,
}

impl Sender {
    pub fn new(engine: SendEngine, groups: Arc<dyn GroupStore>) -> Self {
        Sender { engine, groups }
    }

    /// Sends a plain one-to-one message. `timestamp` is the caller's
    /// message id (typically `SystemTime::now()` millis), threaded through
    /// unchanged so sync/retry correlation on the receiving side works.
    pub async fn send_message_to_number(
        &self,
        number: impl Into<String>,
        body: impl Into<String>,
        timestamp: u64,
        silent: bool,
    ) -> SendOutcome {
        let message = DataMessage {
            body: Some(body.into()),
            ..DataMessage::default()
        };
        self.engine
            .send(vec![number.into()], message, timestamp, silent)
            .await
    }

    /// Sends a `Deliver`-type group message to every current member, per
    /// `groups_get_numbers` (§6 group store contract).
    pub async fn send_group_message(
        &self,
        group_id: Vec<u8>,
        body: impl Into<String>,
        timestamp: u64,
        silent: bool,
    ) -> Result<SendOutcome, crate::store::StoreError> {
        let members = self.groups.groups_get_numbers(&group_id).await?;
        let message = DataMessage {
            body: Some(body.into()),
            group: Some(GroupContext {
                id: group_id,
                group_type: GroupContextType::Deliver,
                name: None,
                members: members.clone(),
                avatar: None,
            }),
            ..DataMessage::default()
        };
        Ok(self.engine.send(members, message, timestamp, silent).await)
    }

    /// Sends an already-built `DataMessage` (end-session, expiration-timer
    /// update, profile-key update, …) to a single number without going
    /// through the group-resolution path.
    pub async fn send_data_message(
        &self,
        number: impl Into<String>,
        message: DataMessage,
        timestamp: u64,
        silent: bool,
    ) -> SendOutcome {
        self.engine
            .send(vec![number.into()], message, timestamp, silent)
            .await
    }
}
