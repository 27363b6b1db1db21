// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! `processDecrypted` (§4.6): normalizes a decoded [`DataMessage`] against
//! flag semantics and group-state reconciliation before it reaches the
//! `message`/`sent` event.

use crate::error::{EngineError, EngineResult};
use crate::model::{AttachmentPointer, DataMessage, DataMessageFlags, GroupContextType};
use crate::store::{GroupStore, Server, StoreError};

/// Outcome of group reconciliation against the `Store`'s group table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupOutcome {
    /// No group context on the message.
    None,
    /// First sighting of a group id not yet known locally.
    FirstSighting,
    /// `UPDATE`: membership replaced.
    MembersReplaced,
    /// `QUIT` from the local number: the group record was deleted.
    SelfQuit,
    /// `QUIT` from a remote member: that member was removed.
    MemberQuit,
    /// `DELIVER`: routing-only, no membership change.
    Deliver,
}

/// Normalizes `message` in place, mirroring §4.6's flag/group handling.
/// `source` and `local_number` are needed to resolve the `QUIT` self-vs-peer
/// branch. `group_store` is consulted (and possibly mutated) for group
/// reconciliation; `server` is where attachments and the group avatar are
/// fetched from.
pub async fn process_decrypted(
    message: &mut DataMessage,
    source: &str,
    local_number: &str,
    group_store: &dyn GroupStore,
    server: &dyn Server,
) -> EngineResult<GroupOutcome> {
    let flags = DataMessageFlags(message.flags);
    if flags.has_unknown_bits() {
        return Err(EngineError::UnknownFlags(message.flags));
    }

    if flags.contains(DataMessageFlags::END_SESSION) {
        message.body = None;
        message.attachments.clear();
        message.group = None;
        return Ok(GroupOutcome::None);
    }

    if flags.contains(DataMessageFlags::EXPIRATION_TIMER_UPDATE)
        || flags.contains(DataMessageFlags::PROFILE_KEY_UPDATE)
    {
        message.body = None;
        message.attachments.clear();
        // Group is retained for these two flags.
    }

    if let Some(quote) = message.quote.as_mut() {
        // Normalizing a 64-bit wire id to a plain integer is a no-op in
        // this model (already `i64`); kept as a named step for parity
        // with §4.6's explicit "Normalize quote.id" bullet.
        let _ = &quote.id;
    }

    fetch_attachments(&message.attachments, server).await?;

    let outcome = if let Some(group) = message.group.as_mut() {
        let existing = group_store
            .groups_get_numbers(&group.id)
            .await
            .map_err(map_store_err)?;

        match group.group_type {
            GroupContextType::Update => {
                if existing.is_empty() {
                    group_store
                        .groups_create_new_group(group.members.clone(), &group.id)
                        .await
                        .map_err(map_store_err)?;
                } else {
                    group_store
                        .groups_update_numbers(&group.id, group.members.clone())
                        .await
                        .map_err(map_store_err)?;
                }
                if let Some(avatar) = group.avatar.as_ref() {
                    if let Err(e) = server.get_attachment(avatar.id).await {
                        tracing::warn!(error = %e, group = ?group.id, "group avatar fetch failed");
                    }
                }
                GroupOutcome::MembersReplaced
            }
            GroupContextType::Quit => {
                message.body = None;
                message.attachments.clear();
                if source == local_number {
                    group_store
                        .groups_delete_group(&group.id)
                        .await
                        .map_err(map_store_err)?;
                    GroupOutcome::SelfQuit
                } else {
                    group_store
                        .groups_remove_number(&group.id, source)
                        .await
                        .map_err(map_store_err)?;
                    GroupOutcome::MemberQuit
                }
            }
            GroupContextType::Deliver => {
                if existing.is_empty() {
                    tracing::warn!(group = ?group.id, %source, "first sighting of unknown group on DELIVER");
                    group_store
                        .groups_create_new_group(vec![source.to_string()], &group.id)
                        .await
                        .map_err(map_store_err)?;
                    group.name = None;
                    group.members = vec![source.to_string()];
                    group.avatar = None;
                    GroupOutcome::FirstSighting
                } else {
                    group.name = None;
                    group.members = Vec::new();
                    group.avatar = None;
                    GroupOutcome::Deliver
                }
            }
            GroupContextType::Unknown => {
                return Err(EngineError::MalformedEnvelope);
            }
        }
    } else {
        GroupOutcome::None
    };

    Ok(outcome)
}

fn map_store_err(e: StoreError) -> EngineError {
    EngineError::Storage(crate::storage::StorageError::Serialization(e.to_string()))
}

/// `message.attachments` is fetched in full; one failure fails the whole
/// message (§4.6), unlike the group-avatar fetch above which only logs.
async fn fetch_attachments(
    attachments: &[AttachmentPointer],
    server: &dyn Server,
) -> EngineResult<()> {
    for attachment in attachments {
        server.get_attachment(attachment.id).await?;
    }
    Ok(())
}
