// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Wire and storage data model shared across the engine.
//!
//! `Envelope`, `Content`, and friends stand in for the protobuf messages a
//! full Signal-service client would decode from the wire. Protobuf schema
//! definitions themselves are an external contract (see `SPEC_FULL.md` §A);
//! these structs carry the same field shape a `prost`-generated type would,
//! so the rest of the engine is agnostic to how the bytes actually got
//! decoded.

use serde::{Deserialize, Serialize};

/// Envelope type tag, mirrors the outer transport frame's `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvelopeType {
    Ciphertext,
    PreKeyBundle,
    Receipt,
}

/// Outer transport frame containing the Signal-encrypted payload and
/// routing metadata. Immutable after parsing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub envelope_type: EnvelopeType,
    pub source: String,
    pub source_device: u32,
    pub timestamp: u64,
    pub received_at: u64,
    pub content: Option<Vec<u8>>,
    pub legacy_message: Option<Vec<u8>>,
}

impl Envelope {
    /// `(source, sourceDevice, timestamp)` triple that identifies this
    /// envelope for cache and ordering purposes.
    pub fn identity(&self) -> EnvelopeId {
        EnvelopeId {
            source: self.source.clone(),
            source_device: self.source_device,
            timestamp: self.timestamp,
        }
    }
}

/// `(source, sourceDevice, timestamp)` — the envelope identity, and the
/// primary key of the durable envelope cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnvelopeId {
    pub source: String,
    pub source_device: u32,
    pub timestamp: u64,
}

impl EnvelopeId {
    /// Renders as `"{source}.{sourceDevice} {timestamp}"`, the cache key
    /// shape spec'd in §6 "Wire formats".
    pub fn as_key(&self) -> String {
        format!("{}.{} {}", self.source, self.source_device, self.timestamp)
    }
}

impl std::fmt::Display for EnvelopeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_key())
    }
}

/// Durable record of an unprocessed envelope, persisted before the
/// envelope is ack'd to the server. See spec §4.2 and the
/// "cache as persistence boundary" invariant in §5.
#[derive(Debug, Clone)]
pub struct UnprocessedItem {
    pub id: String,
    pub version: u32,
    pub envelope: Vec<u8>,
    pub decrypted: Option<Vec<u8>>,
    pub timestamp: u64,
    pub attempts: u32,
}

impl UnprocessedItem {
    pub const CURRENT_VERSION: u32 = 2;

    pub fn new(id: String, envelope: Vec<u8>, timestamp: u64) -> Self {
        UnprocessedItem {
            id,
            version: Self::CURRENT_VERSION,
            envelope,
            decrypted: None,
            timestamp,
            attempts: 1,
        }
    }
}

/// Discriminated union of the decrypted `Content` message's variants.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Content {
    pub data_message: Option<DataMessage>,
    pub sync_message: Option<SyncMessage>,
    pub null_message: Option<NullMessage>,
    pub call_message: Option<CallMessage>,
    pub receipt_message: Option<ReceiptMessage>,
}

impl Content {
    /// Count of variants set; exactly one is expected on a well-formed
    /// `Content` outside of a retry-negotiated legacy decode.
    pub fn set_variant_count(&self) -> usize {
        [
            self.data_message.is_some(),
            self.sync_message.is_some(),
            self.null_message.is_some(),
            self.call_message.is_some(),
            self.receipt_message.is_some(),
        ]
        .into_iter()
        .filter(|b| *b)
        .count()
    }
}

/// A `bitflags`-shaped macro kept minimal and local rather than pulling in
/// the `bitflags` crate for three bits; mirrors the teacher's preference
/// for small hand-rolled helpers over a dependency for a single use site.
macro_rules! bitflags_like_flags {
    (
        $(#[$meta:meta])*
        pub struct $name:ident: $ty:ty {
            $(const $variant:ident = $value:expr;)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
        pub struct $name(pub $ty);

        impl $name {
            $(pub const $variant: $name = $name($value);)*

            pub const KNOWN_MASK: $ty = 0 $(| $value)*;

            pub fn contains(self, other: $name) -> bool {
                self.0 & other.0 == other.0 && other.0 != 0
            }

            pub fn has_unknown_bits(self) -> bool {
                self.0 & !Self::KNOWN_MASK != 0
            }

            pub fn is_empty(self) -> bool {
                self.0 == 0
            }
        }

        impl std::ops::BitOr for $name {
            type Output = $name;
            fn bitor(self, rhs: $name) -> $name {
                $name(self.0 | rhs.0)
            }
        }
    };
}

bitflags_like_flags! {
    /// Genuine flag bits (not an enum) on `DataMessage.flags`. Unknown
    /// nonzero bits must be rejected (spec §4.6).
    pub struct DataMessageFlags: u32 {
        const END_SESSION = 0x01;
        const EXPIRATION_TIMER_UPDATE = 0x02;
        const PROFILE_KEY_UPDATE = 0x04;
    }
}

/// Group context attached to a `DataMessage`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupContext {
    /// Canonical binary group id.
    pub id: Vec<u8>,
    pub group_type: GroupContextType,
    pub name: Option<String>,
    pub members: Vec<String>,
    /// Present on `UPDATE` when the group's avatar changed; the pointer is
    /// fetched, not the avatar itself (spec §4.6 "schedule avatar fetch").
    pub avatar: Option<AttachmentPointer>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupContextType {
    Unknown,
    Update,
    Deliver,
    Quit,
}

/// An attachment pointer; the blob itself is fetched/decrypted by an
/// external collaborator (spec §1, out of scope).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttachmentPointer {
    pub id: u64,
    pub content_type: String,
    pub key: Vec<u8>,
    pub size: Option<u32>,
}

/// A quoted-message reference; `id` is normalized from a 64-bit wire value
/// to a plain integer by `process_decrypted` (spec §4.6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Quote {
    pub id: i64,
    pub author: String,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DataMessage {
    pub body: Option<String>,
    pub attachments: Vec<AttachmentPointer>,
    pub group: Option<GroupContext>,
    pub flags: u32,
    pub expire_timer: u32,
    pub quote: Option<Quote>,
    pub profile_key: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentTranscript {
    pub destination: Option<String>,
    pub timestamp: u64,
    pub expiration_start_timestamp: Option<u64>,
    pub message: DataMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SyncMessage {
    pub sent: Option<SentTranscript>,
    pub contacts: Option<SyncBlob>,
    pub groups: Option<SyncBlob>,
    pub blocked: Option<BlockedList>,
    pub request: Option<SyncRequest>,
    pub read: Option<Vec<ReadMessage>>,
    pub verified: Option<Verified>,
    pub configuration: Option<ConfigurationSync>,
}

impl SyncMessage {
    /// First populated field, in the dispatch order spec §4.5 names.
    pub fn first_set_field(&self) -> Option<&'static str> {
        if self.sent.is_some() {
            Some("sent")
        } else if self.contacts.is_some() {
            Some("contacts")
        } else if self.groups.is_some() {
            Some("groups")
        } else if self.blocked.is_some() {
            Some("blocked")
        } else if self.request.is_some() {
            Some("request")
        } else if self.read.is_some() {
            Some("read")
        } else if self.verified.is_some() {
            Some("verified")
        } else if self.configuration.is_some() {
            Some("configuration")
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncBlob {
    pub attachment: AttachmentPointer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedList {
    pub numbers: Vec<String>,
    pub group_ids: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequest {
    pub request_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadMessage {
    pub sender: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verified {
    pub destination: String,
    pub identity_key: Vec<u8>,
    pub state: VerifiedState,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VerifiedState {
    Default,
    Verified,
    Unverified,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigurationSync {
    pub read_receipts: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NullMessage {
    pub padding: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallMessage {
    pub call_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptMessage {
    pub timestamps: Vec<u64>,
}

/// Wire shape posted to the server for one device's ciphertext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceCiphertext {
    #[serde(rename = "type")]
    pub ciphertext_type: u8,
    pub destination_device_id: u32,
    pub destination_registration_id: u32,
    pub content: String,
}

/// `(phone-number, deviceId)` — the unit the external `Store` addresses
/// sessions by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionAddress {
    pub number: String,
    pub device_id: u32,
}

impl SessionAddress {
    pub fn new(number: impl Into<String>, device_id: u32) -> Self {
        SessionAddress {
            number: number.into(),
            device_id,
        }
    }
}

impl std::fmt::Display for SessionAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.number, self.device_id)
    }
}

/// WebSocket lifecycle state (spec §3 `SocketState`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Disconnected,
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Close codes the socket supervisor treats specially (spec §4.4/§6).
pub mod close_code {
    /// User-initiated close; terminal, never reconnects.
    pub const USER_CLOSE: u16 = 3000;
    /// Server signaled the inbox was fully drained.
    pub const SERVER_DRAINED: u16 = 3001;
}
