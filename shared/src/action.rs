//! Serializable, replayable state-mutation commands.
//!
//! An [`ActionRequest`] is built where an action happens, encoded, sent to the
//! host (or applied directly when already on the host), decoded and applied
//! exactly once to every selected target.
//!
//! # Wire layout
//!
//! Fields are written back to back in a fixed order using fixed-width
//! little-endian integers. Nothing is self-describing beyond what is listed
//! here, so any change to a kind's layout must bump that kind's version.
//!
//! ```text
//! kind        u8      1 = SetMail, 2 = SetEventSeen, 3 = SetCraftingRecipe
//! version     u8      per-kind layout version, currently 1 for every kind
//! target      u8      0 = all peers, 1 = explicit list, 2 = predicate
//!   list      u64 count, then count x u64 peer ids      (target 1 only)
//!   predicate u8      0 = host only, 1 = remote peers only (target 2 only)
//! flag_id     u64 byte length, then UTF-8 bytes
//! set         u8      1 = add, 0 = remove
//! only_peer   u8 presence, then u64 peer id if present
//! -- SetMail v1 only --
//! timing      u8      0 = now, 1 = tomorrow, 2 = received, 3 = all
//! ```

use crate::error::DecodeError;
use crate::net_field::NetStringSet;
use crate::PeerId;
use bincode::Options;
use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeSet;
use std::io::{Read, Write};

/// Upper bound on the encoded size of a single field
const MAX_FIELD_BYTES: u64 = 16 * 1024;

const TARGET_ALL: u8 = 0;
const TARGET_PEERS: u8 = 1;
const TARGET_MATCHING: u8 = 2;

fn wire() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(MAX_FIELD_BYTES)
}

fn put<W: Write, T: Serialize + ?Sized>(writer: &mut W, value: &T) -> bincode::Result<()> {
    wire().serialize_into(&mut *writer, value)
}

fn take<R: Read, T: DeserializeOwned>(reader: &mut R) -> bincode::Result<T> {
    wire().deserialize_from(&mut *reader)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ActionKind {
    SetMail = 1,
    SetEventSeen = 2,
    SetCraftingRecipe = 3,
}

impl ActionKind {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(ActionKind::SetMail),
            2 => Some(ActionKind::SetEventSeen),
            3 => Some(ActionKind::SetCraftingRecipe),
            _ => None,
        }
    }

    /// Layout version written after the kind byte
    pub fn wire_version(self) -> u8 {
        match self {
            ActionKind::SetMail => 1,
            ActionKind::SetEventSeen => 1,
            ActionKind::SetCraftingRecipe => 1,
        }
    }
}

/// A connected peer as seen by target selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPeer {
    pub id: PeerId,
    pub is_host: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerPredicate {
    HostOnly,
    RemoteOnly,
}

impl PeerPredicate {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(PeerPredicate::HostOnly),
            1 => Some(PeerPredicate::RemoteOnly),
            _ => None,
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            PeerPredicate::HostOnly => 0,
            PeerPredicate::RemoteOnly => 1,
        }
    }

    pub fn matches(self, peer: &SessionPeer) -> bool {
        match self {
            PeerPredicate::HostOnly => peer.is_host,
            PeerPredicate::RemoteOnly => !peer.is_host,
        }
    }
}

/// Which peers a request applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSelector {
    All,
    Peers(Vec<PeerId>),
    Matching(PeerPredicate),
}

/// Per-player flag containers a request can toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagContainer {
    Mailbox,
    MailForTomorrow,
    MailReceived,
    EventsSeen,
    CraftingRecipes,
}

/// Entity an action request can be applied to
pub trait FlagTarget {
    fn flags_mut(&mut self, container: FlagContainer) -> &mut NetStringSet;
}

/// When a granted letter shows up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailTiming {
    Now,
    Tomorrow,
    Received,
    All,
    /// Sent by a peer with a newer set of timings; ignored on apply
    Unknown(u8),
}

impl MailTiming {
    fn from_byte(byte: u8) -> Self {
        match byte {
            0 => MailTiming::Now,
            1 => MailTiming::Tomorrow,
            2 => MailTiming::Received,
            3 => MailTiming::All,
            other => MailTiming::Unknown(other),
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            MailTiming::Now => 0,
            MailTiming::Tomorrow => 1,
            MailTiming::Received => 2,
            MailTiming::All => 3,
            MailTiming::Unknown(byte) => byte,
        }
    }

    fn containers(self) -> Option<&'static [FlagContainer]> {
        match self {
            MailTiming::Now => Some(&[FlagContainer::Mailbox]),
            MailTiming::Tomorrow => Some(&[FlagContainer::MailForTomorrow]),
            MailTiming::Received => Some(&[FlagContainer::MailReceived]),
            MailTiming::All => Some(&[
                FlagContainer::Mailbox,
                FlagContainer::MailForTomorrow,
                FlagContainer::MailReceived,
            ]),
            MailTiming::Unknown(_) => None,
        }
    }
}

/// Kind-specific part of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionPayload {
    SetMail { timing: MailTiming },
    SetEventSeen,
    SetCraftingRecipe,
}

/// One serializable state mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRequest {
    pub target: TargetSelector,
    pub flag_id: String,
    /// Add the flag when true, remove it when false
    pub set: bool,
    /// Restricts the selection to this single peer
    pub only_peer: Option<PeerId>,
    pub payload: ActionPayload,
}

impl ActionRequest {
    fn new(
        target: TargetSelector,
        flag_id: impl Into<String>,
        set: bool,
        payload: ActionPayload,
    ) -> Self {
        Self {
            target,
            flag_id: flag_id.into(),
            set,
            only_peer: None,
            payload,
        }
    }

    pub fn set_mail(
        target: TargetSelector,
        mail_id: impl Into<String>,
        timing: MailTiming,
        set: bool,
    ) -> Self {
        Self::new(target, mail_id, set, ActionPayload::SetMail { timing })
    }

    pub fn set_event_seen(target: TargetSelector, event_id: impl Into<String>, set: bool) -> Self {
        Self::new(target, event_id, set, ActionPayload::SetEventSeen)
    }

    pub fn set_crafting_recipe(
        target: TargetSelector,
        recipe: impl Into<String>,
        set: bool,
    ) -> Self {
        Self::new(target, recipe, set, ActionPayload::SetCraftingRecipe)
    }

    pub fn only_for(mut self, peer: PeerId) -> Self {
        self.only_peer = Some(peer);
        self
    }

    pub fn kind(&self) -> ActionKind {
        match self.payload {
            ActionPayload::SetMail { .. } => ActionKind::SetMail,
            ActionPayload::SetEventSeen => ActionKind::SetEventSeen,
            ActionPayload::SetCraftingRecipe => ActionKind::SetCraftingRecipe,
        }
    }

    /// Resolves the target selector against the connected peers
    pub fn select_targets(&self, peers: &[SessionPeer]) -> BTreeSet<PeerId> {
        let mut targets: BTreeSet<PeerId> = match &self.target {
            TargetSelector::All => peers.iter().map(|peer| peer.id).collect(),
            TargetSelector::Peers(ids) => peers
                .iter()
                .filter(|peer| ids.contains(&peer.id))
                .map(|peer| peer.id)
                .collect(),
            TargetSelector::Matching(predicate) => peers
                .iter()
                .filter(|peer| predicate.matches(peer))
                .map(|peer| peer.id)
                .collect(),
        };

        if let Some(only) = self.only_peer {
            targets.retain(|id| *id == only);
        }
        targets
    }

    pub fn encode<W: Write>(&self, writer: &mut W) -> bincode::Result<()> {
        let kind = self.kind();
        put(writer, &(kind as u8))?;
        put(writer, &kind.wire_version())?;

        match &self.target {
            TargetSelector::All => put(writer, &TARGET_ALL)?,
            TargetSelector::Peers(ids) => {
                put(writer, &TARGET_PEERS)?;
                put(writer, ids)?;
            }
            TargetSelector::Matching(predicate) => {
                put(writer, &TARGET_MATCHING)?;
                put(writer, &predicate.to_byte())?;
            }
        }

        put(writer, &self.flag_id)?;
        put(writer, &self.set)?;
        put(writer, &self.only_peer)?;

        if let ActionPayload::SetMail { timing } = self.payload {
            put(writer, &timing.to_byte())?;
        }
        Ok(())
    }

    pub fn decode<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let kind_byte: u8 = take(reader)?;
        let kind = ActionKind::from_byte(kind_byte).ok_or(DecodeError::UnknownKind(kind_byte))?;
        let version: u8 = take(reader)?;
        if version != kind.wire_version() {
            return Err(DecodeError::UnsupportedVersion {
                kind: kind_byte,
                version,
            });
        }

        let target = match take::<_, u8>(reader)? {
            TARGET_ALL => TargetSelector::All,
            TARGET_PEERS => TargetSelector::Peers(take(reader)?),
            TARGET_MATCHING => {
                let byte: u8 = take(reader)?;
                let predicate =
                    PeerPredicate::from_byte(byte).ok_or(DecodeError::UnknownPredicate(byte))?;
                TargetSelector::Matching(predicate)
            }
            other => return Err(DecodeError::UnknownTarget(other)),
        };

        let flag_id: String = take(reader)?;
        let set: bool = take(reader)?;
        let only_peer: Option<PeerId> = take(reader)?;

        let payload = match kind {
            ActionKind::SetMail => ActionPayload::SetMail {
                timing: MailTiming::from_byte(take(reader)?),
            },
            ActionKind::SetEventSeen => ActionPayload::SetEventSeen,
            ActionKind::SetCraftingRecipe => ActionPayload::SetCraftingRecipe,
        };

        Ok(Self {
            target,
            flag_id,
            set,
            only_peer,
            payload,
        })
    }

    pub fn to_bytes(&self) -> bincode::Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.encode(&mut bytes)?;
        Ok(bytes)
    }

    /// Decodes a whole message, rejecting anything left over
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = bytes;
        let request = Self::decode(&mut reader)?;
        if !reader.is_empty() {
            return Err(DecodeError::TrailingBytes(reader.len()));
        }
        Ok(request)
    }

    /// Applies the mutation to `target`
    ///
    /// An unrecognised mail timing is logged and leaves the target untouched.
    /// Returns true if any container changed.
    pub fn perform_action<T: FlagTarget + ?Sized>(&self, target: &mut T) -> bool {
        let containers: &[FlagContainer] = match self.payload {
            ActionPayload::SetMail { timing } => match timing.containers() {
                Some(containers) => containers,
                None => {
                    warn!(
                        "Ignoring mail request for {} with unknown timing {}",
                        self.flag_id,
                        timing.to_byte()
                    );
                    return false;
                }
            },
            ActionPayload::SetEventSeen => &[FlagContainer::EventsSeen],
            ActionPayload::SetCraftingRecipe => &[FlagContainer::CraftingRecipes],
        };

        let mut changed = false;
        for container in containers {
            changed |= toggle(target.flags_mut(*container), &self.flag_id, self.set);
        }
        changed
    }
}

fn toggle(flags: &mut NetStringSet, flag_id: &str, set: bool) -> bool {
    if flags.contains(flag_id) == set {
        return false;
    }
    flags.modify(|flags| {
        if set {
            flags.insert(flag_id.to_string())
        } else {
            flags.remove(flag_id)
        }
    })
}
