//! # Shared replication layer
//!
//! Everything both the host and its peers need to agree on:
//!
//! - [`net_field`] and [`replication`]: synchronized values and the
//!   owner-scoped sets that track them by identity.
//! - [`validate`]: the registration-time check that every declared member of
//!   an entity is wired into its replication set.
//! - [`action`]: versioned, binary-encoded state mutations that are built on
//!   one peer and replayed on the host.
//! - [`stock`]: shared limited-stock counters and the reconciliation that
//!   keeps each peer's shop view converged on them.
//! - [`scheduler`]: the single-flight scheduler that sequences host-side
//!   background work such as the day sync.
//! - [`Packet`]: the session protocol, serialized with bincode.

pub mod action;
pub mod entity;
pub mod error;
pub mod net_field;
pub mod replication;
pub mod scheduler;
pub mod stock;
pub mod validate;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use action::{ActionRequest, MailTiming, PeerPredicate, SessionPeer, TargetSelector};
pub use entity::{PlayerFlags, PlayerState, TeamSnapshot, TeamState};
pub use error::{DecodeError, StockError};
pub use stock::{LimitedStockMode, ShopView, StockEntry, StockReconciler, UNLIMITED_STOCK};

/// Unique identity of a peer within a session
pub type PeerId = u64;

/// Peers must match this exactly to join
pub const PROTOCOL_VERSION: u32 = 1;

/// Largest datagram either side sends
pub const MAX_PACKET_SIZE: usize = 8192;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    Heartbeat,
    /// An encoded [`ActionRequest`]
    Action {
        payload: Vec<u8>,
    },
    /// A peer bought `amount` from the counter at `key`
    ///
    /// `listed` is the quantity the buyer's catalogue offers, used only when
    /// the host has no counter for `key` yet.
    StockPurchase {
        key: String,
        amount: i32,
        listed: i32,
    },
    EndDay,
    Disconnect,

    Connected {
        peer_id: PeerId,
    },
    StockSnapshot {
        day: u32,
        limited_stock: BTreeMap<String, i32>,
    },
    PlayerSnapshot {
        flags: PlayerFlags,
    },
    DayStarted {
        day: u32,
    },
    /// The host debited a [`Packet::StockPurchase`]; sent to the buyer ahead
    /// of the stock snapshot broadcast
    PurchaseAccepted {
        key: String,
        remaining: i32,
    },
    /// The host refused a [`Packet::StockPurchase`]; `available` is what the
    /// counter holds
    PurchaseRefused {
        key: String,
        available: i32,
    },
    Disconnected {
        reason: String,
    },
}
