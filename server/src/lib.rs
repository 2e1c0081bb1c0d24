//! # Session Host Library
//!
//! The authoritative side of a client/host session. Only the host holds the
//! real game state; peers send it commands and receive snapshots back.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative State
//! One [`shared::PlayerState`] per connected peer plus a single
//! [`shared::TeamState`] holding the day counter and the shared
//! limited-stock map. Both entity types are checked with the field validator
//! when the host starts, so a member that was declared but never registered
//! shows up in the log instead of as a silent desync.
//!
//! ### Action Requests
//! Peers send encoded [`shared::ActionRequest`]s. The host decodes each one
//! completely, resolves its targets against the connected peers and applies
//! it to every target's player state. A request that fails to decode is
//! dropped as if it never arrived.
//!
//! ### Shop Stock
//! Peers reconcile their shop views against the host's counters and report
//! the remaining quantity after each purchase. The host stores it and
//! rebroadcasts the whole map.
//!
//! ### Day Sync
//! Ending the day queues a background save through the single-flight
//! scheduler. When it finishes the host rolls the day over: next-day mail is
//! delivered and every shop restocks.
//!
//! ## Module Organization
//!
//! - `peer_manager`: connected peers, host seat, timeouts
//! - `world`: player and team state, action dispatch, day rollover
//! - `network`: UDP loop, packet handling, snapshots
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(ServerConfig::default()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod network;
pub mod peer_manager;
pub mod world;
