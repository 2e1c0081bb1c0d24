//! # Session Peer Library
//!
//! The non-authoritative side of a session. A peer holds no state the host
//! does not also hold; it mirrors what the host broadcasts and turns local
//! intent into packets.
//!
//! ## Module Organization
//!
//! ### Session Module (`session`)
//! The mirrored state:
//! - Last stock snapshot and the shop view reconciled against it
//! - This peer's flags as last reported by the host
//! - Purchases, which produce the counter write the host must store
//!
//! ### Network Module (`network`)
//! UDP transport to the host:
//! - Connection handshake and version check
//! - Sending action requests, stock writes and day-end requests
//! - Waiting for the matching reply with a timeout
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//! use client::session::sample_shop;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client =
//!         Client::new("127.0.0.1:8080", sample_shop("ShopA"), Duration::from_secs(2)).await?;
//!     client.connect().await?;
//!     client.buy("Eggs", 2).await?;
//!     client.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod network;
pub mod session;
