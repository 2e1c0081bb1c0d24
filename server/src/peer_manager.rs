//! Peer connection management for the host
//!
//! This module tracks the peers connected to the session:
//! - Peer connection lifecycle (connect, disconnect, timeout)
//! - Address lookup for routing incoming datagrams
//! - Which peer plays on the host side, for host-only action targets
//!
//! The roster is only touched from the host's main loop.

use log::info;
use shared::{PeerId, SessionPeer};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A connected peer
#[derive(Debug)]
pub struct Peer {
    /// Unique peer identifier assigned by the host
    pub id: PeerId,
    /// Network address for sending responses
    pub addr: SocketAddr,
    /// Last time we received any packet from this peer
    pub last_seen: Instant,
    /// Whether this peer plays on the host side
    pub is_host: bool,
}

impl Peer {
    pub fn new(id: PeerId, addr: SocketAddr, is_host: bool) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            is_host,
        }
    }

    /// Returns true if nothing has been heard from the peer within `timeout`
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages all connected peers
///
/// Enforces the session's capacity and hands out peer ids. Ids are never
/// reused within a session, so per-player stock keys can't alias.
pub struct PeerManager {
    peers: HashMap<PeerId, Peer>,
    next_peer_id: PeerId,
    max_peers: usize,
    timeout: Duration,
}

impl PeerManager {
    pub fn new(max_peers: usize, timeout: Duration) -> Self {
        Self {
            peers: HashMap::new(),
            next_peer_id: 1,
            max_peers,
            timeout,
        }
    }

    /// Attempts to add a new peer connection
    ///
    /// Returns the new peer id, or None if the session is full. The first
    /// peer to join an empty session takes the host-side seat.
    pub fn add_peer(&mut self, addr: SocketAddr) -> Option<PeerId> {
        if self.peers.len() >= self.max_peers {
            return None;
        }

        let peer_id = self.next_peer_id;
        self.next_peer_id += 1;

        let is_host = !self.peers.values().any(|peer| peer.is_host);
        info!(
            "Peer {} connected from {}{}",
            peer_id,
            addr,
            if is_host { " (host seat)" } else { "" }
        );
        self.peers.insert(peer_id, Peer::new(peer_id, addr, is_host));

        Some(peer_id)
    }

    /// Removes a peer, returning true if it was connected
    pub fn remove_peer(&mut self, peer_id: PeerId) -> bool {
        if let Some(peer) = self.peers.remove(&peer_id) {
            info!("Peer {} disconnected", peer.id);
            true
        } else {
            false
        }
    }

    pub fn find_peer_by_addr(&self, addr: SocketAddr) -> Option<PeerId> {
        self.peers
            .values()
            .find(|peer| peer.addr == addr)
            .map(|peer| peer.id)
    }

    pub fn addr_of(&self, peer_id: PeerId) -> Option<SocketAddr> {
        self.peers.get(&peer_id).map(|peer| peer.addr)
    }

    /// Marks the peer at `addr` as alive, returning its id
    pub fn touch(&mut self, addr: SocketAddr) -> Option<PeerId> {
        let peer = self.peers.values_mut().find(|peer| peer.addr == addr)?;
        peer.last_seen = Instant::now();
        Some(peer.id)
    }

    /// Removes and returns every peer that has gone quiet
    pub fn check_timeouts(&mut self) -> Vec<PeerId> {
        let timeout = self.timeout;
        let timed_out: Vec<PeerId> = self
            .peers
            .values()
            .filter(|peer| peer.is_timed_out(timeout))
            .map(|peer| peer.id)
            .collect();

        for peer_id in &timed_out {
            self.remove_peer(*peer_id);
        }
        timed_out
    }

    /// Connected peers in id order, for action target selection
    pub fn session_peers(&self) -> Vec<SessionPeer> {
        let mut peers: Vec<SessionPeer> = self
            .peers
            .values()
            .map(|peer| SessionPeer {
                id: peer.id,
                is_host: peer.is_host,
            })
            .collect();
        peers.sort_by_key(|peer| peer.id);
        peers
    }

    pub fn peer_addrs(&self) -> Vec<(PeerId, SocketAddr)> {
        self.peers
            .values()
            .map(|peer| (peer.id, peer.addr))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
