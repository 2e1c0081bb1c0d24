//! Host network layer: UDP datagrams in, world updates and snapshots out

use crate::peer_manager::PeerManager;
use crate::world::HostWorld;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, PeerId, MAX_PACKET_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{interval, MissedTickBehavior};

/// Host settings, filled from the command line
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub tick_duration: Duration,
    pub max_peers: usize,
    pub peer_timeout: Duration,
    pub save_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            tick_duration: Duration::from_millis(16),
            max_peers: 8,
            peer_timeout: Duration::from_secs(5),
            save_dir: PathBuf::from("saves"),
        }
    }
}

/// The authoritative host
///
/// Runs a single-threaded loop: datagrams are handled as they arrive and the
/// world is ticked at a fixed rate, so no game state is ever shared across
/// tasks.
pub struct Server {
    socket: UdpSocket,
    peers: PeerManager,
    world: HostWorld,
    tick_duration: Duration,
    ticks: u64,
}

impl Server {
    pub async fn new(config: ServerConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind(&config.bind_addr).await?;
        info!("Server listening on {}", socket.local_addr()?);

        let world = HostWorld::new(config.save_dir);
        world.validate_registrations();

        Ok(Server {
            socket,
            peers: PeerManager::new(config.max_peers, config.peer_timeout),
            world,
            tick_duration: config.tick_duration,
            ticks: 0,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    async fn send_packet(&self, packet: &Packet, addr: SocketAddr) {
        let data = match serialize(packet) {
            Ok(data) => data,
            Err(e) => {
                error!("Failed to serialize packet for {}: {}", addr, e);
                return;
            }
        };
        if let Err(e) = self.socket.send_to(&data, addr).await {
            error!("Failed to send packet to {}: {}", addr, e);
        }
    }

    async fn send_to_peer(&self, packet: &Packet, peer_id: PeerId) {
        if let Some(addr) = self.peers.addr_of(peer_id) {
            self.send_packet(packet, addr).await;
        }
    }

    async fn broadcast_packet(&self, packet: &Packet) {
        for (_, addr) in self.peers.peer_addrs() {
            self.send_packet(packet, addr).await;
        }
    }

    async fn send_player_snapshot(&self, peer_id: PeerId) {
        if let Some(flags) = self.world.player_flags(peer_id) {
            self.send_to_peer(&Packet::PlayerSnapshot { flags }, peer_id)
                .await;
        }
    }

    /// Processes one incoming packet
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        if let Packet::Connect { client_version } = packet {
            self.handle_connect(client_version, addr).await;
            return;
        }

        let Some(peer_id) = self.peers.touch(addr) else {
            debug!("Ignoring packet from unknown address {}", addr);
            return;
        };

        match packet {
            Packet::Heartbeat => {}

            Packet::Action { payload } => {
                let session = self.peers.session_peers();
                match self.world.apply_action(&payload, &session) {
                    Ok(changed) => {
                        for target in changed {
                            self.send_player_snapshot(target).await;
                        }
                    }
                    Err(e) => warn!("Dropping action from peer {}: {}", peer_id, e),
                }
            }

            Packet::StockPurchase {
                key,
                amount,
                listed,
            } => match self.world.purchase_stock(&key, amount, listed) {
                Ok(remaining) => {
                    debug!("Peer {} bought {} of {}, {} left", peer_id, amount, key, remaining);
                    self.send_packet(&Packet::PurchaseAccepted { key, remaining }, addr)
                        .await;
                    let snapshot = self.world.stock_snapshot();
                    self.broadcast_packet(&snapshot).await;
                }
                Err(e) => {
                    warn!("Refusing purchase of {} x {} by peer {}: {}", amount, key, peer_id, e);
                    let available = self.world.stock_remaining(&key).unwrap_or(listed).max(0);
                    self.send_packet(&Packet::PurchaseRefused { key, available }, addr)
                        .await;
                    self.send_packet(&self.world.stock_snapshot(), addr).await;
                }
            },

            Packet::EndDay => {
                if self.world.request_day_end() {
                    info!("Peer {} ended day {}", peer_id, self.world.day());
                } else {
                    debug!("Day sync already in progress");
                }
            }

            Packet::Disconnect => {
                self.peers.remove_peer(peer_id);
                self.world.remove_player(peer_id);
            }

            _ => {
                warn!("Unexpected packet type from peer {} at {}", peer_id, addr);
            }
        }
    }

    async fn handle_connect(&mut self, client_version: u32, addr: SocketAddr) {
        info!("Peer connecting from {} (version: {})", addr, client_version);

        if client_version != PROTOCOL_VERSION {
            let response = Packet::Disconnected {
                reason: format!(
                    "Protocol version {} required, got {}",
                    PROTOCOL_VERSION, client_version
                ),
            };
            self.send_packet(&response, addr).await;
            return;
        }

        if let Some(existing_id) = self.peers.find_peer_by_addr(addr) {
            info!("Removing existing peer {} from {}", existing_id, addr);
            self.peers.remove_peer(existing_id);
            self.world.remove_player(existing_id);
        }

        match self.peers.add_peer(addr) {
            Some(peer_id) => {
                self.world.add_player(peer_id);
                self.send_packet(&Packet::Connected { peer_id }, addr).await;
                self.send_packet(&self.world.stock_snapshot(), addr).await;
                self.send_player_snapshot(peer_id).await;
            }
            None => {
                let response = Packet::Disconnected {
                    reason: "Server full".to_string(),
                };
                self.send_packet(&response, addr).await;
            }
        }
    }

    /// One simulation tick: drives the scheduler and announces a new day
    async fn tick(&mut self) {
        self.ticks += 1;

        if let Some(day) = self.world.tick() {
            self.broadcast_packet(&Packet::DayStarted { day }).await;
            let snapshot = self.world.stock_snapshot();
            self.broadcast_packet(&snapshot).await;
            for (peer_id, _) in self.peers.peer_addrs() {
                self.send_player_snapshot(peer_id).await;
            }
        }

        let ticks_per_second = (1.0 / self.tick_duration.as_secs_f32()).max(1.0) as u64;
        if self.ticks % ticks_per_second == 0 {
            for peer_id in self.peers.check_timeouts() {
                self.world.remove_player(peer_id);
            }
        }
    }

    /// Main server loop
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut buffer = vec![0u8; MAX_PACKET_SIZE];

        info!("Server started successfully");

        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buffer) => {
                    match received {
                        Ok((len, addr)) => match deserialize::<Packet>(&buffer[..len]) {
                            Ok(packet) => self.handle_packet(packet, addr).await,
                            Err(_) => warn!("Failed to deserialize packet from {}", addr),
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = tick_interval.tick() => {
                    self.tick().await;
                },
            }
        }
    }
}
