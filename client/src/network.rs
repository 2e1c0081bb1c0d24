use crate::session::{PeerSession, PurchaseError};
use bincode::{deserialize, serialize};
use log::{debug, info, warn};
use shared::{ActionRequest, Packet, ShopView, MAX_PACKET_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{timeout, Instant};

/// A peer connected to a host over UDP
///
/// Every packet received is folded into the [`PeerSession`] before it is
/// handed back, so the session always reflects the latest host snapshot.
pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    session: PeerSession,
    reply_timeout: Duration,
}

impl Client {
    pub async fn new(
        server_addr: &str,
        catalogue: ShopView,
        reply_timeout: Duration,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let server_addr: SocketAddr = server_addr.parse()?;
        let bind_addr = if server_addr.ip().is_loopback() {
            "127.0.0.1:0"
        } else {
            "0.0.0.0:0"
        };
        let socket = UdpSocket::bind(bind_addr).await?;

        Ok(Client {
            socket,
            server_addr,
            session: PeerSession::new(catalogue),
            reply_timeout,
        })
    }

    pub fn session(&self) -> &PeerSession {
        &self.session
    }

    /// Performs the handshake and waits for the initial snapshots
    pub async fn connect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Connecting to server {}...", self.server_addr);

        self.send_packet(&Packet::Connect {
            client_version: PROTOCOL_VERSION,
        })
        .await?;

        match self
            .wait_for(|packet| {
                matches!(
                    packet,
                    Packet::Connected { .. } | Packet::Disconnected { .. }
                )
            })
            .await?
        {
            Some(Packet::Connected { .. }) => {}
            Some(Packet::Disconnected { reason }) => return Err(reason.into()),
            _ => return Err("no reply from server".into()),
        }

        // Connected is followed by the stock and player snapshots
        self.wait_for(|packet| matches!(packet, Packet::PlayerSnapshot { .. }))
            .await?;
        Ok(())
    }

    pub async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    /// Receives one packet, or `None` if nothing arrives before `deadline`
    async fn receive_until(
        &mut self,
        deadline: Instant,
    ) -> Result<Option<Packet>, Box<dyn std::error::Error>> {
        let mut buffer = [0u8; MAX_PACKET_SIZE];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let (len, addr) = match timeout(remaining, self.socket.recv_from(&mut buffer)).await {
                Ok(result) => result?,
                Err(_) => return Ok(None),
            };
            if addr != self.server_addr {
                debug!("Ignoring datagram from {}", addr);
                continue;
            }

            match deserialize::<Packet>(&buffer[..len]) {
                Ok(packet) => {
                    self.session.apply_packet(&packet);
                    return Ok(Some(packet));
                }
                Err(_) => warn!("Failed to deserialize packet from server"),
            }
        }
    }

    /// Receives until a packet matches `wanted` or the reply timeout passes
    pub async fn wait_for(
        &mut self,
        wanted: impl Fn(&Packet) -> bool,
    ) -> Result<Option<Packet>, Box<dyn std::error::Error>> {
        let deadline = Instant::now() + self.reply_timeout;
        while let Some(packet) = self.receive_until(deadline).await? {
            if wanted(&packet) {
                return Ok(Some(packet));
            }
        }
        Ok(None)
    }

    /// Buys from the local shop view and has the host debit its counter
    ///
    /// Fails with [`PurchaseError::Refused`] if another peer emptied the
    /// counter first. The view is refreshed from the host's snapshot either way.
    pub async fn buy(&mut self, item: &str, amount: i32) -> Result<(), Box<dyn std::error::Error>> {
        match self.session.purchase(item, amount) {
            Ok(Some(purchase)) => {
                let Packet::StockPurchase { key, .. } = &purchase else {
                    return Err("purchase produced an unexpected packet".into());
                };
                let key = key.clone();
                self.send_packet(&purchase).await?;

                // snapshots already in flight may predate the host's answer
                let reply = self
                    .wait_for(|packet| match packet {
                        Packet::PurchaseAccepted { key: answered, .. }
                        | Packet::PurchaseRefused { key: answered, .. } => *answered == key,
                        _ => false,
                    })
                    .await?;
                let outcome = match reply {
                    Some(Packet::PurchaseAccepted { .. }) => Ok(()),
                    Some(Packet::PurchaseRefused { available, .. }) => {
                        Err(PurchaseError::Refused { available })
                    }
                    _ => return Err("no reply to purchase".into()),
                };
                self.wait_for(|packet| matches!(packet, Packet::StockSnapshot { .. }))
                    .await?;

                match outcome {
                    Ok(()) => {
                        info!("Bought {} x {}", amount, item);
                        Ok(())
                    }
                    Err(refused) => {
                        warn!("Cannot buy {} x {}: {}", amount, item, refused);
                        Err(refused.into())
                    }
                }
            }
            Ok(None) => {
                info!("Bought {} x {} (not shared)", amount, item);
                Ok(())
            }
            Err(e @ PurchaseError::SoldOut { .. }) => {
                warn!("Cannot buy {} x {}: {}", amount, item, e);
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Sends an action request for the host to apply
    pub async fn send_action(
        &mut self,
        request: &ActionRequest,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let payload = request.to_bytes()?;
        debug!("Sending {:?} action ({} bytes)", request.kind(), payload.len());
        self.send_packet(&Packet::Action { payload }).await
    }

    /// Asks the host to end the day and waits for the next one to start
    pub async fn end_day(&mut self) -> Result<Option<u32>, Box<dyn std::error::Error>> {
        self.send_packet(&Packet::EndDay).await?;
        match self
            .wait_for(|packet| matches!(packet, Packet::DayStarted { .. }))
            .await?
        {
            Some(Packet::DayStarted { day }) => Ok(Some(day)),
            _ => Ok(None),
        }
    }

    pub async fn disconnect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if self.session.is_connected() {
            self.send_packet(&Packet::Disconnect).await?;
        }
        Ok(())
    }
}
