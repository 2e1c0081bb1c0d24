//! Peer-side mirror of the host's state.
//!
//! A peer never owns shared counters. It keeps a copy of the last stock
//! snapshot the host broadcast, reconciles its shop view against that copy,
//! and reports each purchase to the host as [`Packet::StockPurchase`]. The
//! host debits its own counter and answers with [`Packet::PurchaseAccepted`],
//! or with [`Packet::PurchaseRefused`] when the counter ran out first, then
//! sends a fresh snapshot.

use log::{debug, info, warn};
use shared::stock::SharedStock;
use shared::{
    LimitedStockMode, Packet, PeerId, PlayerFlags, ShopView, StockEntry, StockError,
    StockReconciler, UNLIMITED_STOCK,
};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PurchaseError {
    #[error("not connected to a host")]
    NotConnected,
    #[error("purchase amount must be positive, got {0}")]
    InvalidAmount(i32),
    #[error("{0} is not sold here")]
    UnknownItem(String),
    #[error("only {available} left")]
    SoldOut { available: i32 },
    #[error("the host refused the purchase, only {available} left")]
    Refused { available: i32 },
}

impl From<StockError> for PurchaseError {
    fn from(error: StockError) -> Self {
        match error {
            StockError::InvalidAmount(amount) => PurchaseError::InvalidAmount(amount),
            StockError::Insufficient { available } => PurchaseError::SoldOut { available },
        }
    }
}

/// The catalogue every shop view is restocked from at the start of a day
pub fn sample_shop(shop_id: &str) -> ShopView {
    ShopView::new(
        shop_id,
        vec![
            StockEntry::new("Eggs", 50, 5, LimitedStockMode::Global),
            StockEntry::new("Eggs", 45, 3, LimitedStockMode::PerPlayer),
            StockEntry::new("Milk", 125, UNLIMITED_STOCK, LimitedStockMode::Global),
            StockEntry::new("Parsnip Seeds", 20, 10, LimitedStockMode::PerPlayer),
            StockEntry::new("Hay", 50, 20, LimitedStockMode::None),
        ],
    )
}

pub struct PeerSession {
    peer_id: Option<PeerId>,
    day: u32,
    shared_stock: SharedStock,
    catalogue: ShopView,
    view: ShopView,
    flags: PlayerFlags,
}

impl PeerSession {
    pub fn new(catalogue: ShopView) -> Self {
        Self {
            peer_id: None,
            day: 0,
            shared_stock: SharedStock::default(),
            view: catalogue.clone(),
            catalogue,
            flags: PlayerFlags::default(),
        }
    }

    pub fn peer_id(&self) -> Option<PeerId> {
        self.peer_id
    }

    pub fn is_connected(&self) -> bool {
        self.peer_id.is_some()
    }

    pub fn day(&self) -> u32 {
        self.day
    }

    pub fn view(&self) -> &ShopView {
        &self.view
    }

    pub fn flags(&self) -> &PlayerFlags {
        &self.flags
    }

    /// Folds one host packet into the mirror
    pub fn apply_packet(&mut self, packet: &Packet) {
        match packet {
            Packet::Connected { peer_id } => {
                info!("Connected as peer {}", peer_id);
                self.peer_id = Some(*peer_id);
                self.reconcile();
            }

            Packet::StockSnapshot { day, limited_stock } => {
                if *day != self.day {
                    self.start_day(*day);
                }
                self.shared_stock.set(limited_stock.clone());
                self.shared_stock.mark_clean();
                self.reconcile();
            }

            Packet::PlayerSnapshot { flags } => {
                self.flags = flags.clone();
            }

            Packet::DayStarted { day } => {
                self.start_day(*day);
            }

            Packet::PurchaseAccepted { key, remaining } => {
                debug!("Host debited {}, {} left", key, remaining);
            }

            Packet::PurchaseRefused { key, available } => {
                warn!("Host refused purchase from {}, {} left", key, available);
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.peer_id = None;
            }

            other => debug!("Ignoring host-bound packet {:?}", other),
        }
    }

    fn start_day(&mut self, day: u32) {
        debug!("Restocking {} for day {}", self.view.shop_id, day);
        self.day = day;
        self.view = self.catalogue.clone();
        self.shared_stock.set(Default::default());
        self.reconcile();
    }

    /// Refreshes the shop view from the mirrored counters
    ///
    /// Does nothing before the host has assigned a peer id, since per-player
    /// keys cannot be formed yet.
    pub fn reconcile(&mut self) -> usize {
        match self.peer_id {
            Some(peer_id) => {
                StockReconciler::new(peer_id).reconcile(&mut self.view, &self.shared_stock)
            }
            None => 0,
        }
    }

    /// Buys `amount` of the first offer named `item`
    ///
    /// On success returns the purchase the host must be told about, or
    /// `None` when the offer is not backed by a shared counter.
    pub fn purchase(&mut self, item: &str, amount: i32) -> Result<Option<Packet>, PurchaseError> {
        let peer_id = self.peer_id.ok_or(PurchaseError::NotConnected)?;
        if amount <= 0 {
            return Err(PurchaseError::InvalidAmount(amount));
        }

        self.reconcile();

        let reconciler = StockReconciler::new(peer_id);
        let shop_id = self.view.shop_id.clone();
        let entry = self
            .view
            .find_mut(item)
            .ok_or_else(|| PurchaseError::UnknownItem(item.to_string()))?;
        if !entry.can_purchase(amount) {
            return Err(PurchaseError::SoldOut {
                available: entry.stock,
            });
        }

        let listed = entry.stock;
        let written = reconciler.on_purchase(&shop_id, entry, amount, &mut self.shared_stock)?;
        if entry.stock <= 0 {
            self.view.entries.retain(|entry| entry.stock > 0);
        }

        Ok(written.map(|key| Packet::StockPurchase {
            key,
            amount,
            listed,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn connected(peer_id: PeerId) -> PeerSession {
        let mut session = PeerSession::new(sample_shop("ShopA"));
        session.apply_packet(&Packet::Connected { peer_id });
        session
    }

    #[test]
    fn test_purchase_requires_connection() {
        let mut session = PeerSession::new(sample_shop("ShopA"));
        assert_eq!(
            session.purchase("Eggs", 1),
            Err(PurchaseError::NotConnected)
        );
    }

    #[test]
    fn test_connect_assigns_sync_keys() {
        let session = connected(7);
        let keys: Vec<_> = session
            .view()
            .entries
            .iter()
            .map(|entry| entry.item.sync_key.clone())
            .collect();

        assert_eq!(keys[0].as_deref(), Some("Eggs"));
        assert_eq!(keys[1].as_deref(), Some("Eggs1"));
        assert_eq!(keys[2], None);
    }

    #[test]
    fn test_global_purchase_reports_amount_and_listing() {
        let mut session = connected(7);
        let write = session.purchase("Eggs", 2).unwrap();

        assert_eq!(
            write,
            Some(Packet::StockPurchase {
                key: "ShopA/Global/Eggs".to_string(),
                amount: 2,
                listed: 5,
            })
        );
    }

    #[test]
    fn test_unlimited_and_local_purchases_write_nothing() {
        let mut session = connected(7);
        assert_eq!(session.purchase("Milk", 40).unwrap(), None);
        assert_eq!(session.purchase("Hay", 4).unwrap(), None);
        assert_eq!(session.view().entries[4].stock, 16);
    }

    #[test]
    fn test_oversized_purchase_is_refused() {
        let mut session = connected(7);
        assert_eq!(
            session.purchase("Eggs", 6),
            Err(PurchaseError::SoldOut { available: 5 })
        );
        assert_eq!(
            session.purchase("Turnip", 1),
            Err(PurchaseError::UnknownItem("Turnip".to_string()))
        );
        assert_eq!(session.purchase("Eggs", 0), Err(PurchaseError::InvalidAmount(0)));
    }

    #[test]
    fn test_snapshot_overwrites_and_removes_sold_out() {
        let mut session = connected(7);
        let mut limited_stock = BTreeMap::new();
        limited_stock.insert("ShopA/Global/Eggs".to_string(), 0);
        limited_stock.insert("ShopA/7/Parsnip Seeds".to_string(), 4);

        session.apply_packet(&Packet::StockSnapshot {
            day: 0,
            limited_stock,
        });

        let names: Vec<_> = session
            .view()
            .entries
            .iter()
            .map(|entry| (entry.item.display_name.as_str(), entry.stock))
            .collect();
        assert_eq!(
            names,
            vec![
                ("Eggs", 3),
                ("Milk", UNLIMITED_STOCK),
                ("Parsnip Seeds", 4),
                ("Hay", 20)
            ]
        );
    }

    #[test]
    fn test_other_peers_counters_do_not_apply() {
        let mut session = connected(7);
        let mut limited_stock = BTreeMap::new();
        limited_stock.insert("ShopA/8/Parsnip Seeds".to_string(), 1);

        session.apply_packet(&Packet::StockSnapshot {
            day: 0,
            limited_stock,
        });
        assert_eq!(session.view().entries[3].stock, 10);
    }

    #[test]
    fn test_day_started_restocks() {
        let mut session = connected(7);
        session.purchase("Eggs", 5).unwrap();
        assert_eq!(session.view().entries.len(), 4);

        session.apply_packet(&Packet::DayStarted { day: 2 });
        assert_eq!(session.day(), 2);
        assert_eq!(session.view().entries.len(), 5);
        assert_eq!(session.view().entries[0].stock, 5);
    }

    #[test]
    fn test_disconnect_clears_peer_id() {
        let mut session = connected(7);
        session.apply_packet(&Packet::Disconnected {
            reason: "Server full".to_string(),
        });
        assert!(!session.is_connected());
    }
}
