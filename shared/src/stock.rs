//! Shared limited-stock counters for shops.
//!
//! The authoritative remaining quantities live in one string-keyed map inside
//! the team's replication set. Each peer's [`ShopView`] is only a cache: it is
//! refreshed with [`StockReconciler::reconcile`] before being shown or used to
//! validate a purchase. Counters only go down in two places: a peer's
//! [`StockReconciler::on_purchase`] against its local mirror, and the host's
//! [`debit`] against the authoritative map. The host never takes a peer's
//! remaining count on trust; it debits the purchased amount from its own
//! counter. Nothing here increments a counter; restocking overwrites the map
//! from day-rollover logic.
//!
//! No locking: callers run this from the host's single mutation thread.

use crate::error::StockError;
use crate::net_field::NetStringMap;
use crate::PeerId;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashSet;

/// Stock value meaning "never runs out"
pub const UNLIMITED_STOCK: i32 = i32::MAX;

/// Authoritative counters keyed by qualified key
pub type SharedStock = NetStringMap<i32>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LimitedStockMode {
    /// One counter shared by every peer
    Global,
    /// One counter per acting peer
    PerPlayer,
    /// Tracked locally only
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellableItem {
    pub display_name: String,
    /// Stable per-session key, assigned on first reconcile if absent
    pub sync_key: Option<String>,
}

impl SellableItem {
    pub fn new(display_name: &str) -> Self {
        Self {
            display_name: display_name.to_string(),
            sync_key: None,
        }
    }

    /// Key used for the counter: the synced key, else the display name
    pub fn key(&self) -> &str {
        self.sync_key.as_deref().unwrap_or(&self.display_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockEntry {
    pub item: SellableItem,
    pub price: u32,
    pub stock: i32,
    pub mode: LimitedStockMode,
}

impl StockEntry {
    pub fn new(display_name: &str, price: u32, stock: i32, mode: LimitedStockMode) -> Self {
        Self {
            item: SellableItem::new(display_name),
            price,
            stock,
            mode,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.stock == UNLIMITED_STOCK
    }

    /// Whether this entry is backed by a shared counter
    pub fn is_shared(&self) -> bool {
        self.mode != LimitedStockMode::None && !self.is_unlimited()
    }

    pub fn can_purchase(&self, amount: i32) -> bool {
        amount > 0 && (self.is_unlimited() || self.stock >= amount)
    }
}

/// A peer's local view of one shop's stock, in offer order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopView {
    pub shop_id: String,
    pub entries: Vec<StockEntry>,
}

impl ShopView {
    pub fn new(shop_id: &str, entries: Vec<StockEntry>) -> Self {
        Self {
            shop_id: shop_id.to_string(),
            entries,
        }
    }

    /// First entry offered under `display_name`
    pub fn find_mut(&mut self, display_name: &str) -> Option<&mut StockEntry> {
        self.entries
            .iter_mut()
            .find(|entry| entry.item.display_name == display_name)
    }
}

/// Reconciles shop views against the shared counters on behalf of one peer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockReconciler {
    acting_peer: PeerId,
}

impl StockReconciler {
    pub fn new(acting_peer: PeerId) -> Self {
        Self { acting_peer }
    }

    pub fn acting_peer(&self) -> PeerId {
        self.acting_peer
    }

    /// Namespaced counter key, `None` for entries not shared across peers
    ///
    /// Global entries never embed a peer id; per-player entries always embed
    /// the acting peer's id. `%` and `/` inside the shop id and item key are
    /// percent-escaped, so the only separators in a key are the two the key
    /// format itself places.
    pub fn qualify_key(&self, shop_id: &str, entry: &StockEntry) -> Option<String> {
        let shop = escape_segment(shop_id);
        let item = escape_segment(entry.item.key());
        match entry.mode {
            LimitedStockMode::Global => Some(format!("{}/Global/{}", shop, item)),
            LimitedStockMode::PerPlayer => {
                Some(format!("{}/{}/{}", shop, self.acting_peer, item))
            }
            LimitedStockMode::None => None,
        }
    }

    /// Records a confirmed purchase of `amount` from `entry`
    ///
    /// Call exactly once per completed purchase. Returns the qualified key
    /// written to `shared`, if any. Nothing is changed when `amount` is not
    /// positive or exceeds the entry's limited stock.
    pub fn on_purchase(
        &self,
        shop_id: &str,
        entry: &mut StockEntry,
        amount: i32,
        shared: &mut SharedStock,
    ) -> Result<Option<String>, StockError> {
        if amount <= 0 {
            return Err(StockError::InvalidAmount(amount));
        }
        if entry.is_unlimited() {
            return Ok(None);
        }
        if entry.stock < amount {
            return Err(StockError::Insufficient {
                available: entry.stock,
            });
        }

        entry.stock -= amount;
        let Some(key) = self.qualify_key(shop_id, entry) else {
            return Ok(None);
        };
        let remaining = entry.stock;
        shared.modify(|counters| counters.insert(key.clone(), remaining));
        Ok(Some(key))
    }

    /// Overwrites the view's limited stock with the shared counters
    ///
    /// Items without a sync key are given one derived from their display
    /// name: the name itself if unclaimed, then `name1`, `name2`, ... in
    /// offer order. Entries whose shared counter is at or below zero are
    /// removed from the view. Returns the number removed.
    pub fn reconcile(&self, view: &mut ShopView, shared: &SharedStock) -> usize {
        let mut used_keys: HashSet<String> = view
            .entries
            .iter()
            .filter(|entry| entry.is_shared())
            .filter_map(|entry| entry.item.sync_key.clone())
            .collect();
        let mut sold_out = Vec::new();

        for (index, entry) in view.entries.iter_mut().enumerate() {
            if !entry.is_shared() {
                continue;
            }
            if entry.item.sync_key.is_none() {
                entry.item.sync_key = Some(claim_key(&entry.item.display_name, &mut used_keys));
            }

            let Some(key) = self.qualify_key(&view.shop_id, entry) else {
                continue;
            };
            if let Some(&remaining) = shared.get().get(&key) {
                entry.stock = remaining;
                if entry.stock <= 0 {
                    sold_out.push(index);
                }
            }
        }

        let mut index = 0;
        view.entries.retain(|_| {
            let keep = sold_out.binary_search(&index).is_err();
            index += 1;
            keep
        });
        sold_out.len()
    }
}

/// Takes `amount` from the authoritative counter at `key`
///
/// Host-side half of a purchase. The counter only ever goes down: a request
/// for more than remains is refused and leaves the counter as it was. A key
/// with no counter yet starts from `listed`, the quantity the buyer's
/// catalogue offers. Returns what is left.
pub fn debit(
    shared: &mut SharedStock,
    key: &str,
    amount: i32,
    listed: i32,
) -> Result<i32, StockError> {
    if amount <= 0 {
        return Err(StockError::InvalidAmount(amount));
    }
    let current = shared.get().get(key).copied().unwrap_or(listed);
    if current < amount {
        return Err(StockError::Insufficient {
            available: current.max(0),
        });
    }

    let remaining = current - amount;
    shared.modify(|counters| counters.insert(key.to_string(), remaining));
    Ok(remaining)
}

fn escape_segment(segment: &str) -> Cow<'_, str> {
    if segment.contains(['%', '/']) {
        Cow::Owned(segment.replace('%', "%25").replace('/', "%2F"))
    } else {
        Cow::Borrowed(segment)
    }
}

fn claim_key(name: &str, used_keys: &mut HashSet<String>) -> String {
    let mut candidate = name.to_string();
    let mut suffix = 1;
    while used_keys.contains(&candidate) {
        candidate = format!("{}{}", name, suffix);
        suffix += 1;
    }
    used_keys.insert(candidate.clone());
    candidate
}
