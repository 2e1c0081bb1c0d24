//! Authoritative session state held by the host

use log::{error, info, warn};
use shared::entity::{PlayerFlags, PlayerState, TeamSnapshot, TeamState};
use shared::scheduler::{BackgroundOperation, OperationScheduler};
use shared::stock;
use shared::validate::validate_to_log;
use shared::{ActionRequest, DecodeError, Packet, PeerId, SessionPeer, StockError};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Result of the background half of a day sync
pub type DaySyncOutcome = io::Result<PathBuf>;

/// Host-side game state: one player per peer plus the team state
///
/// All mutation happens on the host's main loop. The only work done elsewhere
/// is the day-sync save, which runs through the scheduler and reports back on
/// a channel drained by [`HostWorld::tick`].
pub struct HostWorld {
    players: BTreeMap<PeerId, PlayerState>,
    team: TeamState,
    scheduler: Arc<OperationScheduler>,
    day_sync_tx: mpsc::UnboundedSender<DaySyncOutcome>,
    day_sync_rx: mpsc::UnboundedReceiver<DaySyncOutcome>,
    day_sync_pending: bool,
    save_dir: PathBuf,
}

impl HostWorld {
    pub fn new(save_dir: impl Into<PathBuf>) -> Self {
        let (day_sync_tx, day_sync_rx) = mpsc::unbounded_channel();
        Self {
            players: BTreeMap::new(),
            team: TeamState::new(),
            scheduler: Arc::new(OperationScheduler::new()),
            day_sync_tx,
            day_sync_rx,
            day_sync_pending: false,
            save_dir: save_dir.into(),
        }
    }

    /// Checks every replicated entity type is fully registered
    ///
    /// Violations are logged; returns how many were found.
    pub fn validate_registrations(&self) -> usize {
        let violations = validate_to_log(&PlayerState::new(0)) + validate_to_log(&self.team);
        if violations == 0 {
            info!("All replicated fields registered");
        } else {
            warn!("{} replication registration problems found", violations);
        }
        violations
    }

    pub fn add_player(&mut self, peer_id: PeerId) {
        self.players
            .entry(peer_id)
            .or_insert_with(|| PlayerState::new(peer_id));
        info!("Added player {}", peer_id);
    }

    pub fn remove_player(&mut self, peer_id: PeerId) {
        if self.players.remove(&peer_id).is_some() {
            info!("Removed player {}", peer_id);
        }
    }

    pub fn player(&self, peer_id: PeerId) -> Option<&PlayerState> {
        self.players.get(&peer_id)
    }

    pub fn player_flags(&self, peer_id: PeerId) -> Option<PlayerFlags> {
        self.players.get(&peer_id).map(PlayerState::flags)
    }

    pub fn team(&self) -> &TeamState {
        &self.team
    }

    pub fn day(&self) -> u32 {
        *self.team.day.get()
    }

    /// Decodes and applies an encoded action request
    ///
    /// The request is decoded in full before anything is applied; a decode
    /// failure leaves the world untouched. Returns the players whose state
    /// changed.
    pub fn apply_action(
        &mut self,
        payload: &[u8],
        session: &[SessionPeer],
    ) -> Result<Vec<PeerId>, DecodeError> {
        let request = ActionRequest::from_bytes(payload)?;
        Ok(self.perform(&request, session))
    }

    /// Applies an already-decoded request to every selected target
    pub fn perform(&mut self, request: &ActionRequest, session: &[SessionPeer]) -> Vec<PeerId> {
        let mut changed = Vec::new();
        for peer_id in request.select_targets(session) {
            match self.players.get_mut(&peer_id) {
                Some(player) => {
                    if request.perform_action(player) {
                        changed.push(peer_id);
                    }
                }
                None => warn!("Action target {} has no player state", peer_id),
            }
        }
        changed
    }

    /// Takes a peer's purchase from the authoritative counter
    ///
    /// Returns what is left, or the refusal if the counter can't cover it.
    /// A refused purchase leaves the counter untouched.
    pub fn purchase_stock(
        &mut self,
        key: &str,
        amount: i32,
        listed: i32,
    ) -> Result<i32, StockError> {
        stock::debit(&mut self.team.limited_stock, key, amount, listed)
    }

    pub fn stock_remaining(&self, key: &str) -> Option<i32> {
        self.team.limited_stock.get().get(key).copied()
    }

    pub fn stock_snapshot(&self) -> Packet {
        Packet::StockSnapshot {
            day: self.day(),
            limited_stock: self.team.limited_stock.get().clone(),
        }
    }

    /// Queues the end-of-day save
    ///
    /// Returns false if a day sync is already in flight.
    pub fn request_day_end(&mut self) -> bool {
        if self.day_sync_pending {
            return false;
        }
        self.day_sync_pending = true;

        let snapshot = self.team.snapshot();
        let save_dir = self.save_dir.clone();
        let outcome_tx = self.day_sync_tx.clone();
        self.scheduler.enqueue(BackgroundOperation::new(
            &format!("day-sync-{}", snapshot.day),
            move || write_day_snapshot(&save_dir, &snapshot),
            move |outcome| {
                if outcome_tx.send(outcome).is_err() {
                    error!("Day sync finished after the world was dropped");
                }
            },
        ));
        true
    }

    pub fn day_sync_pending(&self) -> bool {
        self.day_sync_pending
    }

    /// Drives the scheduler and finishes any completed day sync
    ///
    /// Returns the new day if a day rolled over during this tick.
    pub fn tick(&mut self) -> Option<u32> {
        self.scheduler.tick();

        let mut new_day = None;
        while let Ok(outcome) = self.day_sync_rx.try_recv() {
            match outcome {
                Ok(path) => info!("Saved day {} to {}", self.day(), path.display()),
                Err(e) => error!("Failed to save day {}: {}", self.day(), e),
            }
            new_day = Some(self.start_new_day());
        }
        new_day
    }

    /// Day rollover: delivers next-day mail and restocks every shop
    fn start_new_day(&mut self) -> u32 {
        self.day_sync_pending = false;
        let day = self.day() + 1;
        self.team.day.set(day);

        let delivered: usize = self
            .players
            .values_mut()
            .map(PlayerState::deliver_tomorrow_mail)
            .sum();
        self.team.limited_stock.set(BTreeMap::new());

        info!("Day {} started, {} letters delivered", day, delivered);
        day
    }
}

fn write_day_snapshot(save_dir: &Path, snapshot: &TeamSnapshot) -> DaySyncOutcome {
    std::fs::create_dir_all(save_dir)?;
    let bytes =
        bincode::serialize(snapshot).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    let path = save_dir.join(format!("day-{}.bin", snapshot.day));
    std::fs::write(&path, bytes)?;
    Ok(path)
}
