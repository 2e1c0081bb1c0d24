//! Replicated entities the host keeps authoritative copies of.
//!
//! These are deliberately thin: the flag containers action requests toggle,
//! and the team-wide day counter and limited-stock map.

use crate::action::{FlagContainer, FlagTarget};
use crate::net_field::{NetField, NetStringSet};
use crate::replication::ReplicationSet;
use crate::stock::SharedStock;
use crate::validate::{FieldDescriptor, Replicated};
use crate::PeerId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Per-player flags, as sent to that player's peer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerFlags {
    pub mailbox: BTreeSet<String>,
    pub mail_for_tomorrow: BTreeSet<String>,
    pub mail_received: BTreeSet<String>,
    pub events_seen: BTreeSet<String>,
    pub crafting_recipes: BTreeSet<String>,
}

pub struct PlayerState {
    pub peer_id: PeerId,
    net_fields: ReplicationSet,
    pub mailbox: NetStringSet,
    pub mail_for_tomorrow: NetStringSet,
    pub mail_received: NetStringSet,
    pub events_seen: NetStringSet,
    pub crafting_recipes: NetStringSet,
}

impl PlayerState {
    pub fn new(peer_id: PeerId) -> Self {
        let mut player = Self {
            peer_id,
            net_fields: ReplicationSet::new("PlayerState"),
            mailbox: NetStringSet::default(),
            mail_for_tomorrow: NetStringSet::default(),
            mail_received: NetStringSet::default(),
            events_seen: NetStringSet::default(),
            crafting_recipes: NetStringSet::default(),
        };
        player.net_fields.add(&mut player.mailbox, "mailbox");
        player
            .net_fields
            .add(&mut player.mail_for_tomorrow, "mail_for_tomorrow");
        player.net_fields.add(&mut player.mail_received, "mail_received");
        player.net_fields.add(&mut player.events_seen, "events_seen");
        player
            .net_fields
            .add(&mut player.crafting_recipes, "crafting_recipes");
        player
    }

    /// Delivers yesterday's next-day mail into the mailbox
    pub fn deliver_tomorrow_mail(&mut self) -> usize {
        if self.mail_for_tomorrow.is_empty() {
            return 0;
        }
        let arriving = self.mail_for_tomorrow.modify(std::mem::take);
        let count = arriving.len();
        self.mailbox.modify(|mailbox| mailbox.extend(arriving));
        count
    }

    pub fn flags(&self) -> PlayerFlags {
        PlayerFlags {
            mailbox: self.mailbox.get().clone(),
            mail_for_tomorrow: self.mail_for_tomorrow.get().clone(),
            mail_received: self.mail_received.get().clone(),
            events_seen: self.events_seen.get().clone(),
            crafting_recipes: self.crafting_recipes.get().clone(),
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.mailbox.is_dirty()
            || self.mail_for_tomorrow.is_dirty()
            || self.mail_received.is_dirty()
            || self.events_seen.is_dirty()
            || self.crafting_recipes.is_dirty()
    }

    pub fn mark_clean(&mut self) {
        self.mailbox.mark_clean();
        self.mail_for_tomorrow.mark_clean();
        self.mail_received.mark_clean();
        self.events_seen.mark_clean();
        self.crafting_recipes.mark_clean();
    }
}

impl Replicated for PlayerState {
    fn net_fields(&self) -> &ReplicationSet {
        &self.net_fields
    }

    fn declared_members(&self) -> Vec<FieldDescriptor<'_>> {
        crate::declare_members!(self => {
            field mailbox,
            field mail_for_tomorrow,
            field mail_received,
            field events_seen,
            field crafting_recipes,
        })
    }
}

impl FlagTarget for PlayerState {
    fn flags_mut(&mut self, container: FlagContainer) -> &mut NetStringSet {
        match container {
            FlagContainer::Mailbox => &mut self.mailbox,
            FlagContainer::MailForTomorrow => &mut self.mail_for_tomorrow,
            FlagContainer::MailReceived => &mut self.mail_received,
            FlagContainer::EventsSeen => &mut self.events_seen,
            FlagContainer::CraftingRecipes => &mut self.crafting_recipes,
        }
    }
}

/// Team state as written by the day-sync save
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamSnapshot {
    pub day: u32,
    pub limited_stock: BTreeMap<String, i32>,
}

/// State shared by the whole session
pub struct TeamState {
    net_fields: ReplicationSet,
    pub day: NetField<u32>,
    pub limited_stock: SharedStock,
}

impl TeamState {
    pub fn new() -> Self {
        let mut team = Self {
            net_fields: ReplicationSet::new("TeamState"),
            day: NetField::new(1),
            limited_stock: SharedStock::default(),
        };
        team.net_fields.add(&mut team.day, "day");
        team.net_fields.add(&mut team.limited_stock, "limited_stock");
        team
    }

    pub fn snapshot(&self) -> TeamSnapshot {
        TeamSnapshot {
            day: *self.day.get(),
            limited_stock: self.limited_stock.get().clone(),
        }
    }
}

impl Default for TeamState {
    fn default() -> Self {
        Self::new()
    }
}

impl Replicated for TeamState {
    fn net_fields(&self) -> &ReplicationSet {
        &self.net_fields
    }

    fn declared_members(&self) -> Vec<FieldDescriptor<'_>> {
        crate::declare_members!(self => {
            field day,
            field limited_stock,
        })
    }
}
