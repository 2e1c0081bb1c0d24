//! Owner-scoped registry of synchronized values

use crate::net_field::{NetId, Trackable};
use log::warn;
use std::collections::HashMap;

/// Ordered, named collection of the synchronized values one entity owns
///
/// Membership is by [`NetId`], never by value equality. A replication set is
/// itself [`Trackable`], so an entity embedding another replicated entity
/// registers the inner set as a single member.
#[derive(Debug)]
pub struct ReplicationSet {
    id: NetId,
    display_name: String,
    registered_as: Option<String>,
    entries: Vec<(NetId, String)>,
    index: HashMap<NetId, usize>,
}

impl ReplicationSet {
    pub fn new(display_name: &str) -> Self {
        Self {
            id: NetId::next(),
            display_name: display_name.to_string(),
            registered_as: None,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Diagnostic name of the owning entity
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Registers `member` under `name` and assigns it that name
    ///
    /// Returns false, leaving the set untouched, if the member's identity is
    /// already registered.
    pub fn add(&mut self, member: &mut dyn Trackable, name: &str) -> bool {
        let id = member.net_id();
        if let Some(existing) = self.name_of(id) {
            warn!(
                "{}: {} is already registered as {}",
                self.display_name, name, existing
            );
            return false;
        }

        member.set_name(name);
        self.index.insert(id, self.entries.len());
        self.entries.push((id, name.to_string()));
        true
    }

    /// Registers another entity's replication set as a nested member
    pub fn add_nested(&mut self, nested: &mut ReplicationSet, name: &str) -> bool {
        self.add(nested, name)
    }

    pub fn contains(&self, id: NetId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn name_of(&self, id: NetId) -> Option<&str> {
        self.index
            .get(&id)
            .map(|position| self.entries[*position].1.as_str())
    }

    /// Tracked values in insertion order
    pub fn enumerate_all(&self) -> impl Iterator<Item = (NetId, &str)> + '_ {
        self.entries.iter().map(|(id, name)| (*id, name.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Trackable for ReplicationSet {
    fn net_id(&self) -> NetId {
        self.id
    }

    fn name(&self) -> Option<&str> {
        self.registered_as.as_deref()
    }

    fn set_name(&mut self, name: &str) {
        self.registered_as = Some(name.to_string());
    }
}
