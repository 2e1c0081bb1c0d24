//! Synchronized values and the identity tokens they are tracked by.
//!
//! Every value that takes part in replication carries a [`NetId`] handed out
//! at construction. Replication sets key their membership on that token, so
//! two values holding equal data are still distinct members.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_NET_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a synchronized value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetId(u64);

impl NetId {
    /// Allocates the next identity token
    pub fn next() -> Self {
        Self(NEXT_NET_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Anything a replication set can register under a name.
///
/// Implemented by leaf values ([`NetField`]) and by nested replication sets.
pub trait Trackable {
    fn net_id(&self) -> NetId;

    /// Name assigned at registration, `None` until registered
    fn name(&self) -> Option<&str>;

    fn set_name(&mut self, name: &str);
}

/// A leaf synchronized value
///
/// Mutations made through [`NetField::set`] or [`NetField::modify`] mark the
/// field dirty so the propagation layer knows what changed since the last
/// flush. Not `Clone`: a copy would share the original's identity.
#[derive(Debug)]
pub struct NetField<T> {
    id: NetId,
    name: Option<String>,
    value: T,
    dirty: bool,
}

impl<T> NetField<T> {
    pub fn new(value: T) -> Self {
        Self {
            id: NetId::next(),
            name: None,
            value,
            dirty: false,
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    /// Replaces the value, marking the field dirty only if it changed
    pub fn set(&mut self, value: T)
    where
        T: PartialEq,
    {
        if self.value != value {
            self.value = value;
            self.dirty = true;
        }
    }

    /// Mutates the value in place and marks the field dirty
    pub fn modify<R>(&mut self, f: impl FnOnce(&mut T) -> R) -> R {
        self.dirty = true;
        f(&mut self.value)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }
}

impl<T: Default> Default for NetField<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Deref for NetField<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> Trackable for NetField<T> {
    fn net_id(&self) -> NetId {
        self.id
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn set_name(&mut self, name: &str) {
        self.name = Some(name.to_string());
    }
}

/// Set of string flags (mail ids, event ids, recipe names)
pub type NetStringSet = NetField<BTreeSet<String>>;

/// String-keyed map, e.g. the shared limited-stock counters
pub type NetStringMap<V> = NetField<BTreeMap<String, V>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = NetField::new(1u32);
        let b = NetField::new(1u32);
        assert_ne!(a.net_id(), b.net_id());
        assert!(b.net_id().raw() > a.net_id().raw());
    }

    #[test]
    fn test_set_only_dirties_on_change() {
        let mut field = NetField::new(5i32);
        field.set(5);
        assert!(!field.is_dirty());

        field.set(6);
        assert!(field.is_dirty());
        assert_eq!(*field.get(), 6);

        field.mark_clean();
        assert!(!field.is_dirty());
    }

    #[test]
    fn test_modify_marks_dirty() {
        let mut flags = NetStringSet::default();
        let inserted = flags.modify(|set| set.insert("letter".to_string()));
        assert!(inserted);
        assert!(flags.is_dirty());
        assert!(flags.contains("letter"));
    }

    #[test]
    fn test_name_assigned_once_registered() {
        let mut field = NetField::new(0u8);
        assert_eq!(field.name(), None);
        field.set_name("money");
        assert_eq!(field.name(), Some("money"));
    }
}
