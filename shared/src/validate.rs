//! Registration-time check that an entity's synchronized members are all
//! wired into its replication set.
//!
//! Entities list their synchronizable members explicitly through
//! [`Replicated::declared_members`], normally with the [`declare_members!`]
//! macro, in declaration order. [`validate`] cross-references that list
//! against the entity's [`ReplicationSet`] and reports every mismatch it finds
//! in a single pass. Nothing here runs after startup.

use crate::net_field::{NetId, Trackable};
use crate::replication::ReplicationSet;
use log::warn;
use std::fmt;
use thiserror::Error;

/// An entity owning a replication set
pub trait Replicated {
    fn net_fields(&self) -> &ReplicationSet;

    /// Synchronizable members in declaration order
    fn declared_members(&self) -> Vec<FieldDescriptor<'_>>;
}

/// A declared member's current value, either a leaf or a nested entity's set
#[derive(Clone, Copy)]
pub enum SyncMember<'a> {
    Leaf(&'a dyn Trackable),
    Nested(&'a ReplicationSet),
}

impl<'a> SyncMember<'a> {
    pub fn leaf(value: &'a dyn Trackable) -> Self {
        SyncMember::Leaf(value)
    }

    pub fn net_id(&self) -> NetId {
        match *self {
            SyncMember::Leaf(value) => value.net_id(),
            SyncMember::Nested(set) => set.net_id(),
        }
    }

    pub fn name(&self) -> Option<&'a str> {
        match *self {
            SyncMember::Leaf(value) => value.name(),
            SyncMember::Nested(set) => set.name(),
        }
    }
}

/// One declared member, produced and discarded within a validation pass
pub struct FieldDescriptor<'a> {
    pub field: &'static str,
    pub value: Option<SyncMember<'a>>,
    pub excluded: bool,
}

impl<'a> FieldDescriptor<'a> {
    pub fn tracked(field: &'static str, value: Option<SyncMember<'a>>) -> Self {
        Self {
            field,
            value,
            excluded: false,
        }
    }

    /// A member deliberately kept out of replication
    pub fn excluded(field: &'static str, value: Option<SyncMember<'a>>) -> Self {
        Self {
            field,
            value,
            excluded: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    ExcludedButTracked,
    Missing,
    Unnamed,
    NotInCollection,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ViolationKind::ExcludedButTracked => "is marked excluded but is in the collection",
            ViolationKind::Missing => "is null",
            ViolationKind::Unnamed => "has no name",
            ViolationKind::NotInCollection => "isn't in the collection",
        };
        f.write_str(text)
    }
}

/// A wiring mistake found by [`validate`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{owner}.{field} {kind}")]
pub struct ValidationViolation {
    pub owner: String,
    pub field: &'static str,
    pub kind: ViolationKind,
}

/// Reports every member of `owner` that is not correctly registered
///
/// Excluded members are only checked for being tracked anyway. Every other
/// member must be present, named, and in the owner's replication set.
/// Violations go to `report` in declaration order; the scan never stops early.
pub fn validate<O>(owner: &O, mut report: impl FnMut(ValidationViolation))
where
    O: Replicated + ?Sized,
{
    let fields = owner.net_fields();
    let owner_name = fields.display_name();
    let mut violation = |field: &'static str, kind: ViolationKind| {
        report(ValidationViolation {
            owner: owner_name.to_string(),
            field,
            kind,
        })
    };

    let mut candidates = Vec::new();
    for member in owner.declared_members() {
        if member.excluded {
            if let Some(value) = &member.value {
                if fields.contains(value.net_id()) {
                    violation(member.field, ViolationKind::ExcludedButTracked);
                }
            }
        } else {
            candidates.push(member);
        }
    }

    for member in candidates {
        let Some(value) = member.value else {
            violation(member.field, ViolationKind::Missing);
            continue;
        };
        if value.name().is_none() {
            violation(member.field, ViolationKind::Unnamed);
        }
        if !fields.contains(value.net_id()) {
            violation(member.field, ViolationKind::NotInCollection);
        }
    }
}

/// Validates `owner`, logging each violation as a warning
///
/// Returns the number of violations found.
pub fn validate_to_log<O>(owner: &O) -> usize
where
    O: Replicated + ?Sized,
{
    let mut count = 0;
    validate(owner, |violation| {
        warn!("{}", violation);
        count += 1;
    });
    count
}

/// Builds a `Vec<FieldDescriptor>` from an entity's fields.
///
/// ```ignore
/// fn declared_members(&self) -> Vec<FieldDescriptor<'_>> {
///     declare_members!(self => {
///         field money,
///         optional hat,
///         nested current_tool,
///         excluded local_cache,
///     })
/// }
/// ```
#[macro_export]
macro_rules! declare_members {
    ($owner:expr => { $($kind:ident $field:ident),* $(,)? }) => {
        vec![$($crate::declare_members!(@member $owner, $kind $field)),*]
    };
    (@member $owner:expr, field $field:ident) => {
        $crate::validate::FieldDescriptor::tracked(
            stringify!($field),
            Some($crate::validate::SyncMember::leaf(&$owner.$field)),
        )
    };
    (@member $owner:expr, optional $field:ident) => {
        $crate::validate::FieldDescriptor::tracked(
            stringify!($field),
            $owner
                .$field
                .as_ref()
                .map(|value| $crate::validate::SyncMember::leaf(value)),
        )
    };
    (@member $owner:expr, nested $field:ident) => {
        $crate::validate::FieldDescriptor::tracked(
            stringify!($field),
            Some($crate::validate::SyncMember::Nested(
                $crate::validate::Replicated::net_fields(&$owner.$field),
            )),
        )
    };
    (@member $owner:expr, excluded $field:ident) => {
        $crate::validate::FieldDescriptor::excluded(
            stringify!($field),
            Some($crate::validate::SyncMember::leaf(&$owner.$field)),
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net_field::NetField;

    struct Tool {
        net_fields: ReplicationSet,
        upgrade_level: NetField<u8>,
    }

    impl Tool {
        fn new() -> Self {
            let mut tool = Self {
                net_fields: ReplicationSet::new("Tool"),
                upgrade_level: NetField::new(0),
            };
            tool.net_fields.add(&mut tool.upgrade_level, "upgrade_level");
            tool
        }
    }

    impl Replicated for Tool {
        fn net_fields(&self) -> &ReplicationSet {
            &self.net_fields
        }

        fn declared_members(&self) -> Vec<FieldDescriptor<'_>> {
            declare_members!(self => { field upgrade_level })
        }
    }

    struct Farmhand {
        net_fields: ReplicationSet,
        money: NetField<u32>,
        hat: Option<NetField<String>>,
        tool: Tool,
        stamina: NetField<i32>,
        cached_path: NetField<Vec<u32>>,
    }

    impl Farmhand {
        /// Builds a farmhand, skipping registration of the named members
        fn wired_except(skip: &[&str]) -> Self {
            let mut farmhand = Self {
                net_fields: ReplicationSet::new("Farmhand"),
                money: NetField::new(500),
                hat: Some(NetField::new("straw".to_string())),
                tool: Tool::new(),
                stamina: NetField::new(270),
                cached_path: NetField::new(Vec::new()),
            };
            let Farmhand {
                net_fields,
                money,
                hat,
                tool,
                stamina,
                ..
            } = &mut farmhand;
            if !skip.contains(&"money") {
                net_fields.add(money, "money");
            }
            if let Some(hat) = hat.as_mut().filter(|_| !skip.contains(&"hat")) {
                net_fields.add(hat, "hat");
            }
            if !skip.contains(&"tool") {
                net_fields.add_nested(&mut tool.net_fields, "tool");
            }
            if !skip.contains(&"stamina") {
                net_fields.add(stamina, "stamina");
            }
            farmhand
        }
    }

    impl Replicated for Farmhand {
        fn net_fields(&self) -> &ReplicationSet {
            &self.net_fields
        }

        fn declared_members(&self) -> Vec<FieldDescriptor<'_>> {
            declare_members!(self => {
                field money,
                optional hat,
                nested tool,
                field stamina,
                excluded cached_path,
            })
        }
    }

    fn collect<O: Replicated>(owner: &O) -> Vec<ValidationViolation> {
        let mut violations = Vec::new();
        validate(owner, |v| violations.push(v));
        violations
    }

    #[test]
    fn test_correctly_wired_entity_reports_nothing() {
        assert!(collect(&Farmhand::wired_except(&[])).is_empty());
        assert!(collect(&Tool::new()).is_empty());
    }

    #[test]
    fn test_unregistered_field_reported_once_as_missing_from_collection() {
        let farmhand = Farmhand::wired_except(&["stamina"]);
        let violations = collect(&farmhand);

        let not_in_collection: Vec<_> = violations
            .iter()
            .filter(|v| v.kind == ViolationKind::NotInCollection)
            .collect();
        assert_eq!(not_in_collection.len(), 1);
        assert_eq!(not_in_collection[0].field, "stamina");
        assert!(violations
            .iter()
            .any(|v| v.field == "stamina" && v.kind == ViolationKind::Unnamed));
    }

    #[test]
    fn test_every_violation_reported_in_declaration_order() {
        let farmhand = Farmhand::wired_except(&["money", "tool", "stamina"]);
        let fields: Vec<&str> = collect(&farmhand)
            .iter()
            .filter(|v| v.kind == ViolationKind::NotInCollection)
            .map(|v| v.field)
            .collect();
        assert_eq!(fields, vec!["money", "tool", "stamina"]);
    }

    #[test]
    fn test_unset_member_is_null() {
        let mut farmhand = Farmhand::wired_except(&[]);
        farmhand.hat = None;
        let violations = collect(&farmhand);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "hat");
        assert_eq!(violations[0].kind, ViolationKind::Missing);
    }

    #[test]
    fn test_excluded_but_tracked_is_contradiction() {
        let mut farmhand = Farmhand::wired_except(&[]);
        farmhand
            .net_fields
            .add(&mut farmhand.cached_path, "cached_path");

        let violations = collect(&farmhand);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::ExcludedButTracked);
        assert_eq!(
            violations[0].to_string(),
            "Farmhand.cached_path is marked excluded but is in the collection"
        );
    }

    #[test]
    fn test_registered_under_another_set_still_not_in_collection() {
        let mut farmhand = Farmhand::wired_except(&["money"]);
        let mut elsewhere = ReplicationSet::new("Elsewhere");
        elsewhere.add(&mut farmhand.money, "money");

        let violations = collect(&farmhand);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, ViolationKind::NotInCollection);
    }

    #[test]
    fn test_validate_to_log_counts_violations() {
        assert_eq!(validate_to_log(&Farmhand::wired_except(&[])), 0);
        assert_eq!(validate_to_log(&Farmhand::wired_except(&["money"])), 2);
    }
}
