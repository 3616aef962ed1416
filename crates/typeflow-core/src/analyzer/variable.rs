//! Mutable type variables.
//!
//! A [`VariableDef`] tracks the evolving inferred type set for one binding
//! site (parameter, return slot, local, attribute) plus back-references to
//! the units that must re-run when it changes. Dependents are weak in the
//! ownership sense: removing a unit never removes the variable, whose
//! lifetime is tied to its owning module's arena.

use indexmap::IndexSet;

use crate::arena::Id;
use crate::types::TypeSet;

use super::unit::UnitId;

pub type VarId = Id<VariableDef>;

#[derive(Debug, Default)]
pub struct VariableDef {
    types: TypeSet,
    dependents: IndexSet<UnitId>,
    locked: bool,
}

impl VariableDef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn types(&self) -> &TypeSet {
        &self.types
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Grow-only union. Locked variables ignore this (not an error).
    /// Returns whether the set grew.
    pub fn add_types(&mut self, types: &TypeSet) -> bool {
        if self.locked {
            return false;
        }
        self.types.union_in_place(types)
    }

    /// Authoritative overwrite; applies even without strict growth.
    /// Returns whether the stored set changed.
    pub fn set_types(&mut self, types: TypeSet) -> bool {
        if self.types == types {
            return false;
        }
        self.types = types;
        true
    }

    /// One-way freeze: later `add_types` calls become no-ops.
    pub fn lock(&mut self) {
        self.locked = true;
    }

    /// Register a dependent unit; duplicate registration is idempotent.
    pub fn add_dependency(&mut self, unit: UnitId) {
        self.dependents.insert(unit);
    }

    pub fn dependents(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.dependents.iter().copied()
    }
}
