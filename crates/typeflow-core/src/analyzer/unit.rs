//! Schedulable re-analysis units.
//!
//! A unit re-walks one scope's body against current inputs, mutating type
//! variables and registering dependency edges as evaluation touches other
//! variables. Units are not uniquely owned: the scheduler queue, scope
//! tables and dependency edges all hold the same handle.

use std::collections::HashMap;

use crate::arena::Id;
use crate::ast::Expr;

use super::closure::CallChain;
use super::scope::ScopeId;
use super::values::FunctionId;
use super::ModuleId;

pub type UnitId = Id<UnitData>;

#[derive(Debug)]
pub struct UnitData {
    pub module: ModuleId,
    pub scope: ScopeId,
    pub kind: UnitKind,
    /// Invalidation identity. Call-chain clones bump this independently of
    /// the canonical unit so one chain's changes do not invalidate siblings.
    pub version: u32,
}

#[derive(Debug)]
pub enum UnitKind {
    /// Top-level module scope walk.
    Module,
    Function(FunctionUnit),
}

#[derive(Debug)]
pub struct FunctionUnit {
    pub function: FunctionId,
    /// The declaring (outer) scope; annotation and decorator expressions are
    /// evaluated there.
    pub decl_scope: ScopeId,
    /// Placeholder parameters for the generic pass, concrete ones for
    /// call-chain clones.
    pub concrete_parameters: bool,
    /// Synthetic decorator call expressions, cached per decorator position
    /// so repeated passes reuse the same node identity.
    pub decorator_calls: HashMap<usize, Expr>,
    /// Call-chain identity for closure clones; `None` on the canonical unit.
    pub chain: Option<CallChain>,
    /// Canonical unit this clone was derived from.
    pub original: Option<UnitId>,
}

impl UnitData {
    pub fn module_unit(module: ModuleId, scope: ScopeId) -> Self {
        UnitData {
            module,
            scope,
            kind: UnitKind::Module,
            version: 0,
        }
    }

    pub fn function_unit(
        module: ModuleId,
        scope: ScopeId,
        function: FunctionId,
        decl_scope: ScopeId,
    ) -> Self {
        UnitData {
            module,
            scope,
            kind: UnitKind::Function(FunctionUnit {
                function,
                decl_scope,
                concrete_parameters: false,
                decorator_calls: HashMap::new(),
                chain: None,
                original: None,
            }),
            version: 0,
        }
    }

    pub fn function(&self) -> Option<&FunctionUnit> {
        match &self.kind {
            UnitKind::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn function_mut(&mut self) -> Option<&mut FunctionUnit> {
        match &mut self.kind {
            UnitKind::Function(f) => Some(f),
            _ => None,
        }
    }
}

/// Outcome of one analysis pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    /// The pass stopped at a poll point; touched variables are consistent
    /// (possibly stale) and the unit is safely re-runnable.
    Cancelled,
}
