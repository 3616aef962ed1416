//! Lexical scope tree.
//!
//! Scopes are arena nodes: module, class, and function scopes each carry a
//! name → variable table; function scopes additionally own their ordered
//! parameter variables, the return slot, optional generator channels, and
//! the list of call-chain scopes linked to them.

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::arena::Id;

use super::values::{ClassId, FunctionId};
use super::variable::VarId;
use super::ModuleId;

pub type ScopeId = Id<Scope>;

#[derive(Debug)]
pub enum ScopeKind {
    Module(ModuleId),
    Class(ClassId),
    Function(FunctionScopeData),
}

#[derive(Debug)]
pub struct GeneratorChannels {
    pub yields: VarId,
    pub sends: VarId,
    pub returns: VarId,
}

#[derive(Debug)]
pub struct FunctionScopeData {
    pub function: FunctionId,
    /// Parameter variables in declaration order; filled by
    /// `ensure_parameters`.
    pub parameters: SmallVec<[VarId; 4]>,
    pub return_value: VarId,
    pub generator: Option<GeneratorChannels>,
    /// Call-chain scopes sharing this scope's canonical function.
    pub linked: Vec<ScopeId>,
}

#[derive(Debug)]
pub struct Scope {
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    pub name: String,
    variables: IndexMap<String, VarId>,
}

impl Scope {
    pub fn new(kind: ScopeKind, parent: Option<ScopeId>, name: impl Into<String>) -> Self {
        Scope {
            kind,
            parent,
            name: name.into(),
            variables: IndexMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<VarId> {
        self.variables.get(name).copied()
    }

    /// Bind `name` to `var`, replacing an existing binding.
    pub fn bind(&mut self, name: impl Into<String>, var: VarId) {
        self.variables.insert(name.into(), var);
    }

    pub fn variables(&self) -> impl Iterator<Item = (&str, VarId)> {
        self.variables.iter().map(|(n, v)| (n.as_str(), *v))
    }

    pub fn is_class(&self) -> bool {
        matches!(self.kind, ScopeKind::Class(_))
    }

    pub fn class(&self) -> Option<ClassId> {
        match self.kind {
            ScopeKind::Class(c) => Some(c),
            _ => None,
        }
    }

    pub fn function_data(&self) -> Option<&FunctionScopeData> {
        match &self.kind {
            ScopeKind::Function(data) => Some(data),
            _ => None,
        }
    }

    pub fn function_data_mut(&mut self) -> Option<&mut FunctionScopeData> {
        match &mut self.kind {
            ScopeKind::Function(data) => Some(data),
            _ => None,
        }
    }
}
