//! Canonical function, property and class records.
//!
//! A `FunctionInfo` is the identity shared by every call-context clone of a
//! function; per-context analysis state lives in the unit and its scope.
//! Properties pair a getter with an eventually discovered setter. Classes
//! carry the two propagation-link relations used for sharing inferred
//! signature types across a hierarchy.

use std::sync::Arc;

use crate::arena::Id;
use crate::ast::FunctionDef;

use super::scope::ScopeId;
use super::unit::UnitId;
use super::ModuleId;

pub type FunctionId = Id<FunctionInfo>;
pub type PropertyId = Id<PropertyInfo>;
pub type ClassId = Id<ClassInfo>;

#[derive(Debug)]
pub struct FunctionInfo {
    pub def: Arc<FunctionDef>,
    pub module: ModuleId,
    /// Class whose scope the function is declared in, if any.
    pub declaring_class: Option<ClassId>,
    /// The canonical analysis unit; closure clones reference it through
    /// their own unit record.
    pub unit: UnitId,
    pub is_static: bool,
    pub is_class_method: bool,
    pub is_abstract: bool,
    pub property: Option<PropertyId>,
}

impl FunctionInfo {
    pub fn new(
        def: Arc<FunctionDef>,
        module: ModuleId,
        declaring_class: Option<ClassId>,
        unit: UnitId,
    ) -> Self {
        FunctionInfo {
            def,
            module,
            declaring_class,
            unit,
            is_static: false,
            is_class_method: false,
            is_abstract: false,
            property: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    /// Constructor-like methods never take part in signature propagation.
    pub fn is_constructor(&self) -> bool {
        matches!(self.def.name.as_str(), "__init__" | "__new__")
    }
}

#[derive(Debug)]
pub struct PropertyInfo {
    pub getter: FunctionId,
    pub setter: Option<FunctionId>,
}

#[derive(Debug)]
pub struct ClassInfo {
    pub name: String,
    pub module: ModuleId,
    pub scope: ScopeId,
    /// Classes this one shares inferred parameter types with. Direction and
    /// membership come from external hierarchy metadata, not from `bases`.
    pub param_type_links: Vec<ClassId>,
    /// Same, for inferred return types.
    pub return_type_links: Vec<ClassId>,
}

impl ClassInfo {
    pub fn new(name: impl Into<String>, module: ModuleId, scope: ScopeId) -> Self {
        ClassInfo {
            name: name.into(),
            module,
            scope,
            param_type_links: Vec::new(),
            return_type_links: Vec::new(),
        }
    }
}
