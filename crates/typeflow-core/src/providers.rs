//! Pluggable annotation providers.
//!
//! Providers are the lowest-priority source of parameter and return types:
//! inline annotations win, then a companion (stub) declaration, then the
//! registered providers in registration order. A provider that returns
//! `None` or an empty set yields to the next one.

use crate::analyzer::unit::UnitId;
use crate::analyzer::Analyzer;
use crate::ast::Parameter;
use crate::types::TypeSet;

pub trait ParameterAnnotationProvider: Send + Sync {
    /// Types for one parameter of the given function unit, if this provider
    /// knows any.
    fn get_annotation(&self, analyzer: &Analyzer, unit: UnitId, param: &Parameter) -> Option<TypeSet>;
}

pub trait ReturnAnnotationProvider: Send + Sync {
    /// Return types for the given function unit, if this provider knows any.
    fn get_annotation(&self, analyzer: &Analyzer, unit: UnitId) -> Option<TypeSet>;
}
