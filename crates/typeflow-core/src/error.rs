//! Analysis error type.
//!
//! Malformed-but-plausible input never raises these; it degrades silently or
//! records a diagnostic event. Errors here mean a broken internal invariant,
//! and the scheduler isolates them to the offending unit.

use thiserror::Error;

use crate::analyzer::scope::ScopeId;
use crate::analyzer::unit::UnitId;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("unit {0:?} does not exist")]
    MissingUnit(UnitId),
    #[error("unit {0:?} is not a function unit")]
    NotAFunctionUnit(UnitId),
    #[error("scope {0:?} is not a function scope")]
    NotAFunctionScope(ScopeId),
    #[error("scope {0:?} does not exist")]
    MissingScope(ScopeId),
}

pub type Result<T, E = AnalysisError> = std::result::Result<T, E>;
