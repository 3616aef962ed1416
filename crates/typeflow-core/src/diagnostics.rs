//! Structured diagnostic events.
//!
//! Events mirror what the engine also emits through `tracing`, but are kept
//! in an inspectable sink so callers (and tests) can assert on them without
//! capturing log output. None of these are fatal; analysis always proceeds
//! with the best types available.

use crate::analyzer::unit::UnitId;
use crate::error::AnalysisError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisEvent {
    /// A new analysis unit was created (canonical or call-chain clone).
    NewUnit { unit: UnitId, name: String },
    /// A companion (stub) declaration's parameter count did not match the
    /// function's; the whole companion annotation set was discarded.
    AnnotationParameterCountMismatch { function: String },
    /// A recognized decorator was skipped because its shape was malformed
    /// (wrong arity, not class-scoped). Only recorded when
    /// `Limits::report_silent_decorator_skips` is set.
    DecoratorSkipped { function: String, reason: String },
    /// A unit hit an internal defect and was skipped; other units continue.
    UnitFailed { unit: UnitId, message: String },
}

/// Append-only event sink owned by the analyzer.
#[derive(Debug, Default)]
pub struct EventSink {
    events: Vec<AnalysisEvent>,
}

impl EventSink {
    pub fn push(&mut self, event: AnalysisEvent) {
        self.events.push(event);
    }

    pub fn record_failure(&mut self, unit: UnitId, error: &AnalysisError) {
        self.events.push(AnalysisEvent::UnitFailed {
            unit,
            message: error.to_string(),
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnalysisEvent> {
        self.events.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}
