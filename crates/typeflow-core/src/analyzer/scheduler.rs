//! Worklist fixpoint loop.
//!
//! Units are re-analyzed until no variable grows any further. Growth is
//! monotone (set-union, with container descriptors merged element-wise), so
//! the loop terminates whenever the flowing type universe is finite; the
//! iteration cap is a backstop for pathological inputs, not a correctness
//! mechanism.

use tracing::{debug, error};

use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::eval::Evaluator;

use super::unit::Outcome;
use super::Analyzer;

/// Outcome of one [`Analyzer::solve`] run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolveResult {
    /// Unit passes executed, including repeats.
    pub iterations: usize,
    /// False when the run stopped on cancellation or the iteration cap with
    /// work still queued.
    pub completed: bool,
}

impl Analyzer {
    /// Drain the worklist to a fixpoint. Failed units are recorded and
    /// skipped; a cancelled unit is put back so a later run resumes cleanly.
    pub fn solve(&mut self, evaluator: &dyn Evaluator, cancel: &CancellationToken) -> Result<SolveResult> {
        let max_iterations = self.limits.max_iterations;
        let mut iterations = 0usize;

        while let Some(unit) = self.pop_unit() {
            if cancel.is_cancelled() {
                self.enqueue(unit);
                return Ok(SolveResult {
                    iterations,
                    completed: false,
                });
            }
            if iterations >= max_iterations {
                debug!(iterations, queued = self.queue_len() + 1, "iteration cap reached");
                self.enqueue(unit);
                return Ok(SolveResult {
                    iterations,
                    completed: false,
                });
            }
            iterations += 1;

            match self.analyze(unit, evaluator, cancel) {
                Ok(Outcome::Completed) => {}
                Ok(Outcome::Cancelled) => {
                    self.enqueue(unit);
                    return Ok(SolveResult {
                        iterations,
                        completed: false,
                    });
                }
                Err(err) => {
                    // One bad unit must not poison the rest of the run.
                    error!(unit = ?unit, %err, "analysis unit failed");
                    self.events.record_failure(unit, &err);
                }
            }
        }

        Ok(SolveResult {
            iterations,
            completed: true,
        })
    }
}
