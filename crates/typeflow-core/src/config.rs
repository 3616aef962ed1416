//! Runtime limits and feature gates for the analyzer.

use serde::{Deserialize, Serialize};

/// Global analysis limits and policy switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// When set, a generic decorator's call result replaces the decorated
    /// function's exposed type; otherwise decorators are treated as identity.
    pub process_custom_decorators: bool,
    /// When set, annotation-derived types overwrite and lock the target
    /// variable instead of being unioned in.
    pub use_type_stub_packages_exclusively: bool,
    /// Upper bound on worklist iterations before the solver gives up.
    pub max_iterations: usize,
    /// Maximum call-chain length for context-sensitive closure units.
    /// Zero disables call-chain sensitivity entirely.
    pub call_chain_limit: usize,
    /// Surface silently skipped malformed decorators as diagnostic events.
    pub report_silent_decorator_skips: bool,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            process_custom_decorators: true,
            use_type_stub_packages_exclusively: false,
            max_iterations: 10_000,
            call_chain_limit: 3,
            report_silent_decorator_skips: false,
        }
    }
}
