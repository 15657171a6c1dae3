//! Explorer configuration.

use magnifier_ir::InlineOptions;

/// Knobs an [`Explorer`](crate::Explorer) is created with.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExplorerConfig {
    /// Limits handed to the IR inliner.
    pub inline: InlineOptions,
    /// Run the verifier on every re-indexed function and log findings.
    pub verify_after_mutation: bool,
}

impl ExplorerConfig {
    pub fn with_inline_limit(mut self, max_callee_insts: usize) -> Self {
        self.inline.max_callee_insts = max_callee_insts;
        self
    }

    pub fn with_verification(mut self, enabled: bool) -> Self {
        self.verify_after_mutation = enabled;
        self
    }
}
