//! Per-stage USD budget ceilings.
//!
//! Budgets bound spend, not turns: the recon Explore phase in particular
//! is expected to hit its budget long before its turn cap.

/// Share of the recon budget given to the Explore phase; the remainder
/// funds Synthesize.
pub const RECON_EXPLORE_SHARE: f64 = 0.7;

const DEFAULT_STAGE_BUDGET_USD: f64 = 100.0;

/// USD ceilings per stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageBudgets {
    pub recon: f64,
    pub schema: f64,
    pub codegen: f64,
    pub test: f64,
    pub repair: f64,
    pub harden: f64,
}

impl Default for StageBudgets {
    fn default() -> Self {
        Self {
            recon: DEFAULT_STAGE_BUDGET_USD,
            schema: DEFAULT_STAGE_BUDGET_USD,
            codegen: DEFAULT_STAGE_BUDGET_USD,
            test: DEFAULT_STAGE_BUDGET_USD,
            repair: DEFAULT_STAGE_BUDGET_USD,
            harden: DEFAULT_STAGE_BUDGET_USD,
        }
    }
}

impl StageBudgets {
    /// Budget for the recon Explore phase.
    pub fn explore(&self) -> f64 {
        self.recon * RECON_EXPLORE_SHARE
    }

    /// Budget for the recon Synthesize phase.
    pub fn synthesize(&self) -> f64 {
        self.recon * (1.0 - RECON_EXPLORE_SHARE)
    }
}
