//! noctua-core: an autonomous scraper-development pipeline.
//!
//! Given a target URL and a natural-language description of the data to
//! extract, [`run_pipeline`] drives a six-stage state machine
//! (RECON → SCHEMA → CODEGEN → TEST ⇄ REPAIR → HARDEN) over an external
//! LLM runtime, producing a tested, hardened scraper in a per-run
//! workspace. The pipeline owns retry and backoff, per-stage cost
//! budgets, artifact verification, a shell-command guardrail, state
//! persistence and a typed event stream; the model transport, browser
//! driver and tool implementations are behind the [`llm::LlmRuntime`]
//! contract.
//!
//! ```no_run
//! use std::sync::Arc;
//! use noctua_core::{run_pipeline, PipelineOptions};
//! # async fn example(runtime: Arc<dyn noctua_core::LlmRuntime>) {
//! let options = PipelineOptions::new("/var/scrapers", "sonnet-4");
//! let run = run_pipeline(
//!     runtime,
//!     "https://example.gov/records",
//!     "business permits with name and address",
//!     options,
//! )
//! .await;
//! println!("finished in stage {}", run.state.current_stage);
//! # }
//! ```

pub mod guardrail;
pub mod llm;
pub mod paths;
pub mod pipeline;
pub mod report;

mod text;

pub use guardrail::{BashGuardrail, GuardrailVerdict, InputGuardrail};
pub use llm::{
    CostEstimator, InvokeConfig, InvokeError, InvokeResult, LlmRuntime, OutputSchema,
    ReasoningEffort, ToolActivity, ToolSet,
};
pub use pipeline::{
    run_pipeline, slugify, PipelineEvent, PipelineOptions, PipelineRun, PipelineState,
    Stage, StageBudgets,
};
pub use report::{ReconReport, TestReport};
