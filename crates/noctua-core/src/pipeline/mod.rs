//! The staged pipeline: state machine, prompts, events and persistence.

pub mod budget;
pub mod diagnosis;
pub mod driver;
pub mod events;
pub mod prompts;
pub mod state;

pub use budget::StageBudgets;
pub use driver::{run_pipeline, PipelineOptions, PipelineRun};
pub use events::PipelineEvent;
pub use state::{load_state, save_state, slugify, PipelineState, Stage};
