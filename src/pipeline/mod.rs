//! Repository migration pipeline.
//!
//! | Module    | Purpose                                                    |
//! |-----------|------------------------------------------------------------|
//! | `stage`   | Ordered stage sequence for a chunk count                   |
//! | `prompts` | Prompt text for each stage and for single-task intents     |
//! | `intent`  | Keyword classification of single tasks                     |
//! | `runner`  | Sequential stage execution with partial-result accounting  |

pub mod intent;
pub mod prompts;
pub mod runner;
pub mod stage;

pub use intent::{Intent, classify_intent};
pub use runner::{PipelineOutcome, PipelineRun, PipelineRunner, RunStatus, StageFailure};
pub use stage::PipelineStage;
