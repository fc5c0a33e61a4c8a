//! Agent execution subsystem.
//!
//! - **Mode**: permission tier the agent runs under
//! - **Task**: one unit of work and its validation
//! - **Prompt**: review templates
//! - **Command**: task to argument vector
//! - **Supervisor**: process lifecycle, timeout and termination
//! - **Output**: continuation handle and failure hint parsing
//! - **Executor**: ordered, isolated parallel batches

pub mod command;
pub mod executor;
pub mod mode;
pub mod output;
pub mod prompt;
pub mod supervisor;
pub mod task;

pub use command::{CommandBuilder, CommandLine};
pub use mode::ExecutionMode;
pub use supervisor::{RunFailure, RunLimits, RunResult};
pub use task::{AgentTask, ReviewRequest};
