//! Workflow Execution Module
//!
//! Runs a validated template against a target, one step at a time,
//! checkpointing progress so an interrupted or failed run can resume.
//!
//! # Architecture
//!
//! - [`engine`]: Sequential run loop, resume and dry run
//! - [`step`]: Spawning one shell command and streaming its output
//! - [`interrupt`]: Operator skip/abort requests
//! - [`report`]: Progress and output sinks

pub mod engine;
pub mod interrupt;
pub mod report;
pub mod step;

pub use engine::{Engine, RunOptions, RunResult};
pub use interrupt::{Interrupt, Interrupts};
pub use report::{CaptureReporter, ConsoleReporter, Reporter, Stream};
