//! Runbook - Resumable Shell Workflow Runner
//!
//! Runs an ordered list of shell commands described in a YAML template
//! against a target, substituting `{{NAME}}` variables, streaming each
//! command's output live and checkpointing progress after every step so an
//! interrupted or failed run can pick up where it stopped.
//!
//! # Architecture
//!
//! The library is organized into these modules:
//!
//! - [`workflow`]: Templates, variables, validation and run state
//! - [`execution`]: Sequential execution engine and step runner
//! - [`commands`]: Run / validate / list / clear entry points
//! - [`config`]: Home and state directory resolution
//! - [`error`]: Error types
//!
//! # Example
//!
//! ```rust,no_run
//! use runbook::execution::Engine;
//! use runbook::load_template;
//! use runbook::workflow::StateStore;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Load a template from YAML
//!     let template = load_template("recon.yaml")?;
//!
//!     // Create execution engine
//!     let mut engine = Engine::new(template, "example.com", StateStore::new("state"));
//!     engine.set_resume(true);
//!     engine.set_working_dir("/data/recon");
//!
//!     // Execute the workflow
//!     let result = engine.run()?;
//!     println!("{}", result.status);
//!     Ok(())
//! }
//! ```

pub mod commands;
pub mod config;
pub mod error;
pub mod execution;
pub mod workflow;

// Re-export commonly used types
pub use config::Settings;
pub use error::{Error, Result, SchemaError};
pub use execution::engine::{Engine, RunResult};
pub use workflow::model::{Step, Template};
pub use workflow::parser::load_template;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "Runbook";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::CaptureReporter;
    use crate::workflow::{RunStatus, StateStore};
    use tempfile::tempdir;

    #[test]
    fn test_reexports_run_a_template_end_to_end() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("flow.yaml");
        std::fs::write(
            &path,
            "name: flow\nsteps:\n  - name: greet\n    command: echo hi {{TARGET}}\n",
        )
        .unwrap();

        let template: Template = load_template(&path).unwrap();
        let store = StateStore::new(dir.path().join("state"));
        let capture = CaptureReporter::new();

        let mut engine = Engine::new(template, "there", store.clone());
        engine.set_reporter(capture.clone());
        let result: RunResult = engine.run().unwrap();

        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.exit_code(), 0);
        assert_eq!(
            capture.lines(crate::execution::Stream::Stdout),
            vec!["hi there"]
        );
        assert!(store.load("flow", "there").is_some());
    }

    #[test]
    fn test_reexported_errors() {
        let err: Error = SchemaError::MissingSteps.into();
        assert!(matches!(err, Error::Schema(SchemaError::MissingSteps)));

        let settings = Settings::with_home("/srv/runbook");
        assert!(settings.state_dir.ends_with("state"));
    }
}
