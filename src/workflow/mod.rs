//! Workflow Definition Module
//!
//! Templates, the variables they reference, and the persisted progress of
//! running them against a target.
//!
//! # Structure
//!
//! - [`model`]: Core data structures (Step, Template)
//! - [`parser`]: YAML parsing and loading
//! - [`validator`]: Static checks on a template
//! - [`variables`]: `{{NAME}}` resolution and prompting
//! - [`state`]: Per (workflow, target) run records

pub mod model;
pub mod parser;
pub mod state;
pub mod validator;
pub mod variables;

pub use model::{Step, Template, TARGET_VARIABLE};
pub use parser::load_template;
pub use state::{RunStatus, StateRecord, StateStore, StateSummary};
pub use validator::{validate, ValidationReport};
pub use variables::{Prompter, Resolver, ScriptedPrompter, StdinPrompter};
