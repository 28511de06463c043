//! Template Data Model
//!
//! Core data structures representing a workflow template and its steps.
//!
//! # Example YAML Format
//!
//! ```yaml
//! name: recon
//! description: Basic host reconnaissance
//! variables:
//!   OUTPUT_DIR: "out/{{TARGET}}"
//!   PORTS: 1000
//! steps:
//!   - name: prepare
//!     command: mkdir -p {{OUTPUT_DIR}}
//!
//!   - name: scan
//!     command: nmap --top-ports {{PORTS}} {{TARGET}} -oN {{OUTPUT_DIR}}/nmap.txt
//!     continue_on_error: true
//! ```

use std::collections::BTreeMap;

/// Name of the variable bound to the target argument of a run.
pub const TARGET_VARIABLE: &str = "TARGET";

/// A single unit of work: one shell command plus its failure policy.
///
/// A step is identified by its position in [`Template::steps`]; the name is
/// only used for display.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// Display name
    pub name: String,

    /// Raw command, may contain `{{NAME}}` placeholders
    pub command: String,

    /// Keep going when this step exits non-zero
    pub continue_on_error: bool,

    /// Reserved. Parsed and stored, never enforced.
    pub timeout: Option<u64>,
}

impl Step {
    /// Creates a step that halts the run on failure.
    ///
    /// # Example
    ///
    /// ```
    /// use runbook::workflow::Step;
    ///
    /// let step = Step::new("ping", "ping -c 1 {{TARGET}}").allow_failure();
    /// assert!(step.continue_on_error);
    /// ```
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into().trim().to_string(),
            command: command.into().trim().to_string(),
            continue_on_error: false,
            timeout: None,
        }
    }

    /// Marks this step as allowed to fail without stopping the run.
    pub fn allow_failure(mut self) -> Self {
        self.continue_on_error = true;
        self
    }

    /// Sets the reserved timeout value.
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = Some(seconds);
        self
    }
}

/// A parsed, validated workflow definition.
///
/// Built once per invocation and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    /// Workflow name, half of the state key
    pub name: String,

    pub description: Option<String>,

    /// Declared defaults, name -> raw value (may contain placeholders)
    pub variables: BTreeMap<String, String>,

    /// Ordered steps; the index is the step's identity
    pub steps: Vec<Step>,
}

impl Template {
    /// Creates a template with no declared variables.
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            description: None,
            variables: BTreeMap::new(),
            steps,
        }
    }

    /// Declares a variable default.
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Returns the number of steps in the template.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if the template has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_creation() {
        let step = Step::new("  scan ", " nmap {{TARGET}} ").with_timeout(30);

        assert_eq!(step.name, "scan");
        assert_eq!(step.command, "nmap {{TARGET}}");
        assert!(!step.continue_on_error);
        assert_eq!(step.timeout, Some(30));
    }

    #[test]
    fn test_step_allow_failure() {
        let step = Step::new("flaky", "false").allow_failure();
        assert!(step.continue_on_error);
    }

    #[test]
    fn test_template_builder() {
        let template = Template::new(
            "recon",
            vec![Step::new("a", "echo a"), Step::new("b", "echo b")],
        )
        .with_variable("OUTPUT_DIR", "out");

        assert_eq!(template.len(), 2);
        assert!(!template.is_empty());
        assert_eq!(template.variables["OUTPUT_DIR"], "out");
        assert_eq!(template.steps[1].name, "b");
    }
}
