//! Template Parser
//!
//! Loads workflow templates from YAML in two phases:
//! 1. Structural parse into a generic `serde_yaml::Value` tree
//! 2. Typed conversion through serde into raw records, then the checks
//!    serde cannot express (non-empty name, steps and commands)
//!
//! Unknown keys are rejected rather than ignored.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_yaml::Value;

use super::model::{Step, Template};
use crate::error::{Error, Result, SchemaError};

/// Loads a template from a YAML file.
///
/// # Example
///
/// ```rust,no_run
/// use runbook::workflow::load_template;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let template = load_template("recon.yaml")?;
///     println!("Loaded {} steps", template.steps.len());
///     Ok(())
/// }
/// ```
pub fn load_template(path: impl AsRef<Path>) -> Result<Template> {
    let path = path.as_ref();
    info!("Loading template from: {}", path.display());

    let raw = fs::read_to_string(path).map_err(|source| Error::TemplateRead {
        path: path.to_path_buf(),
        source,
    })?;

    debug!("YAML content loaded ({} bytes)", raw.len());

    let template = parse(&raw)?;
    info!(
        "Parsed template '{}': {} steps, {} variables",
        template.name,
        template.steps.len(),
        template.variables.len()
    );
    Ok(template)
}

/// Raw document shape, checked field by field by serde.
#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct RawTemplate {
    name: Option<String>,
    description: Option<String>,
    variables: Option<BTreeMap<String, Value>>,
    steps: Option<Vec<Value>>,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
struct RawStep {
    name: Option<String>,
    command: Option<String>,
    continue_on_error: Option<bool>,
    timeout: Option<f64>,
}

/// A variable default; numbers and booleans are kept as their text.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Number(serde_yaml::Number),
    Flag(bool),
}

impl Scalar {
    fn into_text(self) -> String {
        match self {
            Scalar::Text(text) => text,
            Scalar::Number(n) => n.to_string(),
            Scalar::Flag(b) => b.to_string(),
        }
    }
}

/// Parses template text into a validated [`Template`].
pub fn parse(raw: &str) -> std::result::Result<Template, SchemaError> {
    let tree: Value = serde_yaml::from_str(raw).map_err(|e| SchemaError::Yaml(e.to_string()))?;
    from_value(tree)
}

/// Converts a generic YAML tree into a [`Template`].
pub fn from_value(tree: Value) -> std::result::Result<Template, SchemaError> {
    if !tree.is_mapping() {
        return Err(SchemaError::NotAMapping);
    }
    let raw: RawTemplate = typed("template", tree)?;

    let name = raw.name.unwrap_or_default().trim().to_string();
    if name.is_empty() {
        return Err(SchemaError::MissingName);
    }

    let mut variables = BTreeMap::new();
    for (key, value) in raw.variables.unwrap_or_default() {
        let scalar: Scalar = typed(&format!("variables.{}", key), value)?;
        variables.insert(key, scalar.into_text());
    }

    let steps = raw
        .steps
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(index, item)| build_step(index, typed(&format!("steps[{}]", index), item)?))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    if steps.is_empty() {
        return Err(SchemaError::MissingSteps);
    }

    Ok(Template {
        name,
        description: raw.description,
        variables,
        steps,
    })
}

fn build_step(index: usize, raw: RawStep) -> std::result::Result<Step, SchemaError> {
    let name = match raw.name {
        Some(name) if !name.trim().is_empty() => name,
        _ => format!("Unnamed step {}", index + 1),
    };

    let command = raw.command.unwrap_or_default();
    if command.trim().is_empty() {
        return Err(SchemaError::EmptyCommand {
            index,
            name: name.trim().to_string(),
        });
    }

    let timeout = match raw.timeout {
        None => None,
        Some(seconds) if seconds.is_finite() && seconds >= 0.0 => Some(seconds.ceil() as u64),
        Some(_) => {
            return Err(SchemaError::Invalid {
                location: format!("steps[{}].timeout", index),
                message: "must be a non-negative number of seconds".to_string(),
            })
        }
    };

    let mut step = Step::new(name, command);
    step.continue_on_error = raw.continue_on_error.unwrap_or(false);
    step.timeout = timeout;
    Ok(step)
}

/// Second phase: typed conversion of one subtree.
fn typed<T: DeserializeOwned>(location: &str, value: Value) -> std::result::Result<T, SchemaError> {
    serde_yaml::from_value(value).map_err(|e| SchemaError::Invalid {
        location: location.to_string(),
        message: e.to_string(),
    })
}
