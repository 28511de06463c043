//! Invocation Surface
//!
//! The operations a front end calls: run, validate, list and clear. Each one
//! takes resolved [`Settings`] and returns library types; printing is left to
//! the caller.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::config::Settings;
use crate::error::Result;
use crate::execution::{ConsoleReporter, Engine, Interrupts, RunOptions, RunResult};
use crate::workflow::{
    load_template, validate as validate_template, StateSummary, StdinPrompter, ValidationReport,
};

/// Arguments of a `run`.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub template_path: PathBuf,
    pub target: String,
    pub dry_run: bool,
    pub resume: bool,
    pub working_dir: Option<PathBuf>,
}

impl RunRequest {
    pub fn new(template_path: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        Self {
            template_path: template_path.into(),
            target: target.into(),
            ..Self::default()
        }
    }
}

/// Loads and checks the template, then builds an engine for it.
///
/// Validation findings are logged and never stop the run.
pub fn prepare(settings: &Settings, request: &RunRequest) -> Result<Engine> {
    info!("Loading template: {}", request.template_path.display());
    let template = load_template(&request.template_path)?;
    info!(
        "Template '{}' loaded: {} steps, {} variables",
        template.name,
        template.len(),
        template.variables.len()
    );

    let report = validate_template(&template);
    for finding in report.warnings() {
        warn!("{}", finding);
    }
    for finding in report.infos() {
        debug!("{}", finding);
    }

    let mut engine = Engine::new(template, request.target.as_str(), settings.store());
    engine.set_options(RunOptions {
        dry_run: request.dry_run,
        resume: request.resume,
        working_dir: request.working_dir.clone(),
    });
    Ok(engine)
}

/// Runs a template against a target on the console, prompting on stdin.
pub fn run(settings: &Settings, request: &RunRequest, interrupts: Interrupts) -> Result<RunResult> {
    let mut engine = prepare(settings, request)?;
    engine.set_reporter(ConsoleReporter);
    engine.set_prompter(StdinPrompter);
    engine.set_interrupts(interrupts);
    engine.run()
}

/// Parses and checks a template without running it.
pub fn validate(template_path: impl AsRef<Path>) -> Result<ValidationReport> {
    let template = load_template(template_path)?;
    Ok(validate_template(&template))
}

/// Summaries of every stored run, sorted by workflow then target.
pub fn list_states(settings: &Settings) -> Result<Vec<StateSummary>> {
    settings.store().list()
}

/// Deletes the record for a (workflow, target) pair; returns whether it existed.
pub fn clear_state(settings: &Settings, workflow_name: &str, target: &str) -> Result<bool> {
    let existed = settings.store().delete(workflow_name, target)?;
    if existed {
        info!("Cleared state for '{}' / '{}'", workflow_name, target);
    } else {
        info!("No state stored for '{}' / '{}'", workflow_name, target);
    }
    Ok(existed)
}
