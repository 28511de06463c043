//! Workflow Execution Engine
//!
//! Runs a template's steps one after another against a target:
//! - Resume from the last checkpoint of a previous run
//! - Live output streaming for every step
//! - `continue_on_error` failure policy
//! - Operator skip/abort interrupts
//! - One state checkpoint per step transition

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Instant;

use log::{debug, error, info, warn};

use super::interrupt::{Interrupt, Interrupts};
use super::report::{ConsoleReporter, Reporter};
use super::step::{run_command, StepOutcome};
use crate::error::{Error, Result};
use crate::workflow::state::{RunStatus, StateRecord, StateStore};
use crate::workflow::variables::{Prompter, Resolver};
use crate::workflow::Template;

/// Per-run switches.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Print expanded commands instead of running them; state is untouched
    pub dry_run: bool,
    /// Continue from the stored checkpoint instead of starting over
    pub resume: bool,
    /// Directory steps run in, the current one if unset
    pub working_dir: Option<PathBuf>,
}

/// What a run did.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub status: RunStatus,
    /// First step index considered by this run
    pub start_index: usize,
    /// Steps whose command was launched (or printed, in a dry run), in order
    pub executed: Vec<usize>,
    /// Steps known to have finished successfully, including earlier runs
    pub completed_steps: BTreeSet<usize>,
    /// Failed or skipped steps the run moved past
    pub accepted_failures: Vec<usize>,
    /// Step that stopped the run, if any
    pub stopped_at: Option<usize>,
    /// A resume found a completed record and ran nothing
    pub nothing_to_do: bool,
}

impl RunResult {
    fn new(start_index: usize, completed_steps: BTreeSet<usize>) -> Self {
        Self {
            status: RunStatus::Running,
            start_index,
            executed: Vec::new(),
            completed_steps,
            accepted_failures: Vec::new(),
            stopped_at: None,
            nothing_to_do: false,
        }
    }

    /// True when the last step this run executed failed and was tolerated.
    pub fn ended_with_failure(&self) -> bool {
        match (self.executed.last(), self.accepted_failures.last()) {
            (Some(last), Some(failed)) => last == failed,
            _ => false,
        }
    }

    /// Process exit code for the run.
    pub fn exit_code(&self) -> i32 {
        match self.status {
            RunStatus::Completed if self.ended_with_failure() => 1,
            RunStatus::Completed => 0,
            RunStatus::Aborted => 130,
            RunStatus::Failed | RunStatus::Running => 1,
        }
    }
}

/// Workflow execution engine.
///
/// # Example
///
/// ```rust,no_run
/// use runbook::execution::Engine;
/// use runbook::workflow::{load_template, StateStore};
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let template = load_template("recon.yaml")?;
///     let store = StateStore::new("/var/lib/runbook/state");
///
///     let mut engine = Engine::new(template, "example.com", store);
///     engine.set_resume(true);
///
///     let result = engine.run()?;
///     std::process::exit(result.exit_code());
/// }
/// ```
pub struct Engine {
    template: Template,
    target: String,
    store: StateStore,
    options: RunOptions,
    interrupts: Interrupts,
    reporter: Box<dyn Reporter>,
    prompter: Option<Box<dyn Prompter>>,
}

impl Engine {
    /// Creates an engine with console output and no interactive prompting.
    pub fn new(template: Template, target: impl Into<String>, store: StateStore) -> Self {
        Self {
            template,
            target: target.into(),
            store,
            options: RunOptions::default(),
            interrupts: Interrupts::new(),
            reporter: Box::new(ConsoleReporter),
            prompter: None,
        }
    }

    pub fn set_options(&mut self, options: RunOptions) {
        self.options = options;
    }

    /// Enables or disables dry run mode.
    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.options.dry_run = dry_run;
    }

    pub fn set_resume(&mut self, resume: bool) {
        self.options.resume = resume;
    }

    /// Sets the working directory for step execution.
    pub fn set_working_dir(&mut self, dir: impl Into<PathBuf>) {
        self.options.working_dir = Some(dir.into());
    }

    /// Uses `interrupts` as the skip/abort source.
    pub fn set_interrupts(&mut self, interrupts: Interrupts) {
        self.interrupts = interrupts;
    }

    pub fn set_reporter(&mut self, reporter: impl Reporter + 'static) {
        self.reporter = Box::new(reporter);
    }

    /// Lets the engine ask the operator for undefined variables.
    pub fn set_prompter(&mut self, prompter: impl Prompter + 'static) {
        self.prompter = Some(Box::new(prompter));
    }

    /// Executes the workflow.
    ///
    /// 1. Loads the previous checkpoint when resuming
    /// 2. Resolves declared variables
    /// 3. Runs each remaining step, checkpointing after every transition
    /// 4. Reports the final status
    ///
    /// # Errors
    ///
    /// Undefined or cyclic variables, prompt failures and state write
    /// failures end the run with an error. Step failures and interrupts are
    /// described by the returned [`RunResult`] instead.
    pub fn run(&mut self) -> Result<RunResult> {
        let started = Instant::now();
        let dry_run = self.options.dry_run;
        let workflow_name = self.template.name.clone();
        let total = self.template.steps.len();

        let previous = if self.options.resume {
            let found = self.store.load(&workflow_name, &self.target);
            if found.is_none() {
                info!("No previous run of '{}' for '{}', starting fresh", workflow_name, self.target);
            }
            found
        } else {
            None
        };

        if let Some(record) = previous.as_ref() {
            if !record.status.is_resumable() {
                info!(
                    "'{}' already completed for '{}' - nothing to do",
                    workflow_name, self.target
                );
                let mut result = RunResult::new(total, record.completed_steps.clone());
                result.status = RunStatus::Completed;
                result.nothing_to_do = true;
                self.reporter.finished(RunStatus::Completed, started.elapsed());
                return Ok(result);
            }
            info!(
                "Resuming '{}' for '{}' at step {} ({} previously {})",
                workflow_name,
                self.target,
                record.current_step_index + 1,
                record.completed_steps.len(),
                record.status
            );
        }

        let snapshot = previous
            .as_ref()
            .map(|r| r.variables.clone())
            .unwrap_or_default();
        let mut resolver = Resolver::new(&self.template, &self.target, snapshot);
        resolver.resolve_declared(interactive(&mut self.prompter, dry_run))?;

        let mut record = previous.unwrap_or_else(|| StateRecord::new(&workflow_name, &self.target));
        record.status = RunStatus::Running;
        record.variables = resolver.environment().clone();

        let start_index = record.current_step_index;
        let mut result = RunResult::new(start_index, record.completed_steps.clone());

        if dry_run {
            info!("Mode: DRY RUN (commands will not execute)");
        } else {
            self.store.save(&record)?;
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        info!(
            "Running '{}' against '{}' ({} steps, starting at {})",
            workflow_name,
            self.target,
            total,
            start_index + 1
        );

        for index in start_index..total {
            let step = &self.template.steps[index];

            if record.is_completed(index) {
                self.reporter.step_skipped(index, &step.name);
                continue;
            }

            if self.interrupts.abort_requested() {
                warn!("Abort requested before step '{}'", step.name);
                record.mark_aborted(index);
                result.status = RunStatus::Aborted;
                result.stopped_at = Some(index);
                if !dry_run {
                    record.variables = resolver.environment().clone();
                    self.store.save(&record)?;
                }
                break;
            }
            let command = match resolver.expand(&step.command, interactive(&mut self.prompter, dry_run)) {
                Ok(command) => command,
                Err(e) => {
                    error!("Step '{}': {}", step.name, e);
                    if !dry_run {
                        record.mark_failed(index);
                        record.variables = resolver.environment().clone();
                        self.store.save(&record)?;
                    }
                    self.reporter.finished(RunStatus::Failed, started.elapsed());
                    return Err(e);
                }
            };

            // Ctrl-C while a prompt was open must not hit the step about to start.
            self.interrupts.clear_skip();
            result.executed.push(index);

            if dry_run {
                self.reporter.dry_run(index, total, &step.name, &command);
                continue;
            }

            if let Some(seconds) = step.timeout {
                debug!("Step '{}' timeout of {}s is reserved and not enforced", step.name, seconds);
            }

            info!("Starting step: {}", step.name);
            self.reporter.step_started(index, total, &step.name, &command);

            let outcome = runtime
                .block_on(run_command(
                    &command,
                    self.options.working_dir.as_deref(),
                    self.reporter.as_mut(),
                    &self.interrupts,
                ))
                .unwrap_or_else(|e| {
                    error!("Step '{}' could not be started: {}", step.name, e);
                    StepOutcome::Exited(None)
                });

            let is_last = index + 1 == total;
            match outcome {
                StepOutcome::Exited(Some(0)) => {
                    info!("Step '{}' completed successfully", step.name);
                    self.reporter.step_succeeded(index, &step.name);
                    record.mark_completed(index);
                    result.completed_steps.insert(index);
                }
                StepOutcome::Exited(code) if step.continue_on_error => {
                    warn!(
                        "{}; continuing",
                        Error::StepExecution {
                            index,
                            name: step.name.clone(),
                            code,
                        }
                    );
                    self.reporter.step_failed(index, &step.name, code, true);
                    record.mark_skipped(index);
                    result.accepted_failures.push(index);
                }
                StepOutcome::Exited(code) => {
                    error!(
                        "{}",
                        Error::StepExecution {
                            index,
                            name: step.name.clone(),
                            code,
                        }
                    );
                    self.reporter.step_failed(index, &step.name, code, false);
                    record.mark_failed(index);
                    result.status = RunStatus::Failed;
                    result.stopped_at = Some(index);
                }
                StepOutcome::Interrupted(Interrupt::Skip) => {
                    warn!("Step '{}' skipped by operator", step.name);
                    self.reporter.step_interrupted(index, &step.name, Interrupt::Skip);
                    record.mark_skipped(index);
                    result.accepted_failures.push(index);
                }
                StepOutcome::Interrupted(Interrupt::Abort) => {
                    warn!("{}", Error::Interrupted { index });
                    self.reporter.step_interrupted(index, &step.name, Interrupt::Abort);
                    record.mark_aborted(index);
                    result.status = RunStatus::Aborted;
                    result.stopped_at = Some(index);
                }
            }

            if result.status == RunStatus::Running && is_last {
                record.mark_finished();
                result.status = RunStatus::Completed;
            }

            record.variables = resolver.environment().clone();
            self.store.save(&record)?;

            if result.stopped_at.is_some() {
                break;
            }
        }

        // Every remaining step was already done, or this was a dry run.
        if result.status == RunStatus::Running {
            result.status = RunStatus::Completed;
            if !dry_run {
                record.mark_finished();
                record.variables = resolver.environment().clone();
                self.store.save(&record)?;
            }
        }

        self.reporter.finished(result.status, started.elapsed());
        info!(
            "Workflow '{}' {} ({} executed, {} tolerated failures)",
            workflow_name,
            result.status,
            result.executed.len(),
            result.accepted_failures.len()
        );

        Ok(result)
    }
}

/// Prompter to use for a resolution; dry runs never ask.
fn interactive(prompter: &mut Option<Box<dyn Prompter>>, dry_run: bool) -> Option<&mut dyn Prompter> {
    if dry_run {
        return None;
    }
    match prompter {
        Some(p) => Some(p.as_mut()),
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::report::{CaptureReporter, Event, Stream};
    use crate::workflow::variables::ScriptedPrompter;
    use crate::workflow::Step;
    use std::fs;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        dir: TempDir,
        store: StateStore,
        capture: CaptureReporter,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempdir().unwrap();
            let store = StateStore::new(dir.path().join("state"));
            Self {
                dir,
                store,
                capture: CaptureReporter::new(),
            }
        }

        fn work_dir(&self) -> &Path {
            self.dir.path()
        }

        fn engine(&self, template: &Template, target: &str) -> Engine {
            let mut engine = Engine::new(template.clone(), target, self.store.clone());
            engine.set_reporter(self.capture.clone());
            engine.set_working_dir(self.work_dir());
            engine
        }

        fn read(&self, file: &str) -> String {
            fs::read_to_string(self.work_dir().join(file)).unwrap_or_default()
        }
    }

    fn template(steps: Vec<Step>) -> Template {
        Template::new("test-flow", steps)
    }

    #[test]
    fn test_fresh_run_visits_every_step_in_order() {
        let fx = Fixture::new();
        let t = template(vec![
            Step::new("one", "echo 1 >> order.log"),
            Step::new("two", "echo 2 >> order.log"),
            Step::new("three", "echo 3 >> order.log"),
        ]);

        let result = fx.engine(&t, "host").run().unwrap();

        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.executed, vec![0, 1, 2]);
        assert_eq!(result.exit_code(), 0);
        assert_eq!(fx.read("order.log"), "1\n2\n3\n");
        assert_eq!(fx.capture.started(), vec![0, 1, 2]);

        let record = fx.store.load("test-flow", "host").unwrap();
        assert_eq!(record.status, RunStatus::Completed);
        assert_eq!(record.completed_steps, [0, 1, 2].into_iter().collect());
        assert_eq!(record.current_step_index, 3);
    }

    #[test]
    fn test_target_substitution() {
        let fx = Fixture::new();
        let t = template(vec![Step::new("echo", "echo {{TARGET}}")]);

        let result = fx.engine(&t, "example.com").run().unwrap();

        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(fx.capture.lines(Stream::Stdout), vec!["example.com"]);
    }

    #[test]
    fn test_declared_variable_references_target() {
        let fx = Fixture::new();
        let t = template(vec![Step::new("show", "echo {{OUTPUT_DIR}}")])
            .with_variable("OUTPUT_DIR", "{{TARGET}}");

        fx.engine(&t, "foo").run().unwrap();

        assert_eq!(fx.capture.lines(Stream::Stdout), vec!["foo"]);
        let record = fx.store.load("test-flow", "foo").unwrap();
        assert_eq!(record.variables["OUTPUT_DIR"], "foo");
    }

    #[test]
    fn test_continue_on_error_moves_on() {
        let fx = Fixture::new();
        let t = template(vec![
            Step::new("flaky", "exit 4").allow_failure(),
            Step::new("after", "echo after"),
        ]);

        let result = fx.engine(&t, "host").run().unwrap();

        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.accepted_failures, vec![0]);
        assert_eq!(result.exit_code(), 0);
        assert!(fx.capture.events().contains(&Event::Failed(0, Some(4))));

        let record = fx.store.load("test-flow", "host").unwrap();
        assert!(!record.is_completed(0));
        assert!(record.is_completed(1));
        assert_eq!(record.status, RunStatus::Completed);
    }

    #[test]
    fn test_tolerated_failure_on_last_step_sets_exit_code() {
        let fx = Fixture::new();
        let t = template(vec![
            Step::new("ok", "true"),
            Step::new("flaky", "false").allow_failure(),
        ]);

        let result = fx.engine(&t, "host").run().unwrap();

        assert_eq!(result.status, RunStatus::Completed);
        assert!(result.ended_with_failure());
        assert_eq!(result.exit_code(), 1);
    }

    #[test]
    fn test_failure_halts_and_persists() {
        let fx = Fixture::new();
        let t = template(vec![
            Step::new("ok", "echo ok"),
            Step::new("broken", "exit 2"),
            Step::new("never", "touch never.txt"),
        ]);

        let result = fx.engine(&t, "host").run().unwrap();

        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.stopped_at, Some(1));
        assert_eq!(result.exit_code(), 1);
        assert!(!fx.work_dir().join("never.txt").exists());

        let record = fx.store.load("test-flow", "host").unwrap();
        assert_eq!(record.status, RunStatus::Failed);
        assert_eq!(record.current_step_index, 1);
        assert_eq!(record.completed_steps, [0].into_iter().collect());
    }

    #[test]
    fn test_resume_restarts_at_failed_step() {
        let fx = Fixture::new();
        let t = template(vec![
            Step::new("count", "echo run >> count.log"),
            Step::new("needs flag", "test -f flag"),
        ]);

        let first = fx.engine(&t, "host").run().unwrap();
        assert_eq!(first.status, RunStatus::Failed);

        fs::write(fx.work_dir().join("flag"), "").unwrap();

        let mut engine = fx.engine(&t, "host");
        engine.set_resume(true);
        let second = engine.run().unwrap();

        assert_eq!(second.status, RunStatus::Completed);
        assert_eq!(second.start_index, 1);
        assert_eq!(second.executed, vec![1]);
        assert_eq!(fx.read("count.log"), "run\n");
    }

    #[test]
    fn test_resume_never_repeats_completed_steps() {
        let fx = Fixture::new();
        let t = template(vec![
            Step::new("a", "echo a >> log"),
            Step::new("b", "echo b >> log"),
            Step::new("c", "echo c >> log"),
        ]);

        // A record whose index lags behind its completed set.
        let mut record = StateRecord::new("test-flow", "host");
        record.completed_steps.insert(1);
        record.mark_failed(0);
        fx.store.save(&record).unwrap();

        let mut engine = fx.engine(&t, "host");
        engine.set_resume(true);
        let result = engine.run().unwrap();

        assert_eq!(result.executed, vec![0, 2]);
        assert_eq!(fx.read("log"), "a\nc\n");
        assert!(fx.capture.events().contains(&Event::Skipped(1)));
    }

    #[test]
    fn test_resume_of_completed_run_is_noop() {
        let fx = Fixture::new();
        let t = template(vec![Step::new("a", "echo a >> log")]);

        fx.engine(&t, "host").run().unwrap();

        let mut engine = fx.engine(&t, "host");
        engine.set_resume(true);
        let result = engine.run().unwrap();

        assert!(result.nothing_to_do);
        assert_eq!(result.status, RunStatus::Completed);
        assert!(result.executed.is_empty());
        assert_eq!(fx.read("log"), "a\n");
    }

    #[test]
    fn test_without_resume_starts_over() {
        let fx = Fixture::new();
        let t = template(vec![
            Step::new("a", "echo a >> log"),
            Step::new("b", "exit 1"),
        ]);

        fx.engine(&t, "host").run().unwrap();
        let result = fx.engine(&t, "host").run().unwrap();

        assert_eq!(result.start_index, 0);
        assert_eq!(fx.read("log"), "a\na\n");
    }

    #[test]
    fn test_resume_uses_stored_variables() {
        let fx = Fixture::new();
        let t = template(vec![Step::new("show", "echo {{MODE}}")]).with_variable("MODE", "fast");

        let mut record = StateRecord::new("test-flow", "host");
        record.variables.insert("MODE".into(), "thorough".into());
        record.mark_aborted(0);
        fx.store.save(&record).unwrap();

        let mut engine = fx.engine(&t, "host");
        engine.set_resume(true);
        engine.run().unwrap();

        assert_eq!(fx.capture.lines(Stream::Stdout), vec!["thorough"]);
    }

    #[test]
    fn test_dry_run_spawns_nothing_and_keeps_state() {
        let fx = Fixture::new();
        let t = template(vec![
            Step::new("touch", "touch {{TARGET}}.txt"),
            Step::new("fail", "exit 1"),
        ]);

        let mut engine = fx.engine(&t, "host");
        engine.set_dry_run(true);
        let result = engine.run().unwrap();

        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.executed, vec![0, 1]);
        assert!(!fx.work_dir().join("host.txt").exists());
        assert!(fx.store.load("test-flow", "host").is_none());
        assert!(fx.store.list().unwrap().is_empty());
        assert!(fx
            .capture
            .events()
            .contains(&Event::DryRun(0, "touch host.txt".to_string())));
        assert!(fx.capture.started().is_empty());
    }

    #[test]
    fn test_dry_run_does_not_prompt() {
        let fx = Fixture::new();
        let t = template(vec![Step::new("key", "echo {{API_KEY}}")]);
        let prompter = ScriptedPrompter::new().answer("API_KEY", "k");

        let mut engine = fx.engine(&t, "host");
        engine.set_dry_run(true);
        engine.set_prompter(prompter.clone());
        let err = engine.run().unwrap_err();

        assert!(matches!(err, Error::UndefinedVariable { ref name } if name == "API_KEY"));
        assert!(prompter.asked().is_empty());
        assert!(fx.store.load("test-flow", "host").is_none());
    }

    #[test]
    fn test_undefined_variable_without_prompter_fails() {
        let fx = Fixture::new();
        let t = template(vec![
            Step::new("ok", "true"),
            Step::new("key", "echo {{API_KEY}}"),
        ]);

        let err = fx.engine(&t, "host").run().unwrap_err();

        assert!(matches!(err, Error::UndefinedVariable { .. }));
        let record = fx.store.load("test-flow", "host").unwrap();
        assert_eq!(record.status, RunStatus::Failed);
        assert_eq!(record.current_step_index, 1);
    }

    #[test]
    fn test_prompted_value_asked_once_and_persisted() {
        let fx = Fixture::new();
        let t = template(vec![
            Step::new("first", "echo {{TOKEN}}"),
            Step::new("second", "echo again {{TOKEN}}"),
        ]);
        let prompter = ScriptedPrompter::new().answer("TOKEN", "abc");

        let mut engine = fx.engine(&t, "host");
        engine.set_prompter(prompter.clone());
        engine.run().unwrap();

        assert_eq!(prompter.asked(), vec!["TOKEN"]);
        assert_eq!(fx.capture.lines(Stream::Stdout), vec!["abc", "again abc"]);
        let record = fx.store.load("test-flow", "host").unwrap();
        assert_eq!(record.variables["TOKEN"], "abc");
    }

    #[test]
    fn test_prompted_value_survives_resume() {
        let fx = Fixture::new();
        let t = template(vec![
            Step::new("first", "echo {{TOKEN}}"),
            Step::new("gate", "test -f flag"),
            Step::new("third", "echo {{TOKEN}} > token.txt"),
        ]);

        let mut engine = fx.engine(&t, "host");
        engine.set_prompter(ScriptedPrompter::new().answer("TOKEN", "abc"));
        engine.run().unwrap();

        fs::write(fx.work_dir().join("flag"), "").unwrap();
        let prompter = ScriptedPrompter::new();
        let mut engine = fx.engine(&t, "host");
        engine.set_resume(true);
        engine.set_prompter(prompter.clone());
        engine.run().unwrap();

        assert!(prompter.asked().is_empty());
        assert_eq!(fx.read("token.txt"), "abc\n");
    }

    #[test]
    fn test_skip_interrupt_moves_to_next_step() {
        let fx = Fixture::new();
        let t = template(vec![
            Step::new("slow", "sleep 30"),
            Step::new("after", "echo after"),
        ]);
        let interrupts = Interrupts::new();
        let handle = interrupts.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(300));
            handle.request_skip();
        });

        let mut engine = fx.engine(&t, "host");
        engine.set_interrupts(interrupts);
        let result = engine.run().unwrap();

        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.accepted_failures, vec![0]);
        assert_eq!(fx.capture.lines(Stream::Stdout), vec!["after"]);
        assert!(fx
            .capture
            .events()
            .contains(&Event::Interrupted(0, Interrupt::Skip)));

        let record = fx.store.load("test-flow", "host").unwrap();
        assert_eq!(record.completed_steps, [1].into_iter().collect());
    }

    #[test]
    fn test_abort_interrupt_stops_run() {
        let fx = Fixture::new();
        let t = template(vec![
            Step::new("slow", "sleep 30"),
            Step::new("never", "touch never.txt"),
        ]);
        let interrupts = Interrupts::new();
        let handle = interrupts.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(300));
            handle.request_abort();
        });

        let mut engine = fx.engine(&t, "host");
        engine.set_interrupts(interrupts);
        let result = engine.run().unwrap();

        assert_eq!(result.status, RunStatus::Aborted);
        assert_eq!(result.exit_code(), 130);
        assert!(!fx.work_dir().join("never.txt").exists());

        let record = fx.store.load("test-flow", "host").unwrap();
        assert_eq!(record.status, RunStatus::Aborted);
        assert_eq!(record.current_step_index, 0);
    }

    #[test]
    fn test_abort_before_start_checkpoints() {
        let fx = Fixture::new();
        let t = template(vec![Step::new("never", "touch never.txt")]);
        let interrupts = Interrupts::new();
        interrupts.request_abort();

        let mut engine = fx.engine(&t, "host");
        engine.set_interrupts(interrupts);
        let result = engine.run().unwrap();

        assert_eq!(result.status, RunStatus::Aborted);
        assert!(result.executed.is_empty());
        assert!(!fx.work_dir().join("never.txt").exists());
        assert_eq!(
            fx.store.load("test-flow", "host").unwrap().status,
            RunStatus::Aborted
        );
    }

    #[test]
    fn test_spawn_failure_halts_run() {
        let fx = Fixture::new();
        let t = template(vec![
            Step::new("unreachable dir", "true"),
            Step::new("never", "true"),
        ]);

        let mut engine = fx.engine(&t, "host");
        engine.set_working_dir(fx.work_dir().join("missing"));
        let result = engine.run().unwrap();

        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.stopped_at, Some(0));
        assert!(fx.capture.events().contains(&Event::Failed(0, None)));

        let record = fx.store.load("test-flow", "host").unwrap();
        assert_eq!(record.status, RunStatus::Failed);
        assert_eq!(record.current_step_index, 0);
        assert!(record.completed_steps.is_empty());
    }

    #[test]
    fn test_spawn_failure_tolerated_with_continue_on_error() {
        let fx = Fixture::new();
        let t = template(vec![
            Step::new("a", "true").allow_failure(),
            Step::new("b", "true").allow_failure(),
        ]);

        let mut engine = fx.engine(&t, "host");
        engine.set_working_dir(fx.work_dir().join("missing"));
        let result = engine.run().unwrap();

        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.accepted_failures, vec![0, 1]);
        assert_eq!(result.exit_code(), 1);

        let record = fx.store.load("test-flow", "host").unwrap();
        assert_eq!(record.status, RunStatus::Completed);
        assert!(record.completed_steps.is_empty());
    }

    #[test]
    fn test_skip_during_prompt_does_not_hit_next_step() {
        struct SkippingPrompter(Interrupts);

        impl Prompter for SkippingPrompter {
            fn prompt(&mut self, _name: &str) -> std::io::Result<String> {
                self.0.request_skip();
                Ok("value".to_string())
            }
        }

        let fx = Fixture::new();
        let t = template(vec![Step::new("slowish", "sleep 0.3; echo {{ASKED}}")]);
        let interrupts = Interrupts::new();

        let mut engine = fx.engine(&t, "host");
        engine.set_interrupts(interrupts.clone());
        engine.set_prompter(SkippingPrompter(interrupts));
        let result = engine.run().unwrap();

        assert_eq!(result.status, RunStatus::Completed);
        assert!(result.accepted_failures.is_empty());
        assert_eq!(fx.capture.lines(Stream::Stdout), vec!["value"]);
    }

    #[test]
    fn test_exit_codes() {
        let mut result = RunResult::new(0, BTreeSet::new());
        result.status = RunStatus::Completed;
        assert_eq!(result.exit_code(), 0);
        result.status = RunStatus::Failed;
        assert_eq!(result.exit_code(), 1);
        result.status = RunStatus::Aborted;
        assert_eq!(result.exit_code(), 130);
    }
}
