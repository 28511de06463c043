//! Template Validation
//!
//! Advisory pre-execution checks that never run anything:
//! - Executables named as the first word of a command exist on `PATH`
//! - Path-like arguments exist (informational, an earlier step may create them)
//! - Every placeholder resolves from declared variables and `TARGET`
//!
//! Structural problems are rejected earlier by the parser; nothing here
//! blocks a run.

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use log::{debug, info};

use super::model::Template;
use super::variables::{has_placeholders, placeholders, Resolver};
use crate::error::Error;

/// Stand-in target used when scanning commands without a real run.
const SCAN_TARGET: &str = "<target>";

/// Shell builtins and keywords that never appear on `PATH`.
const SHELL_BUILTINS: &[&str] = &[
    ".", ":", "[", "[[", "alias", "bg", "break", "case", "cd", "command", "continue", "declare",
    "echo", "eval", "exec", "exit", "export", "false", "fg", "for", "function", "if", "jobs",
    "local", "printf", "pwd", "read", "readonly", "return", "set", "shift", "source", "test",
    "time", "trap", "true", "type", "ulimit", "umask", "unset", "until", "wait", "while", "{",
    "(",
];

/// How much a finding matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Likely to break the run
    Warning,
    /// Worth knowing, often harmless
    Info,
}

/// A single observation about a template.
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub severity: Severity,
    /// Step index the finding refers to, `None` for template-wide findings
    pub step: Option<usize>,
    pub message: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        match self.step {
            Some(index) => write!(f, "{} (step {}): {}", level, index + 1, self.message),
            None => write!(f, "{}: {}", level, self.message),
        }
    }
}

/// Result of [`validate`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub findings: Vec<Finding>,
}

impl ValidationReport {
    fn push(&mut self, severity: Severity, step: Option<usize>, message: String) {
        debug!("Validation {:?}: {}", severity, message);
        self.findings.push(Finding {
            severity,
            step,
            message,
        });
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(|f| f.severity == Severity::Warning)
    }

    pub fn infos(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.severity == Severity::Info)
    }

    /// True when there is nothing to report.
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

/// Runs every advisory check against a parsed template.
pub fn validate(template: &Template) -> ValidationReport {
    let mut report = ValidationReport::default();

    check_variables(template, &mut report);

    for (index, step) in template.steps.iter().enumerate() {
        let words = split_command(&step.command);
        let mut words = words
            .iter()
            .skip_while(|w| is_env_assignment(w))
            .map(String::as_str);

        if let Some(program) = words.next() {
            check_program(index, program, &mut report);
        }
        for word in words {
            check_path_argument(index, word, &mut report);
        }

        if let Some(seconds) = step.timeout {
            report.push(
                Severity::Info,
                Some(index),
                format!("timeout of {}s is reserved and will not be enforced", seconds),
            );
        }
    }

    info!(
        "Validated template '{}': {} warnings, {} notes",
        template.name,
        report.warnings().count(),
        report.infos().count()
    );
    report
}

/// Reports cycles among declared variables and placeholders with no value.
fn check_variables(template: &Template, report: &mut ValidationReport) {
    let mut resolver = Resolver::new(template, SCAN_TARGET, Default::default());

    for name in template.variables.keys() {
        if let Err(e) = resolver.resolve(name, None) {
            report.push(Severity::Warning, None, format!("variable '{}': {}", name, e));
        }
    }

    for (index, step) in template.steps.iter().enumerate() {
        for name in placeholders(&step.command) {
            match resolver.resolve(&name, None) {
                Ok(_) => {}
                Err(Error::UndefinedVariable { name }) => report.push(
                    Severity::Warning,
                    Some(index),
                    format!(
                        "'{{{{{}}}}}' is not declared and will be asked for at run time",
                        name
                    ),
                ),
                Err(e) => report.push(Severity::Warning, Some(index), e.to_string()),
            }
        }
    }
}

fn check_program(index: usize, program: &str, report: &mut ValidationReport) {
    if has_placeholders(program) || SHELL_BUILTINS.contains(&program) {
        return;
    }

    if program.contains('/') {
        if !expand_home(program).exists() {
            report.push(
                Severity::Warning,
                Some(index),
                format!("executable '{}' does not exist", program),
            );
        }
        return;
    }

    if find_in_path(program).is_none() {
        report.push(
            Severity::Warning,
            Some(index),
            format!(
                "'{}' was not found on PATH (ignore if it is a shell builtin or alias)",
                program
            ),
        );
    }
}

fn check_path_argument(index: usize, word: &str, report: &mut ValidationReport) {
    if !is_path_like(word) || has_placeholders(word) {
        return;
    }
    if !expand_home(word).exists() {
        report.push(
            Severity::Info,
            Some(index),
            format!(
                "path '{}' does not exist yet (fine if an earlier step creates it)",
                word
            ),
        );
    }
}

/// Shell-style word split, falling back to whitespace on unbalanced quotes.
fn split_command(command: &str) -> Vec<String> {
    shlex::split(command)
        .unwrap_or_else(|| command.split_whitespace().map(str::to_string).collect())
}

fn is_env_assignment(word: &str) -> bool {
    match word.split_once('=') {
        Some((name, _)) => {
            !name.is_empty()
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                && !name.starts_with(|c: char| c.is_ascii_digit())
        }
        None => false,
    }
}

fn is_path_like(word: &str) -> bool {
    if word.starts_with('-') || word.contains("://") {
        return false;
    }
    word.starts_with('/')
        || word.starts_with("./")
        || word.starts_with("../")
        || word.starts_with("~/")
        || (word.contains('/') && !word.contains(['>', '<', '|', '&', '=']))
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => match env::var_os("HOME") {
            Some(home) => Path::new(&home).join(rest),
            None => PathBuf::from(path),
        },
        None => PathBuf::from(path),
    }
}

/// Searches `PATH` for an executable file named `program`.
pub fn find_in_path(program: &str) -> Option<PathBuf> {
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file() || path.with_extension("exe").is_file()
}
