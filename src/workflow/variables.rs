//! Variable Resolution
//!
//! Expands `{{NAME}}` placeholders against a layered environment. Lookup
//! order for a name:
//!
//! 1. Snapshot recovered from a resumed state record
//! 2. The reserved `TARGET` binding
//! 3. The template's declared default
//! 4. An answer solicited from the operator through a [`Prompter`]
//!
//! Values may themselves contain placeholders; they are expanded
//! recursively up to [`MAX_EXPANSION_DEPTH`] levels. Every resolved name is
//! cached, so a name is never prompted for twice within a run.

use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex};

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

use super::model::{Template, TARGET_VARIABLE};
use crate::error::{Error, Result};

/// Nesting limit for variable-references-variable chains.
pub const MAX_EXPANSION_DEPTH: usize = 8;

/// `{{NAME}}`, inner whitespace tolerated. Any name without braces or
/// whitespace is a placeholder, so every declared key can be referenced.
static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([^{}\s]+)\s*\}\}").expect("placeholder pattern is valid")
});

/// Fully resolved variables, name -> value.
pub type Environment = BTreeMap<String, String>;

/// Source of values the resolver cannot find anywhere else.
pub trait Prompter {
    /// Asks the operator for the value of `name`.
    fn prompt(&mut self, name: &str) -> io::Result<String>;
}

/// Reads answers from standard input, one line per variable.
#[derive(Debug, Default)]
pub struct StdinPrompter;

impl Prompter for StdinPrompter {
    fn prompt(&mut self, name: &str) -> io::Result<String> {
        let mut stderr = io::stderr();
        write!(stderr, "Value for {{{{{}}}}}: ", name)?;
        stderr.flush()?;

        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "standard input closed",
            ));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

/// Answers from a fixed table; records every name it was asked for.
///
/// Clones share the record, so a test can keep one clone and hand the
/// other to the engine.
#[derive(Debug, Default, Clone)]
pub struct ScriptedPrompter {
    answers: BTreeMap<String, String>,
    asked: Arc<Mutex<Vec<String>>>,
}

impl ScriptedPrompter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.answers.insert(name.into(), value.into());
        self
    }

    /// Names prompted for, in order.
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().map(|a| a.to_vec()).unwrap_or_default()
    }
}

impl Prompter for ScriptedPrompter {
    fn prompt(&mut self, name: &str) -> io::Result<String> {
        if let Ok(mut asked) = self.asked.lock() {
            asked.push(name.to_string());
        }
        self.answers.get(name).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no scripted answer for {}", name))
        })
    }
}

/// Returns the distinct placeholder names in `text`, in order of appearance.
pub fn placeholders(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in PLACEHOLDER.captures_iter(text) {
        let name = &caps[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Returns true if `text` contains at least one placeholder.
pub fn has_placeholders(text: &str) -> bool {
    PLACEHOLDER.is_match(text)
}

/// Per-run variable resolver.
#[derive(Debug, Clone)]
pub struct Resolver {
    defaults: BTreeMap<String, String>,
    target: String,
    snapshot: BTreeMap<String, String>,
    resolved: Environment,
}

impl Resolver {
    /// Creates a resolver for one run of `template` against `target`.
    ///
    /// `snapshot` is the variable table of a resumed state record, empty for
    /// a fresh run.
    pub fn new(template: &Template, target: &str, snapshot: BTreeMap<String, String>) -> Self {
        Self {
            defaults: template.variables.clone(),
            target: target.to_string(),
            snapshot,
            resolved: Environment::new(),
        }
    }

    /// Resolves `TARGET` and every declared variable.
    ///
    /// Declared defaults always have a value, so this only fails on cycles
    /// or on undefined names referenced from a default.
    pub fn resolve_declared(&mut self, mut prompter: Option<&mut dyn Prompter>) -> Result<&Environment> {
        let mut names: Vec<String> = vec![TARGET_VARIABLE.to_string()];
        names.extend(self.defaults.keys().cloned());

        for name in names {
            self.resolve_name(&name, &mut prompter, &mut Vec::new())?;
        }
        Ok(&self.resolved)
    }

    /// Returns the resolved value of `name`.
    pub fn resolve(&mut self, name: &str, mut prompter: Option<&mut dyn Prompter>) -> Result<String> {
        self.resolve_name(name, &mut prompter, &mut Vec::new())
    }

    /// Replaces every placeholder in `text` with its resolved value.
    ///
    /// Without a prompter, a name with no value fails with
    /// [`Error::UndefinedVariable`].
    pub fn expand(&mut self, text: &str, mut prompter: Option<&mut dyn Prompter>) -> Result<String> {
        self.expand_inner(text, &mut prompter, &mut Vec::new())
    }

    /// Everything resolved so far, including operator answers.
    pub fn environment(&self) -> &Environment {
        &self.resolved
    }

    fn raw_value(&self, name: &str) -> Option<String> {
        if let Some(value) = self.snapshot.get(name) {
            return Some(value.clone());
        }
        if name == TARGET_VARIABLE {
            return Some(self.target.clone());
        }
        self.defaults.get(name).cloned()
    }

    fn resolve_name(
        &mut self,
        name: &str,
        prompter: &mut Option<&mut dyn Prompter>,
        stack: &mut Vec<String>,
    ) -> Result<String> {
        if let Some(value) = self.resolved.get(name) {
            return Ok(value.clone());
        }

        if let Some(start) = stack.iter().position(|n| n == name) {
            let mut cycle = stack[start..].to_vec();
            cycle.push(name.to_string());
            return Err(Error::CyclicVariable { cycle });
        }
        if stack.len() >= MAX_EXPANSION_DEPTH {
            let mut cycle = stack.clone();
            cycle.push(name.to_string());
            return Err(Error::CyclicVariable { cycle });
        }

        let raw = match self.raw_value(name) {
            Some(raw) => raw,
            None => match prompter.as_mut() {
                Some(p) => {
                    debug!("Prompting for undefined variable '{}'", name);
                    p.prompt(name).map_err(|source| Error::Prompt {
                        name: name.to_string(),
                        source,
                    })?
                }
                None => {
                    return Err(Error::UndefinedVariable {
                        name: name.to_string(),
                    })
                }
            },
        };

        stack.push(name.to_string());
        let value = self.expand_inner(&raw, prompter, stack)?;
        stack.pop();

        self.resolved.insert(name.to_string(), value.clone());
        Ok(value)
    }

    fn expand_inner(
        &mut self,
        text: &str,
        prompter: &mut Option<&mut dyn Prompter>,
        stack: &mut Vec<String>,
    ) -> Result<String> {
        let matches: Vec<(usize, usize, String)> = PLACEHOLDER
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                Some((whole.start(), whole.end(), caps[1].to_string()))
            })
            .collect();

        if matches.is_empty() {
            return Ok(text.to_string());
        }

        let mut expanded = String::with_capacity(text.len());
        let mut cursor = 0;
        for (start, end, name) in matches {
            expanded.push_str(&text[cursor..start]);
            let value = self.resolve_name(&name, prompter, stack)?;
            expanded.push_str(&value);
            cursor = end;
        }
        expanded.push_str(&text[cursor..]);
        Ok(expanded)
    }
}
