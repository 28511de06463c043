//! Run Reporting
//!
//! The engine never prints directly; everything the operator should see
//! goes through a [`Reporter`]. [`ConsoleReporter`] writes to the terminal,
//! [`CaptureReporter`] records events for inspection.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use colored::Colorize;

use crate::execution::interrupt::Interrupt;
use crate::workflow::state::RunStatus;

/// Which child stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Receives progress events and live child output.
pub trait Reporter {
    /// A step is about to run. `index` is 0-based.
    fn step_started(&mut self, index: usize, total: usize, name: &str, command: &str);

    /// A line of child output, without its trailing newline.
    fn output(&mut self, stream: Stream, line: &str);

    /// Dry run: the command that would have run.
    fn dry_run(&mut self, index: usize, total: usize, name: &str, command: &str);

    /// A step was skipped because a previous run completed it.
    fn step_skipped(&mut self, _index: usize, _name: &str) {}

    fn step_succeeded(&mut self, index: usize, name: &str);

    /// A step exited non-zero; `tolerated` is its `continue_on_error`.
    fn step_failed(&mut self, index: usize, name: &str, code: Option<i32>, tolerated: bool);

    fn step_interrupted(&mut self, index: usize, name: &str, interrupt: Interrupt);

    fn finished(&mut self, status: RunStatus, elapsed: Duration);
}

/// Terminal output with colored status prefixes.
#[derive(Debug, Default)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn step_started(&mut self, index: usize, total: usize, name: &str, command: &str) {
        println!();
        println!(
            "{} {} {}",
            "[STEP]".green(),
            format!("[{}/{}]", index + 1, total).magenta().bold(),
            name
        );
        println!("{} {}", "[CMND]".yellow(), command.dimmed());
    }

    fn output(&mut self, stream: Stream, line: &str) {
        match stream {
            Stream::Stdout => println!("    {}", line),
            Stream::Stderr => eprintln!("    {}", line),
        }
    }

    fn dry_run(&mut self, index: usize, total: usize, name: &str, command: &str) {
        println!();
        println!(
            "{} {} {}",
            "[DRY RUN]".cyan(),
            format!("[{}/{}]", index + 1, total).magenta().bold(),
            name
        );
        println!("  Command: {}", command);
    }

    fn step_skipped(&mut self, index: usize, name: &str) {
        println!(
            "{} [{}] {} already completed",
            "[SKIP]".blue(),
            index + 1,
            name
        );
    }

    fn step_succeeded(&mut self, _index: usize, name: &str) {
        println!("{} {} completed successfully", "[DONE]".green().bold(), name);
    }

    fn step_failed(&mut self, _index: usize, name: &str, code: Option<i32>, tolerated: bool) {
        let code = code.map_or_else(|| "signal".to_string(), |c| c.to_string());
        if tolerated {
            println!(
                "{} {} failed (exit {}), continuing",
                "[WARN]".yellow().bold(),
                name,
                code
            );
        } else {
            println!("{} {} failed (exit {})", "[ERR]".red().bold(), name, code);
        }
    }

    fn step_interrupted(&mut self, _index: usize, name: &str, interrupt: Interrupt) {
        let action = match interrupt {
            Interrupt::Skip => "skipped by operator",
            Interrupt::Abort => "aborted by operator",
        };
        println!("{} {} {}", "[WARN]".yellow().bold(), name, action);
    }

    fn finished(&mut self, status: RunStatus, elapsed: Duration) {
        println!();
        let line = format!("Workflow {} in {:.2?}", status, elapsed);
        match status {
            RunStatus::Completed => println!("{}", line.green().bold()),
            RunStatus::Running => println!("{}", line),
            RunStatus::Failed | RunStatus::Aborted => println!("{}", line.red().bold()),
        }
    }
}

/// A recorded reporter event.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Started(usize),
    Output(Stream, String),
    DryRun(usize, String),
    Skipped(usize),
    Succeeded(usize),
    Failed(usize, Option<i32>),
    Interrupted(usize, Interrupt),
    Finished(RunStatus),
}

/// Reporter that stores events in a shared list.
#[derive(Debug, Clone, Default)]
pub struct CaptureReporter {
    events: Arc<Mutex<Vec<Event>>>,
}

impl CaptureReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Lines the children wrote to `stream`.
    pub fn lines(&self, stream: Stream) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Output(s, line) if s == stream => Some(line),
                _ => None,
            })
            .collect()
    }

    /// Indices of steps that were started, in order.
    pub fn started(&self) -> Vec<usize> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Started(i) => Some(i),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: Event) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl Reporter for CaptureReporter {
    fn step_started(&mut self, index: usize, _total: usize, _name: &str, _command: &str) {
        self.record(Event::Started(index));
    }

    fn output(&mut self, stream: Stream, line: &str) {
        self.record(Event::Output(stream, line.to_string()));
    }

    fn dry_run(&mut self, index: usize, _total: usize, _name: &str, command: &str) {
        self.record(Event::DryRun(index, command.to_string()));
    }

    fn step_skipped(&mut self, index: usize, _name: &str) {
        self.record(Event::Skipped(index));
    }

    fn step_succeeded(&mut self, index: usize, _name: &str) {
        self.record(Event::Succeeded(index));
    }

    fn step_failed(&mut self, index: usize, _name: &str, code: Option<i32>, _tolerated: bool) {
        self.record(Event::Failed(index, code));
    }

    fn step_interrupted(&mut self, index: usize, _name: &str, interrupt: Interrupt) {
        self.record(Event::Interrupted(index, interrupt));
    }

    fn finished(&mut self, status: RunStatus, _elapsed: Duration) {
        self.record(Event::Finished(status));
    }
}
