//! Runbook CLI Entry Point
//!
//! # Usage
//!
//! ```bash
//! # Run a template against a target
//! runbook run recon.yaml example.com
//!
//! # Continue a failed or interrupted run
//! runbook run recon.yaml example.com --resume
//!
//! # Preview expanded commands
//! runbook run recon.yaml example.com --dry-run
//!
//! # Check a template without running it
//! runbook validate recon.yaml
//!
//! # Inspect and clear stored runs
//! runbook list
//! runbook clear recon example.com
//! ```
//!
//! While a step runs, Ctrl-C skips it; a second Ctrl-C within two seconds
//! aborts the whole run.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use colored::Colorize;
use log::{info, warn};

use runbook::commands::{self, RunRequest};
use runbook::execution::Interrupts;
use runbook::workflow::ValidationReport;
use runbook::{Settings, APP_NAME, VERSION};

/// Window in which a second Ctrl-C turns a skip into an abort.
const ABORT_WINDOW: Duration = Duration::from_secs(2);

/// Exit code for errors raised outside the step loop.
const EXIT_FATAL: u8 = 2;

#[derive(Parser)]
#[command(name = "runbook")]
#[command(about = "Run declarative shell workflows against a target, with resume")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true, help = "Enable debug logging")]
    verbose: bool,

    #[arg(long, global = true, help = "Append log output to this file")]
    log_file: Option<PathBuf>,

    #[arg(long, global = true, help = "Directory holding run state records")]
    state_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a template against a target
    Run {
        #[arg(help = "Path to template YAML file")]
        template: PathBuf,

        #[arg(help = "Target substituted for {{TARGET}}")]
        target: String,

        #[arg(long, help = "Print expanded commands without executing")]
        dry_run: bool,

        #[arg(long, help = "Continue from the last checkpoint")]
        resume: bool,

        #[arg(long, help = "Directory steps run in")]
        working_dir: Option<PathBuf>,
    },

    /// Check a template without running it
    Validate {
        #[arg(help = "Path to template YAML file")]
        template: PathBuf,
    },

    /// List stored runs
    List,

    /// Delete the stored run of a workflow for a target
    Clear {
        #[arg(help = "Workflow name as declared in the template")]
        workflow: String,

        #[arg(help = "Target of the run")]
        target: String,
    },
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool, log_file: Option<&Path>) -> Result<(), std::io::Error> {
    let level = if verbose { "debug" } else { "info" };

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level));
    builder.format(|buf, record| {
        use std::io::Write;

        match record.level() {
            log::Level::Warn | log::Level::Error => {
                writeln!(buf, "[{}] {}", record.level(), record.args())
            }
            _ => writeln!(buf, "{}", record.args()),
        }
    });

    if let Some(path) = log_file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME.bold(), VERSION);
    println!(
        "Started {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    println!();
}

/// Routes Ctrl-C to the run's interrupt flags.
fn install_interrupt_handler(interrupts: &Interrupts) {
    let interrupts = interrupts.clone();
    let mut last_press: Option<Instant> = None;

    let installed = ctrlc::set_handler(move || {
        let now = Instant::now();
        match last_press {
            Some(previous) if now.duration_since(previous) <= ABORT_WINDOW => {
                eprintln!();
                eprintln!("{}", "Abort requested, stopping run".red().bold());
                interrupts.request_abort();
            }
            _ => {
                eprintln!();
                eprintln!(
                    "{}",
                    "Skipping current step (Ctrl-C again within 2s to abort)".yellow()
                );
                interrupts.request_skip();
            }
        }
        last_press = Some(now);
    });

    if let Err(e) = installed {
        warn!("Could not install Ctrl-C handler: {}", e);
    }
}

fn print_report(report: &ValidationReport) {
    for finding in report.warnings() {
        println!("{} {}", "[WARN]".yellow().bold(), finding);
    }
    for finding in report.infos() {
        println!("{} {}", "[INFO]".blue(), finding);
    }
    if report.warnings().count() == 0 {
        println!("{}", "Template OK".green().bold());
    }
}

fn run(args: Args) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut settings = Settings::from_env();
    if let Some(dir) = args.state_dir.as_ref() {
        settings = settings.with_state_dir(dir);
    }

    match args.command {
        Commands::Run {
            template,
            target,
            dry_run,
            resume,
            working_dir,
        } => {
            print_banner();
            info!("State directory: {}", settings.state_dir.display());

            if let Some(dir) = working_dir.as_ref() {
                if !dir.is_dir() {
                    return Err(format!("Working directory does not exist: {}", dir.display()).into());
                }
            }

            let interrupts = Interrupts::new();
            install_interrupt_handler(&interrupts);

            let request = RunRequest {
                template_path: template,
                target,
                dry_run,
                resume,
                working_dir,
            };
            let result = commands::run(&settings, &request, interrupts)?;
            let code = u8::try_from(result.exit_code()).unwrap_or(1);
            Ok(ExitCode::from(code))
        }

        Commands::Validate { template } => {
            let report = commands::validate(&template)?;
            print_report(&report);
            Ok(ExitCode::SUCCESS)
        }

        Commands::List => {
            let states = commands::list_states(&settings)?;
            if states.is_empty() {
                println!("No stored runs in {}", settings.state_dir.display());
            }
            for state in states {
                println!(
                    "{}  {}  {}  next step {}  {} completed  updated {}",
                    state.workflow_name.bold(),
                    state.target,
                    state.status,
                    state.current_step_index + 1,
                    state.completed,
                    state.updated_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Clear { workflow, target } => {
            if commands::clear_state(&settings, &workflow, &target)? {
                println!("Cleared state for {} / {}", workflow, target);
            } else {
                println!("No state for {} / {}", workflow, target);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = setup_logging(args.verbose, args.log_file.as_deref()) {
        eprintln!("Error: cannot open log file: {}", e);
        return ExitCode::from(EXIT_FATAL);
    }

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::from(EXIT_FATAL)
        }
    }
}
