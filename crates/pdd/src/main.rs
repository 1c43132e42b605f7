mod config;
mod logging;
mod worker;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use owo_colors::OwoColorize;
use warden::clap::DaemonCommand;
use warden::{exit_codes, DaemonConfig, Intent, Report, StopOutcome, Supervisor, SupervisorError};

use crate::config::{Overrides, Settings};

const STOP_WAIT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "pdd", about = "Example daemon: start, stop, restart and query a background process", version)]
struct Cli {
	/// Print progress messages
	#[arg(short, long, global = true)]
	verbose: bool,

	/// Configuration file [default: $XDG_CONFIG_HOME/<name>/config.toml]
	#[arg(long, global = true)]
	config: Option<PathBuf>,

	#[command(flatten)]
	overrides: Overrides,

	#[command(subcommand)]
	command: DaemonCommand,
}

fn main() {
	let cli = Cli::parse();
	let diagnostics = logging::cli_dispatch(cli.verbose);
	let code = tracing::dispatcher::with_default(&diagnostics, || run(&cli));
	std::process::exit(code);
}

fn run(cli: &Cli) -> i32 {
	let settings = match config::load(cli.config.as_deref(), &cli.overrides) {
		Ok(settings) => settings,
		Err(e) => {
			print_error(cli.overrides.name.as_deref().unwrap_or(config::DEFAULT_NAME), &e);
			return exit_codes::FAILURE;
		}
	};
	let name = settings.daemon.name.clone();

	if matches!(cli.command, DaemonCommand::Start { .. } | DaemonCommand::Restart) {
		if let Err(e) = settings.prepare_dirs() {
			print_error(&name, &e);
			return exit_codes::FAILURE;
		}
	}
	if cli.verbose {
		announce(&cli.command, &settings);
	}

	let supervisor = Supervisor::new(settings.daemon.clone());
	match dispatch(&cli.command, &supervisor, &settings, cli.verbose) {
		Ok(code) => code,
		Err(e) => {
			print_error(&name, &e);
			e.exit_code()
		}
	}
}

fn dispatch(
	command: &DaemonCommand,
	supervisor: &Supervisor,
	settings: &Settings,
	verbose: bool,
) -> Result<i32, SupervisorError> {
	let name = &settings.daemon.name;
	let work = |daemon: &DaemonConfig| worker::run(&settings.work, daemon);

	match command {
		DaemonCommand::Start { foreground: true } => {
			supervisor.run_foreground(work)?;
			Ok(exit_codes::SUCCESS)
		}
		DaemonCommand::Stop { wait: true } => {
			let report = supervisor.execute(Intent::Stop, work)?;
			print_report(name, &report, verbose);
			if let Report::Stopping { pid } = report {
				if !supervisor.wait_stopped(STOP_WAIT)? {
					eprintln!(
						"{} {}: PID {} still holds {} after {}s",
						"error:".red().bold(),
						name,
						pid,
						settings.daemon.pid_file.display(),
						STOP_WAIT.as_secs()
					);
					return Ok(exit_codes::LOCK_CONTENDED);
				}
				if verbose {
					println!("{}: stopped", name);
				}
			}
			Ok(report.exit_code())
		}
		command => {
			let report = supervisor.execute(command.intent(), work)?;
			print_report(name, &report, verbose);
			Ok(report.exit_code())
		}
	}
}

fn announce(command: &DaemonCommand, settings: &Settings) {
	let name = &settings.daemon.name;
	if matches!(command, DaemonCommand::Stop { .. } | DaemonCommand::Restart) {
		println!("{}: stopping...", name);
	}
	if matches!(command, DaemonCommand::Start { .. } | DaemonCommand::Restart) {
		println!("{}: starting...", name);
		println!("{}: pid_file = {}", name, settings.daemon.pid_file.display());
		println!("{}: log_file = {}", name, settings.work.log_file.display());
	}
}

fn print_report(name: &str, report: &Report, verbose: bool) {
	match report {
		Report::Started { pid } => {
			if verbose {
				println!("{}: started, PID = {}", name, pid);
			}
		}
		Report::Restarted { stopped, pid } => {
			if *stopped == StopOutcome::NotRunning {
				println!("{}: NOT running", name);
			}
			if verbose {
				println!("{}: started, PID = {}", name, pid);
			}
		}
		Report::Stopping { pid } => {
			if verbose {
				println!("{}: sent SIGTERM to PID {}", name, pid);
			}
		}
		Report::Running { pid } => println!("{}: running, PID = {}", name, pid),
		Report::NotRunning => println!("{}: NOT running", name),
	}
}

fn print_error(name: &str, e: &dyn std::fmt::Display) {
	eprintln!("{} {}: {}", "error:".red().bold(), name, e);
}
