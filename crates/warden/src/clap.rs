use clap::Subcommand;

use crate::supervisor::Intent;

/// Daemon control subcommands, ready to embed in an application's CLI.
#[derive(Debug, Clone, Subcommand)]
pub enum DaemonCommand {
	/// Start the daemon in the background
	Start {
		/// Hold the lock and run in the foreground instead of detaching
		#[arg(long)]
		foreground: bool,
	},
	/// Stop the running daemon
	Stop {
		/// Wait until the daemon has released its lock
		#[arg(long)]
		wait: bool,
	},
	/// Stop the daemon, then start it again
	Restart,
	/// Show daemon status
	Status,
}

impl DaemonCommand {
	pub fn intent(&self) -> Intent {
		match self {
			DaemonCommand::Start { .. } => Intent::Start,
			DaemonCommand::Stop { .. } => Intent::Stop,
			DaemonCommand::Restart => Intent::Restart,
			DaemonCommand::Status => Intent::Status,
		}
	}
}
