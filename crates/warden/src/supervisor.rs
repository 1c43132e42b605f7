use std::io;
use std::time::{Duration, Instant};

use nix::errno::Errno;

use crate::config::DaemonConfig;
use crate::detach::{self, Detached, Notifier, Readiness, ReadinessMessage, Stage, Streams};
use crate::error::{DetachError, LockError, SupervisorError};
use crate::exit_codes;
use crate::lockfile::LockFile;
use crate::process;

/// The four things a caller can ask of a daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
	Start,
	Stop,
	Restart,
	Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
	Running { pid: u32 },
	Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
	/// SIGTERM was delivered. The process may still be shutting down.
	Signalled { pid: u32 },
	NotRunning,
}

/// Result of a successfully executed [`Intent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Report {
	Started { pid: u32 },
	Restarted { stopped: StopOutcome, pid: u32 },
	Stopping { pid: u32 },
	Running { pid: u32 },
	NotRunning,
}

impl Report {
	pub fn exit_code(&self) -> i32 {
		match self {
			Report::NotRunning => exit_codes::NOT_RUNNING,
			_ => exit_codes::SUCCESS,
		}
	}
}

impl From<Status> for Report {
	fn from(status: Status) -> Self {
		match status {
			Status::Running { pid } => Report::Running { pid },
			Status::Stopped => Report::NotRunning,
		}
	}
}

impl From<StopOutcome> for Report {
	fn from(outcome: StopOutcome) -> Self {
		match outcome {
			StopOutcome::Signalled { pid } => Report::Stopping { pid },
			StopOutcome::NotRunning => Report::NotRunning,
		}
	}
}

/// Start, stop and observe one daemon identity through its lock file.
///
/// Every operation goes through the lock file at `config.pid_file`; there
/// is no other shared state, so independent invocations of the same
/// program coordinate without talking to each other.
#[derive(Debug, Clone)]
pub struct Supervisor {
	config: DaemonConfig,
	lock: LockFile,
}

impl Supervisor {
	pub fn new(config: DaemonConfig) -> Self {
		let lock = LockFile::new(config.pid_file.clone(), config.lock_timeout);
		Self { config, lock }
	}

	pub fn config(&self) -> &DaemonConfig {
		&self.config
	}

	pub fn lock(&self) -> &LockFile {
		&self.lock
	}

	pub fn execute<F>(&self, intent: Intent, work: F) -> Result<Report, SupervisorError>
	where
		F: FnOnce(&DaemonConfig),
	{
		match intent {
			Intent::Start => self.start(work).map(|pid| Report::Started { pid }),
			Intent::Stop => self.stop().map(Report::from),
			Intent::Restart => self
				.restart(work)
				.map(|(stopped, pid)| Report::Restarted { stopped, pid }),
			Intent::Status => self.status().map(Report::from),
		}
	}

	pub fn status(&self) -> Result<Status, SupervisorError> {
		Ok(match self.lock.query_holder()? {
			Some(pid) => Status::Running { pid },
			None => Status::Stopped,
		})
	}

	/// Send SIGTERM to the holder, if there is one. Does not wait for it to
	/// exit; see [`Supervisor::wait_stopped`].
	pub fn stop(&self) -> Result<StopOutcome, SupervisorError> {
		let Some(pid) = self.lock.query_holder()? else {
			tracing::debug!(name = %self.config.name, "stop: not running");
			return Ok(StopOutcome::NotRunning);
		};

		match process::terminate(pid) {
			Ok(()) => {
				tracing::info!(name = %self.config.name, pid, "sent SIGTERM");
				Ok(StopOutcome::Signalled { pid })
			}
			// Exited between the liveness probe and the signal.
			Err(Errno::ESRCH) => Ok(StopOutcome::NotRunning),
			Err(source) => Err(SupervisorError::Signal { pid, source }),
		}
	}

	/// Poll until no live process holds the lock. Returns `false` if one
	/// still does when `timeout` expires.
	pub fn wait_stopped(&self, timeout: Duration) -> Result<bool, SupervisorError> {
		let deadline = Instant::now() + timeout;
		loop {
			if self.lock.query_holder()?.is_none() {
				return Ok(true);
			}
			let now = Instant::now();
			if now >= deadline {
				return Ok(false);
			}
			std::thread::sleep(Duration::from_millis(50).min(deadline - now));
		}
	}

	/// Launch `work` in a detached daemon and return the daemon's pid.
	///
	/// Refuses immediately if a live process already holds the lock.
	/// Returns only in the invoking process, once the daemon holds the lock
	/// or has reported why it could not. In the daemon, `work` runs once;
	/// when it returns the lock is released and the process exits.
	pub fn start<F>(&self, work: F) -> Result<u32, SupervisorError>
	where
		F: FnOnce(&DaemonConfig),
	{
		if let Some(pid) = self.lock.query_holder()? {
			return Err(SupervisorError::AlreadyRunning { pid });
		}
		self.launch(work)
	}

	/// [`Supervisor::stop`] followed by a launch.
	///
	/// The launch does not check for a running instance first: the daemon's
	/// acquire waits up to `lock_timeout` for the old instance to release
	/// the lock and fails with [`LockError::Contended`] if it does not.
	pub fn restart<F>(&self, work: F) -> Result<(StopOutcome, u32), SupervisorError>
	where
		F: FnOnce(&DaemonConfig),
	{
		let stopped = self.stop()?;
		let pid = self.launch(work)?;
		Ok((stopped, pid))
	}

	/// Hold the lock and run `work` in the calling process, without
	/// detaching. For service managers that supervise the process
	/// themselves.
	pub fn run_foreground<F>(&self, work: F) -> Result<(), SupervisorError>
	where
		F: FnOnce(&DaemonConfig),
	{
		if let Some(pid) = self.lock.query_holder()? {
			return Err(SupervisorError::AlreadyRunning { pid });
		}
		let handle = self.lock.acquire()?;
		tracing::info!(name = %self.config.name, pid = handle.pid(), "running in foreground");
		work(&self.config);
		handle.release()?;
		Ok(())
	}

	fn launch<F>(&self, work: F) -> Result<u32, SupervisorError>
	where
		F: FnOnce(&DaemonConfig),
	{
		let streams = Streams::open(&self.config)?;
		match detach::detach(&self.config, streams)? {
			Detached::Parent(readiness) => self.await_readiness(readiness),
			Detached::Daemon(notifier) => self.serve(notifier, work),
		}
	}

	fn await_readiness(&self, readiness: Readiness) -> Result<u32, SupervisorError> {
		match readiness.wait()? {
			ReadinessMessage::Ready { pid } => {
				tracing::debug!(name = %self.config.name, pid, "daemon ready");
				Ok(pid)
			}
			ReadinessMessage::Failed { stage: Stage::Detach, message, .. } => {
				Err(DetachError::Daemon(message).into())
			}
			ReadinessMessage::Failed {
				stage: Stage::LockContended,
				holder,
				..
			} => Err(LockError::Contended {
				path: self.lock.path().to_path_buf(),
				pid: holder.unwrap_or_default(),
			}
			.into()),
			ReadinessMessage::Failed { stage: Stage::LockIo, message, .. } => {
				Err(LockError::io("acquire", self.lock.path(), io::Error::other(message)).into())
			}
		}
	}

	fn serve<F>(&self, notifier: Notifier, work: F) -> !
	where
		F: FnOnce(&DaemonConfig),
	{
		let handle = match self.lock.acquire() {
			Ok(handle) => handle,
			Err(e) => {
				let (stage, message, holder) = match &e {
					LockError::Contended { pid, .. } => (Stage::LockContended, e.to_string(), Some(*pid)),
					LockError::Io { source, .. } => (Stage::LockIo, source.to_string(), None),
				};
				eprintln!("{}: {}", self.config.name, e);
				notifier.fail(stage, message, holder);
				std::process::exit(SupervisorError::from(e).exit_code());
			}
		};

		notifier.ready(handle.pid());
		tracing::info!(name = %self.config.name, pid = handle.pid(), "daemon started");

		work(&self.config);

		let code = match handle.release() {
			Ok(()) => exit_codes::SUCCESS,
			Err(e) => {
				eprintln!("{}: {}", self.config.name, e);
				exit_codes::LOCK_IO
			}
		};
		std::process::exit(code);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn not_running_is_the_only_nonzero_report() {
		assert_eq!(Report::Started { pid: 1 }.exit_code(), exit_codes::SUCCESS);
		assert_eq!(Report::Stopping { pid: 1 }.exit_code(), exit_codes::SUCCESS);
		assert_eq!(Report::Running { pid: 1 }.exit_code(), exit_codes::SUCCESS);
		assert_eq!(
			Report::Restarted {
				stopped: StopOutcome::NotRunning,
				pid: 1
			}
			.exit_code(),
			exit_codes::SUCCESS
		);
		assert_eq!(Report::NotRunning.exit_code(), exit_codes::NOT_RUNNING);
	}

	#[test]
	fn status_and_stop_map_onto_reports() {
		assert_eq!(Report::from(Status::Stopped), Report::NotRunning);
		assert_eq!(Report::from(Status::Running { pid: 5 }), Report::Running { pid: 5 });
		assert_eq!(Report::from(StopOutcome::Signalled { pid: 5 }), Report::Stopping { pid: 5 });
		assert_eq!(Report::from(StopOutcome::NotRunning), Report::NotRunning);
	}
}
