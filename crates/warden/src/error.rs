use std::io;
use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

use crate::exit_codes;

/// Failures of the lock file protocol that reach the caller.
///
/// Stale and corrupt lock files never show up here: they are reclaimed
/// during acquisition.
#[derive(Debug, Error)]
pub enum LockError {
	/// A live process kept the lock until the acquire timeout expired.
	#[error("lock {} is held by running process {pid}", path.display())]
	Contended { path: PathBuf, pid: u32 },
	/// Filesystem failure; never retried.
	#[error("failed to {op} lock file {}: {source}", path.display())]
	Io {
		op: &'static str,
		path: PathBuf,
		#[source]
		source: io::Error,
	},
}

impl LockError {
	pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
		LockError::Io {
			op,
			path: path.into(),
			source,
		}
	}
}

/// Failures while turning the current process into a daemon.
#[derive(Debug, Error)]
pub enum DetachError {
	#[error("working directory {} is unusable: {source}", path.display())]
	WorkingDirectory {
		path: PathBuf,
		#[source]
		source: io::Error,
	},
	#[error("cannot open {stream} target {}: {source}", path.display())]
	Redirect {
		stream: &'static str,
		path: PathBuf,
		#[source]
		source: io::Error,
	},
	#[error("{context} failed: {source}")]
	Os {
		context: &'static str,
		#[source]
		source: Errno,
	},
	/// The readiness pipe closed or carried garbage.
	#[error("daemon did not report readiness: {0}")]
	Handshake(String),
	/// A detachment step failed inside the already-forked daemon.
	#[error("daemon failed to detach: {0}")]
	Daemon(String),
}

impl DetachError {
	pub(crate) fn os(context: &'static str, source: Errno) -> Self {
		DetachError::Os { context, source }
	}
}

#[derive(Debug, Error)]
pub enum SupervisorError {
	#[error("already running (pid {pid})")]
	AlreadyRunning { pid: u32 },
	#[error(transparent)]
	Lock(#[from] LockError),
	#[error(transparent)]
	Detach(#[from] DetachError),
	#[error("cannot signal pid {pid}: {source}")]
	Signal {
		pid: u32,
		#[source]
		source: Errno,
	},
}

impl SupervisorError {
	pub fn exit_code(&self) -> i32 {
		match self {
			SupervisorError::AlreadyRunning { .. } => exit_codes::ALREADY_RUNNING,
			SupervisorError::Lock(LockError::Contended { .. }) => exit_codes::LOCK_CONTENDED,
			SupervisorError::Lock(LockError::Io { .. }) => exit_codes::LOCK_IO,
			SupervisorError::Detach(_) => exit_codes::DETACH_FAILURE,
			SupervisorError::Signal { .. } => exit_codes::SIGNAL_FAILURE,
		}
	}
}
