//! Turning a foreground process into a session-independent daemon.
//!
//! The invoking process forks, the child starts a new session and forks
//! again so the final daemon can never reacquire a controlling terminal.
//! The daemon then changes directory, sets its umask and replaces stdin,
//! stdout and stderr. A pipe connects the daemon back to the invoking
//! process, which blocks until the daemon reports that it is ready (or
//! why it is not).
//!
//! Everything that can fail cheaply (opening redirect targets, checking
//! the working directory) is done before the first fork, so common
//! mistakes are reported directly to the terminal.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::os::fd::AsRawFd;
use std::path::Path;

use nix::libc;
use nix::sys::stat::{umask, Mode};
use nix::sys::wait::waitpid;
use nix::unistd::{chdir, dup2, fork, pipe, setsid, ForkResult};
use serde::{Deserialize, Serialize};

use crate::config::DaemonConfig;
use crate::error::DetachError;
use crate::exit_codes;

/// Replacement standard streams, opened before detaching.
#[derive(Debug)]
pub struct Streams {
	stdin: File,
	stdout: File,
	stderr: File,
}

impl Streams {
	/// Open `/dev/null` for stdin and the configured stdout/stderr targets
	/// in append mode, creating them if needed.
	pub fn open(config: &DaemonConfig) -> Result<Self, DetachError> {
		let null = Path::new("/dev/null");
		let stdin = File::open(null).map_err(|source| DetachError::Redirect {
			stream: "stdin",
			path: null.to_path_buf(),
			source,
		})?;
		Ok(Self {
			stdin,
			stdout: open_append("stdout", &config.stdout)?,
			stderr: open_append("stderr", &config.stderr)?,
		})
	}

	fn redirect(&self) -> Result<(), DetachError> {
		dup2(self.stdin.as_raw_fd(), libc::STDIN_FILENO).map_err(|e| DetachError::os("redirecting stdin", e))?;
		dup2(self.stdout.as_raw_fd(), libc::STDOUT_FILENO).map_err(|e| DetachError::os("redirecting stdout", e))?;
		dup2(self.stderr.as_raw_fd(), libc::STDERR_FILENO).map_err(|e| DetachError::os("redirecting stderr", e))?;
		Ok(())
	}
}

fn open_append(stream: &'static str, path: &Path) -> Result<File, DetachError> {
	OpenOptions::new()
		.create(true)
		.append(true)
		.open(path)
		.map_err(|source| DetachError::Redirect {
			stream,
			path: path.to_path_buf(),
			source,
		})
}

pub(crate) fn check_working_directory(path: &Path) -> Result<(), DetachError> {
	match std::fs::metadata(path) {
		Ok(meta) if meta.is_dir() => Ok(()),
		Ok(_) => Err(DetachError::WorkingDirectory {
			path: path.to_path_buf(),
			source: io::Error::other("not a directory"),
		}),
		Err(source) => Err(DetachError::WorkingDirectory {
			path: path.to_path_buf(),
			source,
		}),
	}
}

/// Which side of the detachment the caller is on.
#[derive(Debug)]
pub enum Detached {
	/// The invoking process. Wait on the [`Readiness`] to learn the outcome.
	Parent(Readiness),
	/// The daemon. Report through the [`Notifier`] once the lock is held.
	Daemon(Notifier),
}

/// Detach the calling process.
///
/// Must be called while the process is single-threaded: only the calling
/// thread survives `fork`, so no async runtime or background logging
/// thread may exist yet.
///
/// Errors are returned only from the invoking process. Once the first fork
/// has happened, failures are reported through the readiness pipe and the
/// forked process exits, so the caller's code never runs twice.
pub fn detach(config: &DaemonConfig, streams: Streams) -> Result<Detached, DetachError> {
	check_working_directory(&config.working_directory)?;

	let (read_end, write_end) = pipe().map_err(|e| DetachError::os("pipe", e))?;
	let _ = io::stdout().flush();
	let _ = io::stderr().flush();

	// SAFETY: the caller guarantees no other threads exist.
	match unsafe { fork() }.map_err(|e| DetachError::os("fork", e))? {
		ForkResult::Parent { child } => {
			drop(write_end);
			// The intermediate child exits right after the second fork.
			let _ = waitpid(child, None);
			Ok(Detached::Parent(Readiness {
				pipe: File::from(read_end),
			}))
		}
		ForkResult::Child => {
			drop(read_end);
			let notifier = Notifier {
				pipe: File::from(write_end),
			};
			Ok(Detached::Daemon(become_daemon(config, streams, notifier)))
		}
	}
}

fn become_daemon(config: &DaemonConfig, streams: Streams, notifier: Notifier) -> Notifier {
	if let Err(e) = setsid() {
		notifier.abort(DetachError::os("setsid", e));
	}

	// SAFETY: still single-threaded, we are the only thread of the first child.
	match unsafe { fork() } {
		Err(e) => notifier.abort(DetachError::os("second fork", e)),
		Ok(ForkResult::Parent { .. }) => unsafe { libc::_exit(0) },
		Ok(ForkResult::Child) => {}
	}

	if let Err(e) = enter(config, &streams) {
		notifier.abort(e);
	}
	notifier
}

fn enter(config: &DaemonConfig, streams: &Streams) -> Result<(), DetachError> {
	chdir(config.working_directory.as_path()).map_err(|e| DetachError::WorkingDirectory {
		path: config.working_directory.clone(),
		source: io::Error::from(e),
	})?;
	umask(Mode::from_bits_truncate(config.umask as libc::mode_t));
	streams.redirect()
}

/// Why a daemon could not come up, as reported over the readiness pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
	Detach,
	LockContended,
	LockIo,
}

/// One newline-terminated JSON message from the daemon to the invoking
/// process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReadinessMessage {
	Ready {
		pid: u32,
	},
	Failed {
		stage: Stage,
		message: String,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		holder: Option<u32>,
	},
}

/// Invoking-process end of the readiness pipe.
#[derive(Debug)]
pub struct Readiness {
	pipe: File,
}

impl Readiness {
	/// Block until the daemon reports, or the pipe closes without a report.
	pub fn wait(self) -> Result<ReadinessMessage, DetachError> {
		let mut line = String::new();
		BufReader::new(self.pipe)
			.read_line(&mut line)
			.map_err(|e| DetachError::Handshake(e.to_string()))?;
		if line.trim().is_empty() {
			return Err(DetachError::Handshake("daemon exited without reporting".to_string()));
		}
		serde_json::from_str(&line).map_err(|e| DetachError::Handshake(format!("invalid message: {}", e)))
	}
}

/// Daemon end of the readiness pipe. Consumed by the first report.
#[derive(Debug)]
pub struct Notifier {
	pipe: File,
}

impl Notifier {
	pub fn ready(self, pid: u32) {
		self.send(&ReadinessMessage::Ready { pid });
	}

	pub fn fail(self, stage: Stage, message: String, holder: Option<u32>) {
		self.send(&ReadinessMessage::Failed { stage, message, holder });
	}

	/// Report a detachment failure and exit without returning to the caller.
	pub fn abort(self, error: DetachError) -> ! {
		self.fail(Stage::Detach, error.to_string(), None);
		std::process::exit(exit_codes::DETACH_FAILURE);
	}

	fn send(mut self, message: &ReadinessMessage) {
		let mut data = match serde_json::to_vec(message) {
			Ok(d) => d,
			Err(e) => {
				tracing::error!("failed to serialize readiness message: {}", e);
				return;
			}
		};
		data.push(b'\n');
		// The invoking process may already be gone; the daemon carries on regardless.
		if let Err(e) = self.pipe.write_all(&data) {
			tracing::debug!("readiness pipe closed: {}", e);
		}
	}
}
