//! PID lock files.
//!
//! A lock file holds the decimal pid of the process that owns it and
//! nothing else (a trailing newline is tolerated). Exclusion comes from
//! atomic creation: the content is written to a private temporary file and
//! hard-linked onto the lock path, which fails if the path already exists.
//! A lock file is therefore never visible half-written.
//!
//! A file whose pid is dead, or whose content is not a pid at all, is
//! stale and may be reclaimed. Reclaiming is serialized by an advisory
//! `flock` on the lock's directory and re-checks the content under that
//! lock, so two reclaimers can never remove each other's fresh lock.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use nix::fcntl::{Flock, FlockArg};

use crate::error::LockError;
use crate::process;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// What a lock path currently records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Holder {
	Vacant,
	Live(u32),
	/// The recorded process no longer exists.
	Stale(u32),
	/// Empty, non-numeric or out-of-range content.
	Corrupt,
}

#[derive(Debug, Clone)]
pub struct LockFile {
	path: PathBuf,
	timeout: Duration,
	poll_interval: Duration,
}

impl LockFile {
	pub fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
		Self {
			path: path.into(),
			timeout,
			poll_interval: DEFAULT_POLL_INTERVAL,
		}
	}

	pub fn with_poll_interval(mut self, interval: Duration) -> Self {
		self.poll_interval = interval;
		self
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn timeout(&self) -> Duration {
		self.timeout
	}

	/// Take the lock for the calling process.
	///
	/// Stale and corrupt lock files are reclaimed without waiting. A live
	/// holder is polled until the timeout expires, then
	/// [`LockError::Contended`] is returned. Filesystem errors are returned
	/// immediately.
	pub fn acquire(&self) -> Result<LockHandle, LockError> {
		let pid = std::process::id();
		let deadline = Instant::now() + self.timeout;

		loop {
			if self.try_create(pid)? {
				tracing::debug!(path = %self.path.display(), pid, "lock acquired");
				return Ok(LockHandle {
					path: self.path.clone(),
					pid,
					released: false,
				});
			}

			match self.inspect()? {
				Holder::Vacant => continue,
				Holder::Stale(_) | Holder::Corrupt => {
					self.break_stale()?;
				}
				Holder::Live(holder) => {
					let now = Instant::now();
					if now >= deadline {
						return Err(LockError::Contended {
							path: self.path.clone(),
							pid: holder,
						});
					}
					tracing::debug!(path = %self.path.display(), holder, "lock held, waiting");
					std::thread::sleep(self.poll_interval.min(deadline - now));
				}
			}
		}
	}

	/// The pid of the live holder, if any. Never modifies the lock file.
	pub fn query_holder(&self) -> Result<Option<u32>, LockError> {
		match self.inspect()? {
			Holder::Live(pid) => Ok(Some(pid)),
			_ => Ok(None),
		}
	}

	pub fn inspect(&self) -> Result<Holder, LockError> {
		let content = match fs::read_to_string(&self.path) {
			Ok(content) => content,
			Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Holder::Vacant),
			Err(e) if e.kind() == io::ErrorKind::InvalidData => return Ok(Holder::Corrupt),
			Err(e) => return Err(LockError::io("read", &self.path, e)),
		};

		Ok(match process::parse_pid(&content) {
			Some(pid) if process::is_alive(pid) => Holder::Live(pid),
			Some(pid) => Holder::Stale(pid),
			None => Holder::Corrupt,
		})
	}

	/// Remove the lock file if it is stale or corrupt.
	///
	/// Returns `true` if a file was removed. A live lock is left alone.
	pub fn break_stale(&self) -> Result<bool, LockError> {
		let dir = File::open(self.dir()).map_err(|e| LockError::io("open directory of", &self.path, e))?;
		let _guard = Flock::lock(dir, FlockArg::LockExclusive)
			.map_err(|(_, errno)| LockError::io("lock directory of", &self.path, io::Error::from(errno)))?;

		let holder = self.inspect()?;
		match holder {
			Holder::Stale(_) | Holder::Corrupt => {}
			Holder::Vacant | Holder::Live(_) => return Ok(false),
		}

		match fs::remove_file(&self.path) {
			Ok(()) => {}
			Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
			Err(e) => return Err(LockError::io("remove stale", &self.path, e)),
		}

		match holder {
			Holder::Stale(pid) => tracing::warn!(path = %self.path.display(), pid, "removed stale lock"),
			_ => tracing::warn!(path = %self.path.display(), "removed corrupt lock"),
		}
		Ok(true)
	}

	fn try_create(&self, pid: u32) -> Result<bool, LockError> {
		let temp = self.temp_path(pid);
		let result = write_pid(&temp, pid).and_then(|()| fs::hard_link(&temp, &self.path));
		let _ = fs::remove_file(&temp);

		match result {
			Ok(()) => Ok(true),
			Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
			Err(e) => Err(LockError::io("create", &self.path, e)),
		}
	}

	fn temp_path(&self, pid: u32) -> PathBuf {
		let name = self
			.path
			.file_name()
			.map(|n| n.to_string_lossy().into_owned())
			.unwrap_or_else(|| "lock".to_string());
		let seq = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
		self.dir().join(format!(".{}.{}.{}.tmp", name, pid, seq))
	}

	fn dir(&self) -> &Path {
		match self.path.parent() {
			Some(parent) if !parent.as_os_str().is_empty() => parent,
			_ => Path::new("."),
		}
	}
}

fn write_pid(path: &Path, pid: u32) -> io::Result<()> {
	let mut file = OpenOptions::new()
		.write(true)
		.create(true)
		.truncate(true)
		.open(path)?;
	writeln!(file, "{}", pid)?;
	file.sync_all()
}

/// Proof of holding a [`LockFile`].
///
/// Dropping an unreleased handle releases it. A handle only acts in the
/// process that acquired it, so a copy inherited by a forked child never
/// removes the parent's lock.
#[derive(Debug)]
pub struct LockHandle {
	path: PathBuf,
	pid: u32,
	released: bool,
}

impl LockHandle {
	pub fn pid(&self) -> u32 {
		self.pid
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Remove the lock file. Already-removed files are not an error.
	pub fn release(mut self) -> Result<(), LockError> {
		self.released = true;
		if std::process::id() != self.pid {
			return Ok(());
		}
		remove_if_owned(&self.path, self.pid)
	}
}

impl Drop for LockHandle {
	fn drop(&mut self) {
		if self.released || std::process::id() != self.pid {
			return;
		}
		if let Err(e) = remove_if_owned(&self.path, self.pid) {
			tracing::warn!("failed to release lock: {}", e);
		}
	}
}

fn remove_if_owned(path: &Path, pid: u32) -> Result<(), LockError> {
	match fs::read_to_string(path) {
		Ok(content) if process::parse_pid(&content) == Some(pid) => {}
		Ok(_) => {
			tracing::warn!(path = %path.display(), pid, "lock file no longer records this process, leaving it");
			return Ok(());
		}
		Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
		Err(e) => return Err(LockError::io("read", path, e)),
	}

	match fs::remove_file(path) {
		Ok(()) => {
			tracing::debug!(path = %path.display(), pid, "lock released");
			Ok(())
		}
		Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
		Err(e) => Err(LockError::io("remove", path, e)),
	}
}
