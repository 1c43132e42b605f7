use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths::DaemonPaths;

pub const DEFAULT_UMASK: u32 = 0o002;
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// Everything the supervisor needs to know about one daemon identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
	pub name: String,
	pub working_directory: PathBuf,
	pub pid_file: PathBuf,
	pub stdout: PathBuf,
	pub stderr: PathBuf,
	pub umask: u32,
	/// How long `start` waits for a live holder to let go of the lock.
	pub lock_timeout: Duration,
}

impl DaemonConfig {
	pub fn new(name: impl Into<String>) -> Self {
		Self::from_paths(&DaemonPaths::new(name))
	}

	pub fn from_paths(paths: &DaemonPaths) -> Self {
		Self {
			name: paths.app_name.clone(),
			working_directory: paths.state_dir(),
			pid_file: paths.pid_path(),
			stdout: paths.stdout_path(),
			stderr: paths.stderr_path(),
			umask: DEFAULT_UMASK,
			lock_timeout: DEFAULT_LOCK_TIMEOUT,
		}
	}

	/// Make every path absolute against the current directory.
	///
	/// The daemon changes directory while detaching, so relative paths
	/// would otherwise point somewhere else afterwards.
	pub fn resolved(mut self) -> io::Result<Self> {
		let cwd = std::env::current_dir()?;
		for path in [
			&mut self.working_directory,
			&mut self.pid_file,
			&mut self.stdout,
			&mut self.stderr,
		] {
			*path = absolute(&cwd, path);
		}
		Ok(self)
	}
}

fn absolute(cwd: &Path, path: &Path) -> PathBuf {
	if path.is_absolute() {
		path.to_path_buf()
	} else {
		cwd.join(path)
	}
}
