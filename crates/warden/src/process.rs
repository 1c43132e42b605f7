//! Process identifiers as they appear in lock files, and the two signals the
//! supervisor sends to them.

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

/// Parse lock file content into a process identifier.
///
/// Surrounding whitespace (including the trailing newline) is ignored.
/// Zero, negative and out-of-range values are rejected: `kill(0, ..)` and
/// `kill(-n, ..)` address process groups, not a single holder.
pub fn parse_pid(content: &str) -> Option<u32> {
	let pid: i32 = content.trim().parse().ok()?;
	if pid > 0 { Some(pid as u32) } else { None }
}

/// Existence probe using the null signal.
///
/// `EPERM` means the process exists but belongs to someone else, which still
/// counts as alive.
pub fn is_alive(pid: u32) -> bool {
	let Some(pid) = to_pid(pid) else {
		return false;
	};
	match kill(pid, None) {
		Ok(()) => true,
		Err(Errno::EPERM) => true,
		Err(_) => false,
	}
}

/// Ask a process to exit cleanly.
pub fn terminate(pid: u32) -> Result<(), Errno> {
	let pid = to_pid(pid).ok_or(Errno::ESRCH)?;
	kill(pid, Signal::SIGTERM)
}

fn to_pid(pid: u32) -> Option<Pid> {
	i32::try_from(pid).ok().filter(|p| *p > 0).map(Pid::from_raw)
}
