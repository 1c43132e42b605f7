//! Process exit codes for daemon control commands.
//!
//! `2` is left to argument parsers, which conventionally use it for usage
//! errors. `3` matches the LSB init-script code for "program is not running".

/// Command succeeded (for `status`: the daemon is running).
pub const SUCCESS: i32 = 0;

/// Generic failure, e.g. unreadable configuration.
pub const FAILURE: i32 = 1;

/// No live process holds the lock.
pub const NOT_RUNNING: i32 = 3;

/// `start` found a live holder and refused to launch a second instance.
pub const ALREADY_RUNNING: i32 = 4;

/// The lock stayed held by a live process until the acquire timeout.
pub const LOCK_CONTENDED: i32 = 5;

/// Changing directory, umask or redirecting streams failed.
pub const DETACH_FAILURE: i32 = 6;

/// The termination signal could not be delivered to the holder.
pub const SIGNAL_FAILURE: i32 = 7;

/// Creating, reading or removing the lock file failed.
pub const LOCK_IO: i32 = 8;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn exit_codes_are_distinct() {
		let codes = [
			SUCCESS,
			FAILURE,
			NOT_RUNNING,
			ALREADY_RUNNING,
			LOCK_CONTENDED,
			DETACH_FAILURE,
			SIGNAL_FAILURE,
			LOCK_IO,
		];
		for (i, a) in codes.iter().enumerate() {
			for b in &codes[i + 1..] {
				assert_ne!(a, b, "exit codes must be distinct");
			}
		}
	}

	#[test]
	fn usage_error_code_is_left_free() {
		assert!(![SUCCESS, FAILURE, NOT_RUNNING, ALREADY_RUNNING, LOCK_CONTENDED, DETACH_FAILURE, SIGNAL_FAILURE, LOCK_IO]
			.contains(&2));
	}
}
