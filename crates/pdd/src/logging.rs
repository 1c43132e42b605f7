use std::fs::OpenOptions;
use std::io;
use std::path::Path;

use tracing::{Dispatch, Level};
use tracing_appender::non_blocking::WorkerGuard;

/// Diagnostics for the controlling invocation, written to stderr.
///
/// After detaching, stderr is the daemon's stderr file, so whatever the
/// library logs from inside the daemon lands there too.
pub fn cli_dispatch(verbose: bool) -> Dispatch {
	let level = if verbose { Level::DEBUG } else { Level::WARN };
	let subscriber = tracing_subscriber::fmt()
		.with_writer(io::stderr)
		.with_max_level(level)
		.with_target(false)
		.finish();
	Dispatch::new(subscriber)
}

/// The running daemon's log, owned by the work function.
///
/// Records are written from a background thread, so this must only be
/// opened after the process has detached.
pub struct LogHandle {
	dispatch: Dispatch,
	_guard: WorkerGuard,
}

impl LogHandle {
	pub fn open(path: &Path) -> io::Result<Self> {
		let file = OpenOptions::new().create(true).append(true).open(path)?;
		let (writer, guard) = tracing_appender::non_blocking(file);
		let subscriber = tracing_subscriber::fmt()
			.with_writer(writer)
			.with_ansi(false)
			.with_max_level(Level::INFO)
			.finish();
		Ok(Self { dispatch: Dispatch::new(subscriber), _guard: guard })
	}

	pub fn dispatch(&self) -> &Dispatch {
		&self.dispatch
	}
}
