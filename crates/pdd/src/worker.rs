use std::io;

use tokio::signal::unix::{signal, SignalKind};
use warden::DaemonConfig;

use crate::config::WorkSettings;
use crate::logging::LogHandle;

/// The daemon's work: log a sample line every interval until SIGTERM or
/// SIGINT arrives.
///
/// Runs after detaching, with the lock held by the caller. The runtime and
/// the log writer thread are created here for that reason.
pub fn run(settings: &WorkSettings, daemon: &DaemonConfig) {
	let log = match LogHandle::open(&settings.log_file) {
		Ok(log) => log,
		Err(e) => {
			eprintln!("{}: cannot open log file {}: {}", daemon.name, settings.log_file.display(), e);
			return;
		}
	};

	tracing::dispatcher::with_default(log.dispatch(), || {
		let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
			Ok(rt) => rt,
			Err(e) => {
				tracing::error!("failed to start runtime: {}", e);
				return;
			}
		};
		if let Err(e) = runtime.block_on(work_loop(settings, &daemon.name)) {
			tracing::error!("work loop failed: {}", e);
		}
	});
}

async fn work_loop(settings: &WorkSettings, name: &str) -> io::Result<()> {
	let mut terminate = signal(SignalKind::terminate())?;
	let mut interrupt = signal(SignalKind::interrupt())?;
	let mut ticker = tokio::time::interval(settings.interval);

	tracing::info!(name, pid = std::process::id(), "worker started");
	loop {
		tokio::select! {
			_ = ticker.tick() => tracing::info!("sample INFO message"),
			_ = terminate.recv() => {
				tracing::info!(name, "received SIGTERM, shutting down");
				break;
			}
			_ = interrupt.recv() => {
				tracing::info!(name, "received SIGINT, shutting down");
				break;
			}
		}
	}
	Ok(())
}
