//! # warden
//!
//! Daemon lifecycle toolkit for Rust CLIs.
//!
//! Detach a process from its terminal, keep it unique with a PID lock
//! file, and stop or query it from any later invocation of the same
//! program. The lock file is the only coordination point: it holds the
//! pid of the running daemon, and a lock whose pid is dead is reclaimed
//! automatically.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use warden::{DaemonConfig, Intent, Supervisor};
//!
//! let config = DaemonConfig::new("myapp").resolved().unwrap();
//! let supervisor = Supervisor::new(config);
//!
//! match supervisor.execute(Intent::Start, |config| {
//!     // runs in the detached daemon until it decides to return
//!     let _ = config;
//! }) {
//!     Ok(report) => std::process::exit(report.exit_code()),
//!     Err(e) => {
//!         eprintln!("error: {e}");
//!         std::process::exit(e.exit_code());
//!     }
//! }
//! ```

pub mod config;
pub mod detach;
pub mod error;
pub mod exit_codes;
pub mod lockfile;
pub mod paths;
pub mod process;
pub mod supervisor;

#[cfg(feature = "clap")]
pub mod clap;

pub use config::DaemonConfig;
pub use error::{DetachError, LockError, SupervisorError};
pub use lockfile::{Holder, LockFile, LockHandle};
pub use paths::DaemonPaths;
pub use supervisor::{Intent, Report, Status, StopOutcome, Supervisor};
