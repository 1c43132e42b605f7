use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use warden::{DaemonConfig, DaemonPaths};

pub const DEFAULT_NAME: &str = "pdd";

fn default_interval_secs() -> u64 { 5 }

// ── config.toml ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Default)]
pub struct FileConfig {
	#[serde(default)]
	pub daemon: DaemonSection,
	#[serde(default)]
	pub work: WorkSection,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DaemonSection {
	pub name: Option<String>,
	pub working_directory: Option<PathBuf>,
	pub pid_file: Option<PathBuf>,
	pub stdout: Option<PathBuf>,
	pub stderr: Option<PathBuf>,
	pub umask: Option<u32>,
	pub lock_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkSection {
	pub log_file: Option<PathBuf>,
	#[serde(default = "default_interval_secs")]
	pub interval_secs: u64,
}

impl Default for WorkSection {
	fn default() -> Self {
		Self { log_file: None, interval_secs: default_interval_secs() }
	}
}

// ── command-line overrides ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default, clap::Args)]
pub struct Overrides {
	/// Daemon name, used for default file names
	#[arg(long, global = true)]
	pub name: Option<String>,
	/// Directory the daemon changes into
	#[arg(long, global = true)]
	pub working_directory: Option<PathBuf>,
	/// PID lock file
	#[arg(long, global = true)]
	pub pid_file: Option<PathBuf>,
	/// Log file written by the running daemon
	#[arg(long, global = true)]
	pub log_file: Option<PathBuf>,
	/// File the daemon's stdout is appended to
	#[arg(long, global = true)]
	pub stdout: Option<PathBuf>,
	/// File the daemon's stderr is appended to
	#[arg(long, global = true)]
	pub stderr: Option<PathBuf>,
}

// ── resolved settings ───────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed to read {}: {source}", path.display())]
	Read {
		path: PathBuf,
		#[source]
		source: io::Error,
	},
	#[error("failed to parse {}: {source}", path.display())]
	Parse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},
	#[error("invalid configuration: {0}")]
	Invalid(String),
	#[error("cannot resolve paths: {0}")]
	CurrentDir(#[from] io::Error),
}

#[derive(Debug, Clone)]
pub struct WorkSettings {
	pub log_file: PathBuf,
	pub interval: Duration,
}

#[derive(Debug, Clone)]
pub struct Settings {
	pub daemon: DaemonConfig,
	pub work: WorkSettings,
	/// Set when at least one default path points into the state directory,
	/// which then has to exist before the daemon starts.
	pub state_dir: Option<PathBuf>,
}

impl Settings {
	pub fn prepare_dirs(&self) -> io::Result<()> {
		match &self.state_dir {
			Some(dir) => std::fs::create_dir_all(dir),
			None => Ok(()),
		}
	}
}

/// Read the config file and apply command-line overrides on top.
///
/// An explicitly named file must exist; the default one is optional.
pub fn load(explicit: Option<&Path>, overrides: &Overrides) -> Result<Settings, ConfigError> {
	let file = match explicit {
		Some(path) => read_file(path)?,
		None => {
			let name = overrides.name.as_deref().unwrap_or(DEFAULT_NAME);
			let path = DaemonPaths::new(name).config_path();
			if path.exists() { read_file(&path)? } else { FileConfig::default() }
		}
	};
	resolve(file, overrides)
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
	let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
		path: path.to_path_buf(),
		source,
	})?;
	toml::from_str(&content).map_err(|source| ConfigError::Parse {
		path: path.to_path_buf(),
		source,
	})
}

pub fn resolve(file: FileConfig, overrides: &Overrides) -> Result<Settings, ConfigError> {
	let FileConfig { daemon: section, work } = file;

	let name = overrides
		.name
		.clone()
		.or(section.name)
		.unwrap_or_else(|| DEFAULT_NAME.to_string());
	if name.is_empty() || name.contains('/') {
		return Err(ConfigError::Invalid(format!("daemon name {:?} is not a file name", name)));
	}
	if work.interval_secs == 0 {
		return Err(ConfigError::Invalid("work.interval_secs must be at least 1".to_string()));
	}

	let paths = DaemonPaths::new(name.clone());
	let mut uses_state_dir = false;
	let mut pick = |cli: &Option<PathBuf>, file: Option<PathBuf>, default: PathBuf| match cli.clone().or(file) {
		Some(path) => path,
		None => {
			uses_state_dir = true;
			default
		}
	};

	let working_directory = pick(&overrides.working_directory, section.working_directory, paths.state_dir());
	let pid_file = pick(&overrides.pid_file, section.pid_file, paths.pid_path());
	let stdout = pick(&overrides.stdout, section.stdout, paths.stdout_path());
	let stderr = pick(&overrides.stderr, section.stderr, paths.stderr_path());
	let log_file = pick(&overrides.log_file, work.log_file, paths.log_path());

	let daemon = DaemonConfig {
		name,
		working_directory,
		pid_file,
		stdout,
		stderr,
		umask: section.umask.unwrap_or(warden::config::DEFAULT_UMASK),
		lock_timeout: section
			.lock_timeout_ms
			.map(Duration::from_millis)
			.unwrap_or(warden::config::DEFAULT_LOCK_TIMEOUT),
	}
	.resolved()?;

	let log_file = if log_file.is_absolute() {
		log_file
	} else {
		std::env::current_dir()?.join(log_file)
	};

	Ok(Settings {
		daemon,
		work: WorkSettings {
			log_file,
			interval: Duration::from_secs(work.interval_secs),
		},
		state_dir: uses_state_dir.then(|| paths.state_dir()),
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	fn parse(toml_src: &str) -> FileConfig {
		toml::from_str(toml_src).unwrap()
	}

	#[test]
	fn empty_file_uses_defaults() {
		let settings = resolve(parse(""), &Overrides::default()).unwrap();
		let paths = DaemonPaths::new(DEFAULT_NAME);
		assert_eq!(settings.daemon.name, "pdd");
		assert_eq!(settings.daemon.pid_file, paths.pid_path());
		assert_eq!(settings.daemon.umask, 0o002);
		assert_eq!(settings.daemon.lock_timeout, Duration::from_secs(2));
		assert_eq!(settings.work.interval, Duration::from_secs(5));
		assert_eq!(settings.state_dir, Some(paths.state_dir()));
	}

	#[test]
	fn file_values_are_used() {
		let file = parse(
			r#"
[daemon]
name = "sample"
working_directory = "/srv/sample"
pid_file = "/run/sample.pid"
stdout = "/var/log/sample.stdout"
stderr = "/var/log/sample.stderr"
umask = 0o027
lock_timeout_ms = 500

[work]
log_file = "/var/log/sample.log"
interval_secs = 1
"#,
		);
		let settings = resolve(file, &Overrides::default()).unwrap();
		assert_eq!(settings.daemon.name, "sample");
		assert_eq!(settings.daemon.working_directory, PathBuf::from("/srv/sample"));
		assert_eq!(settings.daemon.pid_file, PathBuf::from("/run/sample.pid"));
		assert_eq!(settings.daemon.umask, 0o027);
		assert_eq!(settings.daemon.lock_timeout, Duration::from_millis(500));
		assert_eq!(settings.work.log_file, PathBuf::from("/var/log/sample.log"));
		assert_eq!(settings.work.interval, Duration::from_secs(1));
		assert_eq!(settings.state_dir, None);
	}

	#[test]
	fn command_line_beats_file() {
		let file = parse("[daemon]\nname = \"sample\"\npid_file = \"/run/sample.pid\"\n");
		let overrides = Overrides {
			name: Some("other".into()),
			pid_file: Some("/tmp/other.pid".into()),
			..Overrides::default()
		};
		let settings = resolve(file, &overrides).unwrap();
		assert_eq!(settings.daemon.name, "other");
		assert_eq!(settings.daemon.pid_file, PathBuf::from("/tmp/other.pid"));
		assert_eq!(settings.daemon.stdout, DaemonPaths::new("other").stdout_path());
	}

	#[test]
	fn relative_paths_become_absolute() {
		let overrides = Overrides {
			pid_file: Some("d.pid".into()),
			log_file: Some("d.log".into()),
			..Overrides::default()
		};
		let settings = resolve(FileConfig::default(), &overrides).unwrap();
		let cwd = std::env::current_dir().unwrap();
		assert_eq!(settings.daemon.pid_file, cwd.join("d.pid"));
		assert_eq!(settings.work.log_file, cwd.join("d.log"));
	}

	#[test]
	fn rejects_bad_values() {
		assert!(matches!(
			resolve(parse("[work]\ninterval_secs = 0\n"), &Overrides::default()),
			Err(ConfigError::Invalid(_))
		));
		assert!(matches!(
			resolve(parse("[daemon]\nname = \"a/b\"\n"), &Overrides::default()),
			Err(ConfigError::Invalid(_))
		));
	}

	#[test]
	fn missing_explicit_file_is_an_error() {
		let path = std::env::temp_dir().join("pdd-config-does-not-exist.toml");
		assert!(matches!(
			load(Some(&path), &Overrides::default()),
			Err(ConfigError::Read { .. })
		));
	}
}
