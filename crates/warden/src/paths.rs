use std::path::PathBuf;

/// Default file locations for a named daemon.
///
/// Everything the daemon writes lives under its state directory; the
/// optional configuration file lives under its config directory.
#[derive(Debug, Clone)]
pub struct DaemonPaths {
	pub app_name: String,
}

impl DaemonPaths {
	pub fn new(app_name: impl Into<String>) -> Self {
		Self {
			app_name: app_name.into(),
		}
	}

	pub fn state_dir(&self) -> PathBuf {
		if let Ok(dir) = std::env::var("XDG_STATE_HOME") {
			PathBuf::from(dir).join(&self.app_name)
		} else if let Some(home) = home_dir() {
			home.join(".local").join("state").join(&self.app_name)
		} else {
			PathBuf::from("/tmp").join(&self.app_name)
		}
	}

	pub fn config_dir(&self) -> PathBuf {
		if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
			PathBuf::from(dir).join(&self.app_name)
		} else if let Some(home) = home_dir() {
			home.join(".config").join(&self.app_name)
		} else {
			PathBuf::from("/tmp").join(&self.app_name).join("config")
		}
	}

	pub fn config_path(&self) -> PathBuf {
		self.config_dir().join("config.toml")
	}

	pub fn pid_path(&self) -> PathBuf {
		self.state_file("pid")
	}

	pub fn log_path(&self) -> PathBuf {
		self.state_file("log")
	}

	pub fn stdout_path(&self) -> PathBuf {
		self.state_file("stdout")
	}

	pub fn stderr_path(&self) -> PathBuf {
		self.state_file("stderr")
	}

	fn state_file(&self, extension: &str) -> PathBuf {
		self.state_dir().join(format!("{}.{}", self.app_name, extension))
	}
}

fn home_dir() -> Option<PathBuf> {
	std::env::var("HOME").ok().map(PathBuf::from)
}
