use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// One daemon identity in its own temp directory. Stops the daemon on drop.
struct Sandbox {
	dir: PathBuf,
	stdout: PathBuf,
}

impl Sandbox {
	fn new() -> Self {
		let n = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
		let dir = std::env::temp_dir().join(format!("pdd-test-{}-{}", std::process::id(), n));
		let _ = std::fs::remove_dir_all(&dir);
		std::fs::create_dir_all(&dir).unwrap();
		let stdout = dir.join("pdd.stdout");
		Self { dir, stdout }
	}

	fn pid_file(&self) -> PathBuf {
		self.dir.join("pdd.pid")
	}

	fn log_file(&self) -> PathBuf {
		self.dir.join("pdd.log")
	}

	fn command(&self) -> Command {
		let mut cmd = Command::new(env!("CARGO_BIN_EXE_pdd"));
		cmd.env("XDG_CONFIG_HOME", self.dir.join("config"))
			.env("XDG_STATE_HOME", self.dir.join("state"))
			.arg("--working-directory")
			.arg(&self.dir)
			.arg("--pid-file")
			.arg(self.pid_file())
			.arg("--log-file")
			.arg(self.log_file())
			.arg("--stdout")
			.arg(&self.stdout)
			.arg("--stderr")
			.arg(self.dir.join("pdd.stderr"));
		cmd
	}

	fn run(&self, args: &[&str]) -> Output {
		self.command().args(args).output().unwrap()
	}

	fn recorded_pid(&self) -> Option<u32> {
		std::fs::read_to_string(self.pid_file()).ok()?.trim().parse().ok()
	}

	/// The worker logs this once its signal handlers are installed.
	fn wait_for_worker(&self, count: usize) -> bool {
		wait_for(Duration::from_secs(10), || {
			std::fs::read_to_string(self.log_file())
				.map(|log| log.matches("worker started").count() >= count)
				.unwrap_or(false)
		})
	}

	fn wait_until_stopped(&self) -> bool {
		wait_for(Duration::from_secs(10), || {
			let out = self.run(&["status"]);
			out.status.code() == Some(3) && !self.pid_file().exists()
		})
	}
}

impl Drop for Sandbox {
	fn drop(&mut self) {
		let _ = self.run(&["stop", "--wait"]);
		let _ = std::fs::remove_dir_all(&self.dir);
	}
}

fn wait_for(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
	let deadline = Instant::now() + timeout;
	while Instant::now() < deadline {
		if check() {
			return true;
		}
		std::thread::sleep(Duration::from_millis(50));
	}
	check()
}

fn stdout(out: &Output) -> String {
	String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
	String::from_utf8_lossy(&out.stderr).into_owned()
}

// ── start / status / stop ───────────────────────────────────────────────────

#[test]
fn start_status_stop() {
	let sandbox = Sandbox::new();

	let out = sandbox.run(&["start"]);
	assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr(&out));
	let pid = sandbox.recorded_pid().expect("pid file written before start returns");
	assert!(sandbox.wait_for_worker(1));

	let out = sandbox.run(&["status"]);
	assert_eq!(out.status.code(), Some(0));
	assert_eq!(stdout(&out).trim(), format!("pdd: running, PID = {}", pid));

	let out = sandbox.run(&["stop"]);
	assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr(&out));
	assert!(sandbox.wait_until_stopped());

	let out = sandbox.run(&["status"]);
	assert_eq!(stdout(&out).trim(), "pdd: NOT running");
}

#[test]
fn verbose_start_announces_paths() {
	let sandbox = Sandbox::new();
	let out = sandbox.run(&["-v", "start"]);
	assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr(&out));
	let text = stdout(&out);
	assert!(text.contains("pdd: starting..."));
	assert!(text.contains(&format!("pdd: pid_file = {}", sandbox.pid_file().display())));
	assert!(text.contains(&format!("pdd: log_file = {}", sandbox.log_file().display())));
}

#[test]
fn second_start_is_refused() {
	let sandbox = Sandbox::new();
	assert_eq!(sandbox.run(&["start"]).status.code(), Some(0));
	let pid = sandbox.recorded_pid().unwrap();

	let out = sandbox.run(&["start"]);
	assert_eq!(out.status.code(), Some(4));
	assert!(stderr(&out).contains(&format!("already running (pid {})", pid)));
	assert_eq!(sandbox.recorded_pid(), Some(pid));
}

#[test]
fn stop_when_idle_reports_not_running() {
	let sandbox = Sandbox::new();
	for _ in 0..2 {
		let out = sandbox.run(&["stop"]);
		assert_eq!(out.status.code(), Some(3));
		assert_eq!(stdout(&out).trim(), "pdd: NOT running");
	}
}

#[test]
fn stop_wait_returns_after_release() {
	let sandbox = Sandbox::new();
	assert_eq!(sandbox.run(&["start"]).status.code(), Some(0));
	assert!(sandbox.wait_for_worker(1));
	let out = sandbox.run(&["stop", "--wait"]);
	assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr(&out));
	assert!(!sandbox.pid_file().exists());
}

#[test]
fn restart_replaces_the_process() {
	let sandbox = Sandbox::new();
	assert_eq!(sandbox.run(&["start"]).status.code(), Some(0));
	let first = sandbox.recorded_pid().unwrap();
	assert!(sandbox.wait_for_worker(1));

	// The old instance may still be releasing when the new one tries to
	// take over; the bounded wait in the lock covers that.
	let out = sandbox.run(&["restart"]);
	assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr(&out));
	let second = sandbox.recorded_pid().unwrap();
	assert_ne!(first, second);
	assert!(sandbox.wait_for_worker(2));
}

#[test]
fn restart_when_idle_just_starts() {
	let sandbox = Sandbox::new();
	let out = sandbox.run(&["restart"]);
	assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr(&out));
	assert_eq!(stdout(&out).trim(), "pdd: NOT running");
	assert!(sandbox.recorded_pid().is_some());
}

#[test]
fn daemon_writes_sample_messages() {
	let sandbox = Sandbox::new();
	assert_eq!(sandbox.run(&["start"]).status.code(), Some(0));
	let found = wait_for(Duration::from_secs(10), || {
		std::fs::read_to_string(sandbox.log_file())
			.map(|log| log.contains("sample INFO message"))
			.unwrap_or(false)
	});
	assert!(found, "log file never received a sample message");
}

// ── failures ────────────────────────────────────────────────────────────────

#[test]
fn unwritable_stdout_fails_without_lock() {
	let mut sandbox = Sandbox::new();
	sandbox.stdout = sandbox.dir.join("missing").join("pdd.stdout");

	let out = sandbox.run(&["start"]);
	assert_eq!(out.status.code(), Some(6), "stderr: {}", stderr(&out));
	assert!(stderr(&out).contains("error:"));
	assert!(!sandbox.pid_file().exists());
}

#[test]
fn missing_explicit_config_is_a_failure() {
	let sandbox = Sandbox::new();
	let out = sandbox
		.command()
		.arg("--config")
		.arg(sandbox.dir.join("missing.toml"))
		.arg("status")
		.output()
		.unwrap();
	assert_eq!(out.status.code(), Some(1));
}

#[test]
fn config_file_sets_the_name() {
	let sandbox = Sandbox::new();
	let config = sandbox.dir.join("pdd.toml");
	std::fs::write(&config, "[daemon]\nname = \"sampled\"\n").unwrap();
	let out = sandbox.command().arg("--config").arg(&config).arg("status").output().unwrap();
	assert_eq!(out.status.code(), Some(3));
	assert_eq!(stdout(&out).trim(), "sampled: NOT running");
}

#[test]
fn bad_usage_exits_two() {
	let out = Command::new(env!("CARGO_BIN_EXE_pdd")).arg("launch").output().unwrap();
	assert_eq!(out.status.code(), Some(2));
}

// ── crash recovery ──────────────────────────────────────────────────────────

#[test]
fn killed_foreground_instance_is_reclaimed() {
	let sandbox = Sandbox::new();
	let mut child = sandbox
		.command()
		.args(["start", "--foreground"])
		.stdout(Stdio::null())
		.stderr(Stdio::null())
		.spawn()
		.unwrap();

	assert!(wait_for(Duration::from_secs(10), || sandbox.recorded_pid().is_some()));
	assert_eq!(sandbox.recorded_pid(), Some(child.id()));

	child.kill().unwrap();
	child.wait().unwrap();

	// The stale file is still there, but nothing holds it.
	assert!(sandbox.pid_file().exists());
	let out = sandbox.run(&["status"]);
	assert_eq!(out.status.code(), Some(3));

	let started = Instant::now();
	let out = sandbox.run(&["start"]);
	assert_eq!(out.status.code(), Some(0), "stderr: {}", stderr(&out));
	assert!(started.elapsed() < Duration::from_secs(2));
	assert_ne!(sandbox.recorded_pid(), Some(child.id()));
}

