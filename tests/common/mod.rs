use std::path::PathBuf;
use std::process::{Child, Command, Output, Stdio};
use std::time::{Duration, Instant};

use tempfile::TempDir;

pub fn run_background_work(args: &[&str]) -> Output {
    TestEnv::new().run(args)
}

pub struct TestEnv {
    home: TempDir,
    config: TempDir,
    data: TempDir,
    runtime: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            home: tempfile::tempdir().expect("create temporary HOME dir"),
            config: tempfile::tempdir().expect("create temporary XDG config dir"),
            data: tempfile::tempdir().expect("create temporary XDG data dir"),
            runtime: tempfile::tempdir().expect("create temporary XDG runtime dir"),
        }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_background-work"));
        cmd.args(args)
            .env("HOME", self.home.path())
            .env("XDG_CONFIG_HOME", self.config.path())
            .env("XDG_DATA_HOME", self.data.path())
            .env("XDG_RUNTIME_DIR", self.runtime.path())
            .env_remove("BACKGROUND_WORK_ENTRYPOINT")
            .env_remove("RUST_LOG");
        cmd
    }

    pub fn run(&self, args: &[&str]) -> Output {
        self.command(args)
            .output()
            .expect("failed to execute background-work binary")
    }

    /// Run a foreground daemon and wait until its socket is up.
    #[allow(dead_code)]
    pub fn spawn_daemon(&self) -> DaemonGuard {
        let socket = self.runtime.path().join("background-work.sock");
        // A killed daemon leaves its socket behind
        let _ = std::fs::remove_file(&socket);

        let child = self
            .command(&["daemon", "start", "--foreground"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("failed to spawn daemon");

        let deadline = Instant::now() + Duration::from_secs(5);
        while !socket.exists() {
            assert!(Instant::now() < deadline, "daemon socket never appeared");
            std::thread::sleep(Duration::from_millis(25));
        }

        DaemonGuard { child }
    }

    #[allow(dead_code)]
    pub fn runtime_dir(&self) -> PathBuf {
        self.runtime.path().to_path_buf()
    }

    /// `daemon start` in the background; stopped again on drop.
    #[allow(dead_code)]
    pub fn start_background_daemon(&self) -> BackgroundDaemon<'_> {
        stdout_of(&self.run(&["daemon", "start"]));
        BackgroundDaemon { env: self }
    }

    #[allow(dead_code)]
    pub fn config_path(&self) -> PathBuf {
        let output = self.run(&["config", "path"]);
        assert!(
            output.status.success(),
            "config path should succeed\nstdout:\n{}\nstderr:\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        );

        let path = String::from_utf8_lossy(&output.stdout);
        PathBuf::from(path.trim())
    }

    #[allow(dead_code)]
    pub fn write_config(&self, contents: &str) {
        let config_path = self.config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).expect("create config parent directory");
        }
        std::fs::write(&config_path, contents).expect("write config file");
    }
}

/// Kills the daemon if a test bails out early.
pub struct DaemonGuard {
    child: Child,
}

impl DaemonGuard {
    /// Wait for the daemon to exit on its own.
    #[allow(dead_code)]
    pub fn wait(mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Ok(Some(_)) = self.child.try_wait() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(25));
        }
        false
    }
}

impl Drop for DaemonGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// A daemon started with `daemon start`.
pub struct BackgroundDaemon<'a> {
    env: &'a TestEnv,
}

impl Drop for BackgroundDaemon<'_> {
    fn drop(&mut self) {
        let _ = self.env.run(&["daemon", "stop"]);
    }
}

#[allow(dead_code)]
pub fn stdout_of(output: &Output) -> String {
    assert!(
        output.status.success(),
        "command failed\nstdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr),
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}
