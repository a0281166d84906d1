//! Player Process Control
//!
//! Spawns and stops the player process backing one clone. The executable is a
//! launcher/controller for the actual emulator, so the documented shutdown
//! path is re-invoking it with a `-quit` directive for the clone, not
//! signalling the tracked process.

use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::error::{EmulatorError, Result};

/// The spawned player process backing one clone
pub struct ProcessHandle {
    child: Child,
    exe: PathBuf,
    clone_name: String,
}

impl ProcessHandle {
    /// Spawn `<exe> -clone:<name> <startup args...>` without waiting on it
    pub fn spawn(exe: &Path, clone_name: &str, startup_args: &[String]) -> Result<Self> {
        debug!("Spawning {:?} -clone:{} {:?}", exe, clone_name, startup_args);

        let child = Command::new(exe)
            .arg(format!("-clone:{}", clone_name))
            .args(startup_args)
            .spawn()?;

        Ok(Self {
            child,
            exe: exe.to_path_buf(),
            clone_name: clone_name.to_string(),
        })
    }

    /// Clone name this process was spawned for
    pub fn clone_name(&self) -> &str {
        &self.clone_name
    }

    /// Non-blocking liveness poll
    pub fn is_alive(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(Some(_)) => false,
            Ok(None) => true,
            Err(_) => false,
        }
    }

    /// Ask the player to quit this clone, then wait for the process to exit.
    ///
    /// Only valid on a live process; fails with `ProcessNotRunning` otherwise.
    pub async fn terminate(&mut self) -> Result<ExitStatus> {
        if !self.is_alive() {
            return Err(EmulatorError::ProcessNotRunning);
        }

        CloneCommand::new(&self.exe, &self.clone_name)
            .arg("-quit")
            .run()
            .await?;

        let status = self.child.wait().await?;
        info!("Clone {} exited: {}", self.clone_name, status);
        Ok(status)
    }

    /// Synchronous best-effort kill, for drop paths that cannot await
    pub fn start_kill(&mut self) {
        if let Err(e) = self.child.start_kill() {
            warn!("Failed to kill clone {}: {}", self.clone_name, e);
        }
    }

    /// Synchronously wait for the process to exit, for drop paths.
    ///
    /// Polls `try_wait` with a short sleep until the process is gone or the
    /// budget elapses; returns whether it exited.
    pub fn wait_sync(&mut self, budget: Duration) -> bool {
        let deadline = std::time::Instant::now() + budget;
        loop {
            if !self.is_alive() {
                return true;
            }
            if std::time::Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}

/// Control-plane command builder for the player executable.
///
/// Builds `<exe> -clone:<name> <directive...>` invocations (install APK,
/// launch activity or package, quit) and runs them to completion.
pub struct CloneCommand {
    exe: PathBuf,
    args: Vec<String>,
}

impl CloneCommand {
    pub fn new(exe: &Path, clone_name: &str) -> Self {
        Self {
            exe: exe.to_path_buf(),
            args: vec![format!("-clone:{}", clone_name)],
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Run the invocation and wait for it to finish.
    ///
    /// The player reports nothing useful through exit codes for clone
    /// directives, so the status is returned as-is rather than checked.
    pub async fn run(self) -> Result<ExitStatus> {
        debug!("Running {:?} {:?}", self.exe, self.args);
        let status = Command::new(&self.exe).args(&self.args).status().await?;
        Ok(status)
    }
}
