//! Emulator Instance
//!
//! Composes a pool slot, a player process and a bound adb device into one
//! lifecycle object, and exposes the install/launch/input command surface.
//!
//! Commands on one instance are not serialized against each other; callers
//! issuing overlapping commands get unspecified interleaving of shell output.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use noxherd_core::PlayerConfig;

use crate::adb::AdbClient;
use crate::binder::{DeviceBinder, DeviceRegistry};
use crate::device::BoundDevice;
use crate::error::{EmulatorError, Result};
use crate::pool::{Slot, SlotPool};
use crate::process::{CloneCommand, ProcessHandle};

/// Confirmation line uiautomator prints before the XML (upstream spelling)
const DUMP_CONFIRMATION: &str = "UI hierchary dumped to: /dev/tty\r\n";

/// Recognized startup options for a clone.
///
/// A closed set: the player ignores anything else, so anything else is
/// rejected up front instead of being passed through.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchOptions {
    pub title: Option<String>,
    pub lang: Option<String>,
    pub locale: Option<String>,
    pub screen: Option<String>,
    pub resolution: Option<String>,
    pub dpi: Option<u32>,
    pub performance: Option<String>,
    pub cpu: Option<u32>,
    pub memory: Option<u32>,
    pub root: Option<bool>,
    pub virtual_key: Option<bool>,
}

impl LaunchOptions {
    /// Build options from dynamic key/value pairs (config or CLI surface).
    ///
    /// Fails with `InvalidArgument` on the first key outside the recognized
    /// set, or on a value that does not parse for a numeric/boolean option.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut options = Self::default();
        for (key, value) in pairs {
            let value = value.as_ref();
            match key.as_ref() {
                "title" => options.title = Some(value.to_string()),
                "lang" => options.lang = Some(value.to_string()),
                "locale" => options.locale = Some(value.to_string()),
                "screen" => options.screen = Some(value.to_string()),
                "resolution" => options.resolution = Some(value.to_string()),
                "performance" => options.performance = Some(value.to_string()),
                "dpi" => options.dpi = Some(parse_option("dpi", value)?),
                "cpu" => options.cpu = Some(parse_option("cpu", value)?),
                "memory" => options.memory = Some(parse_option("memory", value)?),
                "root" => options.root = Some(parse_option("root", value)?),
                "virtualKey" => options.virtual_key = Some(parse_option("virtualKey", value)?),
                unknown => return Err(EmulatorError::InvalidArgument(unknown.to_string())),
            }
        }
        Ok(options)
    }

    /// Render the `-key:value` startup arguments for the player command line
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(ref title) = self.title {
            args.push(format!("-title:{}", title));
        }
        if let Some(ref lang) = self.lang {
            args.push(format!("-lang:{}", lang));
        }
        if let Some(ref locale) = self.locale {
            args.push(format!("-locale:{}", locale));
        }
        if let Some(ref screen) = self.screen {
            args.push(format!("-screen:{}", screen));
        }
        if let Some(ref resolution) = self.resolution {
            args.push(format!("-resolution:{}", resolution));
        }
        if let Some(dpi) = self.dpi {
            args.push(format!("-dpi:{}", dpi));
        }
        if let Some(ref performance) = self.performance {
            args.push(format!("-performance:{}", performance));
        }
        if let Some(cpu) = self.cpu {
            args.push(format!("-cpu:{}", cpu));
        }
        if let Some(memory) = self.memory {
            args.push(format!("-memory:{}", memory));
        }
        if let Some(root) = self.root {
            args.push(format!("-root:{}", root));
        }
        if let Some(virtual_key) = self.virtual_key {
            args.push(format!("-virtualKey:{}", virtual_key));
        }

        args
    }
}

fn parse_option<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| EmulatorError::InvalidArgument(format!("{}:{}", key, value)))
}

/// Lifecycle state of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    /// Spawned, waiting for its adb connection
    Starting,
    /// Device bound, command surface available
    Running,
    /// Shut down or process exit detected; terminal
    Stopped,
}

impl InstanceState {
    pub fn label(&self) -> &'static str {
        match self {
            InstanceState::Starting => "Starting",
            InstanceState::Running => "Running",
            InstanceState::Stopped => "Stopped",
        }
    }
}

/// One emulator clone: slot + player process + bound adb device.
///
/// `shutdown()` is the clean teardown path. An instance dropped while still
/// running is force-killed and its slot returned, so neither the process nor
/// the slot outlives the handle on any exit path.
pub struct EmulatorInstance {
    slot: Slot,
    state: InstanceState,
    process: ProcessHandle,
    device: Option<BoundDevice>,
    pool: Arc<SlotPool>,
    exe: PathBuf,
    // Guards against handing the slot back twice: once released it may be
    // owned by a newer instance, so Drop must not touch it again.
    slot_released: bool,
}

impl EmulatorInstance {
    /// Create a clone: acquire a slot, spawn the player with the startup
    /// options, wait for the matching adb connection and bind it.
    ///
    /// On spawn or bind failure the just-spawned process is stopped and the
    /// slot released before the error propagates; construction leaks nothing.
    pub async fn create(
        pool: Arc<SlotPool>,
        adb: AdbClient,
        config: &PlayerConfig,
        options: LaunchOptions,
    ) -> Result<Self> {
        let registry = adb.clone();
        Self::create_with_registry(pool, adb, registry, config, options).await
    }

    /// As `create`, but binding through an explicit registry.
    ///
    /// The seam for scripted registries in tests, and for any future binder
    /// that correlates by something stronger than position.
    pub async fn create_with_registry<R: DeviceRegistry>(
        pool: Arc<SlotPool>,
        adb: AdbClient,
        registry: R,
        config: &PlayerConfig,
        options: LaunchOptions,
    ) -> Result<Self> {
        let slot = pool.acquire()?;
        let exe = config.player_exe();
        let clone_name = slot.clone_name();

        info!("Creating clone {} (ordinal {})", clone_name, slot.ordinal());

        let process = match ProcessHandle::spawn(&exe, &clone_name, &options.to_args()) {
            Ok(process) => process,
            Err(e) => {
                pool.release(&slot);
                return Err(e);
            }
        };

        let mut instance = Self {
            slot,
            state: InstanceState::Starting,
            process,
            device: None,
            pool,
            exe,
            slot_released: false,
        };

        let binder = DeviceBinder::new(registry, config.bind_timeout(), config.bind_poll_interval());
        match binder.wait_and_bind(instance.slot.ordinal()).await {
            Ok(device) => {
                info!("Clone {} bound to device {}", clone_name, device.serial);
                instance.device = Some(BoundDevice::new(device.serial, adb));
                instance.state = InstanceState::Running;
                Ok(instance)
            }
            Err(e) => {
                instance.abort().await;
                Err(e)
            }
        }
    }

    /// Roll back a partially constructed instance
    async fn abort(&mut self) {
        if self.process.is_alive() {
            if let Err(e) = self.process.terminate().await {
                warn!(
                    "Graceful stop of clone {} failed during rollback: {}",
                    self.slot.clone_name(),
                    e
                );
                self.process.start_kill();
            }
        }
        self.state = InstanceState::Stopped;
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.slot_released {
            self.pool.release(&self.slot);
            self.slot_released = true;
        }
    }

    /// Slot this instance owns
    pub fn slot(&self) -> &Slot {
        &self.slot
    }

    /// Clone name of this instance
    pub fn clone_name(&self) -> String {
        self.slot.clone_name()
    }

    /// Bound adb device, once binding has completed
    pub fn device(&self) -> Option<&BoundDevice> {
        self.device.as_ref()
    }

    /// Current lifecycle state, detecting an exited player process
    pub fn state(&mut self) -> InstanceState {
        if self.state == InstanceState::Running && !self.process.is_alive() {
            info!("Clone {} process exited", self.slot.clone_name());
            self.state = InstanceState::Stopped;
        }
        self.state
    }

    fn ensure_running(&mut self) -> Result<()> {
        if self.state() != InstanceState::Running {
            return Err(EmulatorError::InstanceNotRunning);
        }
        Ok(())
    }

    fn bound_device(&self) -> Result<&BoundDevice> {
        self.device.as_ref().ok_or(EmulatorError::InstanceNotRunning)
    }

    /// Install an APK into this clone
    pub async fn install(&mut self, apk: &Path) -> Result<()> {
        self.ensure_running()?;
        CloneCommand::new(&self.exe, &self.slot.clone_name())
            .arg(format!("-apk:{}", apk.display()))
            .run()
            .await?;
        Ok(())
    }

    /// Launch an activity, with optional intent extras.
    ///
    /// The `-param:` block is only emitted when there are extras, matching
    /// the player's expected wire shape.
    pub async fn launch_activity(&mut self, activity: &str, extras: &[(String, String)]) -> Result<()> {
        self.ensure_running()?;

        let mut command = CloneCommand::new(&self.exe, &self.slot.clone_name())
            .arg(format!("-activity:{}", activity));
        if !extras.is_empty() {
            command = command.arg("-param:");
            for (key, value) in extras {
                command = command.arg("-e").arg(key.clone()).arg(value.clone());
            }
        }

        command.run().await?;
        Ok(())
    }

    /// Launch an installed package by name.
    ///
    /// The name is verified against the bound device's package listing first;
    /// an unknown package fails with `PackageNotFound` instead of silently
    /// no-opping inside the player.
    pub async fn launch_package(&mut self, package: &str) -> Result<()> {
        self.ensure_running()?;

        let packages = self.bound_device()?.list_packages().await?;
        if !packages.contains(package) {
            return Err(EmulatorError::PackageNotFound(package.to_string()));
        }

        CloneCommand::new(&self.exe, &self.slot.clone_name())
            .arg(format!("-package:{}", package))
            .run()
            .await?;
        Ok(())
    }

    /// Tap at screen coordinates
    pub async fn tap(&self, x: u32, y: u32) -> Result<()> {
        self.bound_device()?
            .shell(&format!("input tap {} {}", x, y))
            .await?;
        Ok(())
    }

    /// Swipe between two points over `duration_ms` milliseconds
    pub async fn swipe(&self, x0: u32, y0: u32, x1: u32, y1: u32, duration_ms: u32) -> Result<()> {
        self.bound_device()?
            .shell(&format!("input swipe {} {} {} {} {}", x0, y0, x1, y1, duration_ms))
            .await?;
        Ok(())
    }

    /// Type text into the focused input
    pub async fn send_text(&self, text: &str) -> Result<()> {
        self.bound_device()?
            .shell(&format!("input text {}", text))
            .await?;
        Ok(())
    }

    /// Dump the current UI hierarchy as raw XML bytes
    pub async fn dump_ui_tree(&self) -> Result<Vec<u8>> {
        let output = self.bound_device()?.shell("uiautomator dump /dev/tty").await?;
        Ok(strip_dump_confirmation(&output).into_bytes())
    }

    /// Gracefully stop the clone and return its slot to the pool.
    ///
    /// Only valid while `Running`; further calls fail with
    /// `InstanceNotRunning`.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.ensure_running()?;

        self.process.terminate().await?;
        self.state = InstanceState::Stopped;
        self.release_once();
        info!("Clone {} shut down, slot released", self.slot.clone_name());
        Ok(())
    }

    /// Return the slot without a graceful shutdown.
    ///
    /// Fails with `InstanceStillRunning` while the player process is alive;
    /// idempotent once it is not.
    pub fn release_slot(&mut self) -> Result<()> {
        if self.process.is_alive() {
            return Err(EmulatorError::InstanceStillRunning);
        }
        self.state = InstanceState::Stopped;
        self.release_once();
        Ok(())
    }
}

impl Drop for EmulatorInstance {
    fn drop(&mut self) {
        if self.state == InstanceState::Running {
            warn!(
                "Clone {} dropped while running, killing process",
                self.slot.clone_name()
            );
            self.process.start_kill();
            // Reap before the slot goes back: a fresh acquire may re-spawn
            // this clone name, which must not race the dying player.
            if !self.process.wait_sync(std::time::Duration::from_secs(2)) {
                warn!(
                    "Clone {} did not exit after kill",
                    self.slot.clone_name()
                );
            }
        }
        // The slot must come back on every exit path, but only if this
        // instance still owns it.
        self.release_once();
    }
}

/// Strip uiautomator's confirmation line from a dump, leaving the XML
fn strip_dump_confirmation(output: &str) -> String {
    output.replace(DUMP_CONFIRMATION, "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adb::AdbError;
    use crate::binder::DeviceRegistry;
    use crate::device::Device;

    #[test]
    fn test_from_pairs_maps_recognized_keys() {
        let options = LaunchOptions::from_pairs([
            ("title", "farm-bot"),
            ("resolution", "900x1600"),
            ("dpi", "320"),
            ("root", "true"),
            ("virtualKey", "false"),
        ])
        .unwrap();

        assert_eq!(options.title.as_deref(), Some("farm-bot"));
        assert_eq!(options.dpi, Some(320));
        assert_eq!(options.root, Some(true));
        assert_eq!(options.virtual_key, Some(false));
        assert_eq!(
            options.to_args(),
            vec![
                "-title:farm-bot",
                "-resolution:900x1600",
                "-dpi:320",
                "-root:true",
                "-virtualKey:false",
            ]
        );
    }

    #[test]
    fn test_from_pairs_rejects_unknown_key() {
        let result = LaunchOptions::from_pairs([("launchSpeed", "fast")]);
        match result {
            Err(EmulatorError::InvalidArgument(key)) => assert_eq!(key, "launchSpeed"),
            other => panic!("expected InvalidArgument, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_from_pairs_rejects_bad_numeric_value() {
        assert!(matches!(
            LaunchOptions::from_pairs([("memory", "lots")]),
            Err(EmulatorError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_invalid_options_consume_no_slot() {
        // Option validation happens before any slot is acquired.
        let pool = SlotPool::new(2);
        assert!(LaunchOptions::from_pairs([("color", "red")]).is_err());
        assert_eq!(pool.free_count(), 2);
    }

    #[test]
    fn test_strip_dump_confirmation() {
        let raw = "UI hierchary dumped to: /dev/tty\r\n<?xml version='1.0'?><hierarchy/>";
        assert_eq!(
            strip_dump_confirmation(raw),
            "<?xml version='1.0'?><hierarchy/>"
        );
        assert_eq!(strip_dump_confirmation("<hierarchy/>"), "<hierarchy/>");
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(InstanceState::Starting.label(), "Starting");
        assert_eq!(InstanceState::Running.label(), "Running");
        assert_eq!(InstanceState::Stopped.label(), "Stopped");
    }

    fn test_config(exe: &str) -> PlayerConfig {
        PlayerConfig {
            exe_path: Some(PathBuf::from(exe)),
            pool_capacity: 2,
            bind_timeout_secs: 1,
            bind_poll_interval_ms: 20,
        }
    }

    #[tokio::test]
    async fn test_failed_spawn_releases_slot() {
        let pool = Arc::new(SlotPool::new(2));
        let config = test_config("/nonexistent/Nox.exe");

        let result = EmulatorInstance::create(
            Arc::clone(&pool),
            AdbClient::default(),
            &config,
            LaunchOptions::default(),
        )
        .await;

        assert!(matches!(result, Err(EmulatorError::Io(_))));
        assert_eq!(pool.free_count(), 2);
    }

    /// Registry that never reports any connection.
    struct EmptyRegistry;

    impl DeviceRegistry for EmptyRegistry {
        async fn devices(&self) -> std::result::Result<Vec<Device>, AdbError> {
            Ok(Vec::new())
        }
    }

    #[cfg(unix)]
    fn write_script(dir: &std::path::Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join(name);
        std::fs::write(&script, body).unwrap();
        let mut perms = std::fs::metadata(&script).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&script, perms).unwrap();
        script
    }

    /// Stand-in player: stays alive when spawned with just the clone
    /// argument, returns immediately for control-plane directives.
    #[cfg(unix)]
    fn fake_player(dir: &std::path::Path) -> PathBuf {
        write_script(
            dir,
            "player.sh",
            "#!/bin/sh\nif [ -n \"$2\" ]; then exit 0; fi\nsleep 30\n",
        )
    }

    /// Stand-in adb that reports one installed package for any query.
    #[cfg(unix)]
    fn fake_adb(dir: &std::path::Path) -> PathBuf {
        write_script(dir, "adb.sh", "#!/bin/sh\necho \"package:com.bar\"\n")
    }

    /// Stand-in player that records its pid and honors the `-quit` directive
    /// by killing the recorded process, like the real controller does.
    #[cfg(unix)]
    fn quitting_player(dir: &std::path::Path) -> PathBuf {
        let pid_file = dir.join("player.pid");
        let body = format!(
            "#!/bin/sh\n\
             if [ \"$2\" = \"-quit\" ]; then\n\
               kill \"$(cat {pid})\"\n\
               exit 0\n\
             fi\n\
             if [ -z \"$2\" ]; then\n\
               echo $$ > {pid}\n\
               exec sleep 30\n\
             fi\n\
             exit 0\n",
            pid = pid_file.display()
        );
        write_script(dir, "quitting_player.sh", &body)
    }

    #[cfg(unix)]
    fn recorded_pid(dir: &std::path::Path) -> String {
        std::fs::read_to_string(dir.join("player.pid"))
            .unwrap()
            .trim()
            .to_string()
    }

    #[cfg(unix)]
    fn process_gone(pid: &str) -> bool {
        !std::process::Command::new("kill")
            .args(["-0", pid])
            .stderr(std::process::Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_release_while_alive_fails_then_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let script = fake_player(dir.path());

        let pool = Arc::new(SlotPool::new(1));
        let slot = pool.acquire().unwrap();
        let process = ProcessHandle::spawn(&script, &slot.clone_name(), &[]).unwrap();
        let mut instance = EmulatorInstance {
            slot,
            state: InstanceState::Running,
            process,
            device: None,
            pool: Arc::clone(&pool),
            exe: script,
            slot_released: false,
        };

        assert!(matches!(
            instance.release_slot(),
            Err(EmulatorError::InstanceStillRunning)
        ));
        assert_eq!(pool.free_count(), 0);

        instance.process.start_kill();
        for _ in 0..100 {
            if !instance.process.is_alive() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        instance.release_slot().unwrap();
        assert_eq!(pool.free_count(), 1);
        drop(instance);

        // The same slot is acquirable again after the clean release.
        assert_eq!(pool.acquire().unwrap().index(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_launch_package_verifies_device_listing() {
        let dir = tempfile::tempdir().unwrap();
        let script = fake_player(dir.path());
        let client = AdbClient::new(fake_adb(dir.path()));

        let pool = Arc::new(SlotPool::new(1));
        let slot = pool.acquire().unwrap();
        let process = ProcessHandle::spawn(&script, &slot.clone_name(), &[]).unwrap();
        let mut instance = EmulatorInstance {
            slot,
            state: InstanceState::Running,
            process,
            device: Some(BoundDevice::new("127.0.0.1:62001".to_string(), client)),
            pool: Arc::clone(&pool),
            exe: script,
            slot_released: false,
        };

        // The device only carries com.bar, so com.foo must fail before any
        // launch directive is issued.
        let result = instance.launch_package("com.foo").await;
        assert!(matches!(result, Err(EmulatorError::PackageNotFound(name)) if name == "com.foo"));

        // A present package goes through to the player.
        instance.launch_package("com.bar").await.unwrap();
    }

    // A player still alive at the timeout must be stopped by the rollback,
    // leaving zero live processes as well as zero consumed slots.
    #[cfg(unix)]
    #[tokio::test]
    async fn test_bind_timeout_stops_live_player() {
        let dir = tempfile::tempdir().unwrap();
        let script = quitting_player(dir.path());

        let pool = Arc::new(SlotPool::new(2));
        let config = PlayerConfig {
            exe_path: Some(script),
            pool_capacity: 2,
            bind_timeout_secs: 1,
            bind_poll_interval_ms: 20,
        };

        let result = EmulatorInstance::create_with_registry(
            Arc::clone(&pool),
            AdbClient::default(),
            EmptyRegistry,
            &config,
            LaunchOptions::default(),
        )
        .await;

        assert!(matches!(result, Err(EmulatorError::BindTimedOut { expected: 1, .. })));
        assert_eq!(pool.free_count(), 2);
        assert!(process_gone(&recorded_pid(dir.path())));
    }

    // An instance dropped while running must not hand its slot back until
    // the player is actually gone.
    #[cfg(unix)]
    #[tokio::test]
    async fn test_drop_while_running_kills_and_reaps() {
        let dir = tempfile::tempdir().unwrap();
        let script = quitting_player(dir.path());

        let pool = Arc::new(SlotPool::new(1));
        let slot = pool.acquire().unwrap();
        let process = ProcessHandle::spawn(&script, &slot.clone_name(), &[]).unwrap();
        let instance = EmulatorInstance {
            slot,
            state: InstanceState::Running,
            process,
            device: None,
            pool: Arc::clone(&pool),
            exe: script,
            slot_released: false,
        };

        // Give the script a moment to record its pid before the kill.
        for _ in 0..100 {
            if dir.path().join("player.pid").exists() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        drop(instance);
        assert_eq!(pool.free_count(), 1);
        assert!(process_gone(&recorded_pid(dir.path())));
    }

    // Uses `sleep` as a stand-in player binary; it exits immediately on the
    // unrecognized -clone: argument, which the rollback path must tolerate.
    #[cfg(unix)]
    #[tokio::test]
    async fn test_bind_timeout_releases_slot_and_process() {
        let pool = Arc::new(SlotPool::new(2));
        let config = test_config("sleep");

        let result = EmulatorInstance::create_with_registry(
            Arc::clone(&pool),
            AdbClient::default(),
            EmptyRegistry,
            &config,
            LaunchOptions::default(),
        )
        .await;

        assert!(matches!(result, Err(EmulatorError::BindTimedOut { expected: 1, .. })));
        assert_eq!(pool.free_count(), 2);
    }
}
