//! The standalone updater process.
//!
//! Started by the host as
//! `kiota_ui_updater <sourceDir> <targetDir> <mainExePath> [parentPid]`, it
//! waits (bounded) for the host to exit, copies the staged files over the
//! install directory, removes the staging folder and relaunches the app.
//!
//! There is no rollback: if the copy fails part way, the install directory
//! keeps the files copied so far. The main executable is only ever
//! overwritten in place, so it can still be started by hand.

pub mod copy;

use crate::config::UpdateConfig;
use crate::error::{Result, UpdateError};
use crate::process::{ParentProcess, ProcessLauncher};
use copy::{FileCopier, copy_tree};
use std::{
    ffi::OsString,
    fmt, fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const USAGE: &str =
    "Usage: kiota_ui_updater <sourceUpdateDir> <targetAppDir> <mainExePath> [parentPid]";

/// Process exit status of the updater.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdaterExit {
    Success,
    Failed,
    Usage,
}

impl UpdaterExit {
    pub fn code(self) -> u8 {
        match self {
            UpdaterExit::Success => 0,
            UpdaterExit::Failed => 1,
            UpdaterExit::Usage => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageError(pub String);

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n{}", self.0, USAGE)
    }
}

impl std::error::Error for UsageError {}

/// Positional arguments passed by the host at handoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdaterArgs {
    pub source: PathBuf,
    pub target: PathBuf,
    pub main_exe: PathBuf,
    pub parent_pid: Option<u32>,
}

impl UpdaterArgs {
    /// Parse the arguments after the program name. Three are required; an
    /// unparseable or zero pid is treated as absent.
    pub fn parse<I>(args: I) -> std::result::Result<Self, UsageError>
    where
        I: IntoIterator<Item = OsString>,
    {
        let mut args = args.into_iter();
        let mut next_path = |what: &str| {
            args.next()
                .filter(|a| !a.is_empty())
                .map(PathBuf::from)
                .ok_or_else(|| UsageError(format!("missing {what}")))
        };

        let source = next_path("source directory")?;
        let target = next_path("target directory")?;
        let main_exe = next_path("main executable path")?;

        let parent_pid = match args.next() {
            None => None,
            Some(raw) => match raw.to_str().and_then(|s| s.trim().parse::<u32>().ok()) {
                Some(0) | None => {
                    log::warn!("Ignoring invalid parent pid {raw:?}");
                    None
                }
                Some(pid) => Some(pid),
            },
        };

        Ok(Self {
            source,
            target,
            main_exe,
            parent_pid,
        })
    }
}

/// What happened while waiting for the host to exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentWait {
    NoParent,
    AlreadyExited,
    Exited,
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdaterOptions {
    pub parent_wait: Duration,
    pub retry_delay: Duration,
}

impl Default for UpdaterOptions {
    fn default() -> Self {
        Self::from(&UpdateConfig::default())
    }
}

impl From<&UpdateConfig> for UpdaterOptions {
    fn from(config: &UpdateConfig) -> Self {
        Self {
            parent_wait: config.parent_wait(),
            retry_delay: config.copy_retry_delay(),
        }
    }
}

pub struct Updater<P, L, C> {
    parent: P,
    launcher: L,
    copier: C,
    options: UpdaterOptions,
}

impl<P: ParentProcess, L: ProcessLauncher, C: FileCopier> Updater<P, L, C> {
    pub fn new(parent: P, launcher: L, copier: C, options: UpdaterOptions) -> Self {
        Self {
            parent,
            launcher,
            copier,
            options,
        }
    }

    /// Parse `raw_args` and run the update, mapping the outcome to an exit status.
    pub fn run_from_args<I>(&self, raw_args: I) -> UpdaterExit
    where
        I: IntoIterator<Item = OsString>,
    {
        let args = match UpdaterArgs::parse(raw_args) {
            Ok(a) => a,
            Err(e) => {
                log::error!("{}", e.0);
                eprintln!("{e}");
                return UpdaterExit::Usage;
            }
        };

        match self.run(&args) {
            Ok(()) => UpdaterExit::Success,
            Err(e) => {
                log::error!("Update failed: {e}");
                eprintln!("Update failed: {e}");
                UpdaterExit::Failed
            }
        }
    }

    pub fn run(&self, args: &UpdaterArgs) -> Result<()> {
        log::info!(
            "Updating {} from {}",
            args.target.display(),
            args.source.display()
        );

        let waited = self.wait_for_parent(args.parent_pid);
        log::info!("Parent wait: {waited:?}");

        let copied = copy_tree(
            &self.copier,
            &args.source,
            &args.target,
            self.options.retry_delay,
        )?;
        log::info!("Copied {copied} files into {}", args.target.display());

        remove_staging(&args.source);
        self.relaunch(&args.main_exe, &args.target)
    }

    /// Best-effort: a parent still running after the timeout does not stop
    /// the update.
    pub fn wait_for_parent(&self, pid: Option<u32>) -> ParentWait {
        let Some(pid) = pid else {
            return ParentWait::NoParent;
        };
        if !self.parent.is_alive(pid) {
            return ParentWait::AlreadyExited;
        }

        log::info!(
            "Waiting up to {}s for process {pid} to exit...",
            self.options.parent_wait.as_secs()
        );
        if self.parent.wait_for_exit(pid, self.options.parent_wait) {
            ParentWait::Exited
        } else {
            log::warn!("Process {pid} still running after timeout; continuing anyway");
            ParentWait::TimedOut
        }
    }

    fn relaunch(&self, main_exe: &Path, working_dir: &Path) -> Result<()> {
        log::info!("Restarting application: {}", main_exe.display());
        let pid = self
            .launcher
            .spawn_detached(main_exe, &[], working_dir)
            .map_err(|e| UpdateError::Launch(format!("cannot relaunch {}: {e}", main_exe.display())))?;
        log::info!("Update complete; application restarted as pid {pid}");
        Ok(())
    }
}

/// Delete the staging folder. Failures are logged and otherwise ignored.
pub fn remove_staging(dir: &Path) {
    if !dir.exists() {
        return;
    }
    match fs::remove_dir_all(dir) {
        Ok(()) => log::info!("Removed staging folder {}", dir.display()),
        Err(e) => log::warn!("Could not remove staging folder {}: {e}", dir.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use copy::FsCopier;
    use std::cell::Cell;
    use std::io;
    use std::sync::Mutex;
    use std::time::Instant;

    struct FakeParent {
        alive: bool,
        exits_in_time: bool,
        waits: Cell<u32>,
    }

    impl FakeParent {
        fn new(alive: bool, exits_in_time: bool) -> Self {
            Self {
                alive,
                exits_in_time,
                waits: Cell::new(0),
            }
        }
    }

    impl ParentProcess for FakeParent {
        fn is_alive(&self, _pid: u32) -> bool {
            self.alive
        }

        fn wait_for_exit(&self, _pid: u32, _timeout: Duration) -> bool {
            self.waits.set(self.waits.get() + 1);
            self.exits_in_time
        }
    }

    #[derive(Default)]
    struct RecordingLauncher {
        launched: Mutex<Vec<(PathBuf, PathBuf)>>,
        fail: bool,
    }

    impl ProcessLauncher for RecordingLauncher {
        fn spawn_detached(&self, program: &Path, _args: &[OsString], cwd: &Path) -> io::Result<u32> {
            if self.fail {
                return Err(io::Error::from(io::ErrorKind::NotFound));
            }
            self.launched
                .lock()
                .unwrap()
                .push((program.to_path_buf(), cwd.to_path_buf()));
            Ok(1)
        }
    }

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    fn options() -> UpdaterOptions {
        UpdaterOptions {
            parent_wait: Duration::from_secs(30),
            retry_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn parses_positional_args() {
        let args = UpdaterArgs::parse(os(&["/tmp/v2", "/opt/app", "/opt/app/kiota_ui_client", "991"])).unwrap();
        assert_eq!(args.source, PathBuf::from("/tmp/v2"));
        assert_eq!(args.target, PathBuf::from("/opt/app"));
        assert_eq!(args.main_exe, PathBuf::from("/opt/app/kiota_ui_client"));
        assert_eq!(args.parent_pid, Some(991));

        let args = UpdaterArgs::parse(os(&["a", "b", "c"])).unwrap();
        assert_eq!(args.parent_pid, None);

        let args = UpdaterArgs::parse(os(&["a", "b", "c", "not-a-pid"])).unwrap();
        assert_eq!(args.parent_pid, None);

        let args = UpdaterArgs::parse(os(&["a", "b", "c", "0"])).unwrap();
        assert_eq!(args.parent_pid, None);
    }

    #[test]
    fn missing_args_exit_with_usage_code() {
        let updater = Updater::new(
            FakeParent::new(false, true),
            RecordingLauncher::default(),
            FsCopier,
            options(),
        );
        assert_eq!(updater.run_from_args(os(&["a", "b"])), UpdaterExit::Usage);
        assert_eq!(updater.run_from_args(os(&[])), UpdaterExit::Usage);
        assert_eq!(UpdaterExit::Usage.code(), 2);
    }

    #[test]
    fn exited_parent_is_not_waited_on() {
        let parent = FakeParent::new(false, false);
        let updater = Updater::new(parent, RecordingLauncher::default(), FsCopier, options());

        let start = Instant::now();
        assert_eq!(updater.wait_for_parent(Some(4321)), ParentWait::AlreadyExited);
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(updater.parent.waits.get(), 0);
    }

    #[test]
    fn live_parent_is_waited_on_once() {
        let updater = Updater::new(
            FakeParent::new(true, true),
            RecordingLauncher::default(),
            FsCopier,
            options(),
        );
        assert_eq!(updater.wait_for_parent(Some(1)), ParentWait::Exited);

        let stuck = Updater::new(
            FakeParent::new(true, false),
            RecordingLauncher::default(),
            FsCopier,
            options(),
        );
        assert_eq!(stuck.wait_for_parent(Some(1)), ParentWait::TimedOut);
        assert_eq!(stuck.wait_for_parent(None), ParentWait::NoParent);
    }

    fn staged() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let root = tempfile::tempdir().unwrap();
        let source = root.path().join("v2.5.0");
        let target = root.path().join("app");
        fs::create_dir_all(source.join("lib")).unwrap();
        fs::create_dir_all(&target).unwrap();
        fs::write(source.join("kiota_ui_client"), b"new").unwrap();
        fs::write(source.join("lib/x.dll"), b"x").unwrap();
        fs::write(target.join("kiota_ui_client"), b"old").unwrap();
        (root, source, target)
    }

    #[test]
    fn full_run_copies_cleans_up_and_relaunches() {
        let (_root, source, target) = staged();
        let main_exe = target.join("kiota_ui_client");
        let updater = Updater::new(
            FakeParent::new(true, false),
            RecordingLauncher::default(),
            FsCopier,
            options(),
        );

        let exit = updater.run_from_args(vec![
            source.clone().into_os_string(),
            target.clone().into_os_string(),
            main_exe.clone().into_os_string(),
            OsString::from("55"),
        ]);

        assert_eq!(exit, UpdaterExit::Success);
        assert_eq!(fs::read(&main_exe).unwrap(), b"new");
        assert_eq!(fs::read(target.join("lib/x.dll")).unwrap(), b"x");
        assert!(!source.exists());
        assert_eq!(
            *updater.launcher.launched.lock().unwrap(),
            vec![(main_exe, target)]
        );
    }

    #[test]
    fn copy_failure_exits_1_without_relaunch() {
        let root = tempfile::tempdir().unwrap();
        let updater = Updater::new(
            FakeParent::new(false, true),
            RecordingLauncher::default(),
            FsCopier,
            options(),
        );

        let exit = updater.run_from_args(vec![
            root.path().join("missing").into_os_string(),
            root.path().join("app").into_os_string(),
            root.path().join("app/kiota_ui_client").into_os_string(),
        ]);

        assert_eq!(exit, UpdaterExit::Failed);
        assert_eq!(exit.code(), 1);
        assert!(updater.launcher.launched.lock().unwrap().is_empty());
    }

    #[test]
    fn relaunch_failure_exits_1() {
        let (_root, source, target) = staged();
        let updater = Updater::new(
            FakeParent::new(false, true),
            RecordingLauncher {
                fail: true,
                ..Default::default()
            },
            FsCopier,
            options(),
        );

        let args = UpdaterArgs {
            source,
            target: target.clone(),
            main_exe: target.join("kiota_ui_client"),
            parent_pid: None,
        };
        assert!(matches!(updater.run(&args), Err(UpdateError::Launch(_))));
        // files were still copied
        assert_eq!(fs::read(target.join("kiota_ui_client")).unwrap(), b"new");
    }

    #[test]
    fn cleanup_failure_is_swallowed() {
        remove_staging(Path::new("/definitely/not/here/kiota-staging"));
    }
}
