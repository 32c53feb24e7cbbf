//! Handing the update over to the external updater process.
//!
//! The running application cannot overwrite its own files, so it moves the
//! updater binary out of the staging folder, starts it detached with the
//! handoff arguments, and asks the host to shut down. After that the two
//! processes share nothing but those arguments.

use crate::error::{Result, UpdateError};
use crate::platform::Platform;
use crate::process::{ProcessLauncher, SystemLauncher};
use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffState {
    Idle,
    LocatingUpdater,
    CopyingUpdater,
    Spawning,
    HandedOff,
    Failed,
}

pub struct HandoffLauncher<L: ProcessLauncher = SystemLauncher> {
    launcher: L,
    platform: Platform,
    install_dir: PathBuf,
    main_exe: PathBuf,
    pid: u32,
    state: HandoffState,
}

impl<L: ProcessLauncher> HandoffLauncher<L> {
    pub fn new(
        launcher: L,
        platform: Platform,
        install_dir: PathBuf,
        main_exe: PathBuf,
        pid: u32,
    ) -> Self {
        Self {
            launcher,
            platform,
            install_dir,
            main_exe,
            pid,
            state: HandoffState::Idle,
        }
    }

    pub fn state(&self) -> HandoffState {
        self.state
    }

    /// Start the updater for `extracted_dir` and, once it is running, call
    /// `on_shutdown`. Returns `false` on any failure; the application keeps
    /// running and its install directory is untouched.
    pub fn launch(&mut self, extracted_dir: &Path, on_shutdown: impl FnOnce()) -> bool {
        match self.try_launch(extracted_dir) {
            Ok(pid) => {
                self.transition(HandoffState::HandedOff);
                log::info!("Updater running as pid {pid}; shutting down host");
                on_shutdown();
                true
            }
            Err(e) => {
                log::error!("Handoff failed: {e}");
                self.transition(HandoffState::Failed);
                false
            }
        }
    }

    fn try_launch(&mut self, extracted_dir: &Path) -> Result<u32> {
        self.transition(HandoffState::LocatingUpdater);
        let source = find_updater(extracted_dir, self.platform).ok_or_else(|| {
            UpdateError::Launch(format!(
                "{} not found in {}",
                self.platform.updater_file_name(),
                extracted_dir.display()
            ))
        })?;

        self.transition(HandoffState::CopyingUpdater);
        let updater = self.install_dir.join(self.platform.updater_file_name());
        relocate(&source, &updater)?;

        self.transition(HandoffState::Spawning);
        let args = handoff_args(extracted_dir, &self.install_dir, &self.main_exe, self.pid);
        log::info!("Launching updater: {} {:?}", updater.display(), args);
        self.launcher
            .spawn_detached(&updater, &args, &self.install_dir)
            .map_err(|e| {
                UpdateError::Launch(format!("cannot start {}: {e}", updater.display()))
            })
    }

    fn transition(&mut self, next: HandoffState) {
        log::info!("Handoff: {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

/// `<sourceDir> <targetDir> <mainExePath> <parentPid>`
pub fn handoff_args(
    extracted_dir: &Path,
    install_dir: &Path,
    main_exe: &Path,
    pid: u32,
) -> Vec<OsString> {
    vec![
        extracted_dir.as_os_str().to_owned(),
        install_dir.as_os_str().to_owned(),
        main_exe.as_os_str().to_owned(),
        OsString::from(pid.to_string()),
    ]
}

/// Find the updater in an extracted artifact: top level first, then the
/// first match anywhere below it.
pub fn find_updater(extracted_dir: &Path, platform: Platform) -> Option<PathBuf> {
    let direct = extracted_dir.join(platform.updater_file_name());
    if direct.is_file() {
        return Some(direct);
    }

    WalkDir::new(extracted_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .find(|e| {
            e.file_type().is_file()
                && e.file_name()
                    .to_str()
                    .is_some_and(|n| platform.is_updater_file_name(n))
        })
        .map(|e| e.into_path())
}

/// Move `source` to `target`, replacing a leftover from an earlier attempt.
///
/// The source must not survive: a copy left in the staging folder would be
/// copied over the running updater.
fn relocate(source: &Path, target: &Path) -> Result<()> {
    if let Err(rename_err) = fs::rename(source, target) {
        log::warn!(
            "Rename {} -> {} failed ({rename_err}); copying instead",
            source.display(),
            target.display()
        );
        fs::copy(source, target).map_err(|e| {
            UpdateError::Launch(format!("cannot copy updater to {}: {e}", target.display()))
        })?;
        fs::remove_file(source).map_err(|e| {
            UpdateError::Launch(format!(
                "cannot remove updater from staging folder {}: {e}",
                source.display()
            ))
        })?;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(target, fs::Permissions::from_mode(0o755))?;
    }

    Ok(())
}
