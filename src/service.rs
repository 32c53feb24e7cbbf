//! The check and download-and-run flows the host drives.
//!
//! Every failure is caught here and turned into an outcome with a
//! human-readable status; nothing in this module ends the host process
//! except the shutdown hook passed to [`UpdateService::download_and_run`].

use crate::config::UpdateConfig;
use crate::download::{ArtifactFetcher, ProgressFn};
use crate::error::Result;
use crate::extract::ArchiveExtractor;
use crate::handoff::HandoffLauncher;
use crate::platform::Platform;
use crate::process::{ProcessLauncher, SystemLauncher};
use crate::release::{ReleaseInfo, ReleaseResolver, build_http_client};
use crate::session::{UpdatePhase, UpdateSession};
use crate::version::CurrentVersion;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    Available(ReleaseInfo),
    UpToDate(ReleaseInfo),
    NoAsset,
    Failed(String),
}

impl CheckOutcome {
    pub fn status_text(&self) -> String {
        match self {
            CheckOutcome::Available(r) => {
                format!("Update available: {} (asset: {}).", r.tag, r.asset_name)
            }
            CheckOutcome::UpToDate(_) => "You're on the latest version.".to_string(),
            CheckOutcome::NoAsset => "No suitable release asset found for your platform.".to_string(),
            CheckOutcome::Failed(msg) => format!("Update check failed: {msg}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// The updater is running and the shutdown hook has been called.
    HandedOff,
    AlreadyUpToDate,
    NoAsset,
    /// Extracted, but the updater could not be started. The app keeps running.
    LaunchFailed { extracted: PathBuf },
    Failed(String),
}

impl UpdateOutcome {
    pub fn status_text(&self) -> String {
        match self {
            UpdateOutcome::HandedOff => {
                "Updater launched. The application will close and restart after updating."
                    .to_string()
            }
            UpdateOutcome::AlreadyUpToDate => "Already up to date.".to_string(),
            UpdateOutcome::NoAsset => "No suitable release asset found.".to_string(),
            UpdateOutcome::LaunchFailed { extracted } => format!(
                "Update extracted to {}, but failed to start updater. Please update manually.",
                extracted.display()
            ),
            UpdateOutcome::Failed(msg) => format!("Update failed: {msg}"),
        }
    }
}

/// Where the handoff points the updater.
#[derive(Debug, Clone)]
struct HandoffTarget {
    platform: Platform,
    install_dir: PathBuf,
    main_exe: PathBuf,
    pid: u32,
}

pub struct UpdateService<L: ProcessLauncher + Clone = SystemLauncher> {
    current: CurrentVersion,
    resolver: ReleaseResolver,
    fetcher: ArtifactFetcher,
    extractor: ArchiveExtractor,
    launcher: L,
    target: HandoffTarget,
}

impl UpdateService<SystemLauncher> {
    /// Service for the running process and this build's version.
    pub fn from_config(config: &UpdateConfig) -> Result<Self> {
        Self::with_parts(
            config,
            CurrentVersion::detect(),
            Platform::current(),
            SystemLauncher,
            std::env::current_exe()?,
            std::process::id(),
        )
    }
}

impl<L: ProcessLauncher + Clone> UpdateService<L> {
    pub fn with_parts(
        config: &UpdateConfig,
        current: CurrentVersion,
        platform: Platform,
        launcher: L,
        main_exe: PathBuf,
        pid: u32,
    ) -> Result<Self> {
        let client = build_http_client(config, &current)?;
        let install_dir = config.install_dir()?;

        Ok(Self {
            resolver: ReleaseResolver::new(client.clone(), config, platform),
            fetcher: ArtifactFetcher::new(client, config.updates_dir()),
            extractor: ArchiveExtractor::new(install_dir.clone()),
            launcher,
            target: HandoffTarget {
                platform,
                install_dir,
                main_exe,
                pid,
            },
            current,
        })
    }

    pub fn current_version(&self) -> &CurrentVersion {
        &self.current
    }

    /// The running version as found, e.g. `2.4.9-ci.17`.
    pub fn current_version_string(&self) -> &str {
        &self.current.raw
    }

    /// Ask the release API whether a newer build exists.
    pub async fn check_for_update(
        &self,
        session: &UpdateSession,
        cancel: &CancellationToken,
    ) -> CheckOutcome {
        session.reset();
        session.set_phase(UpdatePhase::Checking);
        log::info!("Current version: {} ({})", self.current.raw, self.current.source);

        match self.resolver.latest_release(cancel).await {
            Ok(None) => {
                session.set_phase(UpdatePhase::UpToDate);
                CheckOutcome::NoAsset
            }
            Ok(Some(release)) if self.current.is_newer(&release.version) => {
                log::info!("New version available: {}", release.tag);
                session.set_phase(UpdatePhase::Available);
                CheckOutcome::Available(release)
            }
            Ok(Some(release)) => {
                log::info!("Already up-to-date: {}", release.tag);
                session.set_phase(UpdatePhase::UpToDate);
                CheckOutcome::UpToDate(release)
            }
            Err(e) => {
                log::error!("Update check failed: {e}");
                session.fail(e.to_string());
                CheckOutcome::Failed(e.to_string())
            }
        }
    }

    /// Re-check, download, extract and hand off to the updater.
    ///
    /// `on_shutdown` runs only once the updater process has started.
    pub async fn download_and_run(
        &self,
        session: &UpdateSession,
        cancel: &CancellationToken,
        on_progress: Option<ProgressFn<'_>>,
        on_shutdown: impl FnOnce() + Send,
    ) -> UpdateOutcome {
        match self
            .try_download_and_run(session, cancel, on_progress, on_shutdown)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("Update failed: {e}");
                session.fail(e.to_string());
                UpdateOutcome::Failed(e.to_string())
            }
        }
    }

    async fn try_download_and_run(
        &self,
        session: &UpdateSession,
        cancel: &CancellationToken,
        on_progress: Option<ProgressFn<'_>>,
        on_shutdown: impl FnOnce() + Send,
    ) -> Result<UpdateOutcome> {
        session.reset();
        session.set_phase(UpdatePhase::Checking);

        let Some(release) = self.resolver.latest_release(cancel).await? else {
            session.set_phase(UpdatePhase::UpToDate);
            return Ok(UpdateOutcome::NoAsset);
        };
        if !self.current.is_newer(&release.version) {
            session.set_phase(UpdatePhase::UpToDate);
            return Ok(UpdateOutcome::AlreadyUpToDate);
        }

        session.set_phase(UpdatePhase::Downloading);
        let report: ProgressFn<'_> = &|fraction: f64| {
            session.set_progress(fraction);
            if let Some(cb) = on_progress {
                cb(fraction);
            }
        };
        let archive = self
            .fetcher
            .download(&release.asset_url, Some(report), cancel)
            .await?;

        session.set_phase(UpdatePhase::Extracting);
        let extracted = self
            .extractor
            .extract_async(archive, Some(release.tag.clone()))
            .await?;

        session.set_phase(UpdatePhase::Launching);
        let mut handoff = HandoffLauncher::new(
            self.launcher.clone(),
            self.target.platform,
            self.target.install_dir.clone(),
            self.target.main_exe.clone(),
            self.target.pid,
        );

        if handoff.launch(&extracted, on_shutdown) {
            Ok(UpdateOutcome::HandedOff)
        } else {
            session.fail(format!(
                "failed to start updater from {}",
                extracted.display()
            ));
            Ok(UpdateOutcome::LaunchFailed { extracted })
        }
    }
}
