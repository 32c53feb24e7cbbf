//! Version parsing and comparison.
//!
//! Versions are up to four numeric components (major.minor.patch.revision).
//! Anything from the first `-` or `+` on is dropped before parsing, so
//! pre-release and build metadata never affect ordering. This is not semver
//! precedence: `2.0.0-beta` compares equal to `2.0.0`.

use std::path::{Path, PathBuf};

/// Sidecar file next to the executable carrying the stamped build version.
pub const VERSION_METADATA_SUFFIX: &str = ".version";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AppVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub revision: u64,
}

impl AppVersion {
    pub const ZERO: AppVersion = AppVersion::new(0, 0, 0, 0);

    pub const fn new(major: u64, minor: u64, patch: u64, revision: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            revision,
        }
    }

    /// Parse a version or release tag. Returns `None` if the numeric part is
    /// not 1 to 4 dot-separated integers.
    pub fn parse(s: &str) -> Option<Self> {
        let core = sanitize(s);
        let parts: Vec<&str> = core.split('.').collect();
        if parts.is_empty() || parts.len() > 4 {
            return None;
        }

        let mut nums = [0u64; 4];
        for (slot, part) in nums.iter_mut().zip(&parts) {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            *slot = part.parse().ok()?;
        }

        Some(Self::new(nums[0], nums[1], nums[2], nums[3]))
    }

    /// Parse, collapsing anything unparseable to 0.0.0.0.
    pub fn parse_or_zero(s: &str) -> Self {
        Self::parse(s).unwrap_or(Self::ZERO)
    }

    pub fn is_newer_than(&self, other: &AppVersion) -> bool {
        self > other
    }
}

impl std::fmt::Display for AppVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if self.revision != 0 {
            write!(f, ".{}", self.revision)?;
        }
        Ok(())
    }
}

/// Strip surrounding whitespace, leading `v`/`V` markers, and everything from
/// the first `-` or `+` onward.
pub fn sanitize(s: &str) -> &str {
    let s = s.trim().trim_start_matches(['v', 'V']);
    match s.find(['-', '+']) {
        Some(idx) => &s[..idx],
        None => s,
    }
}

/// Which layer supplied the running build's version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSource {
    Informational,
    FileVersion,
    ExecutableMetadata,
    Default,
}

impl std::fmt::Display for VersionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VersionSource::Informational => write!(f, "informational version"),
            VersionSource::FileVersion => write!(f, "file version"),
            VersionSource::ExecutableMetadata => write!(f, "executable metadata"),
            VersionSource::Default => write!(f, "default"),
        }
    }
}

/// Candidate sources for the running build's version, tried in order.
#[derive(Debug, Clone, Default)]
pub struct VersionLayers {
    /// Free-form build string, e.g. `2.4.9-ci.17+g1a2b3c`.
    pub informational: Option<String>,
    /// Numeric package version.
    pub file_version: Option<String>,
    /// Executable whose `.version` sidecar holds stamped metadata.
    pub executable: Option<PathBuf>,
}

impl VersionLayers {
    /// Layers baked into this build. `KIOTA_UI_INFORMATIONAL_VERSION` is read
    /// at compile time when the release pipeline sets it.
    pub fn from_build() -> Self {
        Self {
            informational: option_env!("KIOTA_UI_INFORMATIONAL_VERSION").map(str::to_string),
            file_version: Some(env!("CARGO_PKG_VERSION").to_string()),
            executable: std::env::current_exe().ok(),
        }
    }

    pub fn resolve(&self) -> CurrentVersion {
        if let Some(raw) = non_blank(self.informational.as_deref()) {
            return CurrentVersion::new(raw, VersionSource::Informational);
        }
        if let Some(raw) = non_blank(self.file_version.as_deref()) {
            return CurrentVersion::new(raw, VersionSource::FileVersion);
        }
        if let Some(raw) = self.executable.as_deref().and_then(read_executable_metadata) {
            return CurrentVersion::new(&raw, VersionSource::ExecutableMetadata);
        }
        CurrentVersion::new("0.0.0", VersionSource::Default)
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

fn read_executable_metadata(exe: &Path) -> Option<String> {
    let mut sidecar = exe.as_os_str().to_owned();
    sidecar.push(VERSION_METADATA_SUFFIX);
    let text = std::fs::read_to_string(PathBuf::from(sidecar)).ok()?;
    non_blank(Some(&text)).map(str::to_string)
}

/// The running build's version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentVersion {
    /// As found, before sanitizing. Used for the user-agent.
    pub raw: String,
    pub source: VersionSource,
    pub version: AppVersion,
}

impl CurrentVersion {
    fn new(raw: &str, source: VersionSource) -> Self {
        Self {
            raw: raw.to_string(),
            source,
            version: AppVersion::parse_or_zero(raw),
        }
    }

    pub fn detect() -> Self {
        VersionLayers::from_build().resolve()
    }

    /// True when `candidate` is strictly newer than the running build.
    pub fn is_newer(&self, candidate: &AppVersion) -> bool {
        candidate.is_newer_than(&self.version)
    }
}
