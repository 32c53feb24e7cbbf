//! Platform identification for asset selection and executable naming.

pub const ARCHIVE_EXTENSION: &str = ".zip";
pub const MAIN_EXE_BASENAME: &str = "kiota_ui_client";
pub const UPDATER_EXE_BASENAME: &str = "kiota_ui_updater";

/// Operating-system family the release assets are built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

pub const ALL_PLATFORMS: [Platform; 3] = [Platform::Windows, Platform::MacOs, Platform::Linux];

impl Platform {
    /// The platform this binary was compiled for. Unknown unixes are treated
    /// as Linux.
    pub const fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }

    /// Lower-case substrings that mark an asset name as built for this platform.
    pub const fn asset_markers(self) -> &'static [&'static str] {
        match self {
            Platform::Windows => &["win"],
            Platform::MacOs => &["osx", "mac"],
            Platform::Linux => &["linux"],
        }
    }

    pub fn matches_asset(self, asset_name: &str) -> bool {
        let lower = asset_name.to_ascii_lowercase();
        is_archive_name(asset_name) && self.asset_markers().iter().any(|m| lower.contains(m))
    }

    pub const fn exe_suffix(self) -> &'static str {
        match self {
            Platform::Windows => ".exe",
            Platform::MacOs | Platform::Linux => "",
        }
    }

    pub fn updater_file_name(self) -> String {
        format!("{}{}", UPDATER_EXE_BASENAME, self.exe_suffix())
    }

    pub fn main_file_name(self) -> String {
        format!("{}{}", MAIN_EXE_BASENAME, self.exe_suffix())
    }

    /// Name-match rule for finding the updater inside an extracted artifact.
    /// Windows file names compare case-insensitively.
    pub fn is_updater_file_name(self, file_name: &str) -> bool {
        let expected = self.updater_file_name();
        match self {
            Platform::Windows => file_name.eq_ignore_ascii_case(&expected),
            Platform::MacOs | Platform::Linux => file_name == expected,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Windows => write!(f, "windows"),
            Platform::MacOs => write!(f, "macos"),
            Platform::Linux => write!(f, "linux"),
        }
    }
}

pub fn is_archive_name(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(ARCHIVE_EXTENSION)
}
