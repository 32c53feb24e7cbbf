//! Self-update for the Kiota UI client.
//!
//! The host side ([`service::UpdateService`]) checks GitHub Releases for a
//! newer build, downloads and stages the platform artifact, and hands off to
//! the standalone updater ([`updater::Updater`]), which replaces the install
//! directory once the host has exited and then relaunches it.

pub mod config;
pub mod download;
pub mod error;
pub mod extract;
pub mod handoff;
pub mod logging;
pub mod platform;
pub mod process;
pub mod release;
pub mod service;
pub mod session;
pub mod updater;
pub mod version;

pub use config::UpdateConfig;
pub use error::{Result, UpdateError};
pub use service::{CheckOutcome, UpdateOutcome, UpdateService};
pub use session::{UpdatePhase, UpdateSession};
pub use version::{AppVersion, CurrentVersion};
