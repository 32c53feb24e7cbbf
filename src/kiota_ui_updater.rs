use kiota_ui_client::UpdateConfig;
use kiota_ui_client::logging::init_logging;
use kiota_ui_client::process::{SysinfoProcesses, SystemLauncher};
use kiota_ui_client::updater::copy::FsCopier;
use kiota_ui_client::updater::{Updater, UpdaterOptions};
use std::process::ExitCode;

fn main() -> ExitCode {
    // The updater must still run when the log directory is unusable.
    let _logger = match init_logging("kiota_ui_updater") {
        Ok(handle) => Some(handle),
        Err(e) => {
            eprintln!("logging unavailable: {e}");
            None
        }
    };
    log::info!("Kiota UI updater started.");

    let config = UpdateConfig::load().unwrap_or_else(|e| {
        log::warn!("{e}; using default settings");
        UpdateConfig::default()
    });

    let updater = Updater::new(
        SysinfoProcesses::default(),
        SystemLauncher,
        FsCopier,
        UpdaterOptions::from(&config),
    );
    let exit = updater.run_from_args(std::env::args_os().skip(1));
    log::info!("Updater finished: {exit:?}");

    ExitCode::from(exit.code())
}
