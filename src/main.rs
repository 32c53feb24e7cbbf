use anyhow::Result;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use kiota_ui_client::download::ProgressFn;
use kiota_ui_client::logging::init_logging;
use kiota_ui_client::{CheckOutcome, UpdateConfig, UpdateOutcome, UpdateService, UpdateSession};
use std::io::Write;
use std::process::ExitCode;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use tokio_util::sync::CancellationToken;

const PROGRESS_STEPS: u64 = 1000;

#[derive(Parser)]
#[command(name = "kiota_ui_client", version, about = "Kiota UI client self-update")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check GitHub Releases for a newer version
    Check,
    /// Download the latest release and hand off to the updater
    Update,
    /// Print the running version and where it was read from
    Version,
}

#[derive(Clone, Copy)]
enum Tone {
    Good,
    Info,
    Bad,
}

fn print_status(tone: Tone, text: &str) {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    let color = match tone {
        Tone::Good => Color::Green,
        Tone::Info => Color::Yellow,
        Tone::Bad => Color::Red,
    };
    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true));
    let _ = writeln!(stdout, "{text}");
    let _ = stdout.reset();
}

fn download_bar() -> ProgressBar {
    let pb = ProgressBar::new(PROGRESS_STEPS);
    if let Ok(style) = ProgressStyle::with_template("  {msg} [{bar:40.cyan/blue}] {percent}%") {
        pb.set_style(style.progress_chars("=>-"));
    }
    pb.set_message("Downloading");
    pb
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let _logger = init_logging("kiota_ui_client")?;
    let config = UpdateConfig::load()?;
    let service = UpdateService::from_config(&config)?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("Interrupted; cancelling");
                cancel.cancel();
            }
        });
    }

    let session = UpdateSession::new();

    let ok = match cli.command {
        Command::Version => {
            println!(
                "{} ({})",
                service.current_version_string(),
                service.current_version().source
            );
            true
        }
        Command::Check => {
            let outcome = service.check_for_update(&session, &cancel).await;
            let tone = match outcome {
                CheckOutcome::Available(_) => Tone::Good,
                CheckOutcome::UpToDate(_) | CheckOutcome::NoAsset => Tone::Info,
                CheckOutcome::Failed(_) => Tone::Bad,
            };
            print_status(tone, &outcome.status_text());
            !matches!(outcome, CheckOutcome::Failed(_))
        }
        Command::Update => {
            print_status(Tone::Info, "Preparing download...");
            let pb = download_bar();
            let bar = pb.clone();
            let progress: ProgressFn<'_> = &move |fraction: f64| {
                bar.set_position((fraction * PROGRESS_STEPS as f64) as u64);
                if fraction >= 1.0 && !bar.is_finished() {
                    bar.finish_with_message("Download complete. Extracting...");
                }
            };

            let outcome = service
                .download_and_run(&session, &cancel, Some(progress), || {
                    log::info!("Updater started; exiting so it can replace the installation");
                })
                .await;
            if !pb.is_finished() {
                pb.finish_and_clear();
            }

            let tone = match outcome {
                UpdateOutcome::HandedOff => Tone::Good,
                UpdateOutcome::AlreadyUpToDate | UpdateOutcome::NoAsset => Tone::Info,
                UpdateOutcome::LaunchFailed { .. } | UpdateOutcome::Failed(_) => Tone::Bad,
            };
            print_status(tone, &outcome.status_text());
            !matches!(
                outcome,
                UpdateOutcome::LaunchFailed { .. } | UpdateOutcome::Failed(_)
            )
        }
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
