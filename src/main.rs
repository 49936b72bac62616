use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use confirma_bot::config::{self, Paths};
use confirma_bot::control::AutomationController;
use confirma_bot::driver::ChromeFactory;
use confirma_bot::utils::logger::EventLog;

/// Headless runner for the order-confirmation automation. The desktop
/// shell drives the same controller through the library API.
#[derive(Parser, Debug)]
#[command(name = "confirma-bot", version, about)]
struct Cli {
    /// Directory holding settings.json, list_checked.txt, log.txt and the
    /// browser profiles
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,

    /// Start the browsers visibly regardless of the saved setting
    #[arg(long)]
    force_visible: bool,

    /// Explicit Chrome/Chromium binary path
    #[arg(long)]
    chrome_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("confirma_bot=debug".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let paths = Paths::new(&cli.data_dir);

    let settings = config::load_settings(&paths.settings_file)?;
    let mut run_config = settings.to_run_config();
    if cli.force_visible {
        run_config.force_visible = true;
    }

    let log = EventLog::new(&paths.log_file, run_config.logging_enabled);
    let factory = Arc::new(ChromeFactory {
        chrome_path: cli.chrome_path,
    });
    let mut controller = AutomationController::new(paths, factory, log);

    let mut status = controller.status();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            info!("status: {}", *status.borrow());
        }
    });

    info!("Starting confirma-bot...");
    controller.start(run_config)?;

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    controller.stop().await;

    Ok(())
}
