mod backend_bridge;
mod controller;
mod ui;

use clap::Parser;
use crossbeam_channel::bounded;
use eframe::egui;
use tracing_subscriber::EnvFilter;

use crate::backend_bridge::commands::BackendCommand;
use crate::controller::events::UiEvent;
use crate::ui::{DesktopGuiApp, StartupConfig};

#[derive(Parser, Debug)]
#[command(name = "messenger-gui", about = "Friendly Messenger desktop client")]
struct Args {
    /// Backend base URL, overriding config file and environment.
    #[arg(long, env = "MESSENGER_API_BASE")]
    api_base: Option<String>,
    /// Directory holding the persisted session and settings file.
    #[arg(long)]
    data_dir: Option<std::path::PathBuf>,
}

fn main() -> eframe::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let settings = match (StartupConfig {
        api_base: args.api_base,
        data_dir: args.data_dir,
    })
    .into_settings()
    {
        Ok(settings) => settings,
        Err(err) => {
            tracing::error!("{err:#}");
            eprintln!("error: {err:#}");
            std::process::exit(2);
        }
    };

    let (cmd_tx, cmd_rx) = bounded::<BackendCommand>(256);
    let (ui_tx, ui_rx) = bounded::<UiEvent>(2048);
    backend_bridge::runtime::launch(settings.clone(), cmd_rx, ui_tx);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Friendly Messenger")
            .with_inner_size([1100.0, 720.0])
            .with_min_inner_size([720.0, 480.0]),
        ..Default::default()
    };
    eframe::run_native(
        "Friendly Messenger",
        options,
        Box::new(move |_cc| Ok(Box::new(DesktopGuiApp::bootstrap(cmd_tx, ui_rx, &settings)))),
    )
}
