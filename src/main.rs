//! voice-nav: hands-free voice command navigation, driven from the terminal.

mod console;
mod hotkey;
mod notifier;
mod service;

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use voice_nav::Config;

#[derive(Parser, Debug)]
#[command(name = "voice-nav", about = "Voice command navigation engine")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON description of the displayed page, re-read on every read command
    #[arg(short, long)]
    page: Option<PathBuf>,

    /// JSON list of selectable items ({"title", "index"}) for "open item N"
    #[arg(long)]
    items: Option<PathBuf>,

    /// Do not watch keyboards for the toggle key
    #[arg(long)]
    no_hotkey: bool,

    /// Start listening right away
    #[arg(short, long)]
    listen: bool,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("voice-nav starting");

    let config = Config::load(args.config.as_deref());
    info!(
        "Config loaded: locale {}, {} route(s)",
        config.recognition.locale,
        config.navigation.routes.len()
    );

    let options = service::ServiceOptions {
        page: args.page,
        items: args.items,
        hotkey: !args.no_hotkey,
        listen: args.listen,
    };
    service::VoiceService::new(config, options).run().await?;

    Ok(())
}
