pub mod compose;
pub mod config;
pub mod data;
pub mod render;
pub mod server;
pub mod types;

use clap::{Parser, Subcommand};
use std::path::Path;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compose the map once and write a standalone HTML file
    Export,
    /// Serve the interactive map with sidebar controls
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Export => {
            let paths = config::LayerPaths::default();

            // 1. Load Data
            let layers = data::load_layers(&paths)?;

            // 2. Compose Map
            let map = compose::compose(
                &layers,
                &compose::LayerToggles::default(),
                compose::Basemap::default(),
                config::DEFAULT_ZOOM,
            );

            // 3. Export
            render::export(&map, Path::new(config::OUTPUT_HTML))?;
        }
        Commands::Serve => {
            server::start_server(config::LayerPaths::default()).await?;
        }
    }

    Ok(())
}
