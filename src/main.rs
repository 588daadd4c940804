use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use types::{Config, OutputFmt};

mod cli;
mod commands;
mod db;
mod load;
mod models;
mod ports;
mod remote;
mod session;
mod storage;
mod sync;
mod timer;
mod types;
mod utils;

#[tokio::main]
async fn main() -> Result<()> {
    // Diagnostics go to stderr so --json output stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let fmt = if cli.json { OutputFmt::Json } else { OutputFmt::Pretty };

    let config = Config::load(&Config::path()?)?;
    let pool = db::open(&db::default_path()).await?;

    match cli.cmd {
        Commands::Session(cmd) => commands::session::handle(cmd, &pool, &config, fmt).await?,
        Commands::Set(cmd) => commands::set::handle(cmd, &pool).await?,
        Commands::Template(cmd) => commands::template::handle(cmd, &pool, fmt).await?,
        Commands::Sync(cmd) => commands::sync::handle(cmd, &pool, &config, fmt).await?,
        Commands::Config(cmd) => commands::config::handle(cmd).await?,
    }

    Ok(())
}
