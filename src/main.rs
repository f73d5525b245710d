mod cli;
mod config;
mod db;
mod error;
mod models;
mod money;
mod operations;

use chrono::Local;
use clap::Parser;
use cli::{Cli, execute};
use config::Config;
use error::AppResult;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> AppResult<()> {
    let config = Config::load(cli.config.as_deref())?.with_overrides(cli.db, cli.log_level);
    init_logging(&config.log_level);

    let conn = db::connection::establish_connection(&config.database_path)?;
    let today = Local::now().date_naive();
    execute(cli.command, &conn, &config, today)
}

/// RUST_LOG wins over the configured level. Logs go to stderr.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
