use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod shell;

use cli::Cli;
use shell::Shell;

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let fs = cli.open()?;

    Shell::new(fs).run()
}

fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse().unwrap()))
        .init();
}
