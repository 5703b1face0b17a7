// Config Template CLI
// Renders template instances and checks whether a host state change warrants a re-render

mod commands;
mod loader;
mod output;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use tracing_subscriber::EnvFilter;

/// Evaluate config-template instances against host state files
#[derive(Parser, Debug)]
#[command(name = "config-template", version, about)]
struct Cli {
    /// Log filter used when RUST_LOG is not set (e.g. debug, config_template=trace)
    #[arg(long, global = true, value_name = "LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render the section and style of an instance as JSON
    Render(commands::render::RenderArgs),

    /// Report whether moving between two host states warrants a re-render
    Check(commands::check::CheckArgs),
}

// Pending values are single-threaded, so everything runs on one thread
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Command::Render(args) => commands::render::execute(args).await,
        Command::Check(args) => commands::check::execute(args).await,
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
