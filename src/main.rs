pub mod audio;
pub mod client;
mod commands;
mod config;
mod console;
pub mod error; // contains format, service, session submodules
pub mod live;
pub mod types;

#[cfg(test)]
mod tests;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::commands::Command;
use crate::config::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "laoshi-live")]
#[command(about = "Live Chinese tutor in your terminal", long_about = None)]
struct Args {
    /// Write the effective configuration to the config file and exit
    #[arg(long)]
    write_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = AppConfig::load();

    if args.write_config {
        match config.save() {
            Ok(path) => println!("Wrote {}", path.display()),
            Err(e) => {
                eprintln!("{e}");
                std::process::exit(1);
            }
        }
        return;
    }

    let Some(command) = args.command else {
        eprintln!("No command given. Try `laoshi-live --help`.");
        std::process::exit(2);
    };

    if let Err(e) = commands::run(command, config).await {
        tracing::error!(error = %e, "command failed");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
