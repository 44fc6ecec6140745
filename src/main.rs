// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use commands::{cmd_check, cmd_install, cmd_plan, cmd_status};
use formulary::AbortHandle;
use tracing::warn;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.global.verbose {
        "debug"
    } else if cli.global.quiet {
        "warn"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Some(Commands::Install {
            name,
            test,
            reinstall,
            head,
            no_progress,
        }) => {
            let abort = AbortHandle::new();
            let handler_abort = abort.clone();
            if let Err(e) = ctrlc::set_handler(move || {
                eprintln!("Interrupt received, stopping after the current command...");
                handler_abort.abort();
            }) {
                warn!("Failed to install interrupt handler: {}", e);
            }

            let args = commands::InstallArgs {
                test,
                reinstall,
                head,
                no_progress,
            };
            cmd_install(&cli.global, &name, &args, abort)
        }
        Some(Commands::Plan { name, json }) => cmd_plan(&cli.global, &name, json),
        Some(Commands::Check { file }) => cmd_check(&file),
        Some(Commands::Status { name, json }) => cmd_status(&cli.global, name.as_deref(), json),
        None => {
            println!("formulary v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'formulary --help' for usage information");
            Ok(())
        }
    }
}
