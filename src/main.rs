//! Main entry point for tabmerge CLI

use clap::Parser;
use tabmerge::cli::Cli;
use tabmerge::commands::execute_command;

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    match execute_command(cli.command, cli.workspace.as_deref(), !cli.quiet) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}
