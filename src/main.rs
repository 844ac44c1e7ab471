mod common;
mod recap;
mod ui;

use clap::Parser;

use crate::recap::RecapCommands;
use crate::ui::prelude::{Level, OutputFormat, emit};

/// Season recap builder
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Activate debug mode
    #[arg(short, long, global = true)]
    debug: bool,

    /// Output format for messages and listings
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: RecapCommands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    ui::init(cli.output, !cli.no_color);
    ui::set_debug_mode(cli.debug);
    if cli.debug {
        emit(Level::Debug, "recap.debug", "Debug mode is on", None);
    }

    if let Err(e) = recap::handle_recap_command(cli.command, cli.debug).await {
        emit(Level::Error, "recap.error", &format!("Error: {:#}", e), None);
        std::process::exit(1);
    }
}
