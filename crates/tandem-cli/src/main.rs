//! Tandem CLI
//!
//! Command-line interface for attaching stores and reading or writing
//! untyped records

use clap::{Parser, Subcommand};

mod commands;

#[derive(Debug, Parser)]
#[command(name = "tandem")]
#[command(about = "Tandem - embedded persistence stack", long_about = None)]
struct Cli {
    #[command(flatten)]
    stack: commands::StackArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Store operations (attach, info)
    Store(commands::store::StoreArgs),
    /// Record operations (put, get, list)
    Record(commands::record::RecordArgs),
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Store(args) => commands::store::execute(&cli.stack, args),
        Commands::Record(args) => commands::record::execute(&cli.stack, args),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
