//! Store commands
//!
//! Usage: tandem [--store <PATH>] store attach | store info

use super::{CommandResult, StackArgs};
use clap::{Args, Subcommand};
use tandem_core::StorageEngine;
use tandem_store::SqliteEngine;

#[derive(Debug, Args)]
pub struct StoreArgs {
    #[command(subcommand)]
    pub command: StoreCommand,
}

#[derive(Debug, Subcommand)]
pub enum StoreCommand {
    /// Create or open the store, migrating it when needed
    Attach,
    /// Show where the store lives without opening it
    Info,
}

pub fn execute(stack: &StackArgs, args: StoreArgs) -> CommandResult {
    match args.command {
        StoreCommand::Attach => execute_attach(stack),
        StoreCommand::Info => execute_info(stack),
    }
}

fn execute_attach(args: &StackArgs) -> CommandResult {
    let (stack, handle) = args.open(None)?;

    println!("Store attached:");
    println!("  id: {}", handle.id());
    println!("  kind: {}", handle.kind().as_str());
    match handle.location() {
        Some(path) => println!("  location: {}", path.display()),
        None => println!("  location: (memory)"),
    }
    println!("  configuration: {}", handle.configuration());
    println!("  schema_version: {}", handle.store().schema_version()?);
    if handle.was_reset() {
        println!("  (store was reset after a migration failure)");
    }

    stack.teardown();
    Ok(())
}

fn execute_info(args: &StackArgs) -> CommandResult {
    let config = args.stack_config()?;

    println!("Stack:");
    println!("  app_name: {}", config.app_name);
    println!("  data_dir: {}", config.data_dir.display());
    if args.memory {
        println!("  store: (memory)");
        return Ok(());
    }

    let primary = config.resolve_location(args.store.as_deref());
    println!("  store: {}", primary.display());
    for path in SqliteEngine::default().store_files(&primary) {
        match std::fs::metadata(&path) {
            Ok(meta) => println!("    {} ({} bytes)", path.display(), meta.len()),
            Err(_) => println!("    {} (absent)", path.display()),
        }
    }
    Ok(())
}
