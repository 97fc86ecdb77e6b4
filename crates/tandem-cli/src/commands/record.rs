//! Record commands
//!
//! Usage: tandem record put <ENTITY> <KEY> <JSON> | get <ENTITY> <KEY> | list <ENTITY>

use super::{CommandResult, StackArgs};
use clap::{Args, Subcommand};
use serde_json::Value;

#[derive(Debug, Args)]
pub struct RecordArgs {
    #[command(subcommand)]
    pub command: RecordCommand,
}

#[derive(Debug, Subcommand)]
pub enum RecordCommand {
    /// Write one record and save
    Put(PutArgs),
    /// Print one record as JSON
    Get(GetArgs),
    /// Print every record of an entity, one `key<TAB>json` line each
    List(ListArgs),
}

#[derive(Debug, Args)]
pub struct PutArgs {
    pub entity: String,
    pub key: String,
    /// Record payload as a JSON document
    pub value: String,
}

#[derive(Debug, Args)]
pub struct GetArgs {
    pub entity: String,
    pub key: String,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    pub entity: String,
}

pub fn execute(stack: &StackArgs, args: RecordArgs) -> CommandResult {
    match args.command {
        RecordCommand::Put(put) => execute_put(stack, put),
        RecordCommand::Get(get) => execute_get(stack, get),
        RecordCommand::List(list) => execute_list(stack, list),
    }
}

fn execute_put(args: &StackArgs, put: PutArgs) -> CommandResult {
    let value: Value = serde_json::from_str(&put.value)
        .map_err(|e| format!("value is not valid JSON: {}", e))?;
    let (stack, _) = args.open(Some(&put.entity))?;

    let PutArgs { entity, key, .. } = put;
    let summary = stack.write_context().perform_and_wait(move |scope| {
        scope.put(&entity, key, value)?;
        scope.save()
    })??;

    println!("Saved {} change(s), generation {}", summary.change_count, summary.generation);
    stack.teardown();
    Ok(())
}

fn execute_get(args: &StackArgs, get: GetArgs) -> CommandResult {
    let (stack, _) = args.open(Some(&get.entity))?;

    let found = stack.read_context().get(&get.entity, &get.key)?;
    stack.teardown();
    match found {
        Some(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        None => Err(format!("no {} record with key '{}'", get.entity, get.key).into()),
    }
}

fn execute_list(args: &StackArgs, list: ListArgs) -> CommandResult {
    let (stack, _) = args.open(Some(&list.entity))?;

    for (key, value) in stack.read_context().fetch_all(&list.entity)? {
        println!("{}\t{}", key, serde_json::to_string(&value)?);
    }
    stack.teardown();
    Ok(())
}
