//! Subcommands and the stack options they share

use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tandem_core::logging_facility;
use tandem_core::{
    EntityDeclaration, EntityMap, FileStoreOptions, Stack, StackConfig, StoreHandle,
};
use tandem_store::SqliteEngine;

pub mod record;
pub mod store;

pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Debug, Args)]
pub struct StackArgs {
    /// Stack configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding store files; overrides the configuration file
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Store location; relative paths resolve against the data directory
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    /// Configuration the store serves
    #[arg(long, global = true)]
    pub configuration: Option<String>,

    /// Refuse to upgrade an older store
    #[arg(long, global = true)]
    pub no_automigrate: bool,

    /// Delete and recreate the store if it cannot be migrated
    #[arg(long, global = true)]
    pub reset_on_failure: bool,

    /// Use an in-memory store instead of a file
    #[arg(long, global = true, conflicts_with = "store")]
    pub memory: bool,

    /// Log stack activity to stderr
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

impl StackArgs {
    pub fn stack_config(&self) -> Result<StackConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => StackConfig::load(path)?,
            None => StackConfig::new("tandem", std::env::current_dir()?),
        };
        if let Some(data_dir) = &self.data_dir {
            config.data_dir = data_dir.clone();
        }
        Ok(config)
    }

    pub fn file_store_options(&self) -> FileStoreOptions {
        let mut options = FileStoreOptions::new()
            .automigrating(!self.no_automigrate)
            .reset_on_migration_failure(self.reset_on_failure);
        if let Some(location) = &self.store {
            options = options.location(location.clone());
        }
        if let Some(configuration) = &self.configuration {
            options = options.configuration(configuration.clone());
        }
        options
    }

    /// Build a stack and attach the selected store
    ///
    /// `entity` is declared in the selected configuration when the
    /// configuration file does not already declare it.
    pub fn open(&self, entity: Option<&str>) -> Result<(Stack, StoreHandle), Box<dyn std::error::Error>> {
        let mut config = self.stack_config()?;
        if self.verbose {
            logging_facility::init(config.log_profile);
        }

        if let Some(name) = entity {
            if !config.entities.iter().any(|d| d.name == name) {
                config.entities.push(EntityDeclaration {
                    name: name.to_string(),
                    configuration: self.configuration.clone(),
                });
            }
        }

        let entities = EntityMap::from_declarations(&config.entities)?;
        let stack = Stack::builder(config)
            .engine(Arc::new(SqliteEngine::default()))
            .entities(entities)
            .build()?;

        let handle = if self.memory {
            stack.add_in_memory_store(self.configuration.as_deref())?
        } else {
            stack.add_file_store(self.file_store_options())?
        };
        Ok((stack, handle))
    }
}
