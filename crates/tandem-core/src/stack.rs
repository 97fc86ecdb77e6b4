//! Persistence stack
//!
//! A [`Stack`] owns one store coordinator, one write context, the read
//! context derived from it, a child-context setup queue and the entity map.
//! It is built once per data domain and lives until torn down or dropped.

use crate::config::StackConfig;
use crate::context::{ChildContext, ReadContext, WriteContext};
use crate::coordinator::{StoreCoordinator, StoreHandle, StoreResult};
use crate::engine::StorageEngine;
use crate::errors::{ErrorKind, Result, TandemError};
use crate::executor::{run_sync, SerialQueue};
use crate::hook::{ErrorHook, TracingErrorHook};
use crate::logging_facility;
use crate::model::{EntityMap, FileStoreOptions, StoreDescriptor};
use std::sync::Arc;

pub struct StackBuilder {
    config: StackConfig,
    engine: Option<Arc<dyn StorageEngine>>,
    entities: Option<EntityMap>,
    hook: Option<Arc<dyn ErrorHook>>,
    init_logging: bool,
}

impl StackBuilder {
    /// Storage engine used for every attach; required
    pub fn engine(mut self, engine: Arc<dyn StorageEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Entity table; defaults to the untyped declarations in the config
    pub fn entities(mut self, entities: EntityMap) -> Self {
        self.entities = Some(entities);
        self
    }

    /// Error hook; defaults to [`TracingErrorHook`]
    pub fn error_hook(mut self, hook: Arc<dyn ErrorHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Initialize the logging facility with the config's profile on build
    pub fn init_logging(mut self) -> Self {
        self.init_logging = true;
        self
    }

    pub fn build(self) -> Result<Stack> {
        if self.init_logging {
            logging_facility::init(self.config.log_profile);
        }

        let hook = self.hook.unwrap_or_else(|| Arc::new(TracingErrorHook));
        let fail = |err: TandemError| crate::hook::reported(hook.as_ref(), err);

        self.config.validate().map_err(fail)?;
        let engine = self.engine.ok_or_else(|| {
            fail(
                TandemError::new(ErrorKind::InvalidConfiguration)
                    .with_op("build_stack")
                    .with_message("no storage engine configured"),
            )
        })?;
        let entities = match self.entities {
            Some(entities) => entities,
            None => EntityMap::from_declarations(&self.config.entities).map_err(fail)?,
        };

        let coordinator_queue = SerialQueue::new(self.config.queue_name("coordinator")).map_err(fail)?;
        let write_queue = SerialQueue::new(self.config.queue_name("writer")).map_err(fail)?;
        let child_setup = SerialQueue::new(self.config.queue_name("child-setup")).map_err(fail)?;

        let coordinator = Arc::new(StoreCoordinator::new(
            coordinator_queue,
            engine,
            Arc::new(entities),
            hook.clone(),
        ));
        let write = WriteContext::new(write_queue, coordinator.clone());
        let read = ReadContext::new(&write, self.config.auto_merge);

        tracing::info!(
            app_name = %self.config.app_name,
            data_dir = %self.config.data_dir.display(),
            entity_count = coordinator.entities().len(),
            "stack ready"
        );

        Ok(Stack {
            config: self.config,
            coordinator,
            write,
            read,
            child_setup,
        })
    }
}

pub struct Stack {
    config: StackConfig,
    coordinator: Arc<StoreCoordinator>,
    write: WriteContext,
    read: ReadContext,
    child_setup: SerialQueue,
}

impl Stack {
    pub fn builder(config: StackConfig) -> StackBuilder {
        StackBuilder {
            config,
            engine: None,
            entities: None,
            hook: None,
            init_logging: false,
        }
    }

    /// Attach an anonymous in-memory store for `configuration`
    /// (the default configuration when `None`)
    pub fn add_in_memory_store(&self, configuration: Option<&str>) -> StoreResult {
        self.coordinator
            .attach(StoreDescriptor::in_memory(configuration))
    }

    /// Attach a file-backed store
    ///
    /// A missing location means the config's default store path; a relative
    /// one resolves against the data directory. The parent directory is
    /// created when absent.
    pub fn add_file_store(&self, options: FileStoreOptions) -> StoreResult {
        let location = self.config.resolve_location(options.location.as_deref());
        self.coordinator.attach(StoreDescriptor::sqlite(
            location,
            options.configuration.as_deref(),
            options.migration_policy(),
        ))
    }

    /// Detach a store and drop everything the read context cached from it
    pub fn remove_store(&self, handle: &StoreHandle) -> Result<()> {
        self.coordinator.detach(handle)?;
        self.read.refresh();
        Ok(())
    }

    pub fn write_context(&self) -> &WriteContext {
        &self.write
    }

    pub fn read_context(&self) -> &ReadContext {
        &self.read
    }

    /// Create a child of the write context; setup runs on the child-setup queue
    pub fn new_child_context(&self) -> Result<ChildContext> {
        let write = self.write.clone();
        run_sync(&self.child_setup, move || write.new_child())
            .map_err(|err| self.coordinator.report(err))
    }

    pub fn entities(&self) -> &Arc<EntityMap> {
        self.coordinator.entities()
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &StoreCoordinator {
        &self.coordinator
    }

    pub fn error_hook(&self) -> Arc<dyn ErrorHook> {
        self.coordinator.hook()
    }

    /// Drain and stop the stack's queues
    ///
    /// Work already submitted finishes first. Contexts still held elsewhere
    /// fail with `UnknownError` afterwards.
    pub fn teardown(self) {
        tracing::info!(app_name = %self.config.app_name, "stack teardown");
        drop(self);
    }

    fn close_queues(&self) {
        self.child_setup.shutdown();
        self.write.shutdown();
        self.coordinator.shutdown();
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        self.close_queues();
    }
}

impl std::fmt::Debug for Stack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stack")
            .field("app_name", &self.config.app_name)
            .field("stores", &self.coordinator.stores().len())
            .finish()
    }
}
