//! Static entity mapping table
//!
//! Maps Rust types (or, for tools, bare names) to logical entity names and
//! the configuration that stores them. Built once, validated eagerly, then
//! shared read-only.

use crate::config::{EntityDeclaration, DEFAULT_CONFIGURATION};
use crate::errors::{ErrorKind, Result, TandemError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::TypeId;
use std::collections::HashMap;

/// Marker for types that can be stored as entity records
pub trait Entity: Serialize + DeserializeOwned + Send + 'static {}

impl<T> Entity for T where T: Serialize + DeserializeOwned + Send + 'static {}

/// One row of the mapping table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityBinding {
    /// Rust type name for typed bindings, the entity name for declared ones
    pub type_name: String,
    pub entity: String,
    pub configuration: String,
}

/// Validated entity mapping
#[derive(Debug, Clone, Default)]
pub struct EntityMap {
    bindings: Vec<EntityBinding>,
    by_type: HashMap<TypeId, usize>,
    by_name: HashMap<String, usize>,
}

impl EntityMap {
    pub fn builder() -> EntityMapBuilder {
        EntityMapBuilder::default()
    }

    /// Build a map of untyped entities from configuration declarations
    pub fn from_declarations(declarations: &[EntityDeclaration]) -> Result<Self> {
        declarations
            .iter()
            .fold(Self::builder(), |builder, decl| match &decl.configuration {
                Some(configuration) => builder.declare_in(&decl.name, configuration),
                None => builder.declare(&decl.name),
            })
            .build()
    }

    /// Entity name bound to `T`
    pub fn entity_name<T: 'static>(&self) -> Result<&str> {
        self.by_type
            .get(&TypeId::of::<T>())
            .map(|&index| self.bindings[index].entity.as_str())
            .ok_or_else(|| {
                TandemError::new(ErrorKind::MissingEntity)
                    .with_op("resolve_entity")
                    .with_entity(std::any::type_name::<T>())
                    .with_message("type has no entity binding")
            })
    }

    /// Look up a binding by entity name
    pub fn binding(&self, entity: &str) -> Result<&EntityBinding> {
        self.by_name
            .get(entity)
            .map(|&index| &self.bindings[index])
            .ok_or_else(|| {
                TandemError::new(ErrorKind::MissingEntity)
                    .with_op("resolve_entity")
                    .with_entity(entity)
                    .with_message("entity is not declared")
            })
    }

    /// Configuration that stores `entity`
    pub fn configuration_of(&self, entity: &str) -> Result<&str> {
        self.binding(entity).map(|b| b.configuration.as_str())
    }

    pub fn contains(&self, entity: &str) -> bool {
        self.by_name.contains_key(entity)
    }

    pub fn bindings(&self) -> &[EntityBinding] {
        &self.bindings
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

enum PendingBinding {
    Typed(TypeId, EntityBinding),
    Declared(EntityBinding),
}

/// Collects bindings; [`EntityMapBuilder::build`] validates them all at once
#[derive(Default)]
pub struct EntityMapBuilder {
    pending: Vec<PendingBinding>,
}

impl EntityMapBuilder {
    /// Bind `T` to `entity` in the default configuration
    pub fn bind<T: Entity>(self, entity: &str) -> Self {
        self.bind_in::<T>(entity, DEFAULT_CONFIGURATION)
    }

    /// Bind `T` to `entity` stored under `configuration`
    pub fn bind_in<T: Entity>(mut self, entity: &str, configuration: &str) -> Self {
        self.pending.push(PendingBinding::Typed(
            TypeId::of::<T>(),
            EntityBinding {
                type_name: std::any::type_name::<T>().to_string(),
                entity: entity.to_string(),
                configuration: configuration.to_string(),
            },
        ));
        self
    }

    /// Declare an untyped entity in the default configuration
    pub fn declare(self, entity: &str) -> Self {
        self.declare_in(entity, DEFAULT_CONFIGURATION)
    }

    /// Declare an untyped entity stored under `configuration`
    pub fn declare_in(mut self, entity: &str, configuration: &str) -> Self {
        self.pending.push(PendingBinding::Declared(EntityBinding {
            type_name: entity.to_string(),
            entity: entity.to_string(),
            configuration: configuration.to_string(),
        }));
        self
    }

    /// Validate and freeze the table
    ///
    /// Fails on empty entity or configuration names, a type bound twice, or
    /// an entity name used twice.
    pub fn build(self) -> Result<EntityMap> {
        let mut map = EntityMap::default();

        for pending in self.pending {
            let (type_id, binding) = match pending {
                PendingBinding::Typed(type_id, binding) => (Some(type_id), binding),
                PendingBinding::Declared(binding) => (None, binding),
            };

            if binding.entity.trim().is_empty() {
                return Err(invalid_binding(&binding, "entity name must not be empty"));
            }
            if binding.configuration.trim().is_empty() {
                return Err(invalid_binding(
                    &binding,
                    "configuration name must not be empty",
                ));
            }
            if map.by_name.contains_key(&binding.entity) {
                return Err(invalid_binding(&binding, "entity name is bound twice"));
            }

            let index = map.bindings.len();
            if let Some(type_id) = type_id {
                if map.by_type.insert(type_id, index).is_some() {
                    return Err(invalid_binding(
                        &binding,
                        &format!("type {} is bound twice", binding.type_name),
                    ));
                }
            }
            map.by_name.insert(binding.entity.clone(), index);
            map.bindings.push(binding);
        }

        Ok(map)
    }
}

fn invalid_binding(binding: &EntityBinding, reason: &str) -> TandemError {
    TandemError::new(ErrorKind::InvalidConfiguration)
        .with_op("build_entity_map")
        .with_entity(binding.entity.clone())
        .with_configuration(binding.configuration.clone())
        .with_message(reason.to_string())
}
