//! Entity hub: cache, hierarchy bookkeeping and synchronization.
//!
//! # Responsibility
//! - Own every cached entity of one project and the parent index.
//! - Resolve entities and children lazily through an `EntityServer`.
//! - Turn local edits into one ordered operation batch on commit.
//!
//! # Invariants
//! - Every structural change (parent, name, removal) goes through the hub.
//! - The parent index and each entity's parent link always agree after a
//!   public call returns.
//! - Failed remote calls never leave half-applied cache state.
//!
//! # See also
//! - `hub::commit` for batch ordering rules.

use crate::config::HubConfig;
use crate::model::entity::{Entity, EntityError, EntityId, EntityType, NewFolder, NewTask};
use crate::server::{EntityServer, ServerError, DATA_FIELD, DEFAULT_FOLDER_FIELDS, FOLDER_PUBLISHED_FIELD};
use log::{debug, info};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

mod commit;
mod hierarchy;
mod query;
mod table;

pub use commit::CommitSummary;

use table::EntityTable;

pub type HubResult<T> = Result<T, HubError>;

/// Hub-level error for cache and hierarchy operations.
#[derive(Debug)]
pub enum HubError {
    Entity(EntityError),
    EntityNotFound(EntityId),
    DuplicateEntity(EntityId),
    ParentNotFound {
        entity_id: EntityId,
        parent_id: EntityId,
    },
    InvalidParentType {
        entity_id: EntityId,
        entity_type: EntityType,
        parent_type: EntityType,
    },
    /// Target parent is a task.
    ChildrenNotAllowed {
        parent_id: EntityId,
    },
    /// The project has no parent; it cannot be moved or removed.
    ProjectParent(EntityId),
    CycleDetected {
        entity_id: EntityId,
        parent_id: EntityId,
    },
    /// Structural edit blocked by published content in the subtree.
    ImmutableForHierarchy(EntityId),
    InvalidName {
        entity_id: EntityId,
        reason: &'static str,
    },
    WrongEntityType {
        entity_id: EntityId,
        expected: EntityType,
        actual: EntityType,
    },
    ProjectNotFound(String),
    DuplicateProject(String),
    Server(ServerError),
}

impl Display for HubError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Entity(err) => write!(f, "{err}"),
            Self::EntityNotFound(id) => write!(f, "entity not cached: {id}"),
            Self::DuplicateEntity(id) => write!(f, "entity already cached: {id}"),
            Self::ParentNotFound {
                entity_id,
                parent_id,
            } => write!(f, "parent {parent_id} of entity {entity_id} not found"),
            Self::InvalidParentType {
                entity_id,
                entity_type,
                parent_type,
            } => write!(
                f,
                "{entity_type} {entity_id} cannot be parented to a {parent_type}"
            ),
            Self::ChildrenNotAllowed { parent_id } => {
                write!(f, "entity {parent_id} cannot have children")
            }
            Self::ProjectParent(id) => {
                write!(f, "project {id} has no parent and cannot be moved or removed")
            }
            Self::CycleDetected {
                entity_id,
                parent_id,
            } => write!(
                f,
                "moving {entity_id} under {parent_id} would make it its own ancestor"
            ),
            Self::ImmutableForHierarchy(id) => write!(
                f,
                "entity {id} has published content in its hierarchy and cannot be restructured"
            ),
            Self::InvalidName { entity_id, reason } => {
                write!(f, "invalid name for entity {entity_id}: {reason}")
            }
            Self::WrongEntityType {
                entity_id,
                expected,
                actual,
            } => write!(f, "entity {entity_id} is a {actual}, expected a {expected}"),
            Self::ProjectNotFound(name) => write!(f, "project \"{name}\" was not found"),
            Self::DuplicateProject(name) => {
                write!(f, "hub already holds project \"{name}\"")
            }
            Self::Server(err) => write!(f, "{err}"),
        }
    }
}

impl Error for HubError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Entity(err) => Some(err),
            Self::Server(err) => Some(err),
            _ => None,
        }
    }
}

impl From<EntityError> for HubError {
    fn from(value: EntityError) -> Self {
        Self::Entity(value)
    }
}

impl From<ServerError> for HubError {
    fn from(value: ServerError) -> Self {
        Self::Server(value)
    }
}

/// In-memory cache of one project's hierarchy.
pub struct EntityHub<S: EntityServer> {
    server: S,
    context: Arc<HubConfig>,
    table: EntityTable,
    attribute_keys: HashMap<EntityType, Vec<String>>,
}

impl<S: EntityServer> EntityHub<S> {
    /// Creates an empty hub. Nothing is queried until first needed.
    pub fn new(config: HubConfig, server: S) -> Self {
        Self {
            server,
            context: Arc::new(config),
            table: EntityTable::default(),
            attribute_keys: HashMap::new(),
        }
    }

    pub fn project_name(&self) -> &str {
        &self.context.project_name
    }

    pub fn allow_data_changes(&self) -> bool {
        self.context.allow_data_changes
    }

    /// Shared context handed to entities built outside the hub.
    pub fn context(&self) -> Arc<HubConfig> {
        Arc::clone(&self.context)
    }

    pub fn server(&self) -> &S {
        &self.server
    }

    /// Cached entities in insertion order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.table.iter()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.len() == 0
    }

    /// Cache lookup only.
    pub fn get_entity_by_id(&self, entity_id: &str) -> Option<&Entity> {
        self.table.get(entity_id)
    }

    /// Mutable access for non-structural edits (attributes, types, flags).
    pub fn get_entity_by_id_mut(&mut self, entity_id: &str) -> Option<&mut Entity> {
        self.table.get_mut(entity_id)
    }

    /// Ids currently indexed under `parent_id`, without querying.
    pub fn children_in_cache(&self, parent_id: &str) -> &[EntityId] {
        self.table.children_of(parent_id)
    }

    /// Legal attribute keys for a type, queried once per hub.
    pub fn get_attributes_for_type(&mut self, entity_type: EntityType) -> HubResult<&[String]> {
        if !self.attribute_keys.contains_key(&entity_type) {
            let keys = self.server.get_attributes_for_type(entity_type)?;
            debug!(
                "event=attribute_schema_load module=hub entity_type={entity_type} keys={}",
                keys.len()
            );
            self.attribute_keys.insert(entity_type, keys);
        }
        Ok(self
            .attribute_keys
            .get(&entity_type)
            .map_or(&[], Vec::as_slice))
    }

    /// Project entity, loaded from the server on first use.
    pub fn project(&mut self) -> HubResult<&Entity> {
        let project_id = self.ensure_project()?;
        self.table
            .get(&project_id)
            .ok_or(HubError::EntityNotFound(project_id))
    }

    /// Inserts an entity and registers it with its parent.
    ///
    /// The parent is resolved (querying when needed) and type-checked, and
    /// children already indexed under the entity's id must be ones it can
    /// hold. Ancestor immutability memos are cleared after insertion.
    ///
    /// # Errors
    /// - `DuplicateEntity` / `DuplicateProject` when already cached.
    /// - `ParentNotFound`, `InvalidParentType`, `ChildrenNotAllowed` for a
    ///   parent that is missing or cannot hold the entity.
    /// - `CycleDetected` for an entity parented to itself.
    pub fn add_entity(&mut self, entity: Entity) -> HubResult<()> {
        let entity_id = entity.id().to_string();
        let entity_type = entity.entity_type();
        if self.table.contains(&entity_id) {
            return Err(HubError::DuplicateEntity(entity_id));
        }
        if entity_type == EntityType::Project {
            if let Some(project_id) = self.table.project_id() {
                return Err(HubError::DuplicateProject(project_id.to_string()));
            }
        }
        if let Some(parent_id) = entity.parent_id().map(str::to_string) {
            if parent_id == entity_id {
                return Err(HubError::CycleDetected {
                    entity_id,
                    parent_id,
                });
            }
            self.validate_parent(&entity_id, entity_type, &parent_id)?;
            // Resolving the parent may have cached the entity itself.
            if self.table.contains(&entity_id) {
                return Err(HubError::DuplicateEntity(entity_id));
            }
        }
        for child_id in self.table.children_of(&entity_id) {
            if let Some(child) = self.table.get(child_id) {
                check_parent_type(child_id, child.entity_type(), &entity)?;
            }
        }

        debug!(
            "event=entity_add module=hub entity_type={entity_type} entity_id={entity_id} created={}",
            entity.created()
        );
        self.insert_cached(entity);
        Ok(())
    }

    /// Creates a never-synced folder; the parent is resolved and validated.
    pub fn add_new_folder(&mut self, mut request: NewFolder) -> HubResult<EntityId> {
        request.name = normalize_new_name(request.name, request.entity_id.as_deref())?;
        let keys = self.get_attributes_for_type(EntityType::Folder)?.to_vec();
        let entity = Entity::new_folder(request, keys, self.context());
        let entity_id = entity.id().to_string();
        self.add_entity(entity)?;
        Ok(entity_id)
    }

    /// Creates a never-synced task; the parent is resolved and validated.
    pub fn add_new_task(&mut self, mut request: NewTask) -> HubResult<EntityId> {
        request.name = normalize_new_name(request.name, request.entity_id.as_deref())?;
        let keys = self.get_attributes_for_type(EntityType::Task)?.to_vec();
        let entity = Entity::new_task(request, keys, self.context());
        let entity_id = entity.id().to_string();
        self.add_entity(entity)?;
        Ok(entity_id)
    }

    /// Snapshots every cached entity as synced.
    pub fn lock(&mut self) {
        self.table.lock_all();
    }

    /// Loads the project into the cache if missing and returns its id.
    fn ensure_project(&mut self) -> HubResult<EntityId> {
        if let Some(project_id) = self.table.project_id() {
            return Ok(project_id.to_string());
        }
        let project = self.load_project()?;
        let project_id = project.id().to_string();
        self.add_entity(project)?;
        info!(
            "event=project_load module=hub status=ok project={}",
            self.project_name()
        );
        Ok(project_id)
    }

    /// Caches an entity and clears the memos of its ancestors.
    ///
    /// Server records take this path directly; their links are the store's.
    pub(super) fn insert_cached(&mut self, entity: Entity) {
        let parent_id = entity.parent_id().map(str::to_string);
        self.table.insert(entity);
        if let Some(parent_id) = parent_id {
            self.reset_immutable_for_hierarchy_cache(&parent_id, true);
        }
    }

    fn load_project(&mut self) -> HubResult<Entity> {
        let project_name = self.context.project_name.clone();
        let record = self
            .server
            .get_project(&project_name)?
            .ok_or(HubError::ProjectNotFound(project_name))?;
        let keys = self.get_attributes_for_type(EntityType::Project)?.to_vec();
        Ok(Entity::from_project_record(&record, keys, self.context()))
    }

    fn folder_fields(&self) -> Vec<&'static str> {
        let mut fields = DEFAULT_FOLDER_FIELDS.to_vec();
        fields.push(FOLDER_PUBLISHED_FIELD);
        if self.context.allow_data_changes {
            fields.push(DATA_FIELD);
        }
        fields
    }

    fn entity(&self, entity_id: &str) -> HubResult<&Entity> {
        self.table
            .get(entity_id)
            .ok_or_else(|| HubError::EntityNotFound(entity_id.to_string()))
    }

    fn entity_mut(&mut self, entity_id: &str) -> HubResult<&mut Entity> {
        self.table
            .get_mut(entity_id)
            .ok_or_else(|| HubError::EntityNotFound(entity_id.to_string()))
    }
}

/// Checks that `parent` may hold an entity of `entity_type`.
fn check_parent_type(entity_id: &str, entity_type: EntityType, parent: &Entity) -> HubResult<()> {
    let parent_type = parent.entity_type();
    if parent_type == EntityType::Task {
        return Err(HubError::ChildrenNotAllowed {
            parent_id: parent.id().to_string(),
        });
    }
    if !parent_type.can_parent(entity_type) {
        return Err(HubError::InvalidParentType {
            entity_id: entity_id.to_string(),
            entity_type,
            parent_type,
        });
    }
    Ok(())
}

/// Trims a name; blank names are rejected.
fn normalize_name(entity_id: &str, name: &str) -> HubResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(HubError::InvalidName {
            entity_id: entity_id.to_string(),
            reason: "name must not be blank",
        });
    }
    Ok(trimmed.to_string())
}

fn normalize_new_name(name: Option<String>, entity_id: Option<&str>) -> HubResult<Option<String>> {
    name.map(|name| normalize_name(entity_id.unwrap_or("<new>"), &name))
        .transpose()
}
