//! Hierarchy entity model (project, folder, task).
//!
//! # Responsibility
//! - Hold one node's identity, fields and last-synced baselines.
//! - Produce update deltas (`changes`) and creation payloads.
//!
//! # Invariants
//! - `id` never changes for the lifetime of the entity.
//! - `created` can only go from `true` to `false` (on lock), never back.
//! - `removed` is derived from `ParentLink::Removed`, never stored.
//! - Parent and name are changed only through `EntityHub`, which keeps the
//!   parent index and the immutability memo consistent.

use crate::config::HubConfig;
use crate::model::attributes::Attributes;
use crate::model::operation::Changes;
use crate::model::records::{FolderRecord, ProjectRecord, TaskRecord, TypeDescriptor};
use crate::model::tracked::{Loaded, Tracked};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use uuid::Uuid;

/// Stable entity identifier. The project's id is its name.
pub type EntityId = String;

pub const DEFAULT_FOLDER_TYPE_ICON: &str = "folder";
pub const DEFAULT_TASK_TYPE_ICON: &str = "task_alt";

/// Generates a new client-side entity id (32 lowercase hex chars).
pub fn create_entity_id() -> EntityId {
    Uuid::new_v4().simple().to_string()
}

/// Entity type as named by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Project,
    Folder,
    Task,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Folder => "folder",
            Self::Task => "task",
        }
    }

    /// Entity types allowed as parent of this type.
    pub fn parent_entity_types(self) -> &'static [EntityType] {
        match self {
            Self::Project => &[],
            Self::Folder => &[EntityType::Folder, EntityType::Project],
            Self::Task => &[EntityType::Folder],
        }
    }

    pub fn can_parent(self, child: EntityType) -> bool {
        child.parent_entity_types().contains(&self)
    }
}

impl Display for EntityType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parent reference of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParentLink {
    /// Parent of the project itself. Never a real id.
    ProjectRoot,
    /// New entity whose parent was not set yet.
    Unassigned,
    /// Regular parent.
    Parent(EntityId),
    /// Detached locally; pending deletion.
    Removed,
}

impl ParentLink {
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Parent(id) => Some(id.as_str()),
            _ => None,
        }
    }
}

/// Errors raised by entity payload builders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityError {
    /// Required field for creation is not set.
    MissingField {
        entity_id: EntityId,
        field: &'static str,
    },
    /// Entity type cannot be created through hierarchy operations.
    NotCreatable(EntityId),
}

impl Display for EntityError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField { entity_id, field } => {
                write!(f, "entity {entity_id} does not have `{field}` set")
            }
            Self::NotCreatable(id) => {
                write!(f, "entity {id} cannot be created through batch operations")
            }
        }
    }
}

impl Error for EntityError {}

/// Project-specific fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectFields {
    code: String,
    library: bool,
    folder_types: Tracked<Vec<TypeDescriptor>>,
    task_types: Tracked<Vec<TypeDescriptor>>,
}

impl ProjectFields {
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn library(&self) -> bool {
        self.library
    }

    pub fn folder_types(&self) -> &[TypeDescriptor] {
        self.folder_types.value()
    }

    /// Replaces the folder type catalog; missing icons get the default.
    pub fn set_folder_types(&mut self, folder_types: Vec<TypeDescriptor>) {
        self.folder_types
            .set_value(with_default_icon(folder_types, DEFAULT_FOLDER_TYPE_ICON));
    }

    pub fn task_types(&self) -> &[TypeDescriptor] {
        self.task_types.value()
    }

    /// Replaces the task type catalog; missing icons get the default.
    pub fn set_task_types(&mut self, task_types: Vec<TypeDescriptor>) {
        self.task_types
            .set_value(with_default_icon(task_types, DEFAULT_TASK_TYPE_ICON));
    }
}

/// Folder-specific fields.
#[derive(Debug, Clone, PartialEq)]
pub struct FolderFields {
    folder_type: Tracked<String>,
    label: Tracked<Option<String>>,
    has_published_content: bool,
}

impl FolderFields {
    pub fn folder_type(&self) -> &str {
        self.folder_type.value()
    }

    pub fn set_folder_type(&mut self, folder_type: impl Into<String>) {
        self.folder_type.set_value(folder_type.into());
    }

    pub fn label(&self) -> Option<&str> {
        self.label.value().as_deref()
    }

    pub fn set_label(&mut self, label: Option<String>) {
        self.label.set_value(label);
    }

    /// Downstream content was published under this folder.
    pub fn has_published_content(&self) -> bool {
        self.has_published_content
    }
}

/// Task-specific fields.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskFields {
    task_type: Tracked<String>,
    label: Tracked<Option<String>>,
}

impl TaskFields {
    pub fn task_type(&self) -> &str {
        self.task_type.value()
    }

    pub fn set_task_type(&mut self, task_type: impl Into<String>) {
        self.task_type.set_value(task_type.into());
    }

    pub fn label(&self) -> Option<&str> {
        self.label.value().as_deref()
    }

    pub fn set_label(&mut self, label: Option<String>) {
        self.label.set_value(label);
    }
}

/// Variant part of an entity.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityKind {
    Project(ProjectFields),
    Folder(FolderFields),
    Task(TaskFields),
}

/// Request for a new, never-synced folder.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFolder {
    /// Explicit id; generated when `None`.
    pub entity_id: Option<EntityId>,
    pub name: Option<String>,
    pub label: Option<String>,
    pub folder_type: String,
    pub parent_id: Option<EntityId>,
    pub attribs: Map<String, Value>,
    pub data: Option<Value>,
    pub thumbnail_id: Option<String>,
    pub active: bool,
}

impl NewFolder {
    pub fn new(
        name: impl Into<String>,
        folder_type: impl Into<String>,
        parent_id: impl Into<EntityId>,
    ) -> Self {
        Self {
            entity_id: None,
            name: Some(name.into()),
            label: None,
            folder_type: folder_type.into(),
            parent_id: Some(parent_id.into()),
            attribs: Map::new(),
            data: None,
            thumbnail_id: None,
            active: true,
        }
    }
}

/// Request for a new, never-synced task.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    /// Explicit id; generated when `None`.
    pub entity_id: Option<EntityId>,
    pub name: Option<String>,
    pub label: Option<String>,
    pub task_type: String,
    pub parent_id: Option<EntityId>,
    pub attribs: Map<String, Value>,
    pub data: Option<Value>,
    pub thumbnail_id: Option<String>,
    pub active: bool,
}

impl NewTask {
    pub fn new(
        name: impl Into<String>,
        task_type: impl Into<String>,
        parent_id: impl Into<EntityId>,
    ) -> Self {
        Self {
            entity_id: None,
            name: Some(name.into()),
            label: None,
            task_type: task_type.into(),
            parent_id: Some(parent_id.into()),
            attribs: Map::new(),
            data: None,
            thumbnail_id: None,
            active: true,
        }
    }
}

/// One node of the hub hierarchy with change tracking.
#[derive(Debug, Clone)]
pub struct Entity {
    id: EntityId,
    kind: EntityKind,
    name: Tracked<Option<String>>,
    parent: Tracked<ParentLink>,
    attribs: Attributes,
    data: Tracked<Value>,
    thumbnail_id: Tracked<Option<String>>,
    active: Tracked<bool>,
    created: bool,
    children: Loaded<Vec<EntityId>>,
    immutable_cache: Option<bool>,
    context: Arc<HubConfig>,
}

struct BaseFields {
    id: EntityId,
    name: Option<String>,
    parent: ParentLink,
    attribs: Attributes,
    data: Option<Value>,
    thumbnail_id: Option<String>,
    active: bool,
    created: bool,
}

impl Entity {
    fn from_parts(base: BaseFields, kind: EntityKind, context: Arc<HubConfig>) -> Self {
        // Created entities and tasks cannot have unknown remote children.
        let children = if base.created || matches!(kind, EntityKind::Task(_)) {
            Loaded::Known(Vec::new())
        } else {
            Loaded::Unknown
        };
        Self {
            id: base.id,
            kind,
            name: Tracked::new(base.name),
            parent: Tracked::new(base.parent),
            attribs: base.attribs,
            data: Tracked::new(base.data.unwrap_or_else(|| Value::Object(Map::new()))),
            thumbnail_id: Tracked::new(base.thumbnail_id),
            active: Tracked::new(base.active),
            created: base.created,
            children,
            immutable_cache: None,
            context,
        }
    }

    /// Builds the project entity from a remote record.
    pub fn from_project_record<I, S>(
        record: &ProjectRecord,
        attrib_keys: I,
        context: Arc<HubConfig>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let kind = EntityKind::Project(ProjectFields {
            code: record.code.clone(),
            library: record.library,
            folder_types: Tracked::new(with_default_icon(
                record.folder_types.clone(),
                DEFAULT_FOLDER_TYPE_ICON,
            )),
            task_types: Tracked::new(with_default_icon(
                record.task_types.clone(),
                DEFAULT_TASK_TYPE_ICON,
            )),
        });
        let base = BaseFields {
            id: record.name.clone(),
            name: Some(record.name.clone()),
            parent: ParentLink::ProjectRoot,
            attribs: Attributes::new(attrib_keys, Some(&record.own_attrib)),
            data: record.data.clone(),
            thumbnail_id: None,
            active: record.active,
            created: false,
        };
        Self::from_parts(base, kind, context)
    }

    /// Builds an existing folder from a remote record.
    ///
    /// Root-level folders (`parent_id == None`) are parented to the project.
    pub fn from_folder_record<I, S>(
        record: &FolderRecord,
        attrib_keys: I,
        context: Arc<HubConfig>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let parent_id = record
            .parent_id
            .clone()
            .unwrap_or_else(|| context.project_name.clone());
        let kind = EntityKind::Folder(FolderFields {
            folder_type: Tracked::new(record.folder_type.clone()),
            label: Tracked::new(record.label.clone()),
            has_published_content: record.has_products,
        });
        let base = BaseFields {
            id: record.id.clone(),
            name: Some(record.name.clone()),
            parent: ParentLink::Parent(parent_id),
            attribs: Attributes::new(attrib_keys, Some(&record.own_attrib)),
            data: record.data.clone(),
            thumbnail_id: record.thumbnail_id.clone(),
            active: record.active,
            created: false,
        };
        Self::from_parts(base, kind, context)
    }

    /// Builds an existing task from a remote record.
    pub fn from_task_record<I, S>(
        record: &TaskRecord,
        attrib_keys: I,
        context: Arc<HubConfig>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let kind = EntityKind::Task(TaskFields {
            task_type: Tracked::new(record.task_type.clone()),
            label: Tracked::new(record.label.clone()),
        });
        let base = BaseFields {
            id: record.id.clone(),
            name: Some(record.name.clone()),
            parent: ParentLink::Parent(record.folder_id.clone()),
            attribs: Attributes::new(attrib_keys, Some(&record.own_attrib)),
            data: record.data.clone(),
            thumbnail_id: record.thumbnail_id.clone(),
            active: record.active,
            created: false,
        };
        Self::from_parts(base, kind, context)
    }

    /// Builds a never-synced folder.
    pub fn new_folder<I, S>(request: NewFolder, attrib_keys: I, context: Arc<HubConfig>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let kind = EntityKind::Folder(FolderFields {
            folder_type: Tracked::new(request.folder_type),
            label: Tracked::new(request.label),
            has_published_content: false,
        });
        let base = BaseFields {
            id: request.entity_id.unwrap_or_else(create_entity_id),
            name: request.name,
            parent: request
                .parent_id
                .map_or(ParentLink::Unassigned, ParentLink::Parent),
            attribs: Attributes::new(attrib_keys, Some(&request.attribs)),
            data: request.data,
            thumbnail_id: request.thumbnail_id,
            active: request.active,
            created: true,
        };
        Self::from_parts(base, kind, context)
    }

    /// Builds a never-synced task.
    pub fn new_task<I, S>(request: NewTask, attrib_keys: I, context: Arc<HubConfig>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let kind = EntityKind::Task(TaskFields {
            task_type: Tracked::new(request.task_type),
            label: Tracked::new(request.label),
        });
        let base = BaseFields {
            id: request.entity_id.unwrap_or_else(create_entity_id),
            name: request.name,
            parent: request
                .parent_id
                .map_or(ParentLink::Unassigned, ParentLink::Parent),
            attribs: Attributes::new(attrib_keys, Some(&request.attribs)),
            data: request.data,
            thumbnail_id: request.thumbnail_id,
            active: request.active,
            created: true,
        };
        Self::from_parts(base, kind, context)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn entity_type(&self) -> EntityType {
        match self.kind {
            EntityKind::Project(_) => EntityType::Project,
            EntityKind::Folder(_) => EntityType::Folder,
            EntityKind::Task(_) => EntityType::Task,
        }
    }

    pub fn parent_entity_types(&self) -> &'static [EntityType] {
        self.entity_type().parent_entity_types()
    }

    pub fn kind(&self) -> &EntityKind {
        &self.kind
    }

    pub fn as_project(&self) -> Option<&ProjectFields> {
        match &self.kind {
            EntityKind::Project(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn as_project_mut(&mut self) -> Option<&mut ProjectFields> {
        match &mut self.kind {
            EntityKind::Project(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn as_folder(&self) -> Option<&FolderFields> {
        match &self.kind {
            EntityKind::Folder(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn as_folder_mut(&mut self) -> Option<&mut FolderFields> {
        match &mut self.kind {
            EntityKind::Folder(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn as_task(&self) -> Option<&TaskFields> {
        match &self.kind {
            EntityKind::Task(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn as_task_mut(&mut self) -> Option<&mut TaskFields> {
        match &mut self.kind {
            EntityKind::Task(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn project_name(&self) -> &str {
        &self.context.project_name
    }

    pub fn name(&self) -> Option<&str> {
        self.name.value().as_deref()
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name.set_value(Some(name));
    }

    pub fn parent(&self) -> &ParentLink {
        self.parent.value()
    }

    /// Parent link at last sync.
    pub fn orig_parent(&self) -> &ParentLink {
        self.parent.baseline()
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent.value().id()
    }

    pub(crate) fn set_parent(&mut self, parent: ParentLink) {
        self.parent.set_value(parent);
    }

    pub fn attribs(&self) -> &Attributes {
        &self.attribs
    }

    pub fn attribs_mut(&mut self) -> &mut Attributes {
        &mut self.attribs
    }

    /// Free-form custom data. Sent only when the hub allows data changes.
    pub fn data(&self) -> &Value {
        self.data.value()
    }

    pub fn set_data(&mut self, data: Value) {
        self.data.set_value(data);
    }

    pub fn active(&self) -> bool {
        *self.active.value()
    }

    pub fn set_active(&mut self, active: bool) {
        self.active.set_value(active);
    }

    pub fn thumbnail_id(&self) -> Option<&str> {
        self.thumbnail_id.value().as_deref()
    }

    pub fn set_thumbnail_id(&mut self, thumbnail_id: Option<String>) {
        self.thumbnail_id.set_value(thumbnail_id);
    }

    /// Entity never existed remotely.
    pub fn created(&self) -> bool {
        self.created
    }

    /// Entity is detached and pending deletion.
    pub fn removed(&self) -> bool {
        matches!(self.parent.value(), ParentLink::Removed)
    }

    /// Entity exists remotely and some field differs from its baseline.
    pub fn modified(&self) -> bool {
        !self.created && !self.changes().is_empty()
    }

    /// Cached children ids. Never queries.
    pub fn children_ids(&self) -> Loaded<&[EntityId]> {
        match &self.children {
            Loaded::Unknown => Loaded::Unknown,
            Loaded::Known(ids) => Loaded::Known(ids.as_slice()),
        }
    }

    pub(crate) fn fill_children_ids(&mut self, children_ids: Vec<EntityId>) {
        self.children = Loaded::Known(children_ids);
    }

    /// Adds a child id when children are known. Unknown stays unknown.
    pub(crate) fn insert_child_id(&mut self, child_id: &str) {
        if let Loaded::Known(ids) = &mut self.children {
            if !ids.iter().any(|id| id == child_id) {
                ids.push(child_id.to_string());
            }
        }
    }

    pub(crate) fn remove_child_id(&mut self, child_id: &str) {
        if let Loaded::Known(ids) = &mut self.children {
            ids.retain(|id| id != child_id);
        }
    }

    pub(crate) fn set_has_published_content(&mut self, has_published_content: bool) -> bool {
        match &mut self.kind {
            EntityKind::Folder(fields) if fields.has_published_content != has_published_content => {
                fields.has_published_content = has_published_content;
                true
            }
            _ => false,
        }
    }

    /// Own immutability rule. `None` defers to children.
    pub(crate) fn own_immutable_for_hierarchy(&self) -> Option<bool> {
        match &self.kind {
            EntityKind::Folder(fields) if fields.has_published_content => Some(true),
            _ => None,
        }
    }

    pub(crate) fn cached_immutable_for_hierarchy(&self) -> Option<bool> {
        self.immutable_cache
    }

    pub(crate) fn set_immutable_for_hierarchy_cache(&mut self, value: Option<bool>) {
        self.immutable_cache = value;
    }

    pub fn has_cached_immutable_hierarchy(&self) -> bool {
        self.immutable_cache.is_some()
    }

    /// Update payload with every field that differs from its baseline.
    ///
    /// Returns an empty map when nothing changed.
    pub fn changes(&self) -> Changes {
        let mut changes = Changes::new();
        if self.name.changed() {
            changes.insert("name".to_string(), optional_string(self.name.value()));
        }
        if self.context.allow_data_changes && self.data.changed() {
            changes.insert("data".to_string(), self.data.value().clone());
        }
        if self.thumbnail_id.changed() {
            changes.insert(
                "thumbnailId".to_string(),
                optional_string(self.thumbnail_id.value()),
            );
        }
        if self.active.changed() {
            changes.insert("active".to_string(), Value::Bool(*self.active.value()));
        }
        for (key, value) in self.attribs.changes() {
            changes.insert(format!("attrib.{key}"), value);
        }

        match &self.kind {
            EntityKind::Project(fields) => {
                if fields.folder_types.changed() {
                    changes.insert(
                        "folderTypes".to_string(),
                        descriptors_to_value(fields.folder_types.value()),
                    );
                }
                if fields.task_types.changed() {
                    changes.insert(
                        "taskTypes".to_string(),
                        descriptors_to_value(fields.task_types.value()),
                    );
                }
            }
            EntityKind::Folder(fields) => {
                if self.parent.changed() {
                    changes.insert("parentId".to_string(), self.folder_parent_value());
                }
                if fields.folder_type.changed() {
                    changes.insert(
                        "folderType".to_string(),
                        Value::String(fields.folder_type.value().clone()),
                    );
                }
                if fields.label.changed() {
                    changes.insert("label".to_string(), optional_string(fields.label.value()));
                }
            }
            EntityKind::Task(fields) => {
                if self.parent.changed() {
                    changes.insert(
                        "folderId".to_string(),
                        self.parent_id()
                            .map_or(Value::Null, |id| Value::String(id.to_string())),
                    );
                }
                if fields.task_type.changed() {
                    changes.insert(
                        "taskType".to_string(),
                        Value::String(fields.task_type.value().clone()),
                    );
                }
                if fields.label.changed() {
                    changes.insert("label".to_string(), optional_string(fields.label.value()));
                }
            }
        }
        changes
    }

    /// Full creation payload for a never-synced entity.
    ///
    /// # Errors
    /// - `MissingField` when `name` or the parent is not set.
    /// - `NotCreatable` for the project.
    pub fn to_create_body_data(&self) -> Result<Changes, EntityError> {
        let parent_key = match &self.kind {
            EntityKind::Project(_) => return Err(EntityError::NotCreatable(self.id.clone())),
            EntityKind::Folder(_) => "parentId",
            EntityKind::Task(_) => "folderId",
        };
        let name = self.name().ok_or_else(|| self.missing_field("name"))?;
        let parent_id = self
            .parent_id()
            .ok_or_else(|| self.missing_field("parent_id"))?;
        let parent_value = match self.kind {
            EntityKind::Folder(_) => self.folder_parent_value(),
            _ => Value::String(parent_id.to_string()),
        };

        let mut output = Changes::new();
        output.insert("name".to_string(), Value::String(name.to_string()));
        match &self.kind {
            EntityKind::Folder(fields) => {
                output.insert(
                    "folderType".to_string(),
                    Value::String(fields.folder_type.value().clone()),
                );
                if let Some(label) = fields.label.value() {
                    output.insert("label".to_string(), Value::String(label.clone()));
                }
            }
            EntityKind::Task(fields) => {
                output.insert(
                    "taskType".to_string(),
                    Value::String(fields.task_type.value().clone()),
                );
                if let Some(label) = fields.label.value() {
                    output.insert("label".to_string(), Value::String(label.clone()));
                }
            }
            EntityKind::Project(_) => {}
        }
        output.insert(parent_key.to_string(), parent_value);

        let attrib = self.attribs.to_map(true);
        if !attrib.is_empty() {
            output.insert("attrib".to_string(), Value::Object(attrib));
        }
        output.insert("active".to_string(), Value::Bool(self.active()));
        if let Some(thumbnail_id) = self.thumbnail_id() {
            output.insert(
                "thumbnailId".to_string(),
                Value::String(thumbnail_id.to_string()),
            );
        }
        if self.context.allow_data_changes {
            output.insert("data".to_string(), self.data.value().clone());
        }
        Ok(output)
    }

    /// Declares current state as synced.
    pub fn lock(&mut self) {
        self.created = false;
        self.name.lock();
        self.parent.lock();
        self.data.lock();
        self.thumbnail_id.lock();
        self.active.lock();
        self.attribs.lock();
        match &mut self.kind {
            EntityKind::Project(fields) => {
                fields.folder_types.lock();
                fields.task_types.lock();
            }
            EntityKind::Folder(fields) => {
                fields.folder_type.lock();
                fields.label.lock();
            }
            EntityKind::Task(fields) => {
                fields.task_type.lock();
                fields.label.lock();
            }
        }
        self.immutable_cache = None;
    }

    /// Root-level folders are sent with `parentId = null`.
    fn folder_parent_value(&self) -> Value {
        match self.parent_id() {
            Some(id) if id == self.context.project_name => Value::Null,
            Some(id) => Value::String(id.to_string()),
            None => Value::Null,
        }
    }

    fn missing_field(&self, field: &'static str) -> EntityError {
        EntityError::MissingField {
            entity_id: self.id.clone(),
            field,
        }
    }
}

fn optional_string(value: &Option<String>) -> Value {
    value
        .as_ref()
        .map_or(Value::Null, |value| Value::String(value.clone()))
}

fn with_default_icon(mut types: Vec<TypeDescriptor>, icon: &str) -> Vec<TypeDescriptor> {
    for descriptor in &mut types {
        if descriptor.icon.is_none() {
            descriptor.icon = Some(icon.to_string());
        }
    }
    types
}

fn descriptors_to_value(types: &[TypeDescriptor]) -> Value {
    Value::Array(types.iter().map(TypeDescriptor::to_value).collect())
}

#[cfg(test)]
mod tests {
    use super::{
        Entity, EntityError, EntityType, NewFolder, NewTask, ParentLink, DEFAULT_TASK_TYPE_ICON,
    };
    use crate::config::HubConfig;
    use crate::model::records::{FolderRecord, ProjectRecord, TypeDescriptor};
    use serde_json::{json, Map};
    use std::sync::Arc;

    fn context() -> Arc<HubConfig> {
        Arc::new(HubConfig::new("demo"))
    }

    fn folder_record() -> FolderRecord {
        serde_json::from_value(json!({
            "id": "F1",
            "name": "shots",
            "folderType": "Folder",
            "parentId": null,
            "ownAttrib": {"fps": 25}
        }))
        .unwrap()
    }

    #[test]
    fn root_folder_record_is_parented_to_project() {
        let folder = Entity::from_folder_record(&folder_record(), ["fps"], context());
        assert_eq!(folder.parent(), &ParentLink::Parent("demo".to_string()));
        assert!(!folder.created());
        assert!(!folder.children_ids().is_known());
    }

    #[test]
    fn changes_is_empty_for_fresh_record() {
        let folder = Entity::from_folder_record(&folder_record(), ["fps"], context());
        assert!(folder.changes().is_empty());
    }

    #[test]
    fn changes_reports_attribute_and_type_deltas() {
        let mut folder = Entity::from_folder_record(&folder_record(), ["fps"], context());
        folder.attribs_mut().set("fps", 24).unwrap();
        folder.as_folder_mut().unwrap().set_folder_type("Sequence");

        let changes = folder.changes();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes["attrib.fps"], json!(24));
        assert_eq!(changes["folderType"], json!("Sequence"));
    }

    #[test]
    fn data_changes_are_ignored_unless_allowed() {
        let mut folder = Entity::from_folder_record(&folder_record(), ["fps"], context());
        folder.set_data(json!({"key": "value"}));
        assert!(folder.changes().is_empty());

        let context = Arc::new(HubConfig::new("demo").with_data_changes(true));
        let mut folder = Entity::from_folder_record(&folder_record(), ["fps"], context);
        folder.set_data(json!({"key": "value"}));
        assert_eq!(folder.changes()["data"], json!({"key": "value"}));
    }

    #[test]
    fn lock_twice_keeps_changes_empty() {
        let mut folder = Entity::from_folder_record(&folder_record(), ["fps"], context());
        folder.set_active(false);
        assert!(folder.modified());
        folder.lock();
        assert!(folder.changes().is_empty());
        folder.lock();
        assert!(folder.changes().is_empty());
        assert!(!folder.modified());
    }

    #[test]
    fn create_body_for_root_folder_sends_null_parent() {
        let folder = Entity::new_folder(NewFolder::new("seq01", "Sequence", "demo"), ["fps"], context());
        assert!(folder.created());
        assert_eq!(folder.children_ids().known(), Some(&[][..]));

        let body = folder.to_create_body_data().unwrap();
        assert_eq!(body["name"], json!("seq01"));
        assert_eq!(body["folderType"], json!("Sequence"));
        assert_eq!(body["parentId"], json!(null));
        assert_eq!(body["active"], json!(true));
        assert!(!body.contains_key("attrib"));
    }

    #[test]
    fn create_body_requires_name_and_parent() {
        let request = NewTask {
            name: None,
            ..NewTask::new("unused", "Compositing", "F1")
        };
        let task = Entity::new_task(request, Vec::<String>::new(), context());
        assert!(matches!(
            task.to_create_body_data(),
            Err(EntityError::MissingField { field: "name", .. })
        ));

        let request = NewTask {
            parent_id: None,
            ..NewTask::new("comp", "Compositing", "F1")
        };
        let task = Entity::new_task(request, Vec::<String>::new(), context());
        assert_eq!(task.parent(), &ParentLink::Unassigned);
        assert!(matches!(
            task.to_create_body_data(),
            Err(EntityError::MissingField {
                field: "parent_id",
                ..
            })
        ));
    }

    #[test]
    fn project_normalizes_type_icons_and_is_not_creatable() {
        let record = ProjectRecord {
            name: "demo".to_string(),
            code: "dm".to_string(),
            library: false,
            folder_types: vec![TypeDescriptor::new("Shot")],
            task_types: vec![TypeDescriptor::new("Compositing")],
            own_attrib: Map::new(),
            data: None,
            active: true,
        };
        let mut project = Entity::from_project_record(&record, ["fps"], context());
        assert_eq!(project.entity_type(), EntityType::Project);
        assert_eq!(project.parent(), &ParentLink::ProjectRoot);
        let fields = project.as_project().unwrap();
        assert_eq!(fields.folder_types()[0].icon.as_deref(), Some("folder"));
        assert!(project.changes().is_empty());

        project
            .as_project_mut()
            .unwrap()
            .set_task_types(vec![TypeDescriptor::new("Lighting")]);
        let changes = project.changes();
        assert_eq!(
            changes["taskTypes"][0]["icon"],
            json!(DEFAULT_TASK_TYPE_ICON)
        );
        assert!(matches!(
            project.to_create_body_data(),
            Err(EntityError::NotCreatable(id)) if id == "demo"
        ));
    }

    #[test]
    fn parent_type_rules() {
        assert!(EntityType::Project.can_parent(EntityType::Folder));
        assert!(!EntityType::Project.can_parent(EntityType::Task));
        assert!(EntityType::Folder.can_parent(EntityType::Task));
        assert!(!EntityType::Task.can_parent(EntityType::Task));
        assert!(!EntityType::Folder.can_parent(EntityType::Project));
    }
}
