//! Remote store boundary.
//!
//! # Responsibility
//! - Define the capability the hub uses to read and write the remote
//!   hierarchy (`EntityServer`).
//! - Provide a SQLite-backed reference store (`SqliteEntityServer`).
//!
//! # Invariants
//! - The hub never talks to a store except through `EntityServer`.
//! - A batch is applied all-or-nothing by conforming stores.
//! - Passing the project name as a folder parent id selects root folders.

use crate::db::DbError;
use crate::model::entity::{EntityId, EntityType};
use crate::model::operation::{Changes, Operation};
use crate::model::records::{FolderRecord, ProjectRecord, TaskRecord};
use std::error::Error;
use std::fmt::{Display, Formatter};

mod sqlite;

pub use sqlite::SqliteEntityServer;

/// Folder fields every store returns.
pub const DEFAULT_FOLDER_FIELDS: &[&str] = &[
    "id",
    "name",
    "label",
    "folderType",
    "parentId",
    "ownAttrib",
    "active",
    "thumbnailId",
];

/// Folder field reporting published content below a folder.
pub const FOLDER_PUBLISHED_FIELD: &str = "hasProducts";

/// Free-form custom data field.
pub const DATA_FIELD: &str = "data";

pub type ServerResult<T> = Result<T, ServerError>;

/// Error reported by a remote store.
#[derive(Debug)]
pub enum ServerError {
    Db(DbError),
    /// Store could not be reached or answered garbage at protocol level.
    Transport(String),
    /// Store refused a request (unknown entity, broken reference, bad field).
    Rejected(String),
    /// Stored data cannot be mapped to records.
    InvalidData(String),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
}

impl Display for ServerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Transport(message) => write!(f, "entity server unreachable: {message}"),
            Self::Rejected(message) => write!(f, "entity server rejected request: {message}"),
            Self::InvalidData(message) => write!(f, "invalid entity server data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "entity store schema version {actual_version} does not match expected {expected_version}"
            ),
        }
    }
}

impl Error for ServerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for ServerError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for ServerError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidData(value.to_string())
    }
}

/// Authenticated access to the remote hierarchy of projects.
pub trait EntityServer {
    /// Project record, or `None` when the project does not exist.
    fn get_project(&self, project_name: &str) -> ServerResult<Option<ProjectRecord>>;

    /// Folders of a project.
    ///
    /// `parent_ids == None` returns every folder; otherwise only children of
    /// the listed parents. The project name selects root-level folders.
    /// `data` and `hasProducts` are filled only when listed in `fields`.
    fn get_folders(
        &self,
        project_name: &str,
        parent_ids: Option<&[EntityId]>,
        fields: &[&str],
    ) -> ServerResult<Vec<FolderRecord>>;

    /// Tasks of a project, optionally restricted to the listed folders.
    fn get_tasks(
        &self,
        project_name: &str,
        folder_ids: Option<&[EntityId]>,
    ) -> ServerResult<Vec<TaskRecord>>;

    fn get_folder_by_id(
        &self,
        project_name: &str,
        folder_id: &str,
        fields: &[&str],
    ) -> ServerResult<Option<FolderRecord>>;

    fn get_task_by_id(&self, project_name: &str, task_id: &str)
        -> ServerResult<Option<TaskRecord>>;

    /// Legal attribute keys for an entity type.
    fn get_attributes_for_type(&self, entity_type: EntityType) -> ServerResult<Vec<String>>;

    /// Applies an ordered batch of operations atomically.
    fn send_batch_operations(
        &self,
        project_name: &str,
        operations: &[Operation],
    ) -> ServerResult<()>;

    /// Applies field changes to the project entity.
    fn patch_project(&self, project_name: &str, changes: &Changes) -> ServerResult<()>;
}

impl<S: EntityServer + ?Sized> EntityServer for &S {
    fn get_project(&self, project_name: &str) -> ServerResult<Option<ProjectRecord>> {
        (**self).get_project(project_name)
    }

    fn get_folders(
        &self,
        project_name: &str,
        parent_ids: Option<&[EntityId]>,
        fields: &[&str],
    ) -> ServerResult<Vec<FolderRecord>> {
        (**self).get_folders(project_name, parent_ids, fields)
    }

    fn get_tasks(
        &self,
        project_name: &str,
        folder_ids: Option<&[EntityId]>,
    ) -> ServerResult<Vec<TaskRecord>> {
        (**self).get_tasks(project_name, folder_ids)
    }

    fn get_folder_by_id(
        &self,
        project_name: &str,
        folder_id: &str,
        fields: &[&str],
    ) -> ServerResult<Option<FolderRecord>> {
        (**self).get_folder_by_id(project_name, folder_id, fields)
    }

    fn get_task_by_id(
        &self,
        project_name: &str,
        task_id: &str,
    ) -> ServerResult<Option<TaskRecord>> {
        (**self).get_task_by_id(project_name, task_id)
    }

    fn get_attributes_for_type(&self, entity_type: EntityType) -> ServerResult<Vec<String>> {
        (**self).get_attributes_for_type(entity_type)
    }

    fn send_batch_operations(
        &self,
        project_name: &str,
        operations: &[Operation],
    ) -> ServerResult<()> {
        (**self).send_batch_operations(project_name, operations)
    }

    fn patch_project(&self, project_name: &str, changes: &Changes) -> ServerResult<()> {
        (**self).patch_project(project_name, changes)
    }
}
