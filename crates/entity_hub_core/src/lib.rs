//! Client-side cache of a project/folder/task hierarchy.
//!
//! Entities are read lazily from an `EntityServer`, edited locally and
//! written back as one ordered operation batch by `EntityHub::commit_changes`.

pub mod config;
pub mod db;
pub mod hub;
pub mod logging;
pub mod model;
pub mod naming;
pub mod server;

pub use config::{ConfigError, HubConfig};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use hub::{CommitSummary, EntityHub, HubError, HubResult};
pub use logging::{default_log_level, init_logging, logging_status, LoggingConfig, LoggingError};
pub use model::attributes::{AttributeError, AttributeValue, Attributes};
pub use model::entity::{
    create_entity_id, Entity, EntityError, EntityId, EntityKind, EntityType, FolderFields,
    NewFolder, NewTask, ParentLink, ProjectFields, TaskFields,
};
pub use model::operation::{Changes, Operation, OperationKind};
pub use model::records::{FolderRecord, ProjectRecord, TaskRecord, TypeDescriptor};
pub use model::tracked::{Loaded, Tracked};
pub use naming::slugify_name;
pub use server::{EntityServer, ServerError, ServerResult, SqliteEntityServer};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
