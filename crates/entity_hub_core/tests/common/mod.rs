#![allow(dead_code)]

use entity_hub_core::{
    Changes, EntityHub, EntityId, EntityServer, EntityType, FolderRecord, HubConfig, Operation,
    ProjectRecord, ServerError, ServerResult, TaskRecord, TypeDescriptor,
};
use serde_json::Map;
use std::cell::{Cell, RefCell};

pub const PROJECT: &str = "demo";

/// In-memory store that records every call the hub makes.
///
/// Remote records never change; batches and patches are only recorded.
#[derive(Default)]
pub struct RecordingServer {
    pub project: Option<ProjectRecord>,
    pub folders: Vec<FolderRecord>,
    pub tasks: Vec<TaskRecord>,
    pub folder_attributes: Vec<String>,
    pub task_attributes: Vec<String>,
    pub batches: RefCell<Vec<Vec<Operation>>>,
    pub project_patches: RefCell<Vec<Changes>>,
    /// Parent ids of every `get_folders` call.
    pub folder_queries: RefCell<Vec<Option<Vec<EntityId>>>>,
    pub fail_sends: Cell<bool>,
}

impl RecordingServer {
    pub fn sent_batches(&self) -> Vec<Vec<Operation>> {
        self.batches.borrow().clone()
    }

    pub fn last_batch(&self) -> Vec<Operation> {
        self.batches.borrow().last().cloned().unwrap_or_default()
    }

    pub fn folder_query_count(&self) -> usize {
        self.folder_queries.borrow().len()
    }

    fn check_project(&self, project_name: &str) -> ServerResult<()> {
        match &self.project {
            Some(project) if project.name == project_name => Ok(()),
            _ => Err(ServerError::Rejected(format!(
                "unknown project {project_name}"
            ))),
        }
    }
}

impl EntityServer for RecordingServer {
    fn get_project(&self, project_name: &str) -> ServerResult<Option<ProjectRecord>> {
        Ok(self
            .project
            .clone()
            .filter(|project| project.name == project_name))
    }

    fn get_folders(
        &self,
        project_name: &str,
        parent_ids: Option<&[EntityId]>,
        fields: &[&str],
    ) -> ServerResult<Vec<FolderRecord>> {
        self.check_project(project_name)?;
        self.folder_queries
            .borrow_mut()
            .push(parent_ids.map(<[EntityId]>::to_vec));

        let with_products = fields.contains(&"hasProducts");
        let with_data = fields.contains(&"data");
        Ok(self
            .folders
            .iter()
            .filter(|folder| {
                let parent = folder.parent_id.as_deref().unwrap_or(project_name);
                parent_ids.map_or(true, |ids| ids.iter().any(|id| id == parent))
            })
            .map(|folder| {
                let mut folder = folder.clone();
                folder.has_products &= with_products;
                if !with_data {
                    folder.data = None;
                }
                folder
            })
            .collect())
    }

    fn get_tasks(
        &self,
        project_name: &str,
        folder_ids: Option<&[EntityId]>,
    ) -> ServerResult<Vec<TaskRecord>> {
        self.check_project(project_name)?;
        Ok(self
            .tasks
            .iter()
            .filter(|task| folder_ids.map_or(true, |ids| ids.contains(&task.folder_id)))
            .cloned()
            .collect())
    }

    fn get_folder_by_id(
        &self,
        project_name: &str,
        folder_id: &str,
        _fields: &[&str],
    ) -> ServerResult<Option<FolderRecord>> {
        self.check_project(project_name)?;
        Ok(self
            .folders
            .iter()
            .find(|folder| folder.id == folder_id)
            .cloned())
    }

    fn get_task_by_id(
        &self,
        project_name: &str,
        task_id: &str,
    ) -> ServerResult<Option<TaskRecord>> {
        self.check_project(project_name)?;
        Ok(self.tasks.iter().find(|task| task.id == task_id).cloned())
    }

    fn get_attributes_for_type(&self, entity_type: EntityType) -> ServerResult<Vec<String>> {
        Ok(match entity_type {
            EntityType::Project => Vec::new(),
            EntityType::Folder => self.folder_attributes.clone(),
            EntityType::Task => self.task_attributes.clone(),
        })
    }

    fn send_batch_operations(
        &self,
        project_name: &str,
        operations: &[Operation],
    ) -> ServerResult<()> {
        self.check_project(project_name)?;
        if self.fail_sends.get() {
            return Err(ServerError::Transport("connection reset".to_string()));
        }
        self.batches.borrow_mut().push(operations.to_vec());
        Ok(())
    }

    fn patch_project(&self, project_name: &str, changes: &Changes) -> ServerResult<()> {
        self.check_project(project_name)?;
        if self.fail_sends.get() {
            return Err(ServerError::Transport("connection reset".to_string()));
        }
        self.project_patches.borrow_mut().push(changes.clone());
        Ok(())
    }
}

pub fn project_record(name: &str) -> ProjectRecord {
    ProjectRecord {
        name: name.to_string(),
        code: name.to_string(),
        library: false,
        folder_types: vec![
            TypeDescriptor::new("Folder"),
            TypeDescriptor::new("Sequence"),
            TypeDescriptor::new("Shot"),
        ],
        task_types: vec![
            TypeDescriptor::new("Compositing"),
            TypeDescriptor::new("Tracking"),
        ],
        own_attrib: Map::new(),
        data: None,
        active: true,
    }
}

pub fn folder_record(id: &str, name: &str, parent_id: Option<&str>) -> FolderRecord {
    FolderRecord {
        id: id.to_string(),
        name: name.to_string(),
        label: None,
        folder_type: "Folder".to_string(),
        parent_id: parent_id.map(str::to_string),
        own_attrib: Map::new(),
        data: None,
        active: true,
        thumbnail_id: None,
        has_products: false,
    }
}

pub fn task_record(id: &str, name: &str, task_type: &str, folder_id: &str) -> TaskRecord {
    TaskRecord {
        id: id.to_string(),
        name: name.to_string(),
        label: None,
        task_type: task_type.to_string(),
        folder_id: folder_id.to_string(),
        own_attrib: Map::new(),
        data: None,
        active: true,
        thumbnail_id: None,
    }
}

/// Project `demo` with `shots` (F1) holding task `comp` (T1).
pub fn demo_server() -> RecordingServer {
    RecordingServer {
        project: Some(project_record(PROJECT)),
        folders: vec![folder_record("F1", "shots", None)],
        tasks: vec![task_record("T1", "comp", "Compositing", "F1")],
        folder_attributes: vec!["fps".to_string(), "frameStart".to_string()],
        task_attributes: vec!["fps".to_string()],
        ..RecordingServer::default()
    }
}

/// Project `demo` with a deeper tree:
///
/// ```text
/// demo
/// ├── shots (F1)
/// │   ├── sq01 (F2)
/// │   │   └── sh010 (F3)
/// │   │       └── comp (T1)
/// │   └── sq02 (F4)
/// └── assets (F5)
/// ```
pub fn tree_server() -> RecordingServer {
    RecordingServer {
        project: Some(project_record(PROJECT)),
        folders: vec![
            folder_record("F1", "shots", None),
            folder_record("F2", "sq01", Some("F1")),
            folder_record("F3", "sh010", Some("F2")),
            folder_record("F4", "sq02", Some("F1")),
            folder_record("F5", "assets", None),
        ],
        tasks: vec![task_record("T1", "comp", "Compositing", "F3")],
        folder_attributes: vec!["fps".to_string()],
        task_attributes: vec!["fps".to_string()],
        ..RecordingServer::default()
    }
}

pub fn hub(server: &RecordingServer) -> EntityHub<&RecordingServer> {
    EntityHub::new(HubConfig::new(PROJECT), server)
}

pub fn hydrated_hub(server: &RecordingServer) -> EntityHub<&RecordingServer> {
    let mut hub = hub(server);
    hub.query_entities_from_server().unwrap();
    hub
}

/// Asserts that every cached entity sits in its parent's index entry
/// and that no index entry points at an entity with another parent.
pub fn assert_index_consistent(hub: &EntityHub<&RecordingServer>) {
    for entity in hub.entities() {
        if let Some(parent_id) = entity.parent_id() {
            assert!(
                hub.children_in_cache(parent_id)
                    .iter()
                    .any(|id| id == entity.id()),
                "{} missing from index of {parent_id}",
                entity.id()
            );
        }
        for child_id in hub.children_in_cache(entity.id()) {
            let child = hub.get_entity_by_id(child_id).unwrap();
            assert_eq!(child.parent_id(), Some(entity.id()));
        }
    }
}
