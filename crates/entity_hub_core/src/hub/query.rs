//! Lazy lookups and hydration.
//!
//! # Invariants
//! - Each entity's children are queried at most once per hub lifetime.
//! - Queried records never replace an entity that is already cached.
//! - Hydration builds a fresh table and swaps it in only on success.

use super::table::EntityTable;
use super::{EntityHub, HubResult};
use crate::model::entity::{Entity, EntityId, EntityType};
use crate::model::tracked::Loaded;
use crate::server::EntityServer;
use log::{debug, error, info};
use std::time::Instant;

impl<S: EntityServer> EntityHub<S> {
    /// Cached entity, or the first hit of a by-id query over `entity_types`.
    pub fn get_or_query_entity_by_id(
        &mut self,
        entity_id: &str,
        entity_types: &[EntityType],
    ) -> HubResult<Option<&Entity>> {
        if self.resolve_entity(entity_id, entity_types)? {
            return Ok(self.table.get(entity_id));
        }
        Ok(None)
    }

    /// Folder by id. Cached entities of another type yield `None`.
    pub fn get_folder_by_id(
        &mut self,
        entity_id: &str,
        allow_query: bool,
    ) -> HubResult<Option<&Entity>> {
        self.get_typed(entity_id, EntityType::Folder, allow_query)
    }

    /// Task by id. Cached entities of another type yield `None`.
    pub fn get_task_by_id(
        &mut self,
        entity_id: &str,
        allow_query: bool,
    ) -> HubResult<Option<&Entity>> {
        self.get_typed(entity_id, EntityType::Task, allow_query)
    }

    /// Children ids of an entity.
    ///
    /// Returns `Loaded::Unknown` when they were never resolved and
    /// `allow_query` is `false`.
    pub fn get_entity_children(
        &mut self,
        entity_id: &str,
        allow_query: bool,
    ) -> HubResult<Loaded<Vec<EntityId>>> {
        if !self.entity(entity_id)?.children_ids().is_known() {
            if !allow_query {
                return Ok(Loaded::Unknown);
            }
            self.ensure_children_loaded(entity_id)?;
        }
        Ok(match self.entity(entity_id)?.children_ids() {
            Loaded::Known(ids) => Loaded::Known(ids.to_vec()),
            Loaded::Unknown => Loaded::Unknown,
        })
    }

    /// Replaces the cache with the full remote hierarchy, level by level.
    ///
    /// On failure the previous cache is kept untouched.
    pub fn query_entities_from_server(&mut self) -> HubResult<()> {
        let started_at = Instant::now();
        info!(
            "event=hub_hydrate module=hub status=start project={}",
            self.project_name()
        );

        match self.build_hydrated_table() {
            Ok(table) => {
                info!(
                    "event=hub_hydrate module=hub status=ok project={} entities={} duration_ms={}",
                    self.project_name(),
                    table.len(),
                    started_at.elapsed().as_millis()
                );
                self.table = table;
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=hub_hydrate module=hub status=error project={} duration_ms={} error={err}",
                    self.project_name(),
                    started_at.elapsed().as_millis()
                );
                Err(err)
            }
        }
    }

    /// Makes `entity_id` cached if possible. Returns whether it is cached.
    ///
    /// Types are tried in order; the first hit wins.
    pub(super) fn resolve_entity(
        &mut self,
        entity_id: &str,
        entity_types: &[EntityType],
    ) -> HubResult<bool> {
        if self.table.contains(entity_id) {
            return Ok(true);
        }

        let project_name = self.context.project_name.clone();
        for entity_type in entity_types {
            let entity = match entity_type {
                EntityType::Project => {
                    if entity_id != project_name {
                        continue;
                    }
                    self.ensure_project()?;
                    return Ok(true);
                }
                EntityType::Folder => {
                    let fields = self.folder_fields();
                    let Some(record) =
                        self.server
                            .get_folder_by_id(&project_name, entity_id, &fields)?
                    else {
                        continue;
                    };
                    let keys = self.get_attributes_for_type(EntityType::Folder)?.to_vec();
                    Entity::from_folder_record(&record, keys, self.context())
                }
                EntityType::Task => {
                    let Some(record) = self.server.get_task_by_id(&project_name, entity_id)?
                    else {
                        continue;
                    };
                    let keys = self.get_attributes_for_type(EntityType::Task)?.to_vec();
                    Entity::from_task_record(&record, keys, self.context())
                }
            };
            debug!(
                "event=entity_query module=hub status=ok entity_type={entity_type} entity_id={entity_id}"
            );
            self.insert_cached(entity);
            return Ok(true);
        }
        Ok(false)
    }

    /// Queries children of an entity whose children are still unknown.
    pub(super) fn ensure_children_loaded(&mut self, entity_id: &str) -> HubResult<()> {
        let entity = self.entity(entity_id)?;
        if entity.children_ids().is_known() {
            return Ok(());
        }
        let entity_type = entity.entity_type();
        let project_name = self.context.project_name.clone();
        let parent_ids = [entity_id.to_string()];

        let (folders, tasks) = match entity_type {
            EntityType::Task => (Vec::new(), Vec::new()),
            EntityType::Project => {
                let fields = self.folder_fields();
                let folders = self
                    .server
                    .get_folders(&project_name, Some(parent_ids.as_slice()), &fields)?;
                (folders, Vec::new())
            }
            EntityType::Folder => {
                let fields = self.folder_fields();
                let folders = self
                    .server
                    .get_folders(&project_name, Some(parent_ids.as_slice()), &fields)?;
                let tasks = self.server.get_tasks(&project_name, Some(parent_ids.as_slice()))?;
                (folders, tasks)
            }
        };

        let folder_keys = self.get_attributes_for_type(EntityType::Folder)?.to_vec();
        let task_keys = self.get_attributes_for_type(EntityType::Task)?.to_vec();
        for record in &folders {
            if !self.table.contains(&record.id) {
                let folder = Entity::from_folder_record(record, &folder_keys, self.context());
                self.insert_cached(folder);
            }
        }
        for record in &tasks {
            if !self.table.contains(&record.id) {
                let task = Entity::from_task_record(record, &task_keys, self.context());
                self.insert_cached(task);
            }
        }

        // Local moves win over the remote parent: the index is the truth.
        self.table.fill_children(entity_id);
        debug!(
            "event=children_query module=hub entity_id={entity_id} folders={} tasks={}",
            folders.len(),
            tasks.len()
        );
        Ok(())
    }

    fn get_typed(
        &mut self,
        entity_id: &str,
        entity_type: EntityType,
        allow_query: bool,
    ) -> HubResult<Option<&Entity>> {
        if allow_query {
            self.resolve_entity(entity_id, &[entity_type])?;
        }
        Ok(self
            .table
            .get(entity_id)
            .filter(|entity| entity.entity_type() == entity_type))
    }

    fn build_hydrated_table(&mut self) -> HubResult<EntityTable> {
        let project_name = self.context.project_name.clone();
        let fields = self.folder_fields();
        let folder_keys = self.get_attributes_for_type(EntityType::Folder)?.to_vec();
        let task_keys = self.get_attributes_for_type(EntityType::Task)?.to_vec();

        let mut table = EntityTable::default();
        let project = self.load_project()?;
        let mut level: Vec<EntityId> = vec![project.id().to_string()];
        table.insert(project);

        let mut is_project_level = true;
        while !level.is_empty() {
            let folders = self
                .server
                .get_folders(&project_name, Some(level.as_slice()), &fields)?;
            let tasks = if is_project_level {
                Vec::new()
            } else {
                self.server.get_tasks(&project_name, Some(level.as_slice()))?
            };

            let mut next_level = Vec::with_capacity(folders.len());
            for record in &folders {
                if table.contains(&record.id) {
                    continue;
                }
                next_level.push(record.id.clone());
                table.insert(Entity::from_folder_record(
                    record,
                    &folder_keys,
                    self.context(),
                ));
            }
            for record in &tasks {
                if !table.contains(&record.id) {
                    table.insert(Entity::from_task_record(record, &task_keys, self.context()));
                }
            }
            for parent_id in &level {
                table.fill_children(parent_id);
            }

            level = next_level;
            is_project_level = false;
        }

        table.lock_all();
        Ok(table)
    }
}
