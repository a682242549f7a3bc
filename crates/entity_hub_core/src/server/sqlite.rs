//! SQLite-backed reference `EntityServer`.
//!
//! # Responsibility
//! - Serve project/folder/task records from a migrated store connection.
//! - Apply operation batches in one transaction.
//!
//! # Invariants
//! - Connections must be migrated to the latest store schema.
//! - Foreign keys reject children whose parent does not exist yet, and
//!   deletes of folders that still have children.
//! - A failed batch leaves the store untouched.

use super::{EntityServer, ServerError, ServerResult, DATA_FIELD, FOLDER_PUBLISHED_FIELD};
use crate::db::migrations::{current_user_version, latest_version};
use crate::model::entity::{EntityId, EntityType};
use crate::model::operation::{Changes, Operation, OperationKind};
use crate::model::records::{FolderRecord, ProjectRecord, TaskRecord, TypeDescriptor};
use log::{debug, warn};
use rusqlite::{params, Connection, Params, Row};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

const PROJECT_SELECT_SQL: &str = "SELECT
    name,
    code,
    library,
    folder_types,
    task_types,
    attrib,
    data,
    active
FROM projects";

const FOLDER_SELECT_SQL: &str = "SELECT
    id,
    name,
    label,
    folder_type,
    parent_id,
    attrib,
    data,
    active,
    thumbnail_id,
    has_products
FROM folders";

const TASK_SELECT_SQL: &str = "SELECT
    id,
    name,
    label,
    task_type,
    folder_id,
    attrib,
    data,
    active,
    thumbnail_id
FROM tasks";

/// Fields needed to rewrite a folder row without losing columns.
const FULL_FOLDER_FIELDS: &[&str] = &[DATA_FIELD, FOLDER_PUBLISHED_FIELD];

/// Reference store over a migrated SQLite connection.
pub struct SqliteEntityServer<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteEntityServer<'conn> {
    /// Creates a store from a connection opened through `open_db*`.
    pub fn try_new(conn: &'conn Connection) -> ServerResult<Self> {
        let expected_version = latest_version();
        let actual_version = current_user_version(conn)?;
        if actual_version != expected_version {
            return Err(ServerError::UninitializedConnection {
                expected_version,
                actual_version,
            });
        }
        Ok(Self { conn })
    }

    /// Inserts a project row.
    pub fn insert_project(&self, record: &ProjectRecord) -> ServerResult<()> {
        self.conn.execute(
            "INSERT INTO projects (
                name,
                code,
                library,
                folder_types,
                task_types,
                attrib,
                data,
                active
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                record.name.as_str(),
                record.code.as_str(),
                record.library,
                descriptors_to_db(&record.folder_types)?,
                descriptors_to_db(&record.task_types)?,
                map_to_db(&record.own_attrib)?,
                data_to_db(record.data.as_ref())?,
                record.active,
            ],
        )?;
        Ok(())
    }

    /// Inserts a folder row. `parent_id == None` makes it a root folder.
    pub fn insert_folder(&self, project_name: &str, record: &FolderRecord) -> ServerResult<()> {
        insert_folder_row(self.conn, project_name, record)
    }

    pub fn insert_task(&self, project_name: &str, record: &TaskRecord) -> ServerResult<()> {
        insert_task_row(self.conn, project_name, record)
    }

    /// Replaces the legal attribute keys of an entity type. Order is kept.
    pub fn set_attribute_schema(&self, entity_type: EntityType, keys: &[&str]) -> ServerResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM attribute_schema WHERE entity_type = ?1;",
            params![entity_type.as_str()],
        )?;
        for (position, key) in keys.iter().enumerate() {
            tx.execute(
                "INSERT INTO attribute_schema (entity_type, name, position)
                 VALUES (?1, ?2, ?3);",
                params![entity_type.as_str(), key, position as i64],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn collect_folders<P: Params>(
        &self,
        sql: &str,
        params: P,
        fields: &[&str],
    ) -> ServerResult<Vec<FolderRecord>> {
        collect_folders(self.conn, sql, params, fields)
    }

    fn collect_tasks<P: Params>(&self, sql: &str, params: P) -> ServerResult<Vec<TaskRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            tasks.push(parse_task_row(row)?);
        }
        Ok(tasks)
    }

    fn require_project(&self, project_name: &str) -> ServerResult<()> {
        if self.get_project(project_name)?.is_none() {
            return Err(ServerError::Rejected(format!(
                "project `{project_name}` does not exist"
            )));
        }
        Ok(())
    }
}

impl EntityServer for SqliteEntityServer<'_> {
    fn get_project(&self, project_name: &str) -> ServerResult<Option<ProjectRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{PROJECT_SELECT_SQL} WHERE name = ?1;"))?;
        let mut rows = stmt.query(params![project_name])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_project_row(row)?));
        }
        Ok(None)
    }

    fn get_folders(
        &self,
        project_name: &str,
        parent_ids: Option<&[EntityId]>,
        fields: &[&str],
    ) -> ServerResult<Vec<FolderRecord>> {
        let Some(parent_ids) = parent_ids else {
            return self.collect_folders(
                &format!("{FOLDER_SELECT_SQL} WHERE project_name = ?1 ORDER BY name, id;"),
                params![project_name],
                fields,
            );
        };

        let mut folders = Vec::new();
        let unique_ids: BTreeSet<&str> = parent_ids.iter().map(String::as_str).collect();
        for parent_id in unique_ids {
            let batch = if parent_id == project_name {
                self.collect_folders(
                    &format!(
                        "{FOLDER_SELECT_SQL}
                         WHERE project_name = ?1 AND parent_id IS NULL
                         ORDER BY name, id;"
                    ),
                    params![project_name],
                    fields,
                )?
            } else {
                self.collect_folders(
                    &format!(
                        "{FOLDER_SELECT_SQL}
                         WHERE project_name = ?1 AND parent_id = ?2
                         ORDER BY name, id;"
                    ),
                    params![project_name, parent_id],
                    fields,
                )?
            };
            folders.extend(batch);
        }
        Ok(folders)
    }

    fn get_tasks(
        &self,
        project_name: &str,
        folder_ids: Option<&[EntityId]>,
    ) -> ServerResult<Vec<TaskRecord>> {
        let Some(folder_ids) = folder_ids else {
            return self.collect_tasks(
                &format!("{TASK_SELECT_SQL} WHERE project_name = ?1 ORDER BY name, id;"),
                params![project_name],
            );
        };

        let mut tasks = Vec::new();
        let unique_ids: BTreeSet<&str> = folder_ids.iter().map(String::as_str).collect();
        for folder_id in unique_ids {
            tasks.extend(self.collect_tasks(
                &format!(
                    "{TASK_SELECT_SQL}
                     WHERE project_name = ?1 AND folder_id = ?2
                     ORDER BY name, id;"
                ),
                params![project_name, folder_id],
            )?);
        }
        Ok(tasks)
    }

    fn get_folder_by_id(
        &self,
        project_name: &str,
        folder_id: &str,
        fields: &[&str],
    ) -> ServerResult<Option<FolderRecord>> {
        load_folder(self.conn, project_name, folder_id, fields)
    }

    fn get_task_by_id(
        &self,
        project_name: &str,
        task_id: &str,
    ) -> ServerResult<Option<TaskRecord>> {
        load_task(self.conn, project_name, task_id)
    }

    fn get_attributes_for_type(&self, entity_type: EntityType) -> ServerResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM attribute_schema
             WHERE entity_type = ?1
             ORDER BY position, name;",
        )?;
        let keys = stmt
            .query_map(params![entity_type.as_str()], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    fn send_batch_operations(
        &self,
        project_name: &str,
        operations: &[Operation],
    ) -> ServerResult<()> {
        self.require_project(project_name)?;

        let tx = self.conn.unchecked_transaction()?;
        for (index, operation) in operations.iter().enumerate() {
            if let Err(err) = apply_operation(&tx, project_name, operation) {
                warn!(
                    "event=store_batch module=server status=rejected index={index} kind={:?} entity_type={} entity_id={}",
                    operation.kind, operation.entity_type, operation.entity_id
                );
                return Err(ServerError::Rejected(format!(
                    "operation #{index} ({:?} {} {}) failed: {err}",
                    operation.kind, operation.entity_type, operation.entity_id
                )));
            }
        }
        tx.commit()?;

        debug!(
            "event=store_batch module=server status=ok project={project_name} operations={}",
            operations.len()
        );
        Ok(())
    }

    fn patch_project(&self, project_name: &str, changes: &Changes) -> ServerResult<()> {
        let mut record = self.get_project(project_name)?.ok_or_else(|| {
            ServerError::Rejected(format!("project `{project_name}` does not exist"))
        })?;
        apply_project_changes(&mut record, changes)?;

        self.conn.execute(
            "UPDATE projects
             SET
                folder_types = ?1,
                task_types = ?2,
                attrib = ?3,
                data = ?4,
                active = ?5
             WHERE name = ?6;",
            params![
                descriptors_to_db(&record.folder_types)?,
                descriptors_to_db(&record.task_types)?,
                map_to_db(&record.own_attrib)?,
                data_to_db(record.data.as_ref())?,
                record.active,
                project_name,
            ],
        )?;
        Ok(())
    }
}

fn apply_operation(
    conn: &Connection,
    project_name: &str,
    operation: &Operation,
) -> ServerResult<()> {
    let entity_id = operation.entity_id.as_str();
    match (operation.kind, operation.entity_type) {
        (_, EntityType::Project) => Err(ServerError::Rejected(
            "project changes must go through patch_project".to_string(),
        )),
        (OperationKind::Create, EntityType::Folder) => {
            let record: FolderRecord = record_from_create(entity_id, required_data(operation)?)?;
            insert_folder_row(conn, project_name, &record)
        }
        (OperationKind::Create, EntityType::Task) => {
            let record: TaskRecord = record_from_create(entity_id, required_data(operation)?)?;
            insert_task_row(conn, project_name, &record)
        }
        (OperationKind::Update, EntityType::Folder) => {
            let mut record = load_folder(conn, project_name, entity_id, FULL_FOLDER_FIELDS)?
                .ok_or_else(|| not_found(EntityType::Folder, entity_id))?;
            apply_folder_changes(&mut record, required_data(operation)?)?;
            update_folder_row(conn, &record)
        }
        (OperationKind::Update, EntityType::Task) => {
            let mut record = load_task(conn, project_name, entity_id)?
                .ok_or_else(|| not_found(EntityType::Task, entity_id))?;
            apply_task_changes(&mut record, required_data(operation)?)?;
            update_task_row(conn, &record)
        }
        (OperationKind::Delete, entity_type) => {
            let table = match entity_type {
                EntityType::Folder => "folders",
                _ => "tasks",
            };
            let deleted = conn.execute(
                &format!("DELETE FROM {table} WHERE id = ?1 AND project_name = ?2;"),
                params![entity_id, project_name],
            )?;
            if deleted == 0 {
                return Err(not_found(entity_type, entity_id));
            }
            Ok(())
        }
    }
}

fn required_data(operation: &Operation) -> ServerResult<&Changes> {
    operation
        .data
        .as_ref()
        .ok_or_else(|| ServerError::Rejected("operation data is missing".to_string()))
}

fn not_found(entity_type: EntityType, entity_id: &str) -> ServerError {
    ServerError::Rejected(format!("{entity_type} `{entity_id}` does not exist"))
}

/// Maps a create body (`attrib` holds own attributes) onto a record.
fn record_from_create<T: serde::de::DeserializeOwned>(
    entity_id: &str,
    data: &Changes,
) -> ServerResult<T> {
    let mut body = data.clone();
    body.insert("id".to_string(), Value::String(entity_id.to_string()));
    if let Some(attrib) = body.remove("attrib") {
        body.insert("ownAttrib".to_string(), attrib);
    }
    serde_json::from_value(Value::Object(body))
        .map_err(|err| ServerError::Rejected(format!("invalid create body: {err}")))
}

fn apply_folder_changes(record: &mut FolderRecord, changes: &Changes) -> ServerResult<()> {
    for (key, value) in changes {
        if let Some(attribute) = key.strip_prefix("attrib.") {
            set_attribute(&mut record.own_attrib, attribute, value);
            continue;
        }
        match key.as_str() {
            "name" => record.name = string_field(key, value)?,
            "label" => record.label = optional_string_field(key, value)?,
            "folderType" => record.folder_type = string_field(key, value)?,
            "parentId" => record.parent_id = optional_string_field(key, value)?,
            "active" => record.active = bool_field(key, value)?,
            "thumbnailId" => record.thumbnail_id = optional_string_field(key, value)?,
            "data" => record.data = Some(value.clone()),
            other => return Err(unknown_field(EntityType::Folder, other)),
        }
    }
    Ok(())
}

fn apply_task_changes(record: &mut TaskRecord, changes: &Changes) -> ServerResult<()> {
    for (key, value) in changes {
        if let Some(attribute) = key.strip_prefix("attrib.") {
            set_attribute(&mut record.own_attrib, attribute, value);
            continue;
        }
        match key.as_str() {
            "name" => record.name = string_field(key, value)?,
            "label" => record.label = optional_string_field(key, value)?,
            "taskType" => record.task_type = string_field(key, value)?,
            "folderId" => record.folder_id = string_field(key, value)?,
            "active" => record.active = bool_field(key, value)?,
            "thumbnailId" => record.thumbnail_id = optional_string_field(key, value)?,
            "data" => record.data = Some(value.clone()),
            other => return Err(unknown_field(EntityType::Task, other)),
        }
    }
    Ok(())
}

fn apply_project_changes(record: &mut ProjectRecord, changes: &Changes) -> ServerResult<()> {
    for (key, value) in changes {
        if let Some(attribute) = key.strip_prefix("attrib.") {
            set_attribute(&mut record.own_attrib, attribute, value);
            continue;
        }
        match key.as_str() {
            "active" => record.active = bool_field(key, value)?,
            "data" => record.data = Some(value.clone()),
            "folderTypes" => record.folder_types = descriptors_field(key, value)?,
            "taskTypes" => record.task_types = descriptors_field(key, value)?,
            "name" | "code" | "library" => {
                return Err(ServerError::Rejected(format!(
                    "project field `{key}` is read-only"
                )))
            }
            other => return Err(unknown_field(EntityType::Project, other)),
        }
    }
    Ok(())
}

/// `null` clears the own value.
fn set_attribute(own_attrib: &mut Map<String, Value>, key: &str, value: &Value) {
    if value.is_null() {
        own_attrib.remove(key);
    } else {
        own_attrib.insert(key.to_string(), value.clone());
    }
}

fn unknown_field(entity_type: EntityType, key: &str) -> ServerError {
    ServerError::Rejected(format!("unknown {entity_type} field `{key}`"))
}

fn string_field(key: &str, value: &Value) -> ServerResult<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ServerError::Rejected(format!("field `{key}` must be a string")))
}

fn optional_string_field(key: &str, value: &Value) -> ServerResult<Option<String>> {
    if value.is_null() {
        return Ok(None);
    }
    string_field(key, value).map(Some)
}

fn bool_field(key: &str, value: &Value) -> ServerResult<bool> {
    value
        .as_bool()
        .ok_or_else(|| ServerError::Rejected(format!("field `{key}` must be a boolean")))
}

fn descriptors_field(key: &str, value: &Value) -> ServerResult<Vec<TypeDescriptor>> {
    serde_json::from_value(value.clone())
        .map_err(|err| ServerError::Rejected(format!("field `{key}` is invalid: {err}")))
}

fn collect_folders<P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
    fields: &[&str],
) -> ServerResult<Vec<FolderRecord>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params)?;
    let mut folders = Vec::new();
    while let Some(row) = rows.next()? {
        folders.push(parse_folder_row(row, fields)?);
    }
    Ok(folders)
}

fn load_folder(
    conn: &Connection,
    project_name: &str,
    folder_id: &str,
    fields: &[&str],
) -> ServerResult<Option<FolderRecord>> {
    let folders = collect_folders(
        conn,
        &format!("{FOLDER_SELECT_SQL} WHERE project_name = ?1 AND id = ?2;"),
        params![project_name, folder_id],
        fields,
    )?;
    Ok(folders.into_iter().next())
}

fn load_task(
    conn: &Connection,
    project_name: &str,
    task_id: &str,
) -> ServerResult<Option<TaskRecord>> {
    let mut stmt = conn.prepare(&format!(
        "{TASK_SELECT_SQL} WHERE project_name = ?1 AND id = ?2;"
    ))?;
    let mut rows = stmt.query(params![project_name, task_id])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_task_row(row)?));
    }
    Ok(None)
}

fn insert_folder_row(
    conn: &Connection,
    project_name: &str,
    record: &FolderRecord,
) -> ServerResult<()> {
    conn.execute(
        "INSERT INTO folders (
            id,
            project_name,
            parent_id,
            name,
            label,
            folder_type,
            attrib,
            data,
            active,
            thumbnail_id,
            has_products
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11);",
        params![
            record.id.as_str(),
            project_name,
            record.parent_id.as_deref(),
            record.name.as_str(),
            record.label.as_deref(),
            record.folder_type.as_str(),
            map_to_db(&record.own_attrib)?,
            data_to_db(record.data.as_ref())?,
            record.active,
            record.thumbnail_id.as_deref(),
            record.has_products,
        ],
    )?;
    Ok(())
}

fn insert_task_row(conn: &Connection, project_name: &str, record: &TaskRecord) -> ServerResult<()> {
    conn.execute(
        "INSERT INTO tasks (
            id,
            project_name,
            folder_id,
            name,
            label,
            task_type,
            attrib,
            data,
            active,
            thumbnail_id
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10);",
        params![
            record.id.as_str(),
            project_name,
            record.folder_id.as_str(),
            record.name.as_str(),
            record.label.as_deref(),
            record.task_type.as_str(),
            map_to_db(&record.own_attrib)?,
            data_to_db(record.data.as_ref())?,
            record.active,
            record.thumbnail_id.as_deref(),
        ],
    )?;
    Ok(())
}

fn update_folder_row(conn: &Connection, record: &FolderRecord) -> ServerResult<()> {
    conn.execute(
        "UPDATE folders
         SET
            parent_id = ?1,
            name = ?2,
            label = ?3,
            folder_type = ?4,
            attrib = ?5,
            data = ?6,
            active = ?7,
            thumbnail_id = ?8
         WHERE id = ?9;",
        params![
            record.parent_id.as_deref(),
            record.name.as_str(),
            record.label.as_deref(),
            record.folder_type.as_str(),
            map_to_db(&record.own_attrib)?,
            data_to_db(record.data.as_ref())?,
            record.active,
            record.thumbnail_id.as_deref(),
            record.id.as_str(),
        ],
    )?;
    Ok(())
}

fn update_task_row(conn: &Connection, record: &TaskRecord) -> ServerResult<()> {
    conn.execute(
        "UPDATE tasks
         SET
            folder_id = ?1,
            name = ?2,
            label = ?3,
            task_type = ?4,
            attrib = ?5,
            data = ?6,
            active = ?7,
            thumbnail_id = ?8
         WHERE id = ?9;",
        params![
            record.folder_id.as_str(),
            record.name.as_str(),
            record.label.as_deref(),
            record.task_type.as_str(),
            map_to_db(&record.own_attrib)?,
            data_to_db(record.data.as_ref())?,
            record.active,
            record.thumbnail_id.as_deref(),
            record.id.as_str(),
        ],
    )?;
    Ok(())
}

fn parse_project_row(row: &Row<'_>) -> ServerResult<ProjectRecord> {
    Ok(ProjectRecord {
        name: row.get(0)?,
        code: row.get(1)?,
        library: row.get(2)?,
        folder_types: serde_json::from_str(&row.get::<_, String>(3)?)?,
        task_types: serde_json::from_str(&row.get::<_, String>(4)?)?,
        own_attrib: map_from_db(&row.get::<_, String>(5)?)?,
        data: Some(serde_json::from_str(&row.get::<_, String>(6)?)?),
        active: row.get(7)?,
    })
}

fn parse_folder_row(row: &Row<'_>, fields: &[&str]) -> ServerResult<FolderRecord> {
    let data = if fields.contains(&DATA_FIELD) {
        Some(serde_json::from_str(&row.get::<_, String>(6)?)?)
    } else {
        None
    };
    let has_products = if fields
        .iter()
        .any(|field| *field == FOLDER_PUBLISHED_FIELD || *field == "hasSubsets")
    {
        row.get(9)?
    } else {
        false
    };
    Ok(FolderRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        label: row.get(2)?,
        folder_type: row.get(3)?,
        parent_id: row.get(4)?,
        own_attrib: map_from_db(&row.get::<_, String>(5)?)?,
        data,
        active: row.get(7)?,
        thumbnail_id: row.get(8)?,
        has_products,
    })
}

fn parse_task_row(row: &Row<'_>) -> ServerResult<TaskRecord> {
    Ok(TaskRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        label: row.get(2)?,
        task_type: row.get(3)?,
        folder_id: row.get(4)?,
        own_attrib: map_from_db(&row.get::<_, String>(5)?)?,
        data: Some(serde_json::from_str(&row.get::<_, String>(6)?)?),
        active: row.get(7)?,
        thumbnail_id: row.get(8)?,
    })
}

fn map_from_db(value: &str) -> ServerResult<Map<String, Value>> {
    match serde_json::from_str::<Value>(value)? {
        Value::Object(map) => Ok(map),
        other => Err(ServerError::InvalidData(format!(
            "expected JSON object, got `{other}`"
        ))),
    }
}

fn map_to_db(map: &Map<String, Value>) -> ServerResult<String> {
    Ok(serde_json::to_string(map)?)
}

fn data_to_db(data: Option<&Value>) -> ServerResult<String> {
    match data {
        Some(value) => Ok(serde_json::to_string(value)?),
        None => Ok("{}".to_string()),
    }
}

fn descriptors_to_db(types: &[TypeDescriptor]) -> ServerResult<String> {
    Ok(serde_json::to_string(types)?)
}
