//! Remote entity records.
//!
//! Shapes returned by an `EntityServer`. Field names follow the server's
//! camelCase schema.

use crate::model::entity::EntityId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Folder or task type descriptor from a project catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Server fields this crate does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            short_name: None,
            icon: None,
            extra: Map::new(),
        }
    }

    /// Server representation of the descriptor.
    pub fn to_value(&self) -> Value {
        let mut output = self.extra.clone();
        output.insert("name".to_string(), Value::String(self.name.clone()));
        if let Some(short_name) = &self.short_name {
            output.insert("shortName".to_string(), Value::String(short_name.clone()));
        }
        if let Some(icon) = &self.icon {
            output.insert("icon".to_string(), Value::String(icon.clone()));
        }
        Value::Object(output)
    }
}

/// Project record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub library: bool,
    #[serde(default)]
    pub folder_types: Vec<TypeDescriptor>,
    #[serde(default)]
    pub task_types: Vec<TypeDescriptor>,
    #[serde(default)]
    pub own_attrib: Map<String, Value>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default = "default_active")]
    pub active: bool,
}

/// Folder record. `parent_id == None` means a root-level folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderRecord {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    pub folder_type: String,
    #[serde(default)]
    pub parent_id: Option<EntityId>,
    #[serde(default)]
    pub own_attrib: Map<String, Value>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub thumbnail_id: Option<String>,
    /// Folder has published products below it.
    #[serde(default, alias = "hasSubsets")]
    pub has_products: bool,
}

/// Task record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    pub task_type: String,
    pub folder_id: EntityId,
    #[serde(default)]
    pub own_attrib: Map<String, Value>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub thumbnail_id: Option<String>,
}

fn default_active() -> bool {
    true
}
