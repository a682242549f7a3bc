//! Batch operation records sent to the remote store.

use crate::model::entity::{EntityId, EntityType};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field deltas keyed by server field name (`name`, `attrib.fps`, ...).
pub type Changes = Map<String, Value>;

/// Operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

/// One record of an ordered operation batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    #[serde(rename = "type")]
    pub kind: OperationKind,
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Changes>,
}

impl Operation {
    pub fn create(entity_type: EntityType, entity_id: impl Into<EntityId>, data: Changes) -> Self {
        Self {
            kind: OperationKind::Create,
            entity_type,
            entity_id: entity_id.into(),
            data: Some(data),
        }
    }

    pub fn update(entity_type: EntityType, entity_id: impl Into<EntityId>, data: Changes) -> Self {
        Self {
            kind: OperationKind::Update,
            entity_type,
            entity_id: entity_id.into(),
            data: Some(data),
        }
    }

    pub fn delete(entity_type: EntityType, entity_id: impl Into<EntityId>) -> Self {
        Self {
            kind: OperationKind::Delete,
            entity_type,
            entity_id: entity_id.into(),
            data: None,
        }
    }
}
