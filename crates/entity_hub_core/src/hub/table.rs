//! Entity arena and parent index.
//!
//! # Invariants
//! - An entity with `ParentLink::Parent(p)` is listed in
//!   `children_by_parent[p]`, and every id listed there points back to `p`.
//! - When a cached parent has `Loaded::Known` children, that list matches
//!   its index entry.
//! - `order` lists every cached id once, in insertion order.

use crate::model::entity::{Entity, EntityId, ParentLink};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub(crate) struct EntityTable {
    entities: HashMap<EntityId, Entity>,
    order: Vec<EntityId>,
    children_by_parent: HashMap<EntityId, Vec<EntityId>>,
    project_id: Option<EntityId>,
}

impl EntityTable {
    pub(crate) fn get(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut Entity> {
        self.entities.get_mut(id)
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entities.len()
    }

    pub(crate) fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    /// Cached entities in insertion order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.order.iter().filter_map(|id| self.entities.get(id))
    }

    /// Ids indexed under `parent_id`, whether or not the parent is cached.
    pub(crate) fn children_of(&self, parent_id: &str) -> &[EntityId] {
        self.children_by_parent
            .get(parent_id)
            .map_or(&[], Vec::as_slice)
    }

    /// Inserts an entity and wires it into the index.
    ///
    /// Callers guarantee the id is not cached yet.
    pub(crate) fn insert(&mut self, entity: Entity) {
        let id = entity.id().to_string();
        if matches!(entity.parent(), ParentLink::ProjectRoot) {
            self.project_id = Some(id.clone());
        }
        let parent_id = entity.parent_id().map(str::to_string);

        self.order.push(id.clone());
        self.entities.insert(id.clone(), entity);

        // Children cached before their parent arrive through the index.
        let early_children = self.children_of(&id).to_vec();
        if let Some(entity) = self.entities.get_mut(&id) {
            for child_id in &early_children {
                entity.insert_child_id(child_id);
            }
        }

        if let Some(parent_id) = parent_id {
            self.link_child(&parent_id, &id);
        }
    }

    /// Moves `id` to a new parent link and returns the previous one.
    pub(crate) fn relink(&mut self, id: &str, link: ParentLink) -> Option<ParentLink> {
        let entity = self.entities.get_mut(id)?;
        let previous = entity.parent().clone();
        entity.set_parent(link.clone());

        if let Some(old_parent_id) = previous.id() {
            self.unlink_child(old_parent_id, id);
        }
        if let Some(new_parent_id) = link.id() {
            self.link_child(new_parent_id, id);
        }
        Some(previous)
    }

    /// Removes `child_id` from the parent's index entry and cached child list.
    pub(crate) fn unlink_child(&mut self, parent_id: &str, child_id: &str) {
        if let Some(children) = self.children_by_parent.get_mut(parent_id) {
            children.retain(|id| id != child_id);
            if children.is_empty() {
                self.children_by_parent.remove(parent_id);
            }
        }
        if let Some(parent) = self.entities.get_mut(parent_id) {
            parent.remove_child_id(child_id);
        }
    }

    /// Marks the parent's children as fully known, using the index.
    pub(crate) fn fill_children(&mut self, parent_id: &str) {
        let children = self.children_of(parent_id).to_vec();
        if let Some(parent) = self.entities.get_mut(parent_id) {
            parent.fill_children_ids(children);
        }
    }

    /// Drops an entity, its index entries and its own child bucket.
    pub(crate) fn remove(&mut self, id: &str) -> Option<Entity> {
        let entity = self.entities.remove(id)?;
        self.order.retain(|cached_id| cached_id != id);
        if let Some(parent_id) = entity.parent_id() {
            self.unlink_child(parent_id, id);
        }
        self.children_by_parent.remove(id);
        if self.project_id.as_deref() == Some(id) {
            self.project_id = None;
        }
        Some(entity)
    }

    /// Entities whose parent is not a cached entity. The project comes first.
    pub(crate) fn roots(&self) -> Vec<EntityId> {
        let mut roots: Vec<EntityId> = self.project_id.iter().cloned().collect();
        for entity in self.iter() {
            if self.project_id.as_deref() == Some(entity.id()) {
                continue;
            }
            let has_cached_parent = entity
                .parent_id()
                .is_some_and(|parent_id| self.entities.contains_key(parent_id));
            if !has_cached_parent {
                roots.push(entity.id().to_string());
            }
        }
        roots
    }

    pub(crate) fn lock_all(&mut self) {
        for entity in self.entities.values_mut() {
            entity.lock();
        }
    }

    fn link_child(&mut self, parent_id: &str, child_id: &str) {
        let children = self
            .children_by_parent
            .entry(parent_id.to_string())
            .or_default();
        if !children.iter().any(|id| id == child_id) {
            children.push(child_id.to_string());
        }
        if let Some(parent) = self.entities.get_mut(parent_id) {
            parent.insert_child_id(child_id);
        }
    }
}
