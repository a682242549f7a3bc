//! Structural edits and the immutability memo.
//!
//! # Invariants
//! - Reparenting never creates a cycle.
//! - Entities that are immutable for hierarchy are never renamed, moved or
//!   removed.
//! - Every parent change invalidates the memo on both ancestor chains.
//! - Memo computation and invalidation use explicit queues, never recursion.

use super::{check_parent_type, normalize_name, EntityHub, HubError, HubResult};
use crate::model::entity::{EntityType, ParentLink};
use crate::server::EntityServer;
use log::debug;
use std::collections::{HashSet, VecDeque};

impl<S: EntityServer> EntityHub<S> {
    /// Moves an entity under a new parent.
    ///
    /// The parent is resolved from the cache or queried by id.
    ///
    /// # Errors
    /// - `EntityNotFound` when the entity is not cached.
    /// - `ProjectParent` for the project.
    /// - `ParentNotFound`, `ChildrenNotAllowed` or `InvalidParentType`.
    /// - `CycleDetected` when the parent lies inside the entity's subtree.
    /// - `ImmutableForHierarchy` when the subtree holds published content.
    pub fn set_entity_parent(&mut self, entity_id: &str, parent_id: &str) -> HubResult<()> {
        let entity = self.entity(entity_id)?;
        let entity_type = entity.entity_type();
        if entity_type == EntityType::Project {
            return Err(HubError::ProjectParent(entity_id.to_string()));
        }
        if entity.parent_id() == Some(parent_id) {
            return Ok(());
        }

        self.validate_parent(entity_id, entity_type, parent_id)?;
        if self.would_create_cycle(entity_id, parent_id) {
            return Err(HubError::CycleDetected {
                entity_id: entity_id.to_string(),
                parent_id: parent_id.to_string(),
            });
        }
        if self.immutable_for_hierarchy(entity_id)? {
            return Err(HubError::ImmutableForHierarchy(entity_id.to_string()));
        }

        debug!(
            "event=entity_reparent module=hub entity_id={entity_id} parent_id={parent_id}"
        );
        self.move_entity(entity_id, ParentLink::Parent(parent_id.to_string()))
    }

    /// Detaches an entity from `parent_id`, marking it removed.
    ///
    /// Returns `false` for a stale call (entity missing or attached
    /// elsewhere); the parent's child list and the index are still cleaned.
    pub fn unset_entity_parent(&mut self, entity_id: &str, parent_id: &str) -> HubResult<bool> {
        let attached = self
            .table
            .get(entity_id)
            .is_some_and(|entity| entity.parent_id() == Some(parent_id));
        if !attached {
            debug!(
                "event=entity_detach module=hub status=stale entity_id={entity_id} parent_id={parent_id}"
            );
            self.table.unlink_child(parent_id, entity_id);
            self.reset_immutable_for_hierarchy_cache(parent_id, true);
            return Ok(false);
        }
        if self.immutable_for_hierarchy(entity_id)? {
            return Err(HubError::ImmutableForHierarchy(entity_id.to_string()));
        }

        debug!("event=entity_detach module=hub status=ok entity_id={entity_id} parent_id={parent_id}");
        self.move_entity(entity_id, ParentLink::Removed)?;
        Ok(true)
    }

    /// Detaches an entity from its current parent. It is deleted on commit.
    pub fn remove_entity(&mut self, entity_id: &str) -> HubResult<()> {
        let parent = self.entity(entity_id)?.parent().clone();
        match parent {
            ParentLink::ProjectRoot => Err(HubError::ProjectParent(entity_id.to_string())),
            ParentLink::Removed => Ok(()),
            ParentLink::Parent(parent_id) => {
                self.unset_entity_parent(entity_id, &parent_id)?;
                Ok(())
            }
            ParentLink::Unassigned => {
                if self.immutable_for_hierarchy(entity_id)? {
                    return Err(HubError::ImmutableForHierarchy(entity_id.to_string()));
                }
                self.move_entity(entity_id, ParentLink::Removed)
            }
        }
    }

    pub fn add_child(&mut self, parent_id: &str, child_id: &str) -> HubResult<()> {
        self.set_entity_parent(child_id, parent_id)
    }

    pub fn remove_child(&mut self, parent_id: &str, child_id: &str) -> HubResult<bool> {
        self.unset_entity_parent(child_id, parent_id)
    }

    /// Renames an entity. Names are trimmed; blank names are rejected.
    pub fn set_entity_name(&mut self, entity_id: &str, name: &str) -> HubResult<()> {
        let entity = self.entity(entity_id)?;
        if entity.entity_type() == EntityType::Project {
            return Err(HubError::InvalidName {
                entity_id: entity_id.to_string(),
                reason: "the project cannot be renamed",
            });
        }
        let name = normalize_name(entity_id, name)?;
        if entity.name() == Some(name.as_str()) {
            return Ok(());
        }
        if self.immutable_for_hierarchy(entity_id)? {
            return Err(HubError::ImmutableForHierarchy(entity_id.to_string()));
        }
        self.entity_mut(entity_id)?.set_name(name);
        Ok(())
    }

    /// Updates a folder's published-content flag and invalidates ancestors.
    pub fn set_has_published_content(
        &mut self,
        entity_id: &str,
        has_published_content: bool,
    ) -> HubResult<()> {
        let entity = self.entity_mut(entity_id)?;
        let actual = entity.entity_type();
        if actual != EntityType::Folder {
            return Err(HubError::WrongEntityType {
                entity_id: entity_id.to_string(),
                expected: EntityType::Folder,
                actual,
            });
        }
        if entity.set_has_published_content(has_published_content) {
            self.reset_immutable_for_hierarchy_cache(entity_id, true);
        }
        Ok(())
    }

    /// Whether the entity or any descendant holds published content.
    ///
    /// Unknown children are queried. Results are memoized per entity until
    /// invalidated or locked.
    pub fn immutable_for_hierarchy(&mut self, entity_id: &str) -> HubResult<bool> {
        if let Some(cached) = self.entity(entity_id)?.cached_immutable_for_hierarchy() {
            return Ok(cached);
        }

        // Post-order walk: a node is resolved once all its children are.
        let mut stack = vec![(entity_id.to_string(), false)];
        while let Some((id, expanded)) = stack.pop() {
            let Some(entity) = self.table.get(&id) else {
                continue;
            };
            if entity.cached_immutable_for_hierarchy().is_some() {
                continue;
            }
            if let Some(own) = entity.own_immutable_for_hierarchy() {
                self.set_memo(&id, own);
                continue;
            }
            if expanded {
                let immutable = self.table.children_of(&id).iter().any(|child_id| {
                    self.table
                        .get(child_id)
                        .and_then(|child| child.cached_immutable_for_hierarchy())
                        == Some(true)
                });
                self.set_memo(&id, immutable);
                continue;
            }

            self.ensure_children_loaded(&id)?;
            let pending: Vec<String> = self
                .table
                .children_of(&id)
                .iter()
                .filter(|child_id| {
                    self.table
                        .get(child_id.as_str())
                        .is_some_and(|child| child.cached_immutable_for_hierarchy().is_none())
                })
                .cloned()
                .collect();
            stack.push((id, true));
            stack.extend(pending.into_iter().map(|child_id| (child_id, false)));
        }

        Ok(self
            .entity(entity_id)?
            .cached_immutable_for_hierarchy()
            .unwrap_or(false))
    }

    /// Clears memoized immutability breadth-first.
    ///
    /// `bottom_to_top` walks the ancestor chain; otherwise the subtree.
    pub fn reset_immutable_for_hierarchy_cache(&mut self, entity_id: &str, bottom_to_top: bool) {
        let mut queue = VecDeque::from([entity_id.to_string()]);
        let mut seen = HashSet::new();
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            let Some(entity) = self.table.get_mut(&id) else {
                continue;
            };
            entity.set_immutable_for_hierarchy_cache(None);
            if bottom_to_top {
                if let Some(parent_id) = entity.parent_id() {
                    queue.push_back(parent_id.to_string());
                }
            } else {
                queue.extend(self.table.children_of(&id).iter().cloned());
            }
        }
    }

    /// Resolves `parent_id` and checks it may hold an `entity_type`.
    pub(super) fn validate_parent(
        &mut self,
        entity_id: &str,
        entity_type: EntityType,
        parent_id: &str,
    ) -> HubResult<()> {
        if !self.resolve_entity(parent_id, entity_type.parent_entity_types())? {
            return Err(HubError::ParentNotFound {
                entity_id: entity_id.to_string(),
                parent_id: parent_id.to_string(),
            });
        }
        check_parent_type(entity_id, entity_type, self.entity(parent_id)?)
    }

    /// Relinks without checks and invalidates both ancestor chains.
    pub(super) fn move_entity(&mut self, entity_id: &str, link: ParentLink) -> HubResult<()> {
        let previous = self
            .table
            .relink(entity_id, link.clone())
            .ok_or_else(|| HubError::EntityNotFound(entity_id.to_string()))?;
        if let Some(old_parent_id) = previous.id() {
            self.reset_immutable_for_hierarchy_cache(old_parent_id, true);
        }
        if let Some(new_parent_id) = link.id() {
            self.reset_immutable_for_hierarchy_cache(new_parent_id, true);
        }
        Ok(())
    }

    fn would_create_cycle(&self, entity_id: &str, parent_id: &str) -> bool {
        let mut current = Some(parent_id);
        for _ in 0..=self.table.len() {
            let Some(id) = current else {
                return false;
            };
            if id == entity_id {
                return true;
            }
            current = self.table.get(id).and_then(|entity| entity.parent_id());
        }
        false
    }

    fn set_memo(&mut self, entity_id: &str, immutable: bool) {
        if let Some(entity) = self.table.get_mut(entity_id) {
            entity.set_immutable_for_hierarchy_cache(Some(immutable));
        }
    }
}
