//! Diff and synchronization engine.
//!
//! # Responsibility
//! - Classify cached entities into removed, created and existing.
//! - Build one ordered operation batch from their changes.
//! - Apply the outcome to the cache only after the store accepted it.
//!
//! # Invariants
//! - A created parent is emitted before any operation referencing it.
//! - Deletes run deepest-first; never-synced removed entities send nothing.
//! - Unchanged entities contribute no operations.
//! - Any failure before or during sending leaves the cache untouched.

use super::{EntityHub, HubResult};
use crate::model::entity::{EntityId, EntityType};
use crate::model::operation::{Changes, Operation, OperationKind};
use crate::server::EntityServer;
use log::{error, info};
use std::collections::{HashSet, VecDeque};
use std::time::Instant;

/// Outcome of a successful commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Removed entities that never reached the server.
    pub discarded: usize,
    pub project_patched: bool,
}

impl CommitSummary {
    /// No remote call was made.
    pub fn is_empty(&self) -> bool {
        self.created == 0 && self.updated == 0 && self.deleted == 0 && !self.project_patched
    }
}

/// Entities in breadth-first visitation order, split by state.
#[derive(Debug, Default)]
struct Classification {
    created: Vec<EntityId>,
    existing: Vec<EntityId>,
    removed: Vec<EntityId>,
}

#[derive(Debug, Default)]
struct CommitPlan {
    operations: Vec<Operation>,
    project_changes: Option<Changes>,
    removed: Vec<EntityId>,
    discarded: usize,
}

impl<S: EntityServer> EntityHub<S> {
    /// Sends every local change to the server as one ordered batch.
    ///
    /// Project changes are sent first through `patch_project`. On success
    /// removed entities are dropped and every survivor is locked.
    ///
    /// # Errors
    /// - `HubError::Entity` when a created entity lacks its name or parent;
    ///   nothing is sent.
    /// - `HubError::Server` when the store refuses; nothing is locked.
    pub fn commit_changes(&mut self) -> HubResult<CommitSummary> {
        let started_at = Instant::now();
        let project_name = self.context.project_name.clone();

        let plan = self.plan_commit()?;
        let summary = CommitSummary {
            created: count_kind(&plan.operations, OperationKind::Create),
            updated: count_kind(&plan.operations, OperationKind::Update),
            deleted: count_kind(&plan.operations, OperationKind::Delete),
            discarded: plan.discarded,
            project_patched: plan.project_changes.is_some(),
        };
        info!(
            "event=hub_commit module=hub status=start project={project_name} operations={} project_patch={}",
            plan.operations.len(),
            summary.project_patched
        );

        if let Err(err) = self.send_plan(&project_name, &plan) {
            error!(
                "event=hub_commit module=hub status=error project={project_name} duration_ms={} error={err}",
                started_at.elapsed().as_millis()
            );
            return Err(err);
        }

        for entity_id in &plan.removed {
            self.table.remove(entity_id);
        }
        self.table.lock_all();

        info!(
            "event=hub_commit module=hub status=ok project={project_name} created={} updated={} deleted={} discarded={} duration_ms={}",
            summary.created,
            summary.updated,
            summary.deleted,
            summary.discarded,
            started_at.elapsed().as_millis()
        );
        Ok(summary)
    }

    fn send_plan(&self, project_name: &str, plan: &CommitPlan) -> HubResult<()> {
        if let Some(changes) = &plan.project_changes {
            self.server.patch_project(project_name, changes)?;
        }
        if !plan.operations.is_empty() {
            self.server
                .send_batch_operations(project_name, &plan.operations)?;
        }
        Ok(())
    }

    /// Builds the batch without touching the cache.
    fn plan_commit(&self) -> HubResult<CommitPlan> {
        let classification = self.classify();
        let created: HashSet<&str> = classification
            .created
            .iter()
            .map(String::as_str)
            .collect();
        let mut emitted: HashSet<&str> = HashSet::new();
        let mut plan = CommitPlan::default();

        for entity_id in &classification.existing {
            let entity = self.entity(entity_id)?;
            let changes = entity.changes();
            if changes.is_empty() {
                continue;
            }
            if entity.entity_type() == EntityType::Project {
                plan.project_changes = Some(changes);
                continue;
            }

            // Created ancestors go first, root-most ancestor leading.
            let mut bodies = vec![Operation::update(
                entity.entity_type(),
                entity.id(),
                changes,
            )];
            let mut ancestor_id = entity.parent_id();
            while let Some(parent_id) = ancestor_id {
                if !created.contains(parent_id) || emitted.contains(parent_id) {
                    break;
                }
                let parent = self.entity(parent_id)?;
                bodies.push(self.create_operation(parent_id)?);
                emitted.insert(parent.id());
                ancestor_id = parent.parent_id();
            }
            plan.operations.extend(bodies.into_iter().rev());
        }

        for entity_id in &classification.created {
            if emitted.insert(entity_id.as_str()) {
                plan.operations.push(self.create_operation(entity_id)?);
            }
        }

        for entity_id in classification.removed.iter().rev() {
            let entity = self.entity(entity_id)?;
            if entity.created() {
                plan.discarded += 1;
            } else {
                plan.operations
                    .push(Operation::delete(entity.entity_type(), entity.id()));
            }
        }
        plan.removed = classification.removed;

        Ok(plan)
    }

    /// Breadth-first walk from the roots. Descendants of a removed entity
    /// are removed as well.
    fn classify(&self) -> Classification {
        let mut classification = Classification::default();
        let mut visited: HashSet<EntityId> = HashSet::new();
        let mut queue: VecDeque<(EntityId, bool)> = self
            .table
            .roots()
            .into_iter()
            .map(|entity_id| (entity_id, false))
            .collect();

        while let Some((entity_id, ancestor_removed)) = queue.pop_front() {
            if !visited.insert(entity_id.clone()) {
                continue;
            }
            let Some(entity) = self.table.get(&entity_id) else {
                continue;
            };
            let removed = ancestor_removed || entity.removed();
            queue.extend(
                self.table
                    .children_of(&entity_id)
                    .iter()
                    .map(|child_id| (child_id.clone(), removed)),
            );

            if removed {
                classification.removed.push(entity_id);
            } else if entity.created() {
                classification.created.push(entity_id);
            } else {
                classification.existing.push(entity_id);
            }
        }
        classification
    }

    fn create_operation(&self, entity_id: &str) -> HubResult<Operation> {
        let entity = self.entity(entity_id)?;
        let data = entity.to_create_body_data()?;
        Ok(Operation::create(entity.entity_type(), entity.id(), data))
    }
}

fn count_kind(operations: &[Operation], kind: OperationKind) -> usize {
    operations
        .iter()
        .filter(|operation| operation.kind == kind)
        .count()
}
