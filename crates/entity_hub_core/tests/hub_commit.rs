mod common;

use common::{demo_server, hub, hydrated_hub, tree_server, PROJECT};
use entity_hub_core::{
    EntityError, EntityHub, EntityType, HubConfig, HubError, NewFolder, NewTask, Operation,
    OperationKind, ServerError, TypeDescriptor,
};
use serde_json::{json, Value};

fn position(operations: &[Operation], entity_id: &str) -> usize {
    operations
        .iter()
        .position(|operation| operation.entity_id == entity_id)
        .unwrap()
}

fn data_of(operation: &Operation) -> Value {
    Value::Object(operation.data.clone().unwrap())
}

#[test]
fn renaming_a_task_sends_a_single_update() {
    let server = demo_server();
    let mut hub = hydrated_hub(&server);

    hub.set_entity_name("T1", "Lighting").unwrap();
    let summary = hub.commit_changes().unwrap();

    assert_eq!(summary.updated, 1);
    assert_eq!(summary.created + summary.deleted, 0);
    let batches = server.sent_batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(
        serde_json::to_value(&batches[0]).unwrap(),
        json!([{
            "type": "update",
            "entityType": "task",
            "entityId": "T1",
            "data": {"name": "Lighting"}
        }])
    );
    assert!(server.project_patches.borrow().is_empty());
}

#[test]
fn new_folder_and_task_are_created_parent_first() {
    let server = demo_server();
    let mut hub = hydrated_hub(&server);

    let folder_id = hub
        .add_new_folder(NewFolder::new("seq01", "Sequence", PROJECT))
        .unwrap();
    let task_id = hub
        .add_new_task(NewTask::new("track", "Tracking", folder_id.as_str()))
        .unwrap();
    let summary = hub.commit_changes().unwrap();

    assert_eq!(summary.created, 2);
    let batch = server.last_batch();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch[0].kind, OperationKind::Create);
    assert_eq!(batch[0].entity_type, EntityType::Folder);
    assert_eq!(batch[0].entity_id, folder_id);
    assert_eq!(
        data_of(&batch[0]),
        json!({"name": "seq01", "folderType": "Sequence", "parentId": null, "active": true})
    );
    assert_eq!(batch[1].kind, OperationKind::Create);
    assert_eq!(batch[1].entity_type, EntityType::Task);
    assert_eq!(batch[1].entity_id, task_id);
    assert_eq!(
        data_of(&batch[1]),
        json!({"name": "track", "taskType": "Tracking", "folderId": folder_id, "active": true})
    );

    assert!(hub.entities().all(|entity| !entity.created()));
}

#[test]
fn second_commit_sends_nothing() {
    let server = demo_server();
    let mut hub = hydrated_hub(&server);

    hub.set_entity_name("T1", "Lighting").unwrap();
    hub.add_new_folder(NewFolder::new("seq01", "Sequence", PROJECT))
        .unwrap();
    hub.commit_changes().unwrap();

    let summary = hub.commit_changes().unwrap();
    assert!(summary.is_empty());
    assert_eq!(server.sent_batches().len(), 1);
    assert!(hub.entities().all(|entity| entity.changes().is_empty()));
}

#[test]
fn unchanged_entities_produce_no_operations() {
    let server = tree_server();
    let mut hub = hydrated_hub(&server);

    hub.set_entity_name("F5", "assets").unwrap();
    hub.get_entity_by_id_mut("F4")
        .unwrap()
        .attribs_mut()
        .set("fps", 25)
        .unwrap();
    hub.commit_changes().unwrap();

    let batch = server.last_batch();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].entity_id, "F4");
    assert_eq!(data_of(&batch[0]), json!({"attrib.fps": 25}));
}

#[test]
fn restoring_baseline_values_is_not_a_change() {
    let server = tree_server();
    let mut hub = hydrated_hub(&server);

    hub.set_entity_name("F4", "sq03").unwrap();
    hub.set_entity_name("F4", "sq02").unwrap();
    hub.set_entity_parent("F4", "F5").unwrap();
    hub.set_entity_parent("F4", "F1").unwrap();
    let folder = hub.get_entity_by_id_mut("F4").unwrap();
    folder.attribs_mut().set("fps", 25).unwrap();
    folder.attribs_mut().set("fps", Value::Null).unwrap();
    folder.set_active(false);
    folder.set_active(true);

    assert!(hub.get_entity_by_id("F4").unwrap().changes().is_empty());
    let summary = hub.commit_changes().unwrap();
    assert!(summary.is_empty());
    assert!(server.sent_batches().is_empty());
}

#[test]
fn data_changes_follow_hub_setting() {
    let server = demo_server();
    let mut hub = hydrated_hub(&server);
    hub.get_entity_by_id_mut("F1")
        .unwrap()
        .set_data(json!({"note": "locked"}));
    assert!(hub.commit_changes().unwrap().is_empty());

    let mut hub = EntityHub::new(HubConfig::new(PROJECT).with_data_changes(true), &server);
    hub.query_entities_from_server().unwrap();
    hub.get_entity_by_id_mut("F1")
        .unwrap()
        .set_data(json!({"note": "locked"}));
    hub.commit_changes().unwrap();

    let batch = server.last_batch();
    assert_eq!(batch.len(), 1);
    assert_eq!(data_of(&batch[0]), json!({"data": {"note": "locked"}}));
}

#[test]
fn reparented_and_renamed_folder_sends_one_update() {
    let server = tree_server();
    let mut hub = hydrated_hub(&server);

    hub.set_entity_parent("F4", "F5").unwrap();
    hub.set_entity_name("F4", "sq03").unwrap();
    hub.set_entity_parent("F2", PROJECT).unwrap();
    hub.commit_changes().unwrap();

    let batch = server.last_batch();
    assert_eq!(batch.len(), 2);
    let moved = &batch[position(&batch, "F4")];
    assert_eq!(moved.kind, OperationKind::Update);
    assert_eq!(data_of(moved), json!({"name": "sq03", "parentId": "F5"}));
    let to_root = &batch[position(&batch, "F2")];
    assert_eq!(data_of(to_root), json!({"parentId": null}));
}

#[test]
fn created_ancestors_precede_updates_that_reference_them() {
    let server = tree_server();
    let mut hub = hydrated_hub(&server);

    let outer = hub
        .add_new_folder(NewFolder::new("episodes", "Folder", "F1"))
        .unwrap();
    let inner = hub
        .add_new_folder(NewFolder::new("ep01", "Folder", outer.as_str()))
        .unwrap();
    hub.set_entity_parent("F4", &inner).unwrap();
    hub.set_entity_parent("T1", "F4").unwrap();
    hub.commit_changes().unwrap();

    let batch = server.last_batch();
    assert_eq!(batch.len(), 4);
    assert!(position(&batch, &outer) < position(&batch, &inner));
    assert!(position(&batch, &inner) < position(&batch, "F4"));
    assert_eq!(
        batch
            .iter()
            .filter(|operation| operation.kind == OperationKind::Create)
            .count(),
        2
    );
    assert_eq!(
        data_of(&batch[position(&batch, "T1")]),
        json!({"folderId": "F4"})
    );
}

#[test]
fn removed_subtree_is_deleted_children_first() {
    let server = tree_server();
    let mut hub = hydrated_hub(&server);

    hub.remove_entity("F2").unwrap();
    let summary = hub.commit_changes().unwrap();

    assert_eq!(summary.deleted, 3);
    assert_eq!(
        server.last_batch(),
        vec![
            Operation::delete(EntityType::Task, "T1"),
            Operation::delete(EntityType::Folder, "F3"),
            Operation::delete(EntityType::Folder, "F2"),
        ]
    );
    for entity_id in ["F2", "F3", "T1"] {
        assert!(hub.get_entity_by_id(entity_id).is_none());
    }
    assert_eq!(hub.children_in_cache("F1"), ["F4".to_string()]);
}

#[test]
fn removed_new_entities_are_discarded_silently() {
    let server = tree_server();
    let mut hub = hydrated_hub(&server);

    let folder_id = hub
        .add_new_folder(NewFolder::new("tmp", "Folder", "F1"))
        .unwrap();
    let task_id = hub
        .add_new_task(NewTask::new("scratch", "Tracking", folder_id.as_str()))
        .unwrap();
    hub.remove_entity(&folder_id).unwrap();
    let summary = hub.commit_changes().unwrap();

    assert_eq!(summary.discarded, 2);
    assert!(summary.is_empty());
    assert!(server.sent_batches().is_empty());
    assert!(hub.get_entity_by_id(&folder_id).is_none());
    assert!(hub.get_entity_by_id(&task_id).is_none());
}

#[test]
fn commit_works_on_a_partially_loaded_hub() {
    let server = tree_server();
    let mut hub = hub(&server);

    hub.get_task_by_id("T1", true).unwrap();
    hub.set_entity_name("T1", "Lighting").unwrap();
    hub.commit_changes().unwrap();

    assert_eq!(
        server.last_batch(),
        vec![Operation::update(
            EntityType::Task,
            "T1",
            json!({"name": "Lighting"}).as_object().cloned().unwrap()
        )]
    );
}

#[test]
fn failed_send_leaves_changes_pending() {
    let server = demo_server();
    let mut hub = hydrated_hub(&server);

    hub.set_entity_name("T1", "Lighting").unwrap();
    let folder_id = hub
        .add_new_folder(NewFolder::new("seq01", "Sequence", PROJECT))
        .unwrap();
    server.fail_sends.set(true);

    let err = hub.commit_changes().unwrap_err();
    assert!(matches!(err, HubError::Server(ServerError::Transport(_))));
    assert!(hub.get_entity_by_id(&folder_id).unwrap().created());
    assert_eq!(
        Value::Object(hub.get_entity_by_id("T1").unwrap().changes()),
        json!({"name": "Lighting"})
    );

    server.fail_sends.set(false);
    let summary = hub.commit_changes().unwrap();
    assert_eq!((summary.created, summary.updated), (1, 1));
}

#[test]
fn missing_name_aborts_before_sending() {
    let server = demo_server();
    let mut hub = hydrated_hub(&server);

    hub.set_entity_name("T1", "Lighting").unwrap();
    let mut request = NewFolder::new("unused", "Folder", PROJECT);
    request.name = None;
    let folder_id = hub.add_new_folder(request).unwrap();

    let err = hub.commit_changes().unwrap_err();
    assert!(matches!(
        err,
        HubError::Entity(EntityError::MissingField { ref entity_id, field: "name" })
            if *entity_id == folder_id
    ));
    assert!(server.sent_batches().is_empty());
    assert!(!hub.get_entity_by_id("T1").unwrap().changes().is_empty());
}

#[test]
fn project_changes_are_patched_separately() {
    let server = demo_server();
    let mut hub = hydrated_hub(&server);

    let mut folder_types = hub
        .project()
        .unwrap()
        .as_project()
        .unwrap()
        .folder_types()
        .to_vec();
    folder_types.push(TypeDescriptor::new("Episode"));
    hub.get_entity_by_id_mut(PROJECT)
        .unwrap()
        .as_project_mut()
        .unwrap()
        .set_folder_types(folder_types);
    hub.set_entity_name("F1", "shots_v2").unwrap();

    let summary = hub.commit_changes().unwrap();
    assert!(summary.project_patched);
    assert_eq!(summary.updated, 1);

    let patches = server.project_patches.borrow();
    assert_eq!(patches.len(), 1);
    let folder_types = patches[0]["folderTypes"].as_array().unwrap();
    assert_eq!(folder_types.len(), 4);
    assert_eq!(folder_types[3], json!({"name": "Episode"}));
    assert!(server
        .last_batch()
        .iter()
        .all(|operation| operation.entity_type != EntityType::Project));
}
