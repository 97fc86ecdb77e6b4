#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{fixture, fixture_with, AuditEntry, Note, ScriptedEngine};
use serde_json::json;
use std::sync::atomic::Ordering;
use tandem_core::{ErrorKind, DEFAULT_CONFIGURATION};

#[test]
fn test_saved_changes_reach_reader_only_after_merge() {
    let fx = fixture_with(ScriptedEngine::new(), false);
    fx.stack.add_in_memory_store(None).unwrap();
    let read = fx.stack.read_context();

    assert_eq!(read.get("Tag", "a").unwrap(), None);

    let summary = fx
        .stack
        .write_context()
        .perform_and_wait(|scope| {
            scope.put("Tag", "a", json!({"label": "first"}))?;
            scope.put("Tag", "b", json!({"label": "second"}))?;
            scope.save()
        })
        .unwrap()
        .unwrap();
    assert_eq!(summary.generation, 1);
    assert_eq!(summary.change_count, 2);
    assert_eq!(summary.store_count, 1);

    // Committed, but not merged yet
    assert_eq!(read.get("Tag", "a").unwrap(), None);
    assert!(read.fetch_all("Tag").unwrap().is_empty());

    assert_eq!(read.merge_pending(), 1);
    assert_eq!(read.merged_generation(), 1);
    let rows = read.fetch_all("Tag").unwrap();
    assert_eq!(
        rows,
        vec![
            ("a".to_string(), json!({"label": "first"})),
            ("b".to_string(), json!({"label": "second"})),
        ]
    );
}

#[test]
fn test_auto_merge_reader_sees_save_on_next_read() {
    let fx = fixture();
    fx.stack.add_in_memory_store(None).unwrap();
    let read = fx.stack.read_context();
    assert!(read.auto_merge());
    assert_eq!(read.get("Tag", "a").unwrap(), None);

    fx.stack
        .write_context()
        .perform_and_wait(|scope| {
            scope.put("Tag", "a", json!(1))?;
            scope.save()
        })
        .unwrap()
        .unwrap();

    assert_eq!(read.get("Tag", "a").unwrap(), Some(json!(1)));
}

#[test]
fn test_unsaved_changes_are_invisible_to_reader() {
    let fx = fixture();
    fx.stack.add_in_memory_store(None).unwrap();

    fx.stack
        .write_context()
        .perform_and_wait(|scope| scope.put("Tag", "draft", json!("wip")))
        .unwrap()
        .unwrap();

    assert_eq!(fx.stack.read_context().get("Tag", "draft").unwrap(), None);
    let pending = fx
        .stack
        .write_context()
        .perform_and_wait(|scope| (scope.has_changes(), scope.get("Tag", "draft")))
        .unwrap();
    assert!(pending.0);
    assert_eq!(pending.1.unwrap(), Some(json!("wip")));
}

#[test]
fn test_snapshot_newer_than_notification_is_not_overwritten() {
    let fx = fixture_with(ScriptedEngine::new(), false);
    fx.stack.add_in_memory_store(None).unwrap();
    let write = fx.stack.write_context();

    write
        .perform_and_wait(|scope| {
            scope.put("Tag", "a", json!("v1"))?;
            scope.save()
        })
        .unwrap()
        .unwrap();
    write
        .perform_and_wait(|scope| {
            scope.delete("Tag", "a")?;
            scope.save()
        })
        .unwrap()
        .unwrap();

    // First load happens after both saves: the snapshot reflects generation 2,
    // so both queued notifications are merged with it
    let read = fx.stack.read_context();
    assert_eq!(read.get("Tag", "a").unwrap(), None);
    assert_eq!(read.merged_generation(), 2);
    assert_eq!(read.merge_pending(), 0);
    assert_eq!(read.get("Tag", "a").unwrap(), None);
}

#[test]
fn test_notifications_only_touch_loaded_entities() {
    let fx = fixture_with(ScriptedEngine::new(), false);
    fx.stack.add_in_memory_store(None).unwrap();
    let read = fx.stack.read_context();
    read.get("Tag", "x").unwrap();

    fx.stack
        .write_context()
        .perform_and_wait(|scope| {
            scope.put("Tag", "x", json!("tag"))?;
            scope.put_object("n1", &Note::new("one", "body"))?;
            scope.save()
        })
        .unwrap()
        .unwrap();
    read.merge_pending();

    assert_eq!(read.get("Tag", "x").unwrap(), Some(json!("tag")));
    // Note was loaded lazily from the store, not from the notification
    assert_eq!(
        read.get_object::<Note>("n1").unwrap(),
        Some(Note::new("one", "body"))
    );
}

#[test]
fn test_typed_objects_round_trip_through_contexts() {
    let fx = fixture();
    fx.stack.add_in_memory_store(None).unwrap();

    fx.stack
        .write_context()
        .perform_and_wait(|scope| {
            scope.put_object("n1", &Note::new("Groceries", "milk"))?;
            scope.put_object("n2", &Note::new("Errands", "post office"))?;
            scope.save()
        })
        .unwrap()
        .unwrap();

    let notes = fx.stack.read_context().fetch_all_objects::<Note>().unwrap();
    assert_eq!(
        notes,
        vec![
            ("n1".to_string(), Note::new("Groceries", "milk")),
            ("n2".to_string(), Note::new("Errands", "post office")),
        ]
    );

    fx.stack
        .write_context()
        .perform_and_wait(|scope| {
            scope.delete_object::<Note>("n1")?;
            scope.save()
        })
        .unwrap()
        .unwrap();
    assert_eq!(fx.stack.read_context().get_object::<Note>("n1").unwrap(), None);
}

#[test]
fn test_entities_are_saved_to_their_configured_store() {
    let fx = fixture();
    fx.stack.add_in_memory_store(None).unwrap();
    fx.stack.add_in_memory_store(Some("Audit")).unwrap();

    let summary = fx
        .stack
        .write_context()
        .perform_and_wait(|scope| {
            scope.put_object("n1", &Note::new("a", "b"))?;
            scope.put_object(
                "e1",
                &common::AuditEntry {
                    action: "created n1".to_string(),
                },
            )?;
            scope.save()
        })
        .unwrap()
        .unwrap();

    assert_eq!(summary.store_count, 2);
    assert_eq!(
        fx.engine
            .store(DEFAULT_CONFIGURATION)
            .commits
            .load(Ordering::SeqCst),
        1
    );
    assert_eq!(fx.engine.store("Audit").commits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_failed_save_keeps_pending_changes_and_reports() {
    let fx = fixture_with(ScriptedEngine::new(), false);
    fx.stack.add_in_memory_store(None).unwrap();
    let store = fx.engine.store(DEFAULT_CONFIGURATION);
    store.fail_commits.store(true, Ordering::SeqCst);
    let write = fx.stack.write_context();

    let err = write
        .perform_and_wait(|scope| {
            scope.put("Tag", "a", json!(1))?;
            scope.save()
        })
        .unwrap()
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Persistence);
    assert_eq!(fx.hook.kinds(), vec![ErrorKind::Persistence]);
    assert!(write.perform_and_wait(|scope| scope.has_changes()).unwrap());
    assert_eq!(fx.stack.read_context().merge_pending(), 0);

    store.fail_commits.store(false, Ordering::SeqCst);
    let summary = write.perform_and_wait(|scope| scope.save()).unwrap().unwrap();
    assert_eq!(summary.change_count, 1);
    assert_eq!(summary.generation, 1);
}

#[test]
fn test_empty_save_broadcasts_nothing() {
    let fx = fixture_with(ScriptedEngine::new(), false);
    fx.stack.add_in_memory_store(None).unwrap();

    let summary = fx
        .stack
        .write_context()
        .perform_and_wait(|scope| scope.save())
        .unwrap()
        .unwrap();

    assert_eq!(summary.change_count, 0);
    assert_eq!(summary.generation, 0);
    assert_eq!(fx.stack.read_context().merge_pending(), 0);
}

#[test]
fn test_rollback_discards_pending_changes() {
    let fx = fixture();
    fx.stack.add_in_memory_store(None).unwrap();

    let after = fx
        .stack
        .write_context()
        .perform_and_wait(|scope| {
            scope.put("Tag", "a", json!(1)).unwrap();
            scope.rollback();
            (scope.has_changes(), scope.get("Tag", "a"))
        })
        .unwrap();

    assert!(!after.0);
    assert_eq!(after.1.unwrap(), None);
}

#[test]
fn test_perform_runs_in_submission_order() {
    let fx = fixture();
    fx.stack.add_in_memory_store(None).unwrap();
    let write = fx.stack.write_context();

    for i in 0..10 {
        write
            .perform(move |scope| {
                scope.put("Tag", "counter", json!(i)).unwrap();
            })
            .unwrap();
    }
    write
        .perform(|scope| {
            scope.save().unwrap();
        })
        .unwrap();

    // perform_and_wait queues behind everything submitted before it
    let value = write
        .perform_and_wait(|scope| scope.get("Tag", "counter"))
        .unwrap()
        .unwrap();
    assert_eq!(value, Some(json!(9)));
    assert_eq!(fx.stack.read_context().get("Tag", "counter").unwrap(), Some(json!(9)));
}

#[test]
fn test_undeclared_entity_is_missing_entity() {
    let fx = fixture();
    fx.stack.add_in_memory_store(None).unwrap();

    let write_err = fx
        .stack
        .write_context()
        .perform_and_wait(|scope| scope.put("Ghost", "a", json!(1)))
        .unwrap()
        .unwrap_err();
    let read_err = fx.stack.read_context().get("Ghost", "a").unwrap_err();

    assert_eq!(write_err.kind(), ErrorKind::MissingEntity);
    assert_eq!(read_err.kind(), ErrorKind::MissingEntity);
}

#[test]
fn test_unbound_type_is_missing_entity() {
    #[derive(serde::Serialize, serde::Deserialize)]
    struct Unbound;

    let fx = fixture();
    fx.stack.add_in_memory_store(None).unwrap();

    let err = fx
        .stack
        .read_context()
        .get_object::<Unbound>("a")
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::MissingEntity);
}

#[test]
fn test_mismatched_payload_is_serialization_error() {
    let fx = fixture();
    fx.stack.add_in_memory_store(None).unwrap();

    fx.stack
        .write_context()
        .perform_and_wait(|scope| {
            scope.put("Note", "bad", json!({"title": 42}))?;
            scope.save()
        })
        .unwrap()
        .unwrap();

    let err = fx.stack.read_context().get_object::<Note>("bad").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Serialization);
    assert_eq!(err.entity(), Some("Note"));
}

#[test]
fn test_removing_store_clears_read_cache() {
    let fx = fixture();
    let handle = fx.stack.add_in_memory_store(None).unwrap();
    fx.stack
        .write_context()
        .perform_and_wait(|scope| {
            scope.put("Tag", "a", json!(1))?;
            scope.save()
        })
        .unwrap()
        .unwrap();
    assert_eq!(fx.stack.read_context().get("Tag", "a").unwrap(), Some(json!(1)));

    fx.stack.remove_store(&handle).unwrap();

    let err = fx.stack.read_context().get("Tag", "a").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoStoreForEntity);
}

#[test]
fn test_reader_never_observes_partial_save() {
    let fx = fixture_with(ScriptedEngine::new(), false);
    fx.stack.add_in_memory_store(None).unwrap();
    let read = fx.stack.read_context();
    read.get("Tag", "k0").unwrap();
    let write = fx.stack.write_context().clone();

    let writer = std::thread::spawn(move || {
        for round in 1..=20 {
            write
                .perform_and_wait(move |scope| {
                    for k in 0..10 {
                        scope.put("Tag", format!("k{k}"), json!(round))?;
                    }
                    scope.save()
                })
                .unwrap()
                .unwrap();
        }
    });

    while !writer.is_finished() {
        read.merge_pending();
        let rows = read.fetch_all("Tag").unwrap();
        let rounds: Vec<_> = rows.iter().map(|(_, v)| v.clone()).collect();
        assert!(
            rounds.windows(2).all(|pair| pair[0] == pair[1]),
            "mixed save generations visible: {rounds:?}"
        );
    }
    writer.join().unwrap();
    read.merge_pending();
    assert_eq!(read.merged_generation(), 20);
}

#[test]
fn test_lazy_load_merges_saves_the_snapshot_already_shows() {
    let fx = fixture_with(ScriptedEngine::new(), false);
    fx.stack.add_in_memory_store(None).unwrap();
    let read = fx.stack.read_context();
    assert_eq!(read.get("Tag", "a").unwrap(), None);

    fx.stack
        .write_context()
        .perform_and_wait(|scope| {
            scope.put("Tag", "a", json!("tag"))?;
            scope.put_object("n", &Note::new("t", "b"))?;
            scope.save()
        })
        .unwrap()
        .unwrap();
    assert_eq!(read.get("Tag", "a").unwrap(), None);

    // Loading Note sees generation 1, so Tag moves to generation 1 with it
    assert_eq!(read.get_object::<Note>("n").unwrap(), Some(Note::new("t", "b")));
    assert_eq!(read.get("Tag", "a").unwrap(), Some(json!("tag")));
    assert_eq!(read.merged_generation(), 1);
    assert_eq!(read.merge_pending(), 0);
}

#[test]
fn test_waiting_on_write_queue_from_its_own_work_fails() {
    let fx = fixture();
    fx.stack.add_in_memory_store(None).unwrap();
    let child = fx.stack.new_child_context().unwrap();
    let write = fx.stack.write_context().clone();

    let (child_read, nested) = fx
        .stack
        .write_context()
        .perform_and_wait(move |_| {
            let child_read = child.get("Tag", "a");
            let nested = write.perform_and_wait(|scope| scope.has_changes());
            (child_read, nested)
        })
        .unwrap();

    assert_eq!(child_read.unwrap_err().kind(), ErrorKind::UnknownError);
    assert_eq!(nested.unwrap_err().kind(), ErrorKind::UnknownError);
    assert!(fx.hook.kinds().contains(&ErrorKind::UnknownError));

    // The queue is still usable afterwards
    let summary = fx
        .stack
        .write_context()
        .perform_and_wait(|scope| {
            scope.put("Tag", "a", json!(1))?;
            scope.save()
        })
        .unwrap()
        .unwrap();
    assert_eq!(summary.generation, 1);
    assert_eq!(fx.stack.read_context().get("Tag", "a").unwrap(), Some(json!(1)));
}

#[test]
fn test_partially_committed_save_is_published() {
    let fx = fixture_with(ScriptedEngine::new(), false);
    fx.stack.add_in_memory_store(None).unwrap();
    fx.stack.add_in_memory_store(Some("Audit")).unwrap();
    let default_store = fx.engine.store(DEFAULT_CONFIGURATION);
    default_store.fail_commits.store(true, Ordering::SeqCst);
    let write = fx.stack.write_context();
    let read = fx.stack.read_context();

    // AuditEntry sorts first, so the Audit store commits before Default fails
    let err = write
        .perform_and_wait(|scope| {
            scope.put_object(
                "e1",
                &AuditEntry {
                    action: "created n1".to_string(),
                },
            )?;
            scope.put_object("n1", &Note::new("a", "b"))?;
            scope.save()
        })
        .unwrap()
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Persistence);
    assert_eq!(err.configuration(), Some(DEFAULT_CONFIGURATION));
    assert!(err.message().contains("already committed"), "{}", err);
    assert_eq!(fx.hook.kinds(), vec![ErrorKind::Persistence]);
    assert_eq!(write.perform_and_wait(|scope| scope.pending_count()).unwrap(), 1);

    assert_eq!(read.merge_pending(), 1);
    assert_eq!(read.merged_generation(), 1);
    assert_eq!(
        read.get_object::<AuditEntry>("e1").unwrap().map(|e| e.action),
        Some("created n1".to_string())
    );
    assert_eq!(read.get_object::<Note>("n1").unwrap(), None);

    default_store.fail_commits.store(false, Ordering::SeqCst);
    let summary = write.perform_and_wait(|scope| scope.save()).unwrap().unwrap();
    assert_eq!(summary.change_count, 1);
    assert_eq!(summary.store_count, 1);
    assert_eq!(summary.generation, 2);
    assert_eq!(read.merge_pending(), 1);
    assert_eq!(read.get_object::<Note>("n1").unwrap(), Some(Note::new("a", "b")));
}
