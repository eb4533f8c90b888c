#![forbid(unsafe_code)]

use std::time::Duration;

use cire_api::{spawn_engine, submit, CireError, CollabEngine, EngineConfig, EngineEvent};
use cire_core::{Collaborator, SubjectId};

fn ev(line: &str) -> EngineEvent { EngineEvent::from_json_line(line).unwrap() }

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn events_apply_in_order_and_publish_snapshots() {
    let mut engine = CollabEngine::new(EngineConfig::default());
    let mut results = engine.subscribe();
    let (tx, handle) = spawn_engine(engine, 64);
    let mut epoch = handle.subscribe_epoch();

    tx.send(ev(r#"{"type":"partial","key":"c1","subject_id":"v1","candidates":[{"name":"Sam"}],"expected_count":2}"#)).await.unwrap();
    tx.send(ev(r#"{"type":"trigger","key":"c1"}"#)).await.unwrap();
    tx.send(ev(r#"{"type":"detailed","candidates":[{"name":"Sam","handle":"@sam"},{"name":"Kim","handle":"@kim"}]}"#)).await.unwrap();

    let res = tokio::time::timeout(Duration::from_secs(2), results.recv()).await.unwrap().unwrap();
    assert_eq!(res.subject_id.as_str(), "v1");

    tokio::time::timeout(Duration::from_secs(2), epoch.wait_for(|e| *e >= 1)).await.unwrap().unwrap();
    let subject = SubjectId::new("v1").unwrap();
    let list = handle.resolved(&subject).unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0], Collaborator::from_parts(Some("Sam"), Some("@sam"), None).unwrap());
    assert_eq!(handle.current().epoch, 1);

    drop(tx);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn later_snapshots_share_untouched_lists() {
    let (tx, handle) = spawn_engine(CollabEngine::new(EngineConfig::default()), 64);
    let mut epoch = handle.subscribe_epoch();

    for line in [
        r#"{"type":"partial","key":"c1","subject_id":"v1","candidates":[{"name":"Sam"}],"expected_count":2}"#,
        r#"{"type":"trigger","key":"c1"}"#,
        r#"{"type":"detailed","candidates":[{"name":"Sam","handle":"@sam"},{"name":"Kim","handle":"@kim"}]}"#,
    ] {
        submit(&tx, ev(line)).await.unwrap();
    }
    tokio::time::timeout(Duration::from_secs(2), epoch.wait_for(|e| *e >= 1)).await.unwrap().unwrap();
    let first = handle.current();

    for line in [
        r#"{"type":"partial","key":"c2","subject_id":"v2","candidates":[{"name":"Lee"}],"expected_count":2}"#,
        r#"{"type":"trigger","key":"c2"}"#,
        r#"{"type":"detailed","candidates":[{"name":"Lee","handle":"@lee"},{"name":"Ray"}]}"#,
    ] {
        submit(&tx, ev(line)).await.unwrap();
    }
    tokio::time::timeout(Duration::from_secs(2), epoch.wait_for(|e| *e >= 2)).await.unwrap().unwrap();
    let second = handle.current();

    let v1 = SubjectId::new("v1").unwrap();
    assert_eq!(second.subjects.len(), 2);
    assert!(std::sync::Arc::ptr_eq(&first.subjects[&v1], &second.subjects[&v1]));
    assert_eq!(first.subjects.len(), 1);
}

#[tokio::test]
async fn submit_reports_closed_channel() {
    let (tx, rx) = tokio::sync::mpsc::channel::<EngineEvent>(1);
    drop(rx);
    let err = submit(&tx, ev(r#"{"type":"cancel","key":"c1"}"#)).await.unwrap_err();
    assert!(matches!(err, CireError::Closed(_)));
}
