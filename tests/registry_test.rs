//! Registry-level tests: name/identity maps, creation, deletion, events.

use dynflow::{Database, Error};

// ---------------------------------------------------------------------------
// Creation and lookup
// ---------------------------------------------------------------------------

#[test]
fn create_registers_workflow_and_queue_by_name() {
    let db = Database::new();
    db.create_workflow("ingest").unwrap();
    db.create_queue("parse").unwrap();

    assert!(db.workflow_exists("ingest"));
    assert!(db.queue_exists("parse"));
    assert!(!db.workflow_exists("other"));
    assert!(!db.queue_exists("other"));
}

#[test]
fn duplicate_names_fail_with_already_exists() {
    let db = Database::new();
    db.create_workflow("ingest").unwrap();
    db.create_queue("parse").unwrap();

    assert!(matches!(
        db.create_workflow("ingest").unwrap_err(),
        Error::AlreadyExists(_)
    ));
    assert!(matches!(
        db.create_queue("parse").unwrap_err(),
        Error::AlreadyExists(_)
    ));

    // A workflow and a queue may share a name; the namespaces are separate.
    db.create_workflow("parse").unwrap();
    db.create_queue("ingest").unwrap();
}

#[test]
fn empty_names_are_invalid_arguments() {
    let db = Database::new();
    assert!(matches!(
        db.create_workflow("").unwrap_err(),
        Error::InvalidArgument(_)
    ));
    assert!(matches!(
        db.create_queue("").unwrap_err(),
        Error::InvalidArgument(_)
    ));
    assert!(matches!(
        db.peek("").unwrap_err(),
        Error::InvalidArgument(_)
    ));
    assert!(matches!(
        db.create_task("", "t", "q").unwrap_err(),
        Error::InvalidArgument(_)
    ));
}

#[test]
fn operations_on_unknown_names_fail_with_not_found() {
    let db = Database::new();
    assert!(matches!(db.peek("nope").unwrap_err(), Error::NotFound(_)));
    assert!(matches!(db.dequeue("nope").unwrap_err(), Error::NotFound(_)));
    assert!(matches!(
        db.queue_is_empty("nope").unwrap_err(),
        Error::NotFound(_)
    ));
    assert!(matches!(
        db.delete_queue("nope").unwrap_err(),
        Error::NotFound(_)
    ));
    assert!(matches!(
        db.resume_workflow("nope").unwrap_err(),
        Error::NotFound(_)
    ));
    assert!(matches!(
        db.complete_task("nope", "task").unwrap_err(),
        Error::NotFound(_)
    ));
}

// ---------------------------------------------------------------------------
// Queue deletion
// ---------------------------------------------------------------------------

#[test]
fn delete_empty_queue_frees_the_name() {
    let db = Database::new();
    db.create_queue("parse").unwrap();
    db.delete_queue("parse").unwrap();
    assert!(!db.queue_exists("parse"));

    // Name immediately reusable.
    db.create_queue("parse").unwrap();
}

#[test]
fn delete_queue_with_ready_tasks_fails_not_empty() {
    let db = Database::new();
    db.create_queue("parse").unwrap();
    db.create_workflow("ingest").unwrap();
    db.create_task("ingest", "extract", "parse").unwrap();
    db.resume_workflow("ingest").unwrap();

    assert!(matches!(
        db.delete_queue("parse").unwrap_err(),
        Error::NotEmpty(_)
    ));
    assert!(db.queue_exists("parse"));
}

#[test]
fn delete_queue_with_only_checked_out_tasks_succeeds() {
    let db = Database::new();
    db.create_queue("parse").unwrap();
    db.create_workflow("ingest").unwrap();
    db.create_task("ingest", "extract", "parse").unwrap();
    db.resume_workflow("ingest").unwrap();

    let task = db.dequeue("parse").unwrap().expect("task should be ready");
    assert_eq!(db.running_count("parse").unwrap(), 1);
    assert!(db.queue_is_empty("parse").unwrap());

    // Checked-out tasks do not block deletion.
    db.delete_queue("parse").unwrap();
    assert!(!db.queue_exists("parse"));

    // Completing the orphaned task still retires the workflow.
    db.complete_task(&task.workflow, &task.task).unwrap();
    assert!(!db.workflow_exists("ingest"));
}

// ---------------------------------------------------------------------------
// Workflow retirement frees the name
// ---------------------------------------------------------------------------

#[test]
fn retired_workflow_name_is_reusable() {
    let db = Database::new();
    db.create_queue("q").unwrap();
    db.create_workflow("wf").unwrap();
    db.create_task("wf", "only", "q").unwrap();
    db.resume_workflow("wf").unwrap();

    let task = db.dequeue("q").unwrap().unwrap();
    db.complete_task(&task.workflow, &task.task).unwrap();
    assert!(!db.workflow_exists("wf"));

    db.create_workflow("wf").unwrap();
    assert!(db.workflow_exists("wf"));
}

// ---------------------------------------------------------------------------
// Event stream
// ---------------------------------------------------------------------------

#[test]
fn event_stream_is_monotonic_and_filterable() {
    let db = Database::new();
    db.create_queue("q").unwrap();
    db.create_workflow("wf").unwrap();
    db.create_task("wf", "only", "q").unwrap();
    db.resume_workflow("wf").unwrap();
    let task = db.dequeue("q").unwrap().unwrap();
    db.complete_task(&task.workflow, &task.task).unwrap();

    let events = db.events_since(0);
    assert!(events.len() >= 6);
    assert!(events.windows(2).all(|w| w[0].seq < w[1].seq));

    let tail = db.events_since(events[2].seq);
    assert_eq!(tail.len(), events.len() - 3);
}
