// Unit tests for the automation task lifecycle

use pretty_assertions::assert_eq;

use super::*;

#[test]
fn test_new_task_is_idle_with_fresh_id() {
    let a = AutomationTask::new("name_change");
    let b = AutomationTask::new("name_change");

    assert_eq!(a.status, TaskStatus::Idle);
    assert_eq!(a.progress, 0);
    assert!(a.log.is_empty());
    assert_ne!(a.id, b.id);
}

#[test]
fn test_progress_never_decreases() {
    let mut task = AutomationTask::new("name_change");
    task.start();

    task.set_progress(40);
    assert_eq!(task.progress, 40);

    task.set_progress(20);
    assert_eq!(task.progress, 40);

    task.set_progress(250);
    assert_eq!(task.progress, 100);
}

#[test]
fn test_complete_records_result_and_full_progress() {
    let mut task = AutomationTask::new("name_change");
    task.start();
    task.log_step("filling mobile");
    task.set_progress(50);

    task.complete(AutomationResult {
        confirmation: Some("CN-99".to_string()),
        fields_filled: 3,
    });

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.progress, 100);
    assert_eq!(task.result.as_ref().unwrap().fields_filled, 3);
    assert!(task.error.is_none());
}

#[test]
fn test_terminal_states_are_final() {
    let mut task = AutomationTask::new("name_change");
    task.start();
    task.fail("page went away");

    let log_len = task.log.len();
    task.start();
    task.set_progress(80);
    task.log_step("should not appear");
    task.complete(AutomationResult {
        confirmation: None,
        fields_filled: 0,
    });

    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error.as_deref(), Some("page went away"));
    assert!(task.result.is_none());
    assert_eq!(task.log.len(), log_len);
}

#[test]
fn test_status_serde_lowercase_and_cancelled_alias() {
    assert_eq!(
        serde_json::to_string(&TaskStatus::Running).unwrap(),
        "\"running\""
    );
    let parsed: TaskStatus = serde_json::from_str("\"cancelled\"").unwrap();
    assert_eq!(parsed, TaskStatus::Failed);

    assert!(TaskStatus::Completed.is_terminal());
    assert!(TaskStatus::Failed.is_terminal());
    assert!(!TaskStatus::Running.is_terminal());
    assert!(!TaskStatus::Queued.is_terminal());
}
