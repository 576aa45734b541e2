use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Lifecycle states of an automation task. `Completed` and `Failed` are
/// final: a new attempt creates a new task rather than reusing one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Idle,
    Queued,
    Running,
    Completed,
    // The remote backend reports cancelled tasks; locally they surface as
    // failed with an explanatory message.
    #[serde(alias = "cancelled")]
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// Payload attached to a completed task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationResult {
    /// Confirmation reference from the target site, when one was visible.
    pub confirmation: Option<String>,
    pub fields_filled: usize,
}

/// One automation attempt: identity, lifecycle state, monotonic progress,
/// and an ordered log of human-readable step messages.
///
/// A task is owned and mutated only by the component driving that attempt;
/// there is no process-wide "is automation running" flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationTask {
    pub id: String,
    pub service: String,
    pub status: TaskStatus,
    /// 0–100; never decreases while running.
    pub progress: u8,
    pub log: Vec<String>,
    pub result: Option<AutomationResult>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AutomationTask {
    pub fn new(service: &str) -> Self {
        let now = Utc::now();
        AutomationTask {
            id: Uuid::new_v4().to_string(),
            service: service.to_string(),
            status: TaskStatus::Idle,
            progress: 0,
            log: Vec::new(),
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Reject mutation of a finished task; terminal states are final.
    fn guard_terminal(&self, what: &str) -> bool {
        if self.status.is_terminal() {
            debug!(task = %self.id, status = ?self.status, "ignoring {what} on terminal task");
            return true;
        }
        false
    }

    pub fn start(&mut self) {
        if self.guard_terminal("start") {
            return;
        }
        self.status = TaskStatus::Running;
        self.touch();
    }

    pub fn log_step(&mut self, message: impl Into<String>) {
        if self.guard_terminal("log_step") {
            return;
        }
        self.log.push(message.into());
        self.touch();
    }

    /// Clamped to 0–100 and to never move backwards.
    pub fn set_progress(&mut self, percent: u8) {
        if self.guard_terminal("set_progress") {
            return;
        }
        self.progress = percent.min(100).max(self.progress);
        self.touch();
    }

    pub fn complete(&mut self, result: AutomationResult) {
        if self.guard_terminal("complete") {
            return;
        }
        self.status = TaskStatus::Completed;
        self.progress = 100;
        self.result = Some(result);
        self.touch();
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        if self.guard_terminal("fail") {
            return;
        }
        self.status = TaskStatus::Failed;
        self.error = Some(error.into());
        self.touch();
    }
}

#[cfg(test)]
#[path = "task_test.rs"]
mod task_test;
