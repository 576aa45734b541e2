use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::AutofillError;
use crate::resolver::ResolvedValueMap;
use crate::task::{AutomationResult, AutomationTask, TaskStatus};

/// Connection settings for the remote automation backend.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub base_url: String,
    pub poll_interval: Duration,
    /// Give up waiting for a terminal status after this long. Giving up only
    /// stops the polling; the remote task keeps running — this design has no
    /// mid-flight cancellation of remote work.
    pub poll_deadline: Duration,
    /// Identifies which front end initiated the request.
    pub source: String,
}

impl BridgeConfig {
    pub fn new(base_url: &str) -> Self {
        BridgeConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            poll_interval: Duration::from_secs(2),
            poll_deadline: Duration::from_secs(300),
            source: "library".to_string(),
        }
    }
}

#[derive(Serialize)]
struct StartRequest<'a> {
    service_type: &'a str,
    form_data: HashMap<String, String>,
    source: &'a str,
}

#[derive(Deserialize)]
struct StartResponse {
    task_id: String,
    status: TaskStatus,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct StatusResponse {
    #[allow(dead_code)]
    task_id: String,
    status: TaskStatus,
    #[serde(default)]
    progress: Option<u8>,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    log: Option<Vec<String>>,
}

fn parse_result(value: &serde_json::Value) -> AutomationResult {
    AutomationResult {
        confirmation: value
            .get("confirmation")
            .or_else(|| value.get("confirmation_number"))
            .and_then(|v| v.as_str())
            .map(str::to_string),
        fields_filled: value
            .get("fields_filled")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as usize,
    }
}

/// Handle on a spawned status-poll loop. Dropping or stopping it only stops
/// listening; the remote task is unaffected.
pub struct StatusSubscription {
    receiver: watch::Receiver<AutomationTask>,
    handle: JoinHandle<()>,
}

impl StatusSubscription {
    pub fn receiver(&self) -> watch::Receiver<AutomationTask> {
        self.receiver.clone()
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}

/// Client for the remote automation backend. The contract with it is
/// exactly one create call, one or more status reads, one terminal result;
/// its browser-driving internals are not this crate's business.
#[derive(Clone)]
pub struct AutomationBridge {
    config: BridgeConfig,
    http: reqwest::Client,
}

impl AutomationBridge {
    pub fn new(config: BridgeConfig) -> Self {
        AutomationBridge {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// `GET /health`. Callers use this to decide between the remote path
    /// and the local/cross-context fallback before committing.
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.config.base_url);
        match self.http.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                debug!(%err, "backend health check failed");
                false
            }
        }
    }

    async fn ensure_available(&self) -> Result<(), AutofillError> {
        if self.health_check().await {
            Ok(())
        } else {
            Err(AutofillError::RemoteUnavailable(format!(
                "health check failed for {}",
                self.config.base_url
            )))
        }
    }

    /// Ship a resolved value map to the backend. Returns the in-flight task;
    /// a transport failure after the health gate comes back as a task in the
    /// failed state with the error attached, never as an uncaught error.
    pub async fn request_automation(
        &self,
        service_id: &str,
        values: &ResolvedValueMap,
    ) -> Result<AutomationTask, AutofillError> {
        self.ensure_available().await?;

        let mut task = AutomationTask::new(service_id);
        task.start();

        let url = format!("{}/api/selenium/start-automation", self.config.base_url);
        let request = StartRequest {
            service_type: service_id,
            form_data: values.as_form_data(),
            source: &self.config.source,
        };

        let response = match self.http.post(&url).json(&request).send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(%err, "automation request failed");
                task.fail(format!("automation request failed: {err}"));
                return Ok(task);
            }
        };
        let parsed: StartResponse = match response.error_for_status() {
            Ok(response) => match response.json().await {
                Ok(parsed) => parsed,
                Err(err) => {
                    task.fail(format!("malformed backend response: {err}"));
                    return Ok(task);
                }
            },
            Err(err) => {
                task.fail(format!("backend rejected automation request: {err}"));
                return Ok(task);
            }
        };

        task.id = parsed.task_id;
        if let Some(message) = parsed.message {
            task.log_step(message);
        }
        if parsed.status == TaskStatus::Failed {
            task.fail("backend failed the task on creation");
        } else {
            task.status = parsed.status;
        }
        info!(task = %task.id, service = %service_id, "automation task created remotely");
        Ok(task)
    }

    /// One status read. Transport failures surface as a failed copy of the
    /// task, with the message attached.
    pub async fn poll_status(&self, task: &AutomationTask) -> AutomationTask {
        let mut updated = task.clone();
        let url = format!(
            "{}/api/selenium/task-status/{}",
            self.config.base_url, task.id
        );

        let parsed: StatusResponse = match self.http.get(&url).send().await {
            Ok(response) => match response.error_for_status() {
                Ok(response) => match response.json().await {
                    Ok(parsed) => parsed,
                    Err(err) => {
                        updated.fail(format!("malformed status response: {err}"));
                        return updated;
                    }
                },
                Err(err) => {
                    updated.fail(format!("status read rejected: {err}"));
                    return updated;
                }
            },
            Err(err) => {
                updated.fail(format!("status read failed: {err}"));
                return updated;
            }
        };

        // The backend owns the task log; adopt its snapshot when it has
        // grown rather than appending by position.
        if let Some(log) = parsed.log
            && log.len() > updated.log.len()
        {
            updated.log = log;
        }
        if let Some(progress) = parsed.progress {
            updated.set_progress(progress);
        }
        match parsed.status {
            TaskStatus::Completed => {
                let result = parsed
                    .result
                    .as_ref()
                    .map(parse_result)
                    .unwrap_or(AutomationResult {
                        confirmation: None,
                        fields_filled: 0,
                    });
                updated.complete(result);
            }
            TaskStatus::Failed => {
                updated.fail(parsed.error.unwrap_or_else(|| "remote failure".to_string()));
            }
            status => updated.status = status,
        }
        updated
    }

    /// Poll until the task reaches a terminal state or the configured
    /// deadline passes; a deadline miss comes back as a failed task, not an
    /// error (the remote task itself may still finish later).
    pub async fn wait_for_completion(&self, task: &AutomationTask) -> AutomationTask {
        let started = tokio::time::Instant::now();
        let mut current = task.clone();
        loop {
            if current.status.is_terminal() {
                return current;
            }
            if started.elapsed() >= self.config.poll_deadline {
                current.fail(format!(
                    "no terminal status within {:?}; stopped polling",
                    self.config.poll_deadline
                ));
                return current;
            }
            tokio::time::sleep(self.config.poll_interval).await;
            current = self.poll_status(&current).await;
        }
    }

    /// Push-style status updates without caller-side polling: a background
    /// loop polls the backend and publishes each snapshot on a watch
    /// channel, ending after the first terminal state.
    pub fn subscribe(&self, task: &AutomationTask) -> StatusSubscription {
        let (sender, receiver) = watch::channel(task.clone());
        let bridge = self.clone();
        let seed = task.clone();
        let handle = tokio::spawn(async move {
            let terminal = bridge.wait_and_publish(seed, &sender).await;
            debug!(task = %terminal.id, status = ?terminal.status, "subscription finished");
        });
        StatusSubscription { receiver, handle }
    }

    async fn wait_and_publish(
        &self,
        task: AutomationTask,
        sender: &watch::Sender<AutomationTask>,
    ) -> AutomationTask {
        let started = tokio::time::Instant::now();
        let mut current = task;
        while !current.status.is_terminal() {
            if started.elapsed() >= self.config.poll_deadline {
                current.fail(format!(
                    "no terminal status within {:?}; stopped polling",
                    self.config.poll_deadline
                ));
                break;
            }
            tokio::time::sleep(self.config.poll_interval).await;
            current = self.poll_status(&current).await;
            if sender.send(current.clone()).is_err() {
                // All receivers gone; keep the contract and stop quietly.
                break;
            }
        }
        let _ = sender.send(current.clone());
        current
    }
}

#[cfg(test)]
#[path = "bridge_test.rs"]
mod bridge_test;
