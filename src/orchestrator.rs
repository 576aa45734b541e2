use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AutofillError;
use crate::fill::{
    FieldOutcome, FieldResult, FillSummary, HIGHLIGHT_WINDOW, SkipReason, fill_control,
};
use crate::locator::{BackoffPolicy, locate_with_backoff};
use crate::page::{ControlKind, Page, PageEvent};
use crate::registry::SiteProfile;
use crate::resolver::ResolvedValueMap;
use crate::task::{AutomationResult, AutomationTask};

/// Annotation left on disabled submit controls. The engine never submits a
/// form that requires a CAPTCHA or OTP it cannot solve.
pub const SECURE_NOTE: &str =
    "Auto-filled — enter the CAPTCHA/OTP, review the form, then submit it yourself";

/// Pacing and waiting knobs for an animated run.
#[derive(Debug, Clone)]
pub struct AnimatedFillConfig {
    /// Delay between typed characters.
    pub char_delay: Duration,
    /// Pause after each field step.
    pub step_pause: Duration,
    /// Bounded wait for controls on late-rendering pages.
    pub locate: BackoffPolicy,
}

impl Default for AnimatedFillConfig {
    fn default() -> Self {
        AnimatedFillConfig {
            char_delay: Duration::from_millis(150),
            step_pause: Duration::from_millis(1500),
            locate: BackoffPolicy::default(),
        }
    }
}

impl AnimatedFillConfig {
    /// No pacing, single locate attempt. For tests and headless bulk runs.
    pub fn fast() -> Self {
        AnimatedFillConfig {
            char_delay: Duration::ZERO,
            step_pause: Duration::ZERO,
            locate: BackoffPolicy::immediate(),
        }
    }
}

/// Cooperative stop signal for an in-progress run. Stopping halts before the
/// next step begins; fields already filled are left as they are.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        StopHandle::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// State of one orchestrator step as it is announced on the progress channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Locating,
    Filling,
    Filled,
    Skipped,
    /// Final step: submit controls are being locked down.
    Securing,
    /// Terminal for this component: the human finishes the form.
    AwaitingManualCompletion,
}

#[derive(Clone, Debug, Serialize)]
pub struct StepProgress {
    /// 1-based step number.
    pub step: usize,
    pub total: usize,
    pub field: String,
    pub state: StepState,
}

/// Outcome of an animated run: the per-field summary and the task record
/// that drove it. A stopped run comes back with a failed task and a summary
/// truncated at the step the stop landed on.
#[derive(Debug, Clone)]
pub struct AnimatedRun {
    pub summary: FillSummary,
    pub task: AutomationTask,
}

/// Fills fields one at a time, in profile order, with visible pacing and a
/// final lockdown of submit controls instead of any submission attempt.
///
/// Clones share the per-document guard: while a run is active against a
/// document, a second run against the same document is refused with
/// [`AutofillError::AutomationBusy`]. Runs against different documents may
/// proceed concurrently.
#[derive(Clone)]
pub struct AnimatedFill {
    config: AnimatedFillConfig,
    active: Arc<DashMap<String, String>>,
    progress: watch::Sender<Option<StepProgress>>,
}

struct RunSlot<'a> {
    active: &'a DashMap<String, String>,
    key: String,
}

impl Drop for RunSlot<'_> {
    fn drop(&mut self) {
        self.active.remove(&self.key);
    }
}

impl AnimatedFill {
    pub fn new(config: AnimatedFillConfig) -> Self {
        let (progress, _) = watch::channel(None);
        AnimatedFill {
            config,
            active: Arc::new(DashMap::new()),
            progress,
        }
    }

    /// Observe step progress. Steps from concurrent runs on different
    /// documents interleave on this channel.
    pub fn subscribe(&self) -> watch::Receiver<Option<StepProgress>> {
        self.progress.subscribe()
    }

    fn announce(&self, step: usize, total: usize, field: &str, state: StepState) {
        let update = StepProgress {
            step,
            total,
            field: field.to_string(),
            state,
        };
        // Nobody listening is fine.
        let _ = self.progress.send(Some(update));
    }

    fn claim<'a>(&'a self, document: &str) -> Result<RunSlot<'a>, AutofillError> {
        match self.active.entry(document.to_string()) {
            Entry::Occupied(_) => Err(AutofillError::AutomationBusy(document.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(Uuid::new_v4().to_string());
                Ok(RunSlot {
                    active: &self.active,
                    key: document.to_string(),
                })
            }
        }
    }

    pub async fn run<P: Page + ?Sized>(
        &self,
        page: &P,
        site: &SiteProfile,
        values: &ResolvedValueMap,
        stop: &StopHandle,
    ) -> Result<AnimatedRun, AutofillError> {
        let document = page.document_id().await?;
        let _slot = self.claim(&document)?;

        let mut task = AutomationTask::new(&site.host);
        task.start();
        task.log_step(format!("Starting animated fill on {}", site.service_name));

        let total = site.fields.len() + 1;
        let mut results = Vec::with_capacity(site.fields.len());
        let mut stopped = false;

        for (index, spec) in site.fields.iter().enumerate() {
            if stop.is_stopped() {
                warn!(site = %site.host, step = index + 1, "stop requested, halting run");
                task.log_step(format!("Stopped before step {} of {total}", index + 1));
                stopped = true;
                break;
            }

            let step = index + 1;
            let outcome = self.run_step(page, spec, values, step, total, &mut task).await;
            results.push(FieldResult {
                field: spec.name.clone(),
                outcome,
            });
            task.set_progress((step * 100 / total) as u8);

            if !self.config.step_pause.is_zero() {
                tokio::time::sleep(self.config.step_pause).await;
            }
        }

        let summary = FillSummary {
            service_name: site.service_name.clone(),
            results,
        };

        if stopped {
            task.fail("stopped before completion");
            return Ok(AnimatedRun { summary, task });
        }

        // Final step: lock the form down for the human. Never submit.
        self.announce(total, total, "submit", StepState::Securing);
        match page.disable_submit_controls(SECURE_NOTE).await {
            Ok(count) => {
                task.log_step(format!("Disabled {count} submit control(s) pending manual review"))
            }
            Err(err) => {
                warn!(%err, "could not disable submit controls");
                task.log_step("Could not disable submit controls; review before submitting");
            }
        }
        self.announce(total, total, "submit", StepState::AwaitingManualCompletion);

        task.log_step(summary.describe());
        let fields_filled = summary.filled();
        task.complete(AutomationResult {
            confirmation: None,
            fields_filled,
        });
        info!(site = %site.host, filled = fields_filled, "animated fill finished");
        Ok(AnimatedRun { summary, task })
    }

    async fn run_step<P: Page + ?Sized>(
        &self,
        page: &P,
        spec: &crate::locator::FieldSpec,
        values: &ResolvedValueMap,
        step: usize,
        total: usize,
        task: &mut AutomationTask,
    ) -> FieldOutcome {
        let Some(resolved) = values.get(&spec.name) else {
            task.log_step(format!("{}: no value available, skipped", spec.name));
            self.announce(step, total, &spec.name, StepState::Skipped);
            return FieldOutcome::Skipped {
                reason: SkipReason::NoValue,
            };
        };

        self.announce(step, total, &spec.name, StepState::Locating);
        let control = match locate_with_backoff(page, spec, &self.config.locate).await {
            Ok(Some(control)) => control,
            Ok(None) => {
                task.log_step(format!("{}: control not found, skipped", spec.name));
                self.announce(step, total, &spec.name, StepState::Skipped);
                return FieldOutcome::Skipped {
                    reason: SkipReason::ControlNotFound,
                };
            }
            Err(err) => {
                warn!(field = %spec.name, %err, "locate failed");
                task.log_step(format!("{}: page error, skipped", spec.name));
                self.announce(step, total, &spec.name, StepState::Skipped);
                return FieldOutcome::Skipped {
                    reason: SkipReason::PageError(err.to_string()),
                };
            }
        };

        self.announce(step, total, &spec.name, StepState::Filling);
        let filled = match control.kind {
            // Selects are chosen in one move; typing into them means nothing.
            ControlKind::Select => fill_control(page, Some(&control), &resolved.value).await,
            ControlKind::Text | ControlKind::TextArea => {
                self.type_animated(page, &control, &resolved.value).await
            }
        };

        match filled {
            Ok(true) => {
                task.log_step(format!("{}: filled", spec.name));
                self.announce(step, total, &spec.name, StepState::Filled);
                FieldOutcome::Filled {
                    source: resolved.source,
                }
            }
            Ok(false) => {
                task.log_step(format!("{}: value rejected, skipped", spec.name));
                self.announce(step, total, &spec.name, StepState::Skipped);
                FieldOutcome::Skipped {
                    reason: SkipReason::ValueRejected,
                }
            }
            Err(err) => {
                warn!(field = %spec.name, %err, "fill failed");
                task.log_step(format!("{}: page error, skipped", spec.name));
                self.announce(step, total, &spec.name, StepState::Skipped);
                FieldOutcome::Skipped {
                    reason: SkipReason::PageError(err.to_string()),
                }
            }
        }
    }

    /// Progressive character-by-character assignment, ending with the same
    /// change/blur pair a manual entry produces.
    async fn type_animated<P: Page + ?Sized>(
        &self,
        page: &P,
        control: &crate::page::Control,
        value: &str,
    ) -> anyhow::Result<bool> {
        if value.is_empty() {
            return Ok(false);
        }
        page.scroll_into_view(control).await?;
        page.write_value(control, "").await?;

        let mut typed = String::with_capacity(value.len());
        for ch in value.chars() {
            typed.push(ch);
            page.write_value(control, &typed).await?;
            page.dispatch(control, PageEvent::Input).await?;
            if !self.config.char_delay.is_zero() {
                tokio::time::sleep(self.config.char_delay).await;
            }
        }
        page.dispatch(control, PageEvent::Change).await?;
        page.dispatch(control, PageEvent::Blur).await?;

        if let Err(err) = page.highlight(control, HIGHLIGHT_WINDOW).await {
            tracing::debug!(%err, "highlight failed");
        }
        Ok(true)
    }
}

#[cfg(test)]
#[path = "orchestrator_test.rs"]
mod orchestrator_test;
