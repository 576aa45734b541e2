use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::errors::AutofillError;
use crate::fill::fill_fields;
use crate::locator::BackoffPolicy;
use crate::page::Page;
use crate::registry::SiteProfile;
use crate::resolver::ResolvedValueMap;

/// The cross-context completion report. Sent at most once per launched
/// context; the opener never assumes it arrives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionMessage {
    #[serde(rename = "type")]
    kind: String,
    pub success: bool,
    #[serde(rename = "filledFields")]
    pub filled_fields: usize,
    pub submitted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

const COMPLETION_KIND: &str = "completion";

impl CompletionMessage {
    pub fn succeeded(filled_fields: usize) -> Self {
        CompletionMessage {
            kind: COMPLETION_KIND.to_string(),
            success: true,
            filled_fields,
            // The engine never submits; a CAPTCHA/OTP stands between the
            // fill and the submission.
            submitted: false,
            error: None,
        }
    }

    pub fn failed(error: &str) -> Self {
        CompletionMessage {
            kind: COMPLETION_KIND.to_string(),
            success: false,
            filled_fields: 0,
            submitted: false,
            error: Some(error.to_string()),
        }
    }

    /// Validate an inbound payload. Anything that is not a well-formed
    /// completion message is ignored, not assumed valid.
    pub fn parse(value: &Value) -> Option<Self> {
        let message: CompletionMessage = serde_json::from_value(value.clone()).ok()?;
        if message.kind != COMPLETION_KIND {
            debug!(kind = %message.kind, "ignoring non-completion message");
            return None;
        }
        Some(message)
    }
}

/// A driver that can open and switch between independent browsing contexts.
#[async_trait]
pub trait ContextHost: Send + Sync {
    /// Identity of the currently active context.
    async fn current_context(&self) -> Result<String>;

    /// Open a new context already navigated to `url`. `Ok(None)` means the
    /// context was blocked (the cross-context analogue of a popup blocker).
    async fn open_context(&self, url: &str) -> Result<Option<String>>;

    async fn activate(&self, context: &str) -> Result<()>;

    async fn close_context(&self, context: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct LaunchConfig {
    /// Resolve with an unconfirmed outcome after this long without a
    /// completion message, rather than hanging.
    pub timeout: Duration,
    /// Grace period for the target page's dynamic content before filling.
    pub settle_delay: Duration,
    pub locate: BackoffPolicy,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        LaunchConfig {
            timeout: Duration::from_secs(300),
            settle_delay: Duration::from_secs(2),
            locate: BackoffPolicy::default(),
        }
    }
}

/// What the opener learned from a launch.
#[derive(Debug, Clone)]
pub struct LaunchOutcome {
    pub message: CompletionMessage,
    /// False when the timeout fired and the message is synthetic: the
    /// context was launched but its outcome is unknown and the operator
    /// should verify manually.
    pub confirmed: bool,
    /// The launched context, left open so the human can finish the form.
    pub context_id: String,
}

/// Open a second context on the service URL, run the fill logic inside it,
/// and report the outcome to the originating context.
///
/// Fails fast with [`AutofillError::ContextBlocked`] when the context cannot
/// be opened (callers should offer a manual-open fallback with the same
/// URL). Every other path resolves: a page failure resolves with a failed
/// completion message, and a timeout resolves with an unconfirmed outcome.
pub async fn launch<D>(
    driver: &D,
    site: &SiteProfile,
    service_url: &str,
    values: &ResolvedValueMap,
    config: &LaunchConfig,
) -> Result<LaunchOutcome, AutofillError>
where
    D: Page + ContextHost + ?Sized,
{
    let origin = driver
        .current_context()
        .await
        .map_err(AutofillError::Other)?;

    let context = match driver.open_context(service_url).await {
        Ok(Some(context)) => context,
        Ok(None) => {
            return Err(AutofillError::ContextBlocked {
                url: service_url.to_string(),
            });
        }
        Err(err) => {
            warn!(%err, url = %service_url, "context open failed");
            return Err(AutofillError::ContextBlocked {
                url: service_url.to_string(),
            });
        }
    };
    info!(context = %context, url = %service_url, "automation context opened");

    let outcome = tokio::time::timeout(
        config.timeout,
        fill_in_context(driver, &context, site, values, config),
    )
    .await;

    // The origin context takes over again either way; the launched context
    // stays open for the human to complete.
    if let Err(err) = driver.activate(&origin).await {
        warn!(%err, "could not reactivate origin context");
    }

    match outcome {
        Ok(report) => {
            // Validate on receipt, exactly as if it crossed a process
            // boundary; a malformed report counts as no report at all.
            match CompletionMessage::parse(&report) {
                Some(message) => Ok(LaunchOutcome {
                    confirmed: true,
                    message,
                    context_id: context,
                }),
                None => {
                    warn!("malformed completion report, treating as unconfirmed");
                    Ok(unconfirmed(context, config.timeout))
                }
            }
        }
        Err(_elapsed) => {
            info!(timeout = ?config.timeout, "no completion within timeout");
            Ok(unconfirmed(context, config.timeout))
        }
    }
}

fn unconfirmed(context: String, timeout: Duration) -> LaunchOutcome {
    LaunchOutcome {
        message: CompletionMessage {
            kind: COMPLETION_KIND.to_string(),
            success: false,
            filled_fields: 0,
            submitted: false,
            error: Some(format!(
                "launched but unconfirmed: no completion message within {timeout:?}"
            )),
        },
        confirmed: false,
        context_id: context,
    }
}

/// The injected side of the protocol: fill inside the launched context and
/// produce exactly one completion payload.
async fn fill_in_context<D>(
    driver: &D,
    context: &str,
    site: &SiteProfile,
    values: &ResolvedValueMap,
    config: &LaunchConfig,
) -> Value
where
    D: Page + ContextHost + ?Sized,
{
    let report = async {
        driver.activate(context).await?;
        if !config.settle_delay.is_zero() {
            tokio::time::sleep(config.settle_delay).await;
        }
        let summary = fill_fields(driver, site, values, &config.locate).await?;
        driver
            .disable_submit_controls(crate::orchestrator::SECURE_NOTE)
            .await?;
        anyhow::Ok(CompletionMessage::succeeded(summary.filled()))
    }
    .await;

    let message = match report {
        Ok(message) => message,
        Err(err) => {
            warn!(%err, "cross-context fill failed");
            CompletionMessage::failed(&err.to_string())
        }
    };
    serde_json::to_value(&message).unwrap_or(Value::Null)
}

#[cfg(test)]
#[path = "launcher_test.rs"]
mod launcher_test;
