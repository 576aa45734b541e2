use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::locator::{BackoffPolicy, locate_with_backoff};
use crate::page::{Control, ControlKind, Page, PageEvent};
use crate::registry::SiteProfile;
use crate::resolver::{ResolvedValueMap, ValueSource};

/// How long a freshly filled control stays visually marked. Cosmetic only;
/// the fill itself never waits on it.
pub const HIGHLIGHT_WINDOW: Duration = Duration::from_secs(2);

/// Why a field was not filled. All of these are normal per-field outcomes,
/// never fatal to the run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No resolved value for this field — filling it would overwrite a
    /// legitimate default.
    NoValue,
    /// No locator in the chain matched a control.
    ControlNotFound,
    /// The control rejected the value (no exactly matching select option).
    ValueRejected,
    /// The page errored mid-operation (element re-rendered, context gone).
    PageError(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldOutcome {
    Filled { source: ValueSource },
    Skipped { reason: SkipReason },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldResult {
    pub field: String,
    pub outcome: FieldOutcome,
}

/// Outcome of one fill pass over a site profile.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FillSummary {
    pub service_name: String,
    pub results: Vec<FieldResult>,
}

impl FillSummary {
    pub fn filled(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, FieldOutcome::Filled { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.results.len() - self.filled()
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// The one human-readable summary line for this attempt. Always states
    /// that the CAPTCHA/OTP and the submission itself remain manual.
    pub fn describe(&self) -> String {
        format!(
            "Filled {} of {} fields on {} ({} skipped). \
             Enter the CAPTCHA/OTP, review the form, and submit it yourself.",
            self.filled(),
            self.total(),
            self.service_name,
            self.skipped()
        )
    }
}

/// Write one value through the control's native semantics.
///
/// Returns `Ok(false)` — without touching the DOM — when there is no control
/// or the value is empty; filling is best-effort per field. Select controls
/// take an exact case-insensitive match on option value or display text,
/// and nothing else: a substring guess could silently pick a wrong option.
pub async fn fill_control<P: Page + ?Sized>(
    page: &P,
    control: Option<&Control>,
    value: &str,
) -> Result<bool> {
    let Some(control) = control else {
        return Ok(false);
    };
    if value.is_empty() {
        return Ok(false);
    }

    let written = match control.kind {
        ControlKind::Select => {
            let options = page.options(control).await?;
            let wanted = value.to_lowercase();
            let hit = options.iter().find(|o| {
                o.value.to_lowercase() == wanted || o.label.to_lowercase() == wanted
            });
            match hit {
                Some(option) => {
                    page.select_option(control, &option.value).await?;
                    true
                }
                None => {
                    debug!(%value, options = options.len(), "no exactly matching option");
                    false
                }
            }
        }
        ControlKind::Text | ControlKind::TextArea => {
            page.write_value(control, value).await?;
            page.dispatch(control, PageEvent::Input).await?;
            page.dispatch(control, PageEvent::Change).await?;
            true
        }
    };

    if written
        && let Err(err) = page.highlight(control, HIGHLIGHT_WINDOW).await
    {
        // Purely cosmetic; never fail the fill over it.
        debug!(%err, "highlight failed");
    }
    Ok(written)
}

/// Fill every field of a site profile from the resolved value map.
///
/// One field's failure never aborts the others; per-field errors from the
/// page are downgraded to skipped entries. The caller is responsible for the
/// one-run-per-document guard (see the orchestrator).
pub async fn fill_fields<P: Page + ?Sized>(
    page: &P,
    site: &SiteProfile,
    values: &ResolvedValueMap,
    backoff: &BackoffPolicy,
) -> Result<FillSummary> {
    let mut results = Vec::with_capacity(site.fields.len());

    for spec in &site.fields {
        let outcome = match values.get(&spec.name) {
            None => FieldOutcome::Skipped {
                reason: SkipReason::NoValue,
            },
            Some(resolved) => match locate_with_backoff(page, spec, backoff).await {
                Ok(None) => {
                    warn!(field = %spec.name, "no control found, skipping");
                    FieldOutcome::Skipped {
                        reason: SkipReason::ControlNotFound,
                    }
                }
                Ok(Some(control)) => {
                    match fill_control(page, Some(&control), &resolved.value).await {
                        Ok(true) => {
                            info!(field = %spec.name, source = ?resolved.source, "filled");
                            FieldOutcome::Filled {
                                source: resolved.source,
                            }
                        }
                        Ok(false) => FieldOutcome::Skipped {
                            reason: SkipReason::ValueRejected,
                        },
                        Err(err) => {
                            warn!(field = %spec.name, %err, "page error while filling");
                            FieldOutcome::Skipped {
                                reason: SkipReason::PageError(err.to_string()),
                            }
                        }
                    }
                }
                Err(err) => {
                    warn!(field = %spec.name, %err, "page error while locating");
                    FieldOutcome::Skipped {
                        reason: SkipReason::PageError(err.to_string()),
                    }
                }
            },
        };
        results.push(FieldResult {
            field: spec.name.clone(),
            outcome,
        });
    }

    let summary = FillSummary {
        service_name: site.service_name.clone(),
        results,
    };
    info!(
        site = %site.host,
        filled = summary.filled(),
        skipped = summary.skipped(),
        "fill pass done"
    );
    Ok(summary)
}

#[cfg(test)]
#[path = "fill_test.rs"]
mod fill_test;
