use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::page::{Control, ControlKind, Page};

/// One rule for discovering a DOM control among many candidates.
///
/// Strategies are structured rather than raw selector strings so that every
/// page backend can interpret them: the WebDriver backend compiles them to
/// CSS, while the in-memory test page matches on the structure directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorStrategy {
    /// `tag[attr*="value"]` — attribute substring match. An empty tag matches
    /// any element.
    AttrContains {
        tag: String,
        attr: String,
        value: String,
    },
    /// `tag[attr="value"]` — exact attribute match.
    AttrEquals {
        tag: String,
        attr: String,
        value: String,
    },
    /// `#id`
    Id(String),
    /// The nth control (0-based) of a given tag on the page, in document
    /// order. Used as a last-resort positional fallback.
    NthOfKind { tag: String, index: usize },
    /// Raw CSS for cases the structured variants cannot express
    /// (e.g. class-based hooks like `select.form-control`).
    Css(String),
}

impl LocatorStrategy {
    pub fn attr_contains(tag: &str, attr: &str, value: &str) -> Self {
        LocatorStrategy::AttrContains {
            tag: tag.to_string(),
            attr: attr.to_string(),
            value: value.to_string(),
        }
    }

    pub fn attr_equals(tag: &str, attr: &str, value: &str) -> Self {
        LocatorStrategy::AttrEquals {
            tag: tag.to_string(),
            attr: attr.to_string(),
            value: value.to_string(),
        }
    }

    pub fn id(id: &str) -> Self {
        LocatorStrategy::Id(id.to_string())
    }

    pub fn nth_of_kind(tag: &str, index: usize) -> Self {
        LocatorStrategy::NthOfKind {
            tag: tag.to_string(),
            index,
        }
    }

    pub fn css(selector: &str) -> Self {
        LocatorStrategy::Css(selector.to_string())
    }

    /// CSS rendering for selector-based backends. `NthOfKind` has no faithful
    /// single-selector form; backends handle it positionally and this returns
    /// the bare tag for logging purposes only.
    pub fn as_css(&self) -> String {
        match self {
            LocatorStrategy::AttrContains { tag, attr, value } => {
                format!("{tag}[{attr}*=\"{value}\"]")
            }
            LocatorStrategy::AttrEquals { tag, attr, value } => {
                format!("{tag}[{attr}=\"{value}\"]")
            }
            LocatorStrategy::Id(id) => format!("#{id}"),
            LocatorStrategy::NthOfKind { tag, .. } => tag.clone(),
            LocatorStrategy::Css(selector) => selector.clone(),
        }
    }
}

/// Describes one logical field of a site profile: its stable name, the kind
/// of control expected, and the ordered locator fallback chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Stable identifier independent of how the site labels its control
    /// (e.g. `mobile`, `service_number`).
    pub name: String,
    pub kind: ControlKind,
    /// Most specific first; the first strategy that finds a control wins.
    pub locators: Vec<LocatorStrategy>,
}

impl FieldSpec {
    /// Panics on an empty locator list; a spec without locators can never
    /// match anything and indicates a broken profile definition.
    pub fn new(name: &str, kind: ControlKind, locators: Vec<LocatorStrategy>) -> Self {
        assert!(
            !locators.is_empty(),
            "field spec '{name}' must have at least one locator"
        );
        FieldSpec {
            name: name.to_string(),
            kind,
            locators,
        }
    }
}

/// Find the control for a field: iterate the locator chain in order and
/// return the first hit. Pure and retry-free — "not found" is a normal
/// outcome and waiting for late-rendering pages belongs to the caller
/// (see [`locate_with_backoff`]).
pub async fn match_control<P: Page + ?Sized>(
    page: &P,
    spec: &FieldSpec,
) -> Result<Option<Control>> {
    for locator in &spec.locators {
        if let Some(control) = page.find(locator).await? {
            debug!(
                field = %spec.name,
                locator = %locator.as_css(),
                kind = ?control.kind,
                "matched control"
            );
            return Ok(Some(control));
        }
        trace!(field = %spec.name, locator = %locator.as_css(), "no match");
    }
    Ok(None)
}

/// Explicit retry policy for locating controls on pages that render
/// asynchronously. Callers pass this in; nothing in the matcher itself
/// sleeps or retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Wait between attempts.
    pub interval: Duration,
}

impl Default for BackoffPolicy {
    /// One retry after 1.5s — long enough for the supported portals to
    /// finish rendering their form controls.
    fn default() -> Self {
        BackoffPolicy {
            attempts: 2,
            interval: Duration::from_millis(1500),
        }
    }
}

impl BackoffPolicy {
    /// Single attempt, no waiting. Used when the caller already knows the
    /// page has settled, and by tests.
    pub fn immediate() -> Self {
        BackoffPolicy {
            attempts: 1,
            interval: Duration::ZERO,
        }
    }
}

/// [`match_control`] with the caller-supplied backoff applied between
/// attempts. Returns `None` once the attempts are exhausted.
pub async fn locate_with_backoff<P: Page + ?Sized>(
    page: &P,
    spec: &FieldSpec,
    policy: &BackoffPolicy,
) -> Result<Option<Control>> {
    let attempts = policy.attempts.max(1);
    for attempt in 1..=attempts {
        if let Some(control) = match_control(page, spec).await? {
            return Ok(Some(control));
        }
        if attempt < attempts {
            debug!(
                field = %spec.name,
                attempt,
                wait_ms = policy.interval.as_millis() as u64,
                "control not present yet, waiting"
            );
            tokio::time::sleep(policy.interval).await;
        }
    }
    Ok(None)
}

#[cfg(test)]
#[path = "locator_test.rs"]
mod locator_test;
