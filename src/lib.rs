//! # sevafill
//!
//! Cross-site form automation engine for Gujarat utility-service portals
//! (electricity, gas, water, property name-change).
//!
//! The engine knows how to (a) recognize which supported portal a page
//! belongs to, (b) assemble the values to fill from a user's stored profile,
//! a short-lived cached submission, and per-call overrides, (c) locate each
//! form control through an ordered chain of fallback locators, (d) write
//! values the way the page's own validation expects (native select
//! semantics, input/change notifications), and (e) report progress and the
//! final outcome across an execution boundary — a second browser window or
//! a remote automation backend.
//!
//! It is a library: the hosting UI or background process owns all
//! user-facing configuration. There is no CLI.
//!
//! Automation always stops short of submission: CAPTCHAs and OTPs are for
//! the human, so every run ends by disabling submit controls and handing
//! the form back for review.
//!
//! ## Usage
//!
//! ```no_run
//! use sevafill::{
//!     AnimatedFill, AnimatedFillConfig, BrowserType, SiteRegistry, StopHandle, WebBrowser,
//!     resolver::{self, ProfileData},
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let registry = SiteRegistry::builtin();
//! let site = registry.require("connect.torrentpower.com")?;
//!
//! let profile = ProfileData::from_pairs(&[("mobile", "9876543210"), ("city", "Ahmedabad")]);
//! let resolution = resolver::resolve(site, Some(&profile), None, &Default::default())?;
//!
//! let browser = WebBrowser::new(BrowserType::Firefox, false).await?;
//! browser.goto("https://connect.torrentpower.com/tplcp/application/namechangerequest").await?;
//!
//! let orchestrator = AnimatedFill::new(AnimatedFillConfig::default());
//! let stop = StopHandle::new();
//! let run = orchestrator.run(&browser, site, &resolution.values, &stop).await?;
//! println!("{}", run.summary.describe());
//! # Ok(())
//! # }
//! ```

/// Remote automation backend client
pub mod bridge;

/// Failure taxonomy for automation attempts
pub mod errors;

/// Fill executor: writing values through native control semantics
pub mod fill;

/// Cross-context launcher and completion protocol
pub mod launcher;

/// Locator strategies, field specs, and the first-match control matcher
pub mod locator;

/// Animated step-by-step fill orchestrator
pub mod orchestrator;

/// Control model and the page abstraction over a live document
pub mod page;

/// Site profile registry for the supported portals
pub mod registry;

/// Field value resolution and the persisted intent record
pub mod resolver;

/// Automation task lifecycle
pub mod task;

/// WebDriver-backed page driver
pub mod webdriver;

pub use bridge::{AutomationBridge, BridgeConfig, StatusSubscription};
pub use errors::AutofillError;
pub use fill::{FieldOutcome, FillSummary, SkipReason};
pub use launcher::{CompletionMessage, ContextHost, LaunchConfig, LaunchOutcome, launch};
pub use locator::{BackoffPolicy, FieldSpec, LocatorStrategy};
pub use orchestrator::{AnimatedFill, AnimatedFillConfig, StepProgress, StepState, StopHandle};
pub use page::{Control, ControlKind, Page, SelectOption};
pub use registry::{SiteProfile, SiteRegistry};
pub use resolver::{CachedSubmission, IntentStore, ProfileData, ResolvedValueMap, ValueSource};
pub use task::{AutomationResult, AutomationTask, TaskStatus};
pub use webdriver::{BrowserType, WebBrowser};
