use std::time::Duration;

use thiserror::Error;

/// Failure taxonomy for an automation attempt.
///
/// Per-field misses are deliberately absent here: a field that cannot be
/// located or whose value is rejected is recorded as a skipped entry in the
/// fill summary, never an error that aborts the run.
#[derive(Debug, Error)]
pub enum AutofillError {
    /// No site profile is registered for the hostname. Non-retryable.
    #[error("no automation profile registered for host: {0}")]
    SiteNotSupported(String),
    /// Neither stored profile data nor a fresh cached submission exists.
    #[error("no stored data available to fill from")]
    NoDataAvailable,
    /// Another automation run is already active against the same document.
    #[error("an automation run is already active on document {0}")]
    AutomationBusy(String),
    /// The remote automation backend failed its health check.
    #[error("remote automation backend unavailable: {0}")]
    RemoteUnavailable(String),
    /// A second browsing context could not be opened (e.g. popup blocked).
    #[error("could not open an automation context for {url}")]
    ContextBlocked { url: String },
    /// No completion confirmation arrived within the allowed window.
    #[error("no completion confirmation received within {0:?}")]
    CompletionTimeout(Duration),
    /// Anything else.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AutofillError {
    /// Whether the same attempt is worth retrying as-is. Unsupported sites
    /// and missing data need operator action first; the rest may clear up
    /// (backend restarts, popups get allowed, slow pages finish loading).
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            AutofillError::SiteNotSupported(_) | AutofillError::NoDataAvailable
        )
    }

    /// One human-readable line for the hosting UI.
    pub fn user_message(&self) -> String {
        match self {
            AutofillError::SiteNotSupported(host) => {
                format!("This site ({host}) is not supported for automatic filling.")
            }
            AutofillError::NoDataAvailable => {
                "Please provide your service details before starting automation.".to_string()
            }
            AutofillError::AutomationBusy(_) => {
                "An automation run is already in progress on this page.".to_string()
            }
            AutofillError::RemoteUnavailable(_) => {
                "Remote automation is unavailable; continuing on this device instead.".to_string()
            }
            AutofillError::ContextBlocked { url } => {
                format!("The automation window was blocked. Allow popups, or open {url} manually.")
            }
            AutofillError::CompletionTimeout(_) => {
                "Automation was launched but not confirmed. Please verify the form manually."
                    .to_string()
            }
            AutofillError::Other(err) => err.to_string(),
        }
    }
}

#[cfg(test)]
#[path = "errors_test.rs"]
mod errors_test;
