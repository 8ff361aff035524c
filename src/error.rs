//! Error types for wikidot-client
//!
//! This module provides the error handling for the library, including:
//! - The module-connector taxonomy (`AmcError`) matched at every retry
//!   decision point
//! - Session lifecycle errors (`SessionError`)
//! - Scraping errors for unrecognized page fragments (`ScrapeError`)
//! - A crate-wide `Result` alias

use thiserror::Error;

/// Result type alias for wikidot-client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for wikidot-client
///
/// This is the primary error type used throughout the library. Each variant
/// includes contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Module-connector call failed
    #[error("module call failed: {0}")]
    Amc(#[from] AmcError),

    /// Session lifecycle error
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// A page fragment did not match the expected structure
    #[error("scrape error: {0}")]
    Scrape(#[from] ScrapeError),

    /// Network error outside the module-connector retry loop
    /// (profile-page and homepage fetches)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The remote service refused the operation for this account
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Failures of a single `ajax-module-connector.php` call
///
/// The retry loop matches these variants explicitly: [`Transport`] and
/// [`Temporary`] are retried, everything else aborts the call. See
/// [`crate::retry::IsRetryable`].
///
/// [`Transport`]: AmcError::Transport
/// [`Temporary`]: AmcError::Temporary
#[derive(Debug, Error)]
pub enum AmcError {
    /// Connection-level failure or non-200 HTTP status. Retryable.
    #[error("transport failure: {reason}")]
    Transport {
        /// What went wrong at the HTTP layer (status line or connection error)
        reason: String,
    },

    /// The response body is not valid JSON. Not retried: the request
    /// itself is likely malformed, so another attempt cannot help.
    #[error("connector returned a non-JSON body")]
    Malformed,

    /// The response body parsed to JSON `null`. Not retried, same
    /// reasoning as [`AmcError::Malformed`].
    #[error("connector returned an empty response")]
    Empty,

    /// The service answered `status: "try_again"` — it is shedding load
    /// or rate-limiting. Retryable.
    #[error("connector asked to try again")]
    Temporary,

    /// All attempts were consumed without a usable response
    #[error("request failed after {attempts} attempts: {last}")]
    Exhausted {
        /// How many attempts were made, counting the first
        attempts: u32,
        /// The failure observed on the final attempt
        last: Box<AmcError>,
    },

    /// The final response carried a status other than `"ok"`
    ///
    /// The status string is the service's application-level error code
    /// (e.g. `"no_permission"`) and is preserved for caller inspection.
    #[error("connector status {status:?}")]
    NotOk {
        /// The application-level status string returned by the service
        status: String,
    },
}

impl AmcError {
    /// The application-level status string, for [`AmcError::NotOk`] failures
    pub fn status(&self) -> Option<&str> {
        match self {
            AmcError::NotOk { status } => Some(status),
            AmcError::Exhausted { last, .. } => last.status(),
            _ => None,
        }
    }
}

/// Session lifecycle errors
#[derive(Debug, Error)]
pub enum SessionError {
    /// Login or its validating call failed
    #[error("failed to create session: {reason}")]
    CreateFailed {
        /// Why the session could not be established
        reason: String,
    },

    /// The operation requires a logged-in client
    #[error("no active session")]
    NotLoggedIn,
}

/// A returned HTML fragment did not match the structure the scraper expects
///
/// These indicate either a malformed fragment or a remote layout change.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// A `printuser` span matched none of the known account renderings
    #[error("unrecognized printuser fragment")]
    Printuser,

    /// An `odate` element carried no `time_<epoch>` class
    #[error("odate element has no timestamp class")]
    Odate,

    /// The pager total could not be read as a number
    #[error("pager total is not a number")]
    PagerTotal,

    /// A profile page was recognized but a required field was missing
    #[error("profile page is missing {field}")]
    Profile {
        /// The field that could not be extracted
        field: &'static str,
    },

    /// A module response that should carry an HTML `body` field did not
    #[error("module response carried no body")]
    MissingBody,
}
