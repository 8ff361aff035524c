//! # wikidot-client
//!
//! Client library for Wikidot's AJAX module connector and its
//! server-rendered pages.
//!
//! The service exposes no documented API; everything dynamic goes through
//! one semi-private endpoint (`ajax-module-connector.php`) that answers
//! JSON with HTML fragments inside, guarded by a cookie handshake and
//! in-body rate-limit signals. This crate turns that into a dependable
//! interface:
//!
//! - **Request engine** — bounded retries with a fixed wait, a typed
//!   failure taxonomy (transport, malformed, empty, temporary, exhausted,
//!   non-ok status) and HTML-unescaping of response bodies
//! - **Sessions** — form login, cookie ownership and explicitly scoped
//!   release ([`Client::with_session`])
//! - **Bulk fetching** — wave-based dispatch under a concurrency gate,
//!   used for member listings and bulk user lookup
//! - **Scrapers** — typed extraction of profiles, account references,
//!   timestamps and member rows from the returned fragments
//!
//! ## Quick Start
//!
//! ```no_run
//! use wikidot_client::{Client, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new(Config::default())?;
//!
//!     // Anonymous lookups need no session
//!     let users = client.get_users(["John Doe", "Jane Roe"]).await;
//!     println!("resolved {} users", users.len());
//!
//!     // Authenticated work is scoped; logout is guaranteed
//!     Client::with_session(Config::default(), "user", "pass", |client| async move {
//!         if let Some(site) = client.get_site("scp-wiki").await? {
//!             println!("{} members", site.members().await?.len());
//!         }
//!         Ok(())
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! A blocking twin of the module-call path lives in [`blocking`] for
//! embedders without an async runtime.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// The module-connector request engine and envelope types
pub mod amc;
/// Wave-based bulk fetch scheduling
mod batch;
/// Blocking execution mode of the request engine
pub mod blocking;
/// The client facade
mod client;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Private message composition and sending
mod message;
/// Retry classification and executors
pub mod retry;
/// Scrapers for the service's rendered fragments
pub mod scrape;
/// Session state and cookie handling
mod session;
/// Site targets, discovery and member listing
mod site;
/// User data model
pub mod user;

// Re-export commonly used types
pub use amc::{ModulePayload, ModuleResponse, RequestOptions};
pub use client::Client;
pub use config::{BatchConfig, Config, EndpointConfig, RetryConfig};
pub use error::{AmcError, Error, Result, ScrapeError, SessionError};
pub use message::PrivateMessage;
pub use retry::IsRetryable;
pub use site::{Site, SiteInfo};
pub use user::{Karma, RegisteredUser, SiteMember, User, to_unix_name};
