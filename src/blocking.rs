//! Blocking execution mode of the request engine
//!
//! A thread-blocking twin of the async module-call path, for embedders
//! without an async runtime. Classification, validation, retry accounting
//! and the token merge are the exact same code as the async mode
//! ([`crate::amc`]); only the transport call and the inter-attempt wait
//! block the thread instead of suspending a task.
//!
//! Do not use this from inside an async runtime; use
//! [`Client`](crate::Client) there instead.

use crate::amc::{self, ModulePayload, ModuleResponse, RequestOptions};
use crate::config::Config;
use crate::error::{AmcError, Result};
use crate::retry;
use crate::session::SessionState;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use std::time::Duration;

/// Blocking module-connector client
///
/// Issues module calls with the same retry/validation semantics as the
/// async [`Client`](crate::Client). Session login is an async-side
/// concern; a session obtained there can be attached here by cookie
/// value.
pub struct Connector {
    http: reqwest::blocking::Client,
    config: Config,
    session: SessionState,
}

impl Connector {
    /// Create a blocking connector
    pub fn new(config: Config) -> Result<Self> {
        let http = reqwest::blocking::Client::builder().build()?;
        let referer = format!("https://www.{}", config.endpoints.root_domain);
        Ok(Self {
            http,
            config,
            session: SessionState::new(referer),
        })
    }

    /// Attach an externally-obtained session cookie to subsequent calls
    pub fn attach_session(&mut self, session_id: impl Into<String>) {
        self.session.attach(session_id.into());
    }

    /// Detach the session cookie
    pub fn clear_session(&mut self) {
        self.session.clear();
    }

    /// Issue a module call with the client-level retry policy
    pub fn module_call(
        &self,
        site: &str,
        tls: bool,
        payload: &ModulePayload,
    ) -> Result<ModuleResponse> {
        self.module_call_with(
            site,
            tls,
            payload,
            &RequestOptions::from_retry(&self.config.retry),
        )
    }

    /// Issue a module call with per-call options
    pub fn module_call_with(
        &self,
        site: &str,
        tls: bool,
        payload: &ModulePayload,
        options: &RequestOptions,
    ) -> Result<ModuleResponse> {
        let url = self.config.endpoints.connector_url(site, tls);
        let headers = self.session.headers();
        let form = payload.to_form();
        tracing::debug!(url = %url, module = payload.get("moduleName"), "blocking module call");

        let response =
            retry::run_with_retries_blocking(options.attempt_limit, options.wait_time, || {
                attempt(&self.http, &url, &headers, &form, options.timeout)
            })?;

        Ok(amc::validate(response, options.unescape)?)
    }
}

/// One blocking POST attempt against the connector
fn attempt(
    http: &reqwest::blocking::Client,
    url: &str,
    headers: &HeaderMap,
    form: &[(String, String)],
    timeout: Duration,
) -> std::result::Result<ModuleResponse, AmcError> {
    let response = http
        .post(url)
        .headers(headers.clone())
        .form(form)
        .timeout(timeout)
        .send()
        .map_err(|e| AmcError::Transport {
            reason: e.to_string(),
        })?;

    let status = response.status();
    if status != StatusCode::OK {
        return Err(AmcError::Transport {
            reason: format!("HTTP {status}"),
        });
    }

    let text = response.text().map_err(|e| AmcError::Transport {
        reason: e.to_string(),
    })?;
    amc::classify_body(&text)
}
