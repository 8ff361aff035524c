//! The AJAX module connector request engine
//!
//! Every dynamic operation against the service goes through one endpoint,
//! `ajax-module-connector.php`, as a form-encoded POST that answers JSON.
//! This module owns the envelope types and the call pipeline: build the
//! outgoing payload (the caller's fields plus the fixed token), POST with
//! the session headers, classify the answer, retry what is transient,
//! validate the final status and unescape the HTML `body` field.
//!
//! Classification is a pure function shared with the blocking execution
//! mode in [`crate::blocking`], so the two modes cannot drift apart.

use crate::config::RetryConfig;
use crate::error::AmcError;
use crate::retry;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// The fixed connector token field, sent both as a cookie and a body field
pub(crate) const TOKEN_FIELD: &str = "wikidot_token7";

/// The fixed connector token value; the endpoint only checks that the
/// cookie and the body field match
pub(crate) const TOKEN_VALUE: &str = "123456";

/// Per-call knobs of the request engine
///
/// Defaults come from the client-level [`RetryConfig`]; every call may
/// override them.
#[derive(Clone, Debug)]
pub struct RequestOptions {
    /// Total attempts, counting the first
    pub attempt_limit: u32,
    /// Fixed wait between attempts
    pub wait_time: Duration,
    /// Per-attempt timeout
    pub timeout: Duration,
    /// Whether to HTML-unescape the response `body` field
    pub unescape: bool,
}

impl RequestOptions {
    /// Build call options from a client-level retry policy
    pub fn from_retry(retry: &RetryConfig) -> Self {
        Self {
            attempt_limit: retry.attempt_limit,
            wait_time: retry.wait_time,
            timeout: retry.timeout,
            unescape: true,
        }
    }
}

/// An outgoing module-call payload
///
/// A mapping of form fields. The engine copies it and merges the fixed
/// token field before transmission; the engine's token always wins, so a
/// caller-supplied token never reaches the wire.
#[derive(Clone, Debug, Default)]
pub struct ModulePayload {
    fields: BTreeMap<String, String>,
}

impl ModulePayload {
    /// Start a payload addressed at a module
    pub fn module(name: &str) -> Self {
        Self::default().field("moduleName", name)
    }

    /// Start a payload for action-only calls (`moduleName=Empty`)
    pub fn empty_module() -> Self {
        Self::module("Empty")
    }

    /// Add a form field
    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.fields.insert(key.into(), value.to_string());
        self
    }

    /// Read back a field
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// The wire form: a copy of the caller's fields with the token merged in
    pub(crate) fn to_form(&self) -> Vec<(String, String)> {
        let mut fields = self.fields.clone();
        fields.insert(TOKEN_FIELD.to_string(), TOKEN_VALUE.to_string());
        fields.into_iter().collect()
    }
}

/// A validated module-call response
///
/// Guaranteed to have passed the HTTP-200, JSON-parseability,
/// non-empty-body and status-is-"ok" checks. All response fields beyond
/// `status` are retained and reachable through [`ModuleResponse::field`].
#[derive(Clone, Debug)]
pub struct ModuleResponse {
    status: String,
    fields: serde_json::Map<String, Value>,
}

impl ModuleResponse {
    /// The application-level status (always `"ok"` on the success path)
    pub fn status(&self) -> &str {
        &self.status
    }

    /// The HTML `body` field, when the module returned one
    pub fn body(&self) -> Option<&str> {
        self.fields.get("body").and_then(Value::as_str)
    }

    /// Any other response field
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    fn unescape_body(&mut self) {
        if let Some(Value::String(body)) = self.fields.get_mut("body") {
            let decoded = html_escape::decode_html_entities(body.as_str()).into_owned();
            *body = decoded;
        }
    }
}

/// Classify one raw response body
///
/// Non-JSON and JSON-null bodies mean the request itself is broken and
/// fail immediately; a `try_again` status is the service shedding load
/// and is retryable. A JSON value that is not an object, or an object
/// without a `status` string, counts as malformed.
pub(crate) fn classify_body(text: &str) -> Result<ModuleResponse, AmcError> {
    let value: Value = serde_json::from_str(text).map_err(|_| AmcError::Malformed)?;
    if value.is_null() {
        return Err(AmcError::Empty);
    }
    let Value::Object(fields) = value else {
        return Err(AmcError::Malformed);
    };
    let status = fields
        .get("status")
        .and_then(Value::as_str)
        .ok_or(AmcError::Malformed)?
        .to_string();
    if status == "try_again" {
        return Err(AmcError::Temporary);
    }
    Ok(ModuleResponse { status, fields })
}

/// Validate the final response after the retry loop
///
/// A non-`"ok"` status at this point is a final result, not something to
/// retry; it surfaces with the status string attached.
pub(crate) fn validate(
    mut response: ModuleResponse,
    unescape: bool,
) -> Result<ModuleResponse, AmcError> {
    if response.status != "ok" {
        return Err(AmcError::NotOk {
            status: response.status,
        });
    }
    if unescape {
        response.unescape_body();
    }
    Ok(response)
}

/// One POST attempt against the connector
async fn attempt(
    http: &reqwest::Client,
    url: &str,
    headers: &HeaderMap,
    form: &[(String, String)],
    timeout: Duration,
) -> Result<ModuleResponse, AmcError> {
    let response = http
        .post(url)
        .headers(headers.clone())
        .form(form)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| AmcError::Transport {
            reason: e.to_string(),
        })?;

    let status = response.status();
    if status != StatusCode::OK {
        return Err(AmcError::Transport {
            reason: format!("HTTP {status}"),
        });
    }

    let text = response.text().await.map_err(|e| AmcError::Transport {
        reason: e.to_string(),
    })?;
    classify_body(&text)
}

/// Issue a module call with retries, validation and unescaping
///
/// This is the concurrency-suspending execution mode: waits and the
/// network call suspend the task, never the scheduling thread. The
/// blocking twin lives in [`crate::blocking`].
pub(crate) async fn module_call(
    http: &reqwest::Client,
    url: &str,
    headers: &HeaderMap,
    payload: &ModulePayload,
    options: &RequestOptions,
) -> Result<ModuleResponse, AmcError> {
    let form = payload.to_form();
    let form = &form[..];
    tracing::debug!(url = %url, module = payload.get("moduleName"), "module call");

    let response = retry::run_with_retries(options.attempt_limit, options.wait_time, || {
        attempt(http, url, headers, form, options.timeout)
    })
    .await?;

    validate(response, options.unescape)
}
