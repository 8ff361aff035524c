//! Session state and cookie handling
//!
//! The service authenticates every request through cookies: the fixed
//! connector token is always present, and a successful login adds the
//! named session cookie. This module owns that cookie set and the headers
//! derived from it. The state is per-client and mutated only by the
//! login/logout lifecycle — never a process-wide singleton.

use crate::amc::{TOKEN_FIELD, TOKEN_VALUE};
use reqwest::header::{self, HeaderMap, HeaderValue};
use std::collections::BTreeMap;

/// The cookie the service issues on login
pub(crate) const SESSION_COOKIE: &str = "WIKIDOT_SESSION_ID";

/// Per-client cookie set and derived request headers
#[derive(Debug)]
pub(crate) struct SessionState {
    cookies: BTreeMap<String, String>,
    referer: String,
    /// Whether this state owns a login it is responsible for closing
    owned: bool,
}

impl SessionState {
    /// Fresh state carrying only the fixed token cookie
    pub(crate) fn new(referer: String) -> Self {
        let mut cookies = BTreeMap::new();
        cookies.insert(TOKEN_FIELD.to_string(), TOKEN_VALUE.to_string());
        Self {
            cookies,
            referer,
            owned: false,
        }
    }

    /// Store the session cookie from a login this client performed
    pub(crate) fn open(&mut self, session_id: String) {
        self.cookies.insert(SESSION_COOKIE.to_string(), session_id);
        self.owned = true;
    }

    /// Attach an externally-obtained session cookie
    ///
    /// The caller keeps the logout responsibility; dropping this state
    /// will not warn about it.
    pub(crate) fn attach(&mut self, session_id: String) {
        self.cookies.insert(SESSION_COOKIE.to_string(), session_id);
        self.owned = false;
    }

    /// Forget the session cookie
    pub(crate) fn clear(&mut self) {
        self.cookies.remove(SESSION_COOKIE);
        self.owned = false;
    }

    /// Whether a session cookie is currently set
    pub(crate) fn has_session(&self) -> bool {
        self.cookies.contains_key(SESSION_COOKIE)
    }

    fn cookie_header(&self) -> String {
        let mut header = String::new();
        for (name, value) in &self.cookies {
            header.push_str(name);
            header.push('=');
            header.push_str(value);
            header.push_str("; ");
        }
        header.trim_end().trim_end_matches(';').to_string()
    }

    /// The headers attached to every connector request
    pub(crate) fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        match HeaderValue::from_str(&self.cookie_header()) {
            Ok(value) => {
                headers.insert(header::COOKIE, value);
            }
            Err(_) => {
                tracing::warn!("session cookie contains invalid header characters, omitting");
            }
        }
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded;charset=UTF-8"),
        );
        if let Ok(value) = HeaderValue::from_str(&self.referer) {
            headers.insert(header::REFERER, value);
        }
        headers
    }
}

impl Drop for SessionState {
    fn drop(&mut self) {
        // A live owned session at drop time means close() was never
        // called; the server-side session is left dangling.
        if self.owned && self.has_session() {
            tracing::warn!(
                "client dropped with a live session; call close() or use with_session() \
                 so logout runs"
            );
        }
    }
}

/// Pull a named cookie out of a response's `Set-Cookie` headers
pub(crate) fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for value in headers.get_all(header::SET_COOKIE) {
        let Ok(text) = value.to_str() else { continue };
        let pair = text.split(';').next().unwrap_or_default();
        if let Some((cookie_name, cookie_value)) = pair.split_once('=') {
            if cookie_name.trim() == name {
                return Some(cookie_value.trim().to_string());
            }
        }
    }
    None
}
