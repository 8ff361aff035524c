//! The client facade
//!
//! [`Client`] owns everything with a lifetime: the HTTP connection pool,
//! the configuration and the session state. It is cheap to clone — all
//! fields are shared handles — and every derived value ([`Site`],
//! [`PrivateMessage`]) holds a clone.
//!
//! Sessions are an explicitly scoped resource: open with [`Client::login`],
//! release with [`Client::close`], or let [`Client::with_session`] pair
//! the two around a closure. There is no destructor-triggered network
//! call; a client dropped with a live session only logs a warning.

use crate::amc::{self, ModulePayload, ModuleResponse, RequestOptions};
use crate::batch;
use crate::config::Config;
use crate::error::{Error, Result, SessionError};
use crate::message::PrivateMessage;
use crate::scrape;
use crate::session::{self, SESSION_COOKIE, SessionState};
use crate::site::{Site, SiteInfo};
use crate::user::{RegisteredUser, to_unix_name};
use reqwest::StatusCode;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Timeout of the direct (non-retried) login POST
const LOGIN_TIMEOUT: Duration = Duration::from_secs(20);

/// Timeout of plain page fetches (profiles, homepages)
const PAGE_TIMEOUT: Duration = Duration::from_secs(60);

/// Asynchronous client for the farm's module connector and rendered pages
///
/// # Example
///
/// ```no_run
/// use wikidot_client::{Client, Config};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = Client::new(Config::default())?;
///
///     if let Some(user) = client.get_user("John Doe").await? {
///         println!("{} registered {:?}", user.name, user.registered);
///     }
///
///     if let Some(site) = client.get_site("scp-wiki").await? {
///         let members = site.members().await?;
///         println!("{} members", members.len());
///     }
///     Ok(())
/// }
/// ```
#[derive(Clone, Debug)]
pub struct Client {
    http: reqwest::Client,
    config: Arc<Config>,
    session: Arc<RwLock<SessionState>>,
}

impl Client {
    /// Create a client; no network traffic happens until the first call
    pub fn new(config: Config) -> Result<Self> {
        let http = reqwest::Client::builder().build()?;
        let referer = format!("https://www.{}", config.endpoints.root_domain);
        Ok(Self {
            http,
            config: Arc::new(config),
            session: Arc::new(RwLock::new(SessionState::new(referer))),
        })
    }

    /// The client's configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Issue a module call against the farm's `www` site
    pub async fn module_call(&self, payload: &ModulePayload) -> Result<ModuleResponse> {
        self.connector_call("www", true, payload, None).await
    }

    /// Issue a module call against the farm's `www` site with per-call options
    pub async fn module_call_with(
        &self,
        payload: &ModulePayload,
        options: RequestOptions,
    ) -> Result<ModuleResponse> {
        self.connector_call("www", true, payload, Some(options)).await
    }

    /// The shared engine entry: session headers + retry policy + one call
    pub(crate) async fn connector_call(
        &self,
        site: &str,
        tls: bool,
        payload: &ModulePayload,
        options: Option<RequestOptions>,
    ) -> Result<ModuleResponse> {
        let options = options.unwrap_or_else(|| RequestOptions::from_retry(&self.config.retry));
        let url = self.config.endpoints.connector_url(site, tls);
        let headers = self.session.read().await.headers();
        Ok(amc::module_call(&self.http, &url, &headers, payload, &options).await?)
    }

    // ----- session lifecycle -----

    /// Log in and validate the session
    ///
    /// Performs the direct (non-retried) authentication POST, stores the
    /// session cookie, then validates it with one account-settings module
    /// call through the engine. A `no_permission` answer means the
    /// credentials were rejected.
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        let response = self
            .http
            .post(self.config.endpoints.login_url())
            .form(&[
                ("login", username),
                ("password", password),
                ("action", "Login2Action"),
                ("event", "login"),
            ])
            .timeout(LOGIN_TIMEOUT)
            .send()
            .await
            .map_err(|e| SessionError::CreateFailed {
                reason: format!("login request failed: {e}"),
            })?;

        let session_id = session::extract_cookie(response.headers(), SESSION_COOKIE).ok_or_else(
            || SessionError::CreateFailed {
                reason: "login response carried no session cookie".to_string(),
            },
        )?;
        self.session.write().await.open(session_id);

        let validation = self
            .module_call(&ModulePayload::module("dashboard/settings/DSAccountModule"))
            .await;
        match validation {
            Ok(_) => {
                tracing::debug!("session created");
                Ok(())
            }
            Err(Error::Amc(e)) if e.status() == Some("no_permission") => {
                self.session.write().await.clear();
                Err(SessionError::CreateFailed {
                    reason: "the service rejected the credentials".to_string(),
                }
                .into())
            }
            Err(e) => {
                self.session.write().await.clear();
                Err(SessionError::CreateFailed {
                    reason: format!("session validation failed: {e}"),
                }
                .into())
            }
        }
    }

    /// Whether a session cookie is currently held
    pub async fn has_session(&self) -> bool {
        self.session.read().await.has_session()
    }

    /// Log out, best-effort
    ///
    /// Issues the logout call, then clears the stored cookie. Failures of
    /// the call are logged and swallowed; the cookie is cleared either way.
    pub async fn logout(&self) {
        let payload = ModulePayload::empty_module()
            .field("action", "Login2Action")
            .field("event", "logout");
        if let Err(error) = self.module_call(&payload).await {
            tracing::debug!(%error, "logout call failed, clearing the session cookie anyway");
        }
        self.session.write().await.clear();
        tracing::debug!("session deleted");
    }

    /// Release the session if one is held
    ///
    /// Call this when done with a logged-in client; [`Client::with_session`]
    /// does it automatically.
    pub async fn close(&self) {
        if self.has_session().await {
            self.logout().await;
        }
    }

    /// Run a closure against a logged-in client with guaranteed release
    ///
    /// Logs in, hands the client to `run`, and logs out afterwards whether
    /// the closure succeeded or failed.
    pub async fn with_session<F, Fut, T>(
        config: Config,
        username: &str,
        password: &str,
        run: F,
    ) -> Result<T>
    where
        F: FnOnce(Client) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let client = Client::new(config)?;
        client.login(username, password).await?;
        let result = run(client.clone()).await;
        client.close().await;
        result
    }

    // ----- derived lookups -----

    /// Look up one user by name
    ///
    /// Fetches and scrapes the profile page. `Ok(None)` means the user
    /// does not exist, which is an expected outcome, not an error.
    pub async fn get_user(&self, name: &str) -> Result<Option<RegisteredUser>> {
        let url = self.config.endpoints.profile_url(&to_unix_name(name));
        let response = self.http.get(&url).timeout(PAGE_TIMEOUT).send().await?;
        let html = response.text().await?;
        Ok(scrape::parse_profile_page(&html)?)
    }

    /// Look up many users concurrently
    ///
    /// Profile pages are fetched in waves under the batch throughput
    /// controls. Names that do not resolve are dropped from the result;
    /// connection-level failures retry under the batch retry policy. The
    /// result preserves the order of the input names.
    pub async fn get_users<I, S>(&self, names: I) -> Vec<RegisteredUser>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<String> = names
            .into_iter()
            .map(|name| to_unix_name(name.as_ref()))
            .collect();
        let config = &self.config.batch;
        tracing::debug!(count = names.len(), "bulk user lookup");

        let sources = batch::run_waves(names, config, |name| async move {
            let url = self.config.endpoints.profile_url(&name);
            batch::persistent(config, || {
                let http = self.http.clone();
                let url = url.clone();
                async move {
                    let response = http
                        .get(&url)
                        .timeout(PAGE_TIMEOUT)
                        .send()
                        .await
                        .map_err(Error::Network)?;
                    response.text().await.map_err(Error::Network)
                }
            })
            .await
        })
        .await;

        let mut users = Vec::new();
        for html in sources.into_iter().flatten() {
            match scrape::parse_profile_page(&html) {
                Ok(Some(user)) => users.push(user),
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(%error, "profile page failed to scrape, dropping");
                }
            }
        }
        users
    }

    /// Look up a site by unix name, with homepage discovery
    ///
    /// `Ok(None)` means no site answers under that name. The returned
    /// [`Site`] carries the discovered id, custom domain, privacy flag,
    /// title and whether the site enforces TLS.
    pub async fn get_site(&self, name: &str) -> Result<Option<Site>> {
        let url = self.config.endpoints.home_url(name);
        let response = self.http.get(&url).timeout(PAGE_TIMEOUT).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        // A redirect to https means the site enforces TLS
        let tls = response.url().scheme() == "https";
        let html = response.text().await?;
        let info = scrape::parse_homepage(&html);
        Ok(Some(Site::new(self.clone(), name.to_string(), tls, info)))
    }

    /// Address a site without homepage discovery
    ///
    /// No metadata is fetched; use [`Client::get_site`] when the id,
    /// domain or title matter.
    pub fn site_unchecked(&self, name: &str, tls: bool) -> Site {
        Site::new(self.clone(), name.to_string(), tls, SiteInfo::default())
    }

    /// Compose a private message; sending requires a live session
    pub async fn new_message(
        &self,
        recipient: &RegisteredUser,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<PrivateMessage> {
        if !self.has_session().await {
            return Err(SessionError::NotLoggedIn.into());
        }
        Ok(PrivateMessage::new(
            self.clone(),
            recipient.clone(),
            subject.into(),
            body.into(),
        ))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EndpointConfig;
    use url::Url;
    use wiremock::matchers::{body_string_contains, method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(server: &MockServer) -> Config {
        let mut config = Config::default();
        config.endpoints = EndpointConfig {
            host_override: Some(Url::parse(&server.uri()).unwrap()),
            ..EndpointConfig::default()
        };
        config.retry.attempt_limit = 2;
        config.retry.wait_time = Duration::from_millis(5);
        config.batch.item_backoff = Duration::from_millis(5);
        config
    }

    async fn mount_login(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/default--flow/login__LoginPopupScreen"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "WIKIDOT_SESSION_ID=sess-1; Path=/; HttpOnly"),
            )
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/ajax-module-connector.php"))
            .and(body_string_contains("DSAccountModule"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"status": "ok", "body": "settings"}"#),
            )
            .mount(server)
            .await;
    }

    fn profile_page(name: &str, id: u64) -> String {
        format!(
            r#"<div id="page-content">
                 <a class="btn btn-default btn-xs"
                    href="http://www.wikidot.com/account/messages#/new/{id}">Write private message</a>
                 <h1 class="profile-title">{name}</h1>
               </div>"#
        )
    }

    const MISSING_PAGE: &str = r#"<div id="page-content"> User does not exist. </div>"#;

    #[tokio::test]
    async fn login_validates_and_close_logs_out_before_clearing() {
        let server = MockServer::start().await;
        mount_login(&server).await;
        Mock::given(method("POST"))
            .and(path("/ajax-module-connector.php"))
            .and(body_string_contains("event=logout"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"status": "ok"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let client = Client::new(test_config(&server)).unwrap();
        client.login("alice", "hunter2").await.unwrap();
        assert!(client.has_session().await);

        client.close().await;
        assert!(!client.has_session().await);

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 3, "login, validation, logout");
        // The validating call and the logout both carried the session cookie,
        // proving the logout ran before the cookie was cleared
        for request in &requests[1..] {
            let cookie = request.headers.get("cookie").unwrap().to_str().unwrap();
            assert!(cookie.contains("WIKIDOT_SESSION_ID=sess-1"), "got: {cookie}");
        }
        let last = String::from_utf8(requests[2].body.clone()).unwrap();
        assert!(last.contains("event=logout"));
    }

    #[tokio::test]
    async fn rejected_credentials_surface_as_session_create_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/default--flow/login__LoginPopupScreen"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "WIKIDOT_SESSION_ID=sess-2; Path=/"),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/ajax-module-connector.php"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"status": "no_permission"}"#),
            )
            .mount(&server)
            .await;

        let client = Client::new(test_config(&server)).unwrap();
        let result = client.login("alice", "wrong").await;
        assert!(matches!(
            result,
            Err(Error::Session(SessionError::CreateFailed { .. }))
        ));
        assert!(!client.has_session().await, "cookie cleared on rejection");
    }

    #[tokio::test]
    async fn login_without_cookie_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/default--flow/login__LoginPopupScreen"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = Client::new(test_config(&server)).unwrap();
        let result = client.login("alice", "hunter2").await;
        assert!(matches!(
            result,
            Err(Error::Session(SessionError::CreateFailed { .. }))
        ));
    }

    #[tokio::test]
    async fn with_session_releases_even_when_the_closure_fails() {
        let server = MockServer::start().await;
        mount_login(&server).await;
        Mock::given(method("POST"))
            .and(path("/ajax-module-connector.php"))
            .and(body_string_contains("event=logout"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"status": "ok"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let result: Result<()> =
            Client::with_session(test_config(&server), "alice", "hunter2", |_client| async {
                Err(Error::Other("work went wrong".to_string()))
            })
            .await;

        assert!(matches!(result, Err(Error::Other(_))));
        let requests = server.received_requests().await.unwrap();
        let last = String::from_utf8(requests.last().unwrap().body.clone()).unwrap();
        assert!(
            last.contains("event=logout"),
            "logout must run after a failing closure"
        );
    }

    #[tokio::test]
    async fn get_user_resolves_and_normalizes_the_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user:info/john-doe"))
            .respond_with(ResponseTemplate::new(200).set_body_string(profile_page("John Doe", 7)))
            .expect(1)
            .mount(&server)
            .await;

        let client = Client::new(test_config(&server)).unwrap();
        let user = client.get_user("John Doe").await.unwrap().unwrap();
        assert_eq!(user.name, "John Doe");
        assert_eq!(user.id, Some(7));
    }

    #[tokio::test]
    async fn get_user_absent_is_none_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/user:info/.*$"))
            .respond_with(ResponseTemplate::new(200).set_body_string(MISSING_PAGE))
            .mount(&server)
            .await;

        let client = Client::new(test_config(&server)).unwrap();
        assert!(client.get_user("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn bulk_lookup_drops_missing_users_and_keeps_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user:info/alice"))
            .respond_with(ResponseTemplate::new(200).set_body_string(profile_page("Alice", 1)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user:info/nobody"))
            .respond_with(ResponseTemplate::new(200).set_body_string(MISSING_PAGE))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user:info/bob"))
            .respond_with(ResponseTemplate::new(200).set_body_string(profile_page("Bob", 2)))
            .mount(&server)
            .await;

        let client = Client::new(test_config(&server)).unwrap();
        let users = client.get_users(["Alice", "nobody", "Bob"]).await;
        let names: Vec<&str> = users.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["Alice", "Bob"]);
    }

    #[tokio::test]
    async fn get_site_discovers_metadata() {
        let server = MockServer::start().await;
        let homepage = concat!(
            "<html><head><script>\n",
            "WIKIREQUEST.info.domain = \"example-wiki.net\";\n",
            "WIKIREQUEST.info.siteId = 4242;\n",
            "var isUAMobile = false;\n",
            "</script></head><body>",
            "<div id=\"header\"><h1><a href=\"/\"><span>Example Wiki</span></a></h1></div>",
            "</body></html>"
        );
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(homepage))
            .mount(&server)
            .await;

        let client = Client::new(test_config(&server)).unwrap();
        let site = client.get_site("example-wiki").await.unwrap().unwrap();
        assert_eq!(site.name(), "example-wiki");
        assert_eq!(site.id(), Some(4242));
        assert_eq!(site.domain(), Some("example-wiki.net"));
        assert_eq!(site.title(), Some("Example Wiki"));
        assert!(!site.is_private());
    }

    #[tokio::test]
    async fn get_site_404_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = Client::new(test_config(&server)).unwrap();
        assert!(client.get_site("no-such-site").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn composing_a_message_requires_a_session() {
        let server = MockServer::start().await;
        let client = Client::new(test_config(&server)).unwrap();
        let recipient = RegisteredUser {
            id: Some(9),
            name: "Bob".to_string(),
            unix_name: "bob".to_string(),
            registered: None,
            pro: false,
            karma: None,
        };
        let result = client.new_message(&recipient, "hello", "a body").await;
        assert!(matches!(
            result,
            Err(Error::Session(SessionError::NotLoggedIn))
        ));
    }
}
