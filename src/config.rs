//! Configuration types for wikidot-client

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Main configuration for [`Client`](crate::Client)
///
/// Fields are organized into logical sub-configs:
/// - [`endpoints`](EndpointConfig) — farm domain and endpoint overrides
/// - [`retry`](RetryConfig) — module-call retry policy
/// - [`batch`](BatchConfig) — wave-based bulk fetch throughput control
///
/// All values have working defaults; `Config::default()` talks to
/// `wikidot.com` with the connector's customary limits.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Farm domain and endpoint overrides
    #[serde(default)]
    pub endpoints: EndpointConfig,

    /// Module-call retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Bulk fetch throughput control
    #[serde(default)]
    pub batch: BatchConfig,
}

/// Where requests are addressed
///
/// The default targets the public `wikidot.com` farm, where every site
/// lives under its own subdomain. Self-hosted farms that serve everything
/// from a single origin (and HTTP-level tests) can set `host_override` to
/// route every request there instead.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Root domain of the wiki farm (default: "wikidot.com")
    #[serde(default = "default_root_domain")]
    pub root_domain: String,

    /// Route every request to this single origin instead of per-site hosts
    #[serde(default)]
    pub host_override: Option<Url>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            root_domain: default_root_domain(),
            host_override: None,
        }
    }
}

impl EndpointConfig {
    fn origin(&self, host: &str, tls: bool) -> String {
        match &self.host_override {
            Some(url) => url.as_str().trim_end_matches('/').to_string(),
            None => {
                let scheme = if tls { "https" } else { "http" };
                format!("{scheme}://{host}.{}", self.root_domain)
            }
        }
    }

    /// The AJAX module connector endpoint for a site
    pub fn connector_url(&self, site: &str, tls: bool) -> String {
        format!("{}/ajax-module-connector.php", self.origin(site, tls))
    }

    /// The farm-wide login endpoint
    pub fn login_url(&self) -> String {
        format!(
            "{}/default--flow/login__LoginPopupScreen",
            self.origin("www", true)
        )
    }

    /// A user's profile page (`user:info`)
    pub fn profile_url(&self, unix_name: &str) -> String {
        format!("{}/user:info/{unix_name}", self.origin("www", true))
    }

    /// A site's homepage, used for site discovery
    ///
    /// Addressed over plain HTTP; the farm redirects TLS-enforcing sites
    /// to `https`, which is how enforcement is detected.
    pub fn home_url(&self, site: &str) -> String {
        format!("{}/", self.origin(site, false))
    }
}

/// Retry policy for module-connector calls
///
/// The connector answers transient overload with an in-body `try_again`
/// status, so the waits here are deliberately long compared to typical
/// HTTP retry policies.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per call, counting the first (default: 6, minimum 1)
    #[serde(default = "default_attempt_limit")]
    pub attempt_limit: u32,

    /// Fixed wait between attempts (default: 5 seconds)
    #[serde(default = "default_wait_time", with = "duration_serde")]
    pub wait_time: Duration,

    /// Per-attempt timeout (default: 40 seconds)
    #[serde(default = "default_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempt_limit: default_attempt_limit(),
            wait_time: default_wait_time(),
            timeout: default_timeout(),
        }
    }
}

/// Throughput control for bulk operations (member listing, bulk user lookup)
///
/// Work proceeds in waves: at most `wave_size` tasks are dispatched
/// together and the whole wave drains before the next starts, with at
/// most `concurrency_limit` requests in flight at any moment. The wave
/// boundaries double as a courtesy rate limit against the single remote
/// host; this is deliberately not a sliding-window pool.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum simultaneous in-flight requests (default: 40)
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// Tasks dispatched per wave (default: 30)
    #[serde(default = "default_wave_size")]
    pub wave_size: usize,

    /// Idle pause between waves (default: 0 seconds)
    #[serde(default = "default_wave_delay", with = "duration_serde")]
    pub wave_delay: Duration,

    /// Fixed backoff before re-trying a failed batch item (default: 5 seconds)
    #[serde(default = "default_item_backoff", with = "duration_serde")]
    pub item_backoff: Duration,

    /// Cap on per-item retries inside a batch
    ///
    /// `None` (the default) retries a transiently-failing item forever,
    /// which means a permanently unreachable host stalls the batch.
    /// Setting `Some(n)` abandons the item after `n` retries instead;
    /// abandoned items are dropped from the aggregate like not-found ones.
    #[serde(default)]
    pub max_item_retries: Option<u32>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
            wave_size: default_wave_size(),
            wave_delay: default_wave_delay(),
            item_backoff: default_item_backoff(),
            max_item_retries: None,
        }
    }
}

fn default_root_domain() -> String {
    "wikidot.com".to_string()
}

fn default_attempt_limit() -> u32 {
    6
}

fn default_wait_time() -> Duration {
    Duration::from_secs(5)
}

fn default_timeout() -> Duration {
    Duration::from_secs(40)
}

fn default_concurrency_limit() -> usize {
    40
}

fn default_wave_size() -> usize {
    30
}

fn default_wave_delay() -> Duration {
    Duration::ZERO
}

fn default_item_backoff() -> Duration {
    Duration::from_secs(5)
}

// Duration serialization helper (seconds as integers)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
