use crate::error::SwitchyardError;
use crate::route::MiddlewareKey;
use crate::table::DuplicateRoutePolicy;
use figment::{Figment, providers::{Env, Format, Yaml}};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration. Built once at startup and handed to constructors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwitchyardConfig {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub correlation: CorrelationConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub access: AccessConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Recorded as `app` on every access-log record.
    #[serde(default = "default_app_name")]
    pub name: String,
    /// Log the route listing at startup.
    #[serde(default)]
    pub debug: bool,
    /// Include each route's middleware in the listing.
    #[serde(default)]
    pub debug_middlewares: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_addr")]
    pub addr: String,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Outermost middleware of every route, in order.
    #[serde(default = "default_middlewares")]
    pub default_middlewares: Vec<MiddlewareKey>,
    #[serde(default)]
    pub duplicate_policy: DuplicateRoutePolicy,
    /// 404 or 405 for a known path requested with an unregistered method.
    #[serde(default = "default_mismatch_status")]
    pub method_mismatch_status: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationConfig {
    /// Inbound header honoured as the correlation id, echoed on responses.
    #[serde(default = "default_correlation_header")]
    pub header: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "default_origins")]
    pub allow_origins: Vec<String>,
    #[serde(default = "default_methods")]
    pub allow_methods: Vec<String>,
    #[serde(default = "default_headers")]
    pub allow_headers: Vec<String>,
    #[serde(default)]
    pub expose_headers: Vec<String>,
    /// Preflight cache lifetime. 0 omits the header.
    #[serde(default)]
    pub max_age_secs: u64,
    #[serde(default)]
    pub allow_credentials: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    /// 403s within the window that trigger a permanent block.
    #[serde(default = "default_max_denied")]
    pub max_denied: u64,
    /// 401s within the window that trigger a temporary block.
    #[serde(default = "default_max_unauthorized")]
    pub max_unauthorized: u64,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_unauthorized_block_secs")]
    pub unauthorized_block_secs: u64,
    /// Body fields masked in the access log on top of the built-in ones.
    #[serde(default)]
    pub redact_fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_account_service_url")]
    pub account_service_url: String,
    #[serde(default = "default_validation_path")]
    pub validation_path: String,
    #[serde(default = "default_auth_timeout")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// State file for the `file` backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Upper bound on every single store operation.
    #[serde(default = "default_store_timeout")]
    pub timeout_ms: u64,
    /// Age after which the file backend drops access records. Must cover
    /// `access.window_secs`.
    #[serde(default = "default_store_retention")]
    pub retention_secs: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    File,
}

// ── Defaults ──────────────────────────────────────────────────

fn default_app_name() -> String { "sbframework".into() }
fn default_log_level() -> String { "info".into() }
fn default_server_addr() -> String { "0.0.0.0:8080".into() }
fn default_body_limit() -> usize { 2 * 1024 * 1024 }
fn default_middlewares() -> Vec<MiddlewareKey> {
    ["correlation", "cors", "access", "method", "auth"]
        .into_iter()
        .map(MiddlewareKey::new)
        .collect()
}
fn default_mismatch_status() -> u16 { 404 }
fn default_correlation_header() -> String { "x-request-id".into() }
fn default_origins() -> Vec<String> { vec!["*".into()] }
fn default_methods() -> Vec<String> {
    ["GET", "POST", "PUT", "DELETE", "OPTIONS"].map(String::from).to_vec()
}
fn default_headers() -> Vec<String> {
    ["Content-Type", "Authorization", "X-Requested-With", "X-Request-Id"]
        .map(String::from)
        .to_vec()
}
fn default_max_denied() -> u64 { 3 }
fn default_max_unauthorized() -> u64 { 10 }
fn default_window_secs() -> u64 { 600 }
fn default_unauthorized_block_secs() -> u64 { 24 * 60 * 60 }
fn default_account_service_url() -> String { "http://localhost:8080".into() }
fn default_validation_path() -> String { "/auth/validation".into() }
fn default_auth_timeout() -> u64 { 5000 }
fn default_store_timeout() -> u64 { 3000 }
fn default_store_retention() -> u64 { 24 * 60 * 60 }

// ── Impls ─────────────────────────────────────────────────────

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            debug: false,
            debug_middlewares: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_server_addr(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_middlewares: default_middlewares(),
            duplicate_policy: DuplicateRoutePolicy::Skip,
            method_mismatch_status: default_mismatch_status(),
        }
    }
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            header: default_correlation_header(),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origins: default_origins(),
            allow_methods: default_methods(),
            allow_headers: default_headers(),
            expose_headers: Vec::new(),
            max_age_secs: 0,
            allow_credentials: false,
        }
    }
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            max_denied: default_max_denied(),
            max_unauthorized: default_max_unauthorized(),
            window_secs: default_window_secs(),
            unauthorized_block_secs: default_unauthorized_block_secs(),
            redact_fields: Vec::new(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            account_service_url: default_account_service_url(),
            validation_path: default_validation_path(),
            timeout_ms: default_auth_timeout(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            path: None,
            timeout_ms: default_store_timeout(),
            retention_secs: default_store_retention(),
        }
    }
}

impl AccessConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn unauthorized_block(&self) -> Duration {
        Duration::from_secs(self.unauthorized_block_secs)
    }
}

impl AuthConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// `account_service_url` + `validation_path` with exactly one slash between.
    pub fn validation_url(&self) -> String {
        let base = self.account_service_url.trim_end_matches('/');
        let path = self.validation_path.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

impl SwitchyardConfig {
    /// Load configuration from a YAML file + env overrides.
    ///
    /// Environment keys use `SWITCHYARD_` and `__` between sections, e.g.
    /// `SWITCHYARD_ACCESS__MAX_DENIED=5`.
    pub fn load(path: &Path) -> Result<Self, SwitchyardError> {
        let config: SwitchyardConfig = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("SWITCHYARD_").split("__"))
            .extract()
            .map_err(|e| SwitchyardError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot start with.
    pub fn validate(&self) -> Result<(), SwitchyardError> {
        let fail = |msg: String| Err(SwitchyardError::Config(msg));

        if self.server.addr.parse::<SocketAddr>().is_err() {
            return fail(format!("server.addr is not a socket address: {}", self.server.addr));
        }
        if !matches!(self.routing.method_mismatch_status, 404 | 405) {
            return fail(format!(
                "routing.method_mismatch_status must be 404 or 405, got {}",
                self.routing.method_mismatch_status
            ));
        }
        if self.correlation.header.trim().is_empty() {
            return fail("correlation.header must not be empty".into());
        }
        if self.access.max_denied == 0 || self.access.max_unauthorized == 0 {
            return fail("access thresholds must be at least 1".into());
        }
        if self.access.window_secs == 0 {
            return fail("access.window_secs must be at least 1".into());
        }
        if self.auth.account_service_url.trim().is_empty() {
            return fail("auth.account_service_url is required".into());
        }
        if self.store.backend == StoreBackend::File && self.store.path.is_none() {
            return fail("store.path is required for the file backend".into());
        }
        if self.store.timeout_ms == 0 {
            return fail("store.timeout_ms must be at least 1".into());
        }
        if self.store.retention_secs < self.access.window_secs {
            return fail(format!(
                "store.retention_secs ({}) must cover access.window_secs ({})",
                self.store.retention_secs, self.access.window_secs
            ));
        }
        Ok(())
    }
}
