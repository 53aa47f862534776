//! Environment-driven configuration for the dashboard and identity
//! provider endpoints.

use std::env;
use std::env::VarError;

use thiserror::Error;
use url::Url;

const DASHBOARD_API_ENV_NAME: &str = "DASHBOARD_API";
const LOGIN_URL_ENV_NAME: &str = "LOGIN_URL";

const DEFAULT_DASHBOARD_API: &str = "https://dashboard.snapcraft.io";
const DEFAULT_LOGIN_URL: &str = "https://login.ubuntu.com";

/// Team whose membership marks a session as canonical.
const CANONICAL_TEAM: &str = "canonical";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid url `{0}`: `{1}`")]
    InvalidUrl(String, String),
}

#[derive(Debug, Clone)]
pub struct Config {
    dashboard_api: String,
    login_url: String,
    login_host: String,
}

impl Config {
    /// Reads `DASHBOARD_API` and `LOGIN_URL` from the environment, falling
    /// back to the production endpoints.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::with_env(env::var)
    }

    fn with_env<F>(env_var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Result<String, VarError>,
    {
        let dashboard_api =
            env_var(DASHBOARD_API_ENV_NAME).unwrap_or_else(|_| DEFAULT_DASHBOARD_API.to_string());
        let login_url =
            env_var(LOGIN_URL_ENV_NAME).unwrap_or_else(|_| DEFAULT_LOGIN_URL.to_string());
        Self::new(&dashboard_api, &login_url)
    }

    pub fn new(dashboard_api: &str, login_url: &str) -> Result<Self, ConfigError> {
        let parsed_login = Url::parse(login_url)
            .map_err(|err| ConfigError::InvalidUrl(login_url.to_string(), err.to_string()))?;
        let login_host = parsed_login
            .host_str()
            .ok_or_else(|| {
                ConfigError::InvalidUrl(login_url.to_string(), "missing host".to_string())
            })?
            .to_string();
        Url::parse(dashboard_api)
            .map_err(|err| ConfigError::InvalidUrl(dashboard_api.to_string(), err.to_string()))?;

        Ok(Self {
            dashboard_api: dashboard_api.trim_end_matches('/').to_string(),
            login_url: login_url.trim_end_matches('/').to_string(),
            login_host,
        })
    }

    pub fn login_url(&self) -> &str {
        &self.login_url
    }

    /// Host the root macaroon's third-party caveat is addressed to.
    pub fn login_host(&self) -> &str {
        &self.login_host
    }

    pub fn canonical_team(&self) -> &str {
        CANONICAL_TEAM
    }

    fn dashboard_endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.dashboard_api)
    }

    pub fn macaroon_url(&self) -> String {
        self.dashboard_endpoint("dev/api/acl/")
    }

    pub fn account_url(&self) -> String {
        self.dashboard_endpoint("dev/api/account")
    }

    pub fn agreement_url(&self) -> String {
        self.dashboard_endpoint("dev/api/agreement/")
    }

    pub fn register_name_url(&self) -> String {
        self.dashboard_endpoint("dev/api/register-name/")
    }

    pub fn register_name_dispute_url(&self) -> String {
        self.dashboard_endpoint("dev/api/register-name-dispute/")
    }

    pub fn snap_info_url(&self, snap_name: &str) -> String {
        self.dashboard_endpoint(&format!("dev/api/snaps/info/{snap_name}"))
    }

    pub fn metadata_url(&self, snap_id: &str) -> String {
        self.dashboard_endpoint(&format!("dev/api/snaps/{snap_id}/metadata"))
    }

    pub fn screenshots_url(&self, snap_id: &str) -> String {
        self.dashboard_endpoint(&format!("dev/api/snaps/{snap_id}/binary-metadata"))
    }

    pub fn revision_history_url(&self, snap_id: &str) -> String {
        self.dashboard_endpoint(&format!("dev/api/snaps/{snap_id}/history"))
    }

    pub fn release_history_url(&self, snap_name: &str, page: u32) -> String {
        self.dashboard_endpoint(&format!("api/v2/snaps/{snap_name}/releases?page={page}"))
    }

    pub fn snap_release_url(&self) -> String {
        self.dashboard_endpoint("dev/api/snap-release/")
    }

    pub fn close_channel_url(&self, snap_id: &str) -> String {
        self.dashboard_endpoint(&format!("dev/api/snaps/{snap_id}/close"))
    }

    pub fn publisher_metrics_url(&self) -> String {
        self.dashboard_endpoint("dev/api/snaps/metrics")
    }
}
