//! Login flow orchestration.
//!
//! The handlers here implement the `GET/POST /login` and `GET /logout`
//! surface. They never touch the network layer of the web framework:
//! each transition takes the explicit [`Session`] and returns a
//! [`LoginAction`] for the caller to execute.

use ::http::StatusCode;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tracing::{debug, warn};

use crate::config::Config;
use crate::credential::extract_caveat_id;
use crate::dashboard::DashboardClient;
use crate::error::ApiError;
use crate::http_client::HttpClient;
use crate::provider::{ProviderLoginRequest, ProviderResponse};
use crate::session::{snap_names_by_ownership, OpenIdIdentity, Session};

/// Claims the identity provider must return.
const REQUIRED_CLAIMS: &[&str] = &["email", "nickname", "image"];
/// Claims the identity provider may return.
const OPTIONAL_CLAIMS: &[&str] = &["fullname"];

/// Keep unreserved URI characters readable in the logout return url.
const RETURN_TO: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~');

/// HTTP-level outcome of a login-flow transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginAction {
    Redirect(String),
    /// Delegate to the identity provider's redirect mechanism.
    ProviderLogin(ProviderLoginRequest),
    Abort(StatusCode, String),
}

pub struct LoginService<C> {
    dashboard: DashboardClient<C>,
    config: Config,
}

impl<C> LoginService<C>
where
    C: HttpClient,
{
    pub fn new(http_client: C, config: Config) -> Self {
        Self {
            dashboard: DashboardClient::new(http_client, config.clone()),
            config,
        }
    }

    /// Entry point for `GET/POST /login`.
    ///
    /// Already-authenticated sessions are redirected straight to
    /// `next_url` without re-acquiring a macaroon.
    pub fn login(&self, session: &mut Session, next_url: &str) -> LoginAction {
        if session.is_authenticated() {
            return LoginAction::Redirect(next_url.to_string());
        }

        let root = match self.dashboard.request_macaroon() {
            Ok(root) => root,
            Err(err) if err.status_code() == Some(401) => {
                // The dashboard still holds a session for this user; it has
                // to be logged out before a new macaroon can be issued.
                debug!("macaroon issuance returned 401, sending user to logout");
                return LoginAction::Redirect("/logout".to_string());
            }
            Err(ApiError::CircuitBreaker) => {
                return LoginAction::Abort(StatusCode::SERVICE_UNAVAILABLE, String::new());
            }
            Err(err) => return LoginAction::Abort(StatusCode::BAD_GATEWAY, err.to_string()),
        };

        let caveat_id = match extract_caveat_id(&root, self.config.login_host()) {
            Ok(caveat_id) => caveat_id,
            Err(err) => return LoginAction::Abort(StatusCode::BAD_GATEWAY, err.to_string()),
        };
        session.macaroon_root = Some(root);

        LoginAction::ProviderLogin(ProviderLoginRequest {
            provider_url: self.config.login_url().to_string(),
            ask_for: REQUIRED_CLAIMS.iter().map(|s| s.to_string()).collect(),
            ask_for_optional: OPTIONAL_CLAIMS.iter().map(|s| s.to_string()).collect(),
            macaroon_caveat_id: caveat_id,
            query_membership: vec![self.config.canonical_team().to_string()],
        })
    }

    /// Provider callback: binds the discharge and establishes the session.
    ///
    /// A dashboard failure during account enrichment does not block login:
    /// the session is still established from the provider-supplied fields,
    /// without team membership or shared-snap data. Only documented API
    /// error kinds are degraded over; a circuit-breaker failure aborts.
    pub fn after_login(
        &self,
        session: &mut Session,
        response: &ProviderResponse,
        next_url: &str,
    ) -> LoginAction {
        if session
            .bind_discharge(response.extensions.macaroon.discharge.clone())
            .is_err()
        {
            // Callback without a preceding acquisition step; restart the
            // flow at the provider.
            warn!("provider callback received without a root macaroon");
            return LoginAction::Redirect(self.config.login_url().to_string());
        }

        let nickname = match response.nickname.as_deref() {
            Some(nickname) if !nickname.is_empty() => nickname,
            _ => {
                debug!("provider returned no nickname, retrying login");
                return LoginAction::Redirect(self.config.login_url().to_string());
            }
        };

        match self.dashboard.get_account(session) {
            Ok(account) => {
                let (_owned, shared) = snap_names_by_ownership(&account);
                let is_canonical = response
                    .extensions
                    .teams
                    .is_member
                    .contains(self.config.canonical_team());
                session.openid = Some(OpenIdIdentity {
                    identity_url: response.identity_url.clone(),
                    nickname: account.username,
                    fullname: Some(account.displayname),
                    image: response.image.clone(),
                    email: Some(account.email),
                    is_canonical: Some(is_canonical),
                });
                session.user_shared_snaps = shared.into_iter().collect();
            }
            Err(ApiError::CircuitBreaker) => {
                return LoginAction::Abort(StatusCode::SERVICE_UNAVAILABLE, String::new());
            }
            Err(err) => {
                debug!("account fetch failed, establishing degraded session: {err}");
                session.openid = Some(OpenIdIdentity {
                    identity_url: response.identity_url.clone(),
                    nickname: nickname.to_string(),
                    fullname: response.fullname.clone(),
                    image: response.image.clone(),
                    email: response.email.clone(),
                    is_canonical: None,
                });
            }
        }

        LoginAction::Redirect(next_url.to_string())
    }

    /// `GET /logout?no_redirect={true|false}`.
    pub fn logout(&self, session: &mut Session, no_redirect: bool, url_root: &str) -> LoginAction {
        if session.is_authenticated() {
            session.clear();
        }

        if no_redirect {
            return LoginAction::Redirect("/".to_string());
        }

        let return_to = utf8_percent_encode(url_root, RETURN_TO).to_string();
        LoginAction::Redirect(format!(
            "{}/+logout?return_to={return_to}&return_now=True",
            self.config.login_url()
        ))
    }
}
