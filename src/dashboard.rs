//! Authenticated client for the backend dashboard API.
//!
//! Every operation follows the same shape: build the macaroon
//! authorization header from the session, issue the request, check the
//! expiry header before trusting the body, then classify the response.
//! There is no caching and no silent retry; an expired credential always
//! surfaces as [`ApiError::MacaroonRefreshRequired`] for the surrounding
//! application to force re-authentication (a discharge can only be
//! re-obtained through a provider round-trip).

use ::http::header::{HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use ::http::{Method, Request, Response, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::Config;
use crate::credential::{authorization_header, is_macaroon_expired, CredentialError};
use crate::error::{ApiError, ApiErrorDetail};
use crate::http_client::HttpClient;
use crate::session::{Account, Session};

/// Permissions requested for the root macaroon at issuance.
const MACAROON_PERMISSIONS: &[&str] = &[
    "package_access",
    "package_metrics",
    "package_register",
    "package_release",
    "package_update",
    "package_upload_request",
];

/// Error code the dashboard uses for accounts that cannot act yet.
const USER_NOT_READY: &str = "user-not-ready";

/// Boundary for the hand-built multipart body of screenshot updates.
const MULTIPART_BOUNDARY: &str = "storefront-auth-binary-metadata";

/// Name-registration payload; optional fields are omitted from the wire
/// format when unset.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegisterNameRequest {
    pub snap_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registrant_comment: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_private: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<String>,
}

pub struct DashboardClient<C> {
    http_client: C,
    config: Config,
}

impl<C> DashboardClient<C>
where
    C: HttpClient,
{
    pub fn new(http_client: C, config: Config) -> Self {
        Self {
            http_client,
            config,
        }
    }

    /// Requests a fresh root macaroon from the issuance endpoint. This is
    /// the only unauthenticated dashboard call; a 401 here means the
    /// dashboard still holds a session for this user.
    pub fn request_macaroon(&self) -> Result<String, ApiError> {
        let body = json!({ "permissions": MACAROON_PERMISSIONS });
        let response = self.call(Method::POST, &self.config.macaroon_url(), None, Some(&body))?;
        let body = process_response(&response)?;

        debug!("root macaroon issued");
        body.get("macaroon")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| {
                ApiError::ResponseDecode("macaroon missing from issuance response".into())
            })
    }

    /// Fetches the account record behind the session's credential pair.
    pub fn get_account(&self, session: &Session) -> Result<Account, ApiError> {
        let response = self.call(Method::GET, &self.config.account_url(), Some(session), None)?;
        let body = process_response(&response)?;
        serde_json::from_value(body)
            .map_err(|err| ApiError::ResponseDecode(format!("malformed account payload: {err}")))
    }

    pub fn get_agreement(&self, session: &Session) -> Result<Value, ApiError> {
        let response = self.call(Method::GET, &self.config.agreement_url(), Some(session), None)?;
        serde_json::from_slice(response.body())
            .map_err(|err| ApiError::ResponseDecode(format!("JSON decoding failed: {err}")))
    }

    pub fn post_agreement(&self, session: &Session, agreed: bool) -> Result<Value, ApiError> {
        let body = json!({ "latest_tos_accepted": agreed });
        let response = self.call(
            Method::POST,
            &self.config.agreement_url(),
            Some(session),
            Some(&body),
        )?;
        process_response(&response)
    }

    pub fn post_username(&self, session: &Session, username: &str) -> Result<Value, ApiError> {
        let body = json!({ "short_namespace": username });
        let response = self.call(
            Method::PATCH,
            &self.config.account_url(),
            Some(session),
            Some(&body),
        )?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(Value::Object(Default::default()));
        }
        process_response(&response)
    }

    pub fn get_publisher_metrics(&self, session: &Session, query: &Value) -> Result<Value, ApiError> {
        let response = self.call(
            Method::POST,
            &self.config.publisher_metrics_url(),
            Some(session),
            Some(query),
        )?;
        process_response(&response)
    }

    pub fn post_register_name(
        &self,
        session: &Session,
        registration: &RegisterNameRequest,
    ) -> Result<Value, ApiError> {
        let body = serde_json::to_value(registration)
            .map_err(|err| ApiError::Transport(format!("failed to encode request body: {err}")))?;
        let response = self.call(
            Method::POST,
            &self.config.register_name_url(),
            Some(session),
            Some(&body),
        )?;
        process_response(&response)
    }

    pub fn post_register_name_dispute(
        &self,
        session: &Session,
        snap_name: &str,
        claim_comment: &str,
    ) -> Result<Value, ApiError> {
        let body = json!({ "snap_name": snap_name, "comment": claim_comment });
        let response = self.call(
            Method::POST,
            &self.config.register_name_dispute_url(),
            Some(session),
            Some(&body),
        )?;
        process_response(&response)
    }

    pub fn get_snap_info(&self, session: &Session, snap_name: &str) -> Result<Value, ApiError> {
        let response = self.call(
            Method::GET,
            &self.config.snap_info_url(snap_name),
            Some(session),
            None,
        )?;
        process_response(&response)
    }

    pub fn get_snap_id(&self, session: &Session, snap_name: &str) -> Result<String, ApiError> {
        let snap_info = self.get_snap_info(session, snap_name)?;
        snap_info
            .get("snap_id")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| ApiError::ResponseDecode("snap_id missing from snap info".into()))
    }

    /// Reads the snap metadata, or replaces it when `metadata` is given.
    pub fn snap_metadata(
        &self,
        session: &Session,
        snap_id: &str,
        metadata: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let method = if metadata.is_some() {
            Method::PUT
        } else {
            Method::GET
        };
        let response = self.call(
            method,
            &self.config.metadata_url(snap_id),
            Some(session),
            metadata,
        )?;
        process_response(&response)
    }

    /// Reads the snap's binary metadata (screenshots and icons), or
    /// replaces it when `info` is given. Updates go out as the multipart
    /// request the dashboard requires.
    pub fn snap_screenshots(
        &self,
        session: &Session,
        snap_id: &str,
        info: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let url = self.config.screenshots_url(snap_id);
        let request = match info {
            None => self
                .authed(Method::GET, &url, session)?
                .header(ACCEPT, "application/json")
                .body(Vec::new()),
            Some(info) => {
                let body = format!(
                    "--{MULTIPART_BOUNDARY}\r\n\
                     Content-Disposition: form-data; name=\"info\"\r\n\r\n\
                     {info}\r\n\
                     --{MULTIPART_BOUNDARY}--\r\n"
                );
                self.authed(Method::PUT, &url, session)?
                    .header(ACCEPT, "application/json")
                    .header(
                        CONTENT_TYPE,
                        format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"),
                    )
                    .body(body.into_bytes())
            }
        };
        let request =
            request.map_err(|err| ApiError::Transport(format!("failed to build request: {err}")))?;
        let response = self.dispatch(request)?;
        process_response(&response)
    }

    pub fn snap_revision_history(&self, session: &Session, snap_id: &str) -> Result<Value, ApiError> {
        let response = self.call(
            Method::GET,
            &self.config.revision_history_url(snap_id),
            Some(session),
            None,
        )?;
        process_response(&response)
    }

    pub fn snap_release_history(
        &self,
        session: &Session,
        snap_name: &str,
        page: u32,
    ) -> Result<Value, ApiError> {
        let response = self.call(
            Method::GET,
            &self.config.release_history_url(snap_name, page),
            Some(session),
            None,
        )?;
        process_response(&response)
    }

    pub fn post_snap_release(&self, session: &Session, release: &Value) -> Result<Value, ApiError> {
        let response = self.call(
            Method::POST,
            &self.config.snap_release_url(),
            Some(session),
            Some(release),
        )?;
        process_response(&response)
    }

    pub fn post_close_channel(
        &self,
        session: &Session,
        snap_id: &str,
        channels: &Value,
    ) -> Result<Value, ApiError> {
        let response = self.call(
            Method::POST,
            &self.config.close_channel_url(snap_id),
            Some(session),
            Some(channels),
        )?;
        process_response(&response)
    }

    fn call(
        &self,
        method: Method,
        url: &str,
        session: Option<&Session>,
        json: Option<&Value>,
    ) -> Result<Response<Vec<u8>>, ApiError> {
        let mut builder = match session {
            Some(session) => self.authed(method, url, session)?,
            None => Request::builder().method(method).uri(url),
        };

        let body = match json {
            Some(value) => {
                builder = builder.header(CONTENT_TYPE, "application/json");
                serde_json::to_vec(value).map_err(|err| {
                    ApiError::Transport(format!("failed to encode request body: {err}"))
                })?
            }
            None => Vec::new(),
        };

        let request = builder
            .body(body)
            .map_err(|err| ApiError::Transport(format!("failed to build request: {err}")))?;
        self.dispatch(request)
    }

    fn authed(
        &self,
        method: Method,
        url: &str,
        session: &Session,
    ) -> Result<::http::request::Builder, ApiError> {
        let (root, discharge) = session
            .macaroon_pair()
            .ok_or(CredentialError::IncompletePair)?;
        let header = authorization_header(root, discharge)?;
        let mut value = HeaderValue::from_str(&header)
            .map_err(|_| ApiError::Transport("invalid authorization header value".into()))?;
        value.set_sensitive(true);

        Ok(Request::builder()
            .method(method)
            .uri(url)
            .header(AUTHORIZATION, value))
    }

    /// Sends the request and applies the expiry check before anyone gets
    /// to look at the body.
    fn dispatch(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, ApiError> {
        let response = self.http_client.send(request)?;
        if is_macaroon_expired(response.headers()) {
            debug!("dashboard reports the macaroon as expired");
            return Err(ApiError::MacaroonRefreshRequired);
        }
        Ok(response)
    }
}

/// Decodes and classifies a dashboard response body.
///
/// Non-ok responses carrying a payload but no `error_list` hand the body
/// back to the caller unchanged; the dashboard uses that shape for
/// partially-successful operations.
fn process_response(response: &Response<Vec<u8>>) -> Result<Value, ApiError> {
    let status = response.status();
    let body: Value = serde_json::from_slice(response.body())
        .map_err(|err| ApiError::ResponseDecode(format!("JSON decoding failed: {err}")))?;

    if !status.is_success() {
        if let Some(error_list) = body.get("error_list") {
            let errors: Vec<ApiErrorDetail> = serde_json::from_value(error_list.clone())
                .map_err(|err| ApiError::ResponseDecode(format!("malformed error_list: {err}")))?;

            for error in &errors {
                if error.code == USER_NOT_READY {
                    if error.message.contains("has not signed agreement") {
                        return Err(ApiError::AgreementNotSigned);
                    }
                    if error.message.contains("missing store username") {
                        return Err(ApiError::MissingUsername);
                    }
                }
            }

            return Err(ApiError::ResponseList(status.as_u16(), errors));
        }

        if is_empty_body(&body) {
            return Err(ApiError::Response(status.as_u16()));
        }
    }

    Ok(body)
}

fn is_empty_body(body: &Value) -> bool {
    match body {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_f64() == Some(0.0),
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
    }
}
