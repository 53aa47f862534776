//! The per-user session record and the projection of provider and
//! dashboard responses into it.
//!
//! The session is an explicit value passed into every login-flow function;
//! persistence (cookie/session backend) belongs to the surrounding web
//! application.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Snap series the dashboard keys account snaps under.
const SNAP_SERIES: &str = "16";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("discharge macaroon bound before a root macaroon was acquired")]
    DischargeWithoutRoot,
}

/// Identity fields persisted after a completed provider callback.
///
/// `is_canonical` and the account-sourced fields are absent when the
/// session was established in degraded mode (dashboard unreachable during
/// the callback).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenIdIdentity {
    pub identity_url: String,
    pub nickname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fullname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_canonical: Option<bool>,
}

/// Per-user session record, created at login start and destroyed at logout.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unbound root macaroon, set once during credential acquisition.
    pub macaroon_root: Option<String>,
    /// Only settable through [`Session::bind_discharge`]: a discharge must
    /// never exist without a root in the same session.
    macaroon_discharge: Option<String>,
    pub openid: Option<OpenIdIdentity>,
    /// Snaps shared with (not owned by) the user.
    #[serde(default)]
    pub user_shared_snaps: BTreeSet<String>,
}

impl Session {
    /// Fresh session holding an unbound root macaroon, as left behind by
    /// the credential acquisition step.
    pub fn with_root(root: impl Into<String>) -> Self {
        Session {
            macaroon_root: Some(root.into()),
            ..Session::default()
        }
    }

    /// The session counts as authenticated exactly when the identity record
    /// is present.
    pub fn is_authenticated(&self) -> bool {
        self.openid.is_some()
    }

    /// Binds the discharge macaroon returned by the identity provider.
    pub fn bind_discharge(&mut self, discharge: String) -> Result<(), SessionError> {
        if self.macaroon_root.is_none() {
            return Err(SessionError::DischargeWithoutRoot);
        }
        self.macaroon_discharge = Some(discharge);
        Ok(())
    }

    pub fn macaroon_discharge(&self) -> Option<&str> {
        self.macaroon_discharge.as_deref()
    }

    /// Both macaroons, when the credential pair is complete. An
    /// authenticated request is only valid once this returns `Some`.
    pub fn macaroon_pair(&self) -> Option<(&str, &str)> {
        match (&self.macaroon_root, &self.macaroon_discharge) {
            (Some(root), Some(discharge)) => Some((root, discharge)),
            _ => None,
        }
    }

    pub fn clear(&mut self) {
        *self = Session::default();
    }
}

/// Dashboard account payload, as far as the login flow consumes it.
#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub username: String,
    pub displayname: String,
    pub email: String,
    #[serde(default)]
    pub snaps: HashMap<String, HashMap<String, AccountSnap>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountSnap {
    #[serde(default)]
    pub publisher: Option<Publisher>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Publisher {
    pub username: String,
}

/// Partitions the account's snaps into (owned, shared-with-user) by
/// comparing the publisher against the account username.
pub fn snap_names_by_ownership(account: &Account) -> (Vec<String>, Vec<String>) {
    let mut owned = Vec::new();
    let mut shared = Vec::new();

    if let Some(snaps) = account.snaps.get(SNAP_SERIES) {
        for (name, snap) in snaps {
            let publisher = snap.publisher.as_ref().map(|p| p.username.as_str());
            if publisher == Some(account.username.as_str()) {
                owned.push(name.clone());
            } else {
                shared.push(name.clone());
            }
        }
    }

    owned.sort();
    shared.sort();
    (owned, shared)
}
