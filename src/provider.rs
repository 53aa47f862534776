//! Identity-provider boundary types.
//!
//! The OpenID protocol library is an external collaborator: it executes
//! [`ProviderLoginRequest`] as a redirect and hands the callback payload
//! back as a [`ProviderResponse`]. Deserialization is the validation
//! boundary; a callback without a macaroon discharge is rejected before it
//! reaches the login flow.

use std::collections::BTreeSet;

use serde::Deserialize;

/// Parameters for the redirect to the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderLoginRequest {
    pub provider_url: String,
    /// Claims the provider must supply.
    pub ask_for: Vec<String>,
    /// Claims the provider may supply.
    pub ask_for_optional: Vec<String>,
    /// Third-party caveat identifier the provider discharges.
    pub macaroon_caveat_id: String,
    /// Team identifiers to query membership for.
    pub query_membership: Vec<String>,
}

/// Callback payload from the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderResponse {
    pub identity_url: String,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub fullname: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub extensions: ProviderExtensions,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderExtensions {
    pub macaroon: MacaroonExtension,
    #[serde(default)]
    pub teams: TeamsExtension,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MacaroonExtension {
    pub discharge: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TeamsExtension {
    #[serde(default)]
    pub is_member: BTreeSet<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_payload_deserializes() {
        let response: ProviderResponse = serde_json::from_value(serde_json::json!({
            "identity_url": "https://login.example.com/+id/abcdef",
            "nickname": "jane",
            "email": "jane@example.com",
            "extensions": {
                "macaroon": {"discharge": "discharge-macaroon"},
                "teams": {"is_member": ["canonical"]},
            }
        }))
        .unwrap();

        assert_eq!(response.nickname.as_deref(), Some("jane"));
        assert_eq!(response.fullname, None);
        assert_eq!(response.extensions.macaroon.discharge, "discharge-macaroon");
        assert!(response.extensions.teams.is_member.contains("canonical"));
    }

    #[test]
    fn callback_without_discharge_is_rejected() {
        let result = serde_json::from_value::<ProviderResponse>(serde_json::json!({
            "identity_url": "https://login.example.com/+id/abcdef",
            "nickname": "jane",
            "extensions": {"teams": {"is_member": []}},
        }));

        assert!(result.is_err());
    }

    #[test]
    fn missing_team_extension_defaults_to_no_memberships() {
        let response: ProviderResponse = serde_json::from_value(serde_json::json!({
            "identity_url": "https://login.example.com/+id/abcdef",
            "extensions": {"macaroon": {"discharge": "discharge-macaroon"}},
        }))
        .unwrap();

        assert!(response.extensions.teams.is_member.is_empty());
    }
}
