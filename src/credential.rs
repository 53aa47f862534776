//! Macaroon credential handling: authorization header construction,
//! third-party caveat extraction and expiry detection.
//!
//! The session owns the serialized macaroon strings; everything here is a
//! pure transformation over them.

use std::sync::Once;

use ::http::header::WWW_AUTHENTICATE;
use ::http::HeaderMap;
use macaroon::{Caveat, Format, Macaroon};
use thiserror::Error;

/// Value of the `WWW-Authenticate` header the dashboard sets when the
/// presented macaroon has expired or been revoked.
const MACAROON_NEEDS_REFRESH: &str = "Macaroon needs_refresh=1";

static CRYPTO_INIT: Once = Once::new();

fn init_crypto() {
    CRYPTO_INIT.call_once(|| {
        // Makes the underlying crypto primitives thread-safe.
        let _ = macaroon::initialize();
    });
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("incomplete macaroon pair: both root and discharge are required")]
    IncompletePair,
    #[error("malformed macaroon: `{0}`")]
    Malformed(String),
    #[error("no third-party caveat for `{0}` in root macaroon")]
    CaveatNotFound(String),
    #[error("binding discharge macaroon failed: `{0}`")]
    Binding(String),
}

/// Binds the discharge macaroon to the root macaroon and serializes the
/// pair into a single `Authorization` header value, as expected by the
/// dashboard's verifier.
pub fn authorization_header(root: &str, discharge: &str) -> Result<String, CredentialError> {
    if root.is_empty() || discharge.is_empty() {
        return Err(CredentialError::IncompletePair);
    }
    init_crypto();

    let root_macaroon = Macaroon::deserialize(root)
        .map_err(|err| CredentialError::Malformed(format!("root macaroon: {err:?}")))?;
    let mut discharge_macaroon = Macaroon::deserialize(discharge)
        .map_err(|err| CredentialError::Malformed(format!("discharge macaroon: {err:?}")))?;

    root_macaroon.bind(&mut discharge_macaroon);
    let bound = discharge_macaroon
        .serialize(Format::V1)
        .map_err(|err| CredentialError::Binding(format!("{err:?}")))?;

    Ok(format!("Macaroon root={root}, discharge={bound}"))
}

/// Returns the identifier of the third-party caveat addressed to the
/// identity provider at `location`, to be embedded in the OpenID request so
/// the provider can mint a matching discharge.
pub fn extract_caveat_id(root: &str, location: &str) -> Result<String, CredentialError> {
    init_crypto();

    let root_macaroon = Macaroon::deserialize(root)
        .map_err(|err| CredentialError::Malformed(format!("root macaroon: {err:?}")))?;

    let caveat = root_macaroon
        .third_party_caveats()
        .into_iter()
        .find_map(|caveat| match caveat {
            Caveat::ThirdParty(caveat) if caveat.location() == location => Some(caveat),
            _ => None,
        })
        .ok_or_else(|| CredentialError::CaveatNotFound(location.to_string()))?;

    String::from_utf8(caveat.id().0)
        .map_err(|_| CredentialError::Malformed("caveat identifier is not valid UTF-8".into()))
}

/// True when the dashboard signals through the response headers that the
/// presented macaroon must be refreshed. Must be consulted before the body
/// of an authenticated response is trusted: the dashboard can set this on
/// otherwise-successful responses.
pub fn is_macaroon_expired(headers: &HeaderMap) -> bool {
    headers
        .get(WWW_AUTHENTICATE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == MACAROON_NEEDS_REFRESH)
}

#[cfg(test)]
pub(crate) mod test_support {
    use macaroon::{Macaroon, MacaroonKey};

    pub(crate) const TEST_CAVEAT_ID: &str = "test-caveat-id";

    /// Builds a (root, discharge) pair whose third-party caveat points at
    /// `location`, serialized the way the dashboard hands them out.
    pub(crate) fn macaroon_pair(location: &str) -> (String, String) {
        super::init_crypto();
        let root_key = MacaroonKey::generate(b"root-key");
        let caveat_key = MacaroonKey::generate(b"caveat-key");

        let mut root = Macaroon::create(
            Some("dashboard.example".into()),
            &root_key,
            "storefront-root".into(),
        )
        .unwrap();
        root.add_third_party_caveat(location, &caveat_key, TEST_CAVEAT_ID.into());

        let discharge = Macaroon::create(
            Some(location.to_string()),
            &caveat_key,
            TEST_CAVEAT_ID.into(),
        )
        .unwrap();

        (
            root.serialize(macaroon::Format::V1).unwrap(),
            discharge.serialize(macaroon::Format::V1).unwrap(),
        )
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use macaroon::{Macaroon, MacaroonKey, Verifier};

    use super::test_support::{macaroon_pair, TEST_CAVEAT_ID};
    use super::*;

    const PROVIDER_LOCATION: &str = "login.example.com";

    #[test]
    fn authorization_header_binds_discharge_to_root() {
        let (root, discharge) = macaroon_pair(PROVIDER_LOCATION);

        let header = authorization_header(&root, &discharge).unwrap();

        let root_macaroon = Macaroon::deserialize(&root).unwrap();
        let mut discharge_macaroon = Macaroon::deserialize(&discharge).unwrap();
        root_macaroon.bind(&mut discharge_macaroon);
        let expected = discharge_macaroon.serialize(Format::V1).unwrap();

        assert_eq!(header, format!("Macaroon root={root}, discharge={expected}"));
    }

    #[test]
    fn bound_pair_passes_reference_verification() {
        init_crypto();
        let root_key = MacaroonKey::generate(b"root-key");
        let caveat_key = MacaroonKey::generate(b"caveat-key");

        let mut root = Macaroon::create(
            Some("dashboard.example".into()),
            &root_key,
            "storefront-root".into(),
        )
        .unwrap();
        root.add_third_party_caveat(PROVIDER_LOCATION, &caveat_key, TEST_CAVEAT_ID.into());
        let discharge = Macaroon::create(
            Some(PROVIDER_LOCATION.to_string()),
            &caveat_key,
            TEST_CAVEAT_ID.into(),
        )
        .unwrap();

        let serialized_root = root.serialize(Format::V1).unwrap();
        let serialized_discharge = discharge.serialize(Format::V1).unwrap();
        let header = authorization_header(&serialized_root, &serialized_discharge).unwrap();

        let bound = header.split(", discharge=").nth(1).unwrap();
        let bound_discharge = Macaroon::deserialize(bound).unwrap();

        let mut verifier = Verifier::default();
        verifier
            .verify(&root, &root_key, vec![bound_discharge])
            .unwrap();
    }

    #[test]
    fn authorization_header_rejects_empty_inputs() {
        let (root, discharge) = macaroon_pair(PROVIDER_LOCATION);

        assert_matches!(
            authorization_header("", &discharge),
            Err(CredentialError::IncompletePair)
        );
        assert_matches!(
            authorization_header(&root, ""),
            Err(CredentialError::IncompletePair)
        );
    }

    #[test]
    fn authorization_header_rejects_garbage() {
        assert_matches!(
            authorization_header("not a macaroon", "neither is this"),
            Err(CredentialError::Malformed(_))
        );
    }

    #[test]
    fn extract_caveat_id_finds_provider_caveat() {
        let (root, _) = macaroon_pair(PROVIDER_LOCATION);

        let caveat_id = extract_caveat_id(&root, PROVIDER_LOCATION).unwrap();

        assert_eq!(caveat_id, TEST_CAVEAT_ID);
    }

    #[test]
    fn extract_caveat_id_fails_for_unknown_location() {
        let (root, _) = macaroon_pair(PROVIDER_LOCATION);

        assert_matches!(
            extract_caveat_id(&root, "other.example.com"),
            Err(CredentialError::CaveatNotFound(location)) => {
                assert_eq!(location, "other.example.com")
            }
        );
    }

    #[test]
    fn extract_caveat_id_fails_for_malformed_macaroon() {
        assert_matches!(
            extract_caveat_id("not a macaroon", PROVIDER_LOCATION),
            Err(CredentialError::Malformed(_))
        );
    }

    #[test]
    fn expired_macaroon_is_detected() {
        let mut headers = HeaderMap::new();
        headers.insert(WWW_AUTHENTICATE, "Macaroon needs_refresh=1".parse().unwrap());

        assert!(is_macaroon_expired(&headers));
    }

    #[test]
    fn missing_or_unrelated_headers_are_not_expiry() {
        assert!(!is_macaroon_expired(&HeaderMap::new()));

        let mut headers = HeaderMap::new();
        headers.insert(WWW_AUTHENTICATE, "Basic realm=\"store\"".parse().unwrap());
        assert!(!is_macaroon_expired(&headers));
    }
}
