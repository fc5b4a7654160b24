//! Access token with expiry derived from its embedded claim.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Deserialize;

use crate::error::AuthError;

/// Short-lived bearer credential.
///
/// Expiry is always derived from the token's own `exp` claim at parse time,
/// never stored separately, so a cached expiry can never diverge from the
/// token it describes. The raw value is held only in volatile memory and is
/// redacted from `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    raw: String,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct TokenClaims {
    #[serde(default)]
    exp: Option<i64>,
}

impl AccessToken {
    /// Parse a raw bearer string, deriving expiry from the `exp` claim.
    ///
    /// A token whose payload carries no `exp` claim is treated as
    /// non-expiring; a token whose payload cannot be decoded at all is
    /// rejected.
    pub fn parse(raw: impl Into<String>) -> Result<Self, AuthError> {
        let raw = raw.into();
        let expires_at = decode_exp_claim(&raw)?;
        Ok(Self { raw, expires_at })
    }

    /// The raw bearer value, for the Authorization header.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Expiry instant, if the token carries one.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Check whether the token is past its expiry claim.
    pub fn is_expired(&self) -> bool {
        self.expires_within(Duration::zero())
    }

    /// Check whether the token expires within the given leeway.
    pub fn expires_within(&self, leeway: Duration) -> bool {
        match self.expires_at {
            Some(exp) => Utc::now() + leeway >= exp,
            None => false,
        }
    }

    /// Short prefix of the raw value, safe for log correlation.
    pub fn prefix(&self) -> &str {
        const PREFIX_LEN: usize = 8;
        self.raw.get(..PREFIX_LEN).unwrap_or(&self.raw)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("prefix", &self.prefix())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Decode the `exp` claim from the payload segment of a JWT-shaped token.
///
/// No signature verification happens client-side; the claim is only used to
/// decide when to refresh proactively.
fn decode_exp_claim(raw: &str) -> Result<Option<DateTime<Utc>>, AuthError> {
    let mut segments = raw.split('.');
    let payload = match (segments.next(), segments.next()) {
        (Some(_), Some(payload)) if !payload.is_empty() => payload,
        _ => {
            return Err(AuthError::Token(
                "token is not in header.payload[.signature] form".to_string(),
            ));
        }
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| AuthError::Token(format!("invalid payload encoding: {e}")))?;
    let claims: TokenClaims = serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::Token(format!("invalid claims object: {e}")))?;

    Ok(claims
        .exp
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single()))
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_exp_claim_roundtrips(exp in 0i64..4_000_000_000i64) {
            let payload = serde_json::json!({ "exp": exp });
            let body = URL_SAFE_NO_PAD.encode(payload.to_string().as_bytes());
            let raw = format!("h.{body}.s");

            let token = AccessToken::parse(raw).expect("parse");
            prop_assert_eq!(
                token.expires_at().map(|t| t.timestamp()),
                Some(exp)
            );
        }

        #[test]
        fn prop_arbitrary_payload_never_panics(payload in "[A-Za-z0-9_-]{0,64}") {
            let raw = format!("h.{payload}.s");
            // Parsing may fail, but must never panic.
            let _ = AccessToken::parse(raw);
        }
    }
}
