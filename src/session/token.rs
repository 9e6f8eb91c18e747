use std::collections::HashSet;

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{errors::Error as JwtError, DecodingKey, TokenData, Validation};
use serde_json::{Map, Value};
use thiserror::Error;

/// Why an expiry could not be read from an access token.
#[derive(Debug, Error)]
pub enum TokenError {
    /// Not a JWT at all: wrong shape, bad base64, or a payload that is not JSON.
    #[error("Malformed access token: {0}")]
    Malformed(#[from] JwtError),
    /// A well-formed token whose payload has no usable `exp` claim.
    #[error("Access token has no expiry claim")]
    MissingExpiry,
}

/// Read the `exp` claim of an access token.
///
/// The client holds no key, so the signature is not checked: the value is only
/// used to decide when to renew, never to trust the token.
///
/// The header must still name an algorithm `jsonwebtoken` knows. A token with
/// `"alg": "none"` or an unknown algorithm is [`TokenError::Malformed`], so no
/// renewal is scheduled for it and only a 401 will refresh it.
pub fn decode_expiry(token: &str) -> Result<DateTime<Utc>, TokenError> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.required_spec_claims = HashSet::new();

    let data: TokenData<Map<String, Value>> =
        jsonwebtoken::decode(token, &DecodingKey::from_secret(&[]), &validation)?;

    // Seconds since the epoch; fractional values are truncated.
    let seconds = match data.claims.get("exp") {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        _ => None,
    };
    seconds
        .filter(|s| *s > 0)
        .and_then(|s| Utc.timestamp_opt(s, 0).single())
        .ok_or(TokenError::MissingExpiry)
}

/// Soft-failing [`decode_expiry`]: `None` means "cannot schedule".
pub fn expiry_of(token: &str) -> Option<DateTime<Utc>> {
    match decode_expiry(token) {
        Ok(expiry) => Some(expiry),
        Err(e) => {
            debug!("Not scheduling renewal: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use jsonwebtoken::{EncodingKey, Header};
    use serde_json::json;

    use super::*;

    fn sign(claims: &Value) -> String {
        jsonwebtoken::encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(b"someone else's secret"),
        )
        .unwrap()
    }

    #[test]
    fn reads_expiry_without_the_key() {
        let token = sign(&json!({ "sub": "alice", "exp": 1_900_000_000 }));
        let expiry = decode_expiry(&token).unwrap();
        assert_eq!(expiry.timestamp(), 1_900_000_000);
        assert_eq!(expiry_of(&token), Some(expiry));
    }

    #[test]
    fn expired_tokens_still_decode() {
        let token = sign(&json!({ "exp": 1_000 }));
        assert_eq!(decode_expiry(&token).unwrap().timestamp(), 1_000);
    }

    #[test]
    fn missing_or_unusable_expiry() {
        for claims in [
            json!({ "sub": "alice" }),
            json!({ "exp": "tomorrow" }),
            json!({ "exp": 0 }),
            json!({ "exp": null }),
        ] {
            let token = sign(&claims);
            assert!(
                matches!(decode_expiry(&token), Err(TokenError::MissingExpiry)),
                "{claims}"
            );
            assert_eq!(expiry_of(&token), None);
        }
    }

    #[test]
    fn malformed_tokens() {
        for token in ["", "not-a-jwt", "a.b", "a.b.c", "eyJhbGciOiJIUzI1NiJ9.!!!.sig"] {
            assert!(
                matches!(decode_expiry(token), Err(TokenError::Malformed(_))),
                "{token}"
            );
            assert_eq!(expiry_of(token), None);
        }
    }

    #[test]
    fn header_algorithm_must_be_known() {
        const CLAIMS: &str = "eyJleHAiOjE5MDAwMDAwMDB9"; // {"exp":1900000000}

        // {"alg":"none"} and {"alg":"XX1"}
        for header in ["eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0", "eyJhbGciOiJYWDEiLCJ0eXAiOiJKV1QifQ"] {
            let token = format!("{header}.{CLAIMS}.");
            assert!(
                matches!(decode_expiry(&token), Err(TokenError::Malformed(_))),
                "{token}"
            );
        }

        // {"alg":"RS256"} is read even though the signature is never checked.
        let token = format!("eyJhbGciOiJSUzI1NiIsInR5cCI6IkpXVCJ9.{CLAIMS}.c2ln");
        assert_eq!(decode_expiry(&token).unwrap().timestamp(), 1_900_000_000);
    }
}
