//! Session model
//!
//! Sessions are issued and owned by the hosted data store. The application
//! only reads them back from the access token it was handed.

use chrono::{DateTime, TimeZone, Utc};
use data_encoding::BASE64URL_NOPAD;
use serde::{Deserialize, Serialize};

/// Authenticated admin user as reported by the data store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Session bound to an admin user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Bearer token presented to the data store
    pub access_token: String,
    /// Id of the user the token was issued to
    pub user_id: String,
    /// Expiration timestamp
    pub expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct TokenClaims {
    sub: String,
    exp: i64,
}

impl Session {
    /// Check if the session has expired
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    /// Read the session back out of a JWT access token
    ///
    /// Only the payload is decoded; the signature is verified by the data
    /// store on the follow-up user lookup. Returns `None` for anything that
    /// is not a three-part token with `sub` and `exp` claims.
    pub fn from_access_token(token: &str) -> Option<Self> {
        let mut parts = token.split('.');
        let (_header, payload, _signature) = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() {
            return None;
        }

        let payload = BASE64URL_NOPAD
            .decode(payload.trim_end_matches('=').as_bytes())
            .ok()?;
        let claims: TokenClaims = serde_json::from_slice(&payload).ok()?;
        let expires_at = Utc.timestamp_opt(claims.exp, 0).single()?;

        Some(Self {
            access_token: token.to_string(),
            user_id: claims.sub,
            expires_at,
        })
    }
}

#[cfg(test)]
pub(crate) fn encode_test_token(sub: &str, exp: i64) -> String {
    let header = BASE64URL_NOPAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let claims = format!(r#"{{"sub":"{}","exp":{}}}"#, sub, exp);
    let payload = BASE64URL_NOPAD.encode(claims.as_bytes());
    format!("{}.{}.signature", header, payload)
}
