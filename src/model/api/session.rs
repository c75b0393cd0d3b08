//! Stateless admin sessions.
//!
//! A session token is `base64url(json payload).base64url(hmac-sha256)`, kept
//! in an HttpOnly cookie. Nothing is stored server-side, so a session lives
//! until it expires; there is no revocation.

use chrono::{serde::ts_seconds, DateTime, Duration, Utc};
use data_encoding::BASE64URL_NOPAD;
use hmac::{Hmac, Mac};
use rocket::{
    http::{Cookie, SameSite, Status},
    outcome::{try_outcome, IntoOutcome},
    request::{FromRequest, Outcome},
    serde::json::serde_json,
    Request,
};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::config::Config;

pub const ADMIN_SESSION_COOKIE: &str = "pemira_admin_session";

type HmacSha256 = Hmac<Sha256>;

/// Why a session token was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("no session cookie")]
    Missing,
    #[error("malformed session token")]
    Malformed,
    #[error("session signature mismatch")]
    BadSignature,
    #[error("session expired")]
    Expired,
    #[error("server config unavailable")]
    Unconfigured,
}

/// A signed-in administrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminSession {
    pub email: String,
    #[serde(rename = "exp", with = "ts_seconds")]
    pub expire_at: DateTime<Utc>,
}

impl AdminSession {
    /// A session for `email` valid for `ttl` from now.
    pub fn new(email: impl Into<String>, ttl: Duration) -> Self {
        Self {
            email: email.into(),
            expire_at: Utc::now() + ttl,
        }
    }

    /// Serialize and sign this session.
    #[allow(clippy::missing_panics_doc)]
    pub fn sign(&self, secret: &[u8]) -> String {
        let payload = serde_json::to_vec(self).expect("Session serialization is infallible");
        let payload = BASE64URL_NOPAD.encode(&payload);
        let signature = BASE64URL_NOPAD.encode(&mac(secret, &payload).finalize().into_bytes());
        format!("{payload}.{signature}")
    }

    /// Check the signature and expiry of a session token.
    pub fn verify(token: &str, secret: &[u8]) -> Result<Self, SessionError> {
        Self::verify_at(token, secret, Utc::now())
    }

    fn verify_at(token: &str, secret: &[u8], now: DateTime<Utc>) -> Result<Self, SessionError> {
        let (payload, signature) = token.split_once('.').ok_or(SessionError::Malformed)?;
        if payload.is_empty() || signature.is_empty() {
            return Err(SessionError::Malformed);
        }

        // Constant-time comparison.
        let signature = BASE64URL_NOPAD
            .decode(signature.as_bytes())
            .map_err(|_| SessionError::Malformed)?;
        mac(secret, payload)
            .verify_slice(&signature)
            .map_err(|_| SessionError::BadSignature)?;

        let payload = BASE64URL_NOPAD
            .decode(payload.as_bytes())
            .map_err(|_| SessionError::Malformed)?;
        let session: Self =
            serde_json::from_slice(&payload).map_err(|_| SessionError::Malformed)?;
        if session.email.is_empty() {
            return Err(SessionError::Malformed);
        }
        if session.expire_at <= now {
            return Err(SessionError::Expired);
        }
        Ok(session)
    }

    /// Sign this session into a cookie that lives as long as the session.
    pub fn into_cookie(self, config: &Config) -> Cookie<'static> {
        let max_age = rocket::time::Duration::seconds(config.session_ttl().num_seconds());
        Cookie::build((ADMIN_SESSION_COOKIE, self.sign(config.session_secret())))
            .path("/")
            .max_age(max_age)
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(config.secure_cookies())
            .build()
    }
}

fn mac(secret: &[u8], payload: &str) -> HmacSha256 {
    // HMAC accepts keys of any length.
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC takes any key length");
    mac.update(payload.as_bytes());
    mac
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminSession {
    type Error = SessionError;

    /// Get a valid session from the cookie, failing with `401` otherwise.
    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(config) = req.rocket().state::<Config>() else {
            return Outcome::Error((Status::InternalServerError, SessionError::Unconfigured));
        };

        let cookie = try_outcome!(req
            .cookies()
            .get(ADMIN_SESSION_COOKIE)
            .ok_or(SessionError::Missing)
            .or_error(Status::Unauthorized));

        AdminSession::verify(cookie.value(), config.session_secret())
            .map_err(|err| {
                debug!("Rejected admin session: {err}");
                err
            })
            .or_error(Status::Unauthorized)
    }
}
