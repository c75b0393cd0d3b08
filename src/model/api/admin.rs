use argon2::Config;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::db::admin::NewAdmin;

/// Raw admin credentials, received from a user. These are never stored directly,
/// since the password is in plaintext.
#[derive(Clone, Deserialize, Serialize)]
pub struct AdminCredentials {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl AdminCredentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Emails are compared trimmed and lower-case.
    pub fn normalized_email(&self) -> String {
        self.email.trim().to_lowercase()
    }

    /// Reject credentials that cannot possibly be valid.
    pub fn validate(&self) -> Result<()> {
        if self.normalized_email().is_empty() || self.password.is_empty() {
            return Err(Error::bad_request("Email and password are required."));
        }
        Ok(())
    }
}

impl TryFrom<AdminCredentials> for NewAdmin {
    type Error = Error;

    /// Convert [`AdminCredentials`] to a new admin by hashing the password.
    fn try_from(cred: AdminCredentials) -> Result<Self> {
        cred.validate()?;

        // 16 bytes is recommended for password hashing:
        //  https://en.wikipedia.org/wiki/Argon2
        let mut salt = [0_u8; 16];
        rand::thread_rng().fill(&mut salt);
        let password_hash =
            argon2::hash_encoded(cred.password.as_bytes(), &salt, &Config::default())?;
        Ok(Self {
            email: cred.normalized_email(),
            password_hash,
        })
    }
}
