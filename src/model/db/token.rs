use std::ops::Deref;

use chrono::{DateTime, Utc};
use mongodb::bson::{
    serde_helpers::{chrono_datetime_as_bson_datetime, chrono_datetime_as_bson_datetime_optional},
    Bson,
};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::model::{api::pin::TOKEN_LENGTH, mongodb::Id};

/// Lifecycle of a token: it is issued active and used up exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStatus {
    Active,
    Used,
}

impl TokenStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Used => "used",
        }
    }
}

impl From<TokenStatus> for Bson {
    fn from(status: TokenStatus) -> Self {
        Bson::String(status.as_str().to_string())
    }
}

/// Core token data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCore {
    /// The PIN itself, a fixed-length digit string.
    pub value: String,
    pub status: TokenStatus,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "chrono_datetime_as_bson_datetime_optional")]
    pub used_at: Option<DateTime<Utc>>,
}

impl TokenCore {
    /// A freshly issued, unused token.
    pub fn active(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            status: TokenStatus::Active,
            created_at: Utc::now(),
            used_at: None,
        }
    }
}

/// A token without an ID.
pub type NewToken = TokenCore;

/// A token from the database, with its unique ID.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub token: TokenCore,
}

impl Deref for Token {
    type Target = TokenCore;

    fn deref(&self) -> &Self::Target {
        &self.token
    }
}


/// Generate a random token value: uniformly random digits, the first of
/// which is never zero.
pub fn random_token_value() -> String {
    let mut rng = rand::thread_rng();
    let mut value = String::with_capacity(TOKEN_LENGTH);
    value.push(char::from(b'0' + rng.gen_range(1..=9)));
    for _ in 1..TOKEN_LENGTH {
        value.push(char::from(b'0' + rng.gen_range(0..=9)));
    }
    value
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl TokenCore {
        pub fn example() -> Self {
            Self::active("48151623")
        }

        pub fn example_legacy() -> Self {
            Self::active("004217")
        }

        pub fn example_used() -> Self {
            Self {
                value: "90210000".to_string(),
                status: TokenStatus::Used,
                created_at: Utc::now(),
                used_at: Some(Utc::now()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use mongodb::bson::{doc, to_document};

    use super::*;

    #[test]
    fn random_values_are_well_formed() {
        for _ in 0..1000 {
            let value = random_token_value();
            assert_eq!(value.len(), TOKEN_LENGTH);
            assert!(value.bytes().all(|b| b.is_ascii_digit()));
            assert_ne!(value.as_bytes()[0], b'0');
        }
    }

    #[test]
    fn status_is_stored_as_lowercase_string() {
        let stored = to_document(&NewToken::example()).unwrap();
        assert_eq!(stored.get_str("status").unwrap(), "active");
        assert_eq!(Bson::from(TokenStatus::Used), Bson::String("used".into()));
        assert_eq!(doc! { "status": TokenStatus::Active }, doc! { "status": "active" });
    }
}
