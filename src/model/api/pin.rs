//! Voter PIN normalisation.
//!
//! Voters type PINs by hand, so input is forgiving: separators are ignored and
//! short inputs are tried with leading zeros restored. Tokens are issued with
//! [`TOKEN_LENGTH`] digits; [`LEGACY_TOKEN_LENGTH`] tokens from older batches
//! are still accepted.

use serde::{Deserialize, Serialize};

use crate::error::Error;

pub const MIN_PIN_LENGTH: usize = 5;
pub const MAX_PIN_LENGTH: usize = 8;
pub const LEGACY_TOKEN_LENGTH: usize = 6;
pub const TOKEN_LENGTH: usize = 8;

/// The stored token values a typed PIN may refer to, most likely first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinKeys(Vec<String>);

impl PinKeys {
    /// Strip everything but digits from `raw` and derive the lookup keys.
    pub fn normalize(raw: &str) -> Result<Self, Error> {
        let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
        if !(MIN_PIN_LENGTH..=MAX_PIN_LENGTH).contains(&digits.len()) {
            return Err(Error::bad_request(format!(
                "PIN must be {MIN_PIN_LENGTH} to {MAX_PIN_LENGTH} digits."
            )));
        }

        let mut keys = Vec::with_capacity(3);
        if digits.len() == LEGACY_TOKEN_LENGTH || digits.len() == TOKEN_LENGTH {
            keys.push(digits.clone());
        }
        for width in [LEGACY_TOKEN_LENGTH, TOKEN_LENGTH] {
            if digits.len() < width {
                let padded = format!("{digits:0>width$}");
                if !keys.contains(&padded) {
                    keys.push(padded);
                }
            }
        }
        Ok(Self(keys))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

/// A PIN as sent by a client: usually a string, sometimes a bare number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PinInput {
    Text(String),
    Number(u64),
}

impl PinInput {
    pub fn normalize(&self) -> Result<PinKeys, Error> {
        match self {
            Self::Text(text) => PinKeys::normalize(text),
            Self::Number(number) => PinKeys::normalize(&number.to_string()),
        }
    }
}
