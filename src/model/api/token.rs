use chrono::{DateTime, Utc};
use mongodb::{bson::doc, options::FindOptions};
use rocket::{futures::TryStreamExt, serde::json::Value};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    api::{json::whole_number, pagination::PageInfo},
    db::{
        generation::{Generation, MAX_GENERATE_COUNT},
        token::{Token, TokenStatus},
    },
    mongodb::Coll,
};

/// How many tokens to generate. A missing count means one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub count: Option<Value>,
}

impl GenerateRequest {
    /// The requested count, which must be a whole number in `1..=MAX_GENERATE_COUNT`.
    /// Numeric strings are accepted.
    pub fn count(&self) -> Result<u32> {
        let count = match &self.count {
            None | Some(Value::Null) => return Ok(1),
            Some(count) => whole_number(count),
        };
        count
            .filter(|count| (1..=u64::from(MAX_GENERATE_COUNT)).contains(count))
            .map(|count| count as u32)
            .ok_or_else(|| {
                Error::bad_request(format!(
                    "Count must be a whole number between 1 and {MAX_GENERATE_COUNT}."
                ))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub success: bool,
    pub message: String,
    pub generated_count: usize,
    pub requested_count: u32,
    pub generated_tokens_preview: Vec<String>,
}

impl From<Generation> for GenerateResponse {
    fn from(generation: Generation) -> Self {
        let message = if generation.is_complete() {
            format!("Generated {} new PINs.", generation.generated.len())
        } else {
            format!(
                "Generated {} of {} requested PINs.",
                generation.generated.len(),
                generation.requested
            )
        };
        Self {
            success: true,
            message,
            generated_count: generation.generated.len(),
            requested_count: generation.requested,
            generated_tokens_preview: generation.preview().to_vec(),
        }
    }
}

/// A token as listed on the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRow {
    pub id: String,
    pub token: String,
    pub status: TokenStatus,
    pub created_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

impl From<Token> for TokenRow {
    fn from(token: Token) -> Self {
        Self {
            id: token.id.to_string(),
            token: token.token.value,
            status: token.token.status,
            created_at: token.token.created_at,
            used_at: token.token.used_at,
        }
    }
}

impl TokenRow {
    /// One page of tokens, newest first.
    pub async fn page(tokens: &Coll<Token>, page: &PageInfo) -> Result<Vec<TokenRow>> {
        let newest_first = FindOptions::builder()
            .sort(doc! { "created_at": -1, "_id": -1 })
            .skip(page.skip())
            .limit(page.per_page as i64)
            .build();
        let rows = tokens
            .find(None, newest_first)
            .await?
            .map_ok(TokenRow::from)
            .try_collect()
            .await?;
        Ok(rows)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPage {
    pub success: bool,
    pub tokens: Vec<TokenRow>,
    pub pagination: PageInfo,
}
