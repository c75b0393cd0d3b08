use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, serde_helpers::chrono_datetime_as_bson_datetime},
    Database,
};
use rocket::{futures::TryStreamExt, serde::json::Value};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    api::{json::whole_number, pagination::PageInfo, pin::PinInput},
    db::{candidate::Candidate, token::Token, vote::Vote},
    mongodb::{Coll, Id, MongoCollection},
};

/// Shown for a vote whose token or candidate cannot be found.
pub const MISSING_TOKEN: &str = "-";
pub const MISSING_CANDIDATE: &str = "Unknown candidate";

/// Body of a PIN check. Older clients send the PIN as `token`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifyPinRequest {
    #[serde(default)]
    pub pin: Option<PinInput>,
    #[serde(default)]
    pub token: Option<PinInput>,
}

impl VerifyPinRequest {
    pub fn pin(&self) -> Option<&PinInput> {
        self.pin.as_ref().or(self.token.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyPinResponse {
    pub success: bool,
    pub message: String,
    /// The stored token value the PIN matched.
    pub pin: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    #[serde(default)]
    pub pin: Option<PinInput>,
    #[serde(default)]
    pub candidate_id: Option<Value>,
}

impl VoteRequest {
    /// The chosen candidate, which must be a positive whole number.
    pub fn candidate_id(&self) -> Result<u32> {
        self.candidate_id
            .as_ref()
            .and_then(whole_number)
            .filter(|&id| id > 0)
            .and_then(|id| u32::try_from(id).ok())
            .ok_or_else(|| Error::bad_request("Candidate is not valid."))
    }
}

/// A vote as listed on the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRow {
    pub id: String,
    pub token: String,
    pub candidate_id: u32,
    pub candidate_name: String,
    pub created_at: DateTime<Utc>,
}

/// A vote joined with its token and candidate.
#[derive(Deserialize)]
struct JoinedVote {
    #[serde(rename = "_id")]
    id: Id,
    token: Option<String>,
    candidate_id: u32,
    candidate_name: Option<String>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    created_at: DateTime<Utc>,
}

impl From<JoinedVote> for VoteRow {
    fn from(vote: JoinedVote) -> Self {
        Self {
            id: vote.id.to_string(),
            token: vote.token.unwrap_or_else(|| MISSING_TOKEN.to_string()),
            candidate_id: vote.candidate_id,
            candidate_name: vote
                .candidate_name
                .unwrap_or_else(|| MISSING_CANDIDATE.to_string()),
            created_at: vote.created_at,
        }
    }
}

impl VoteRow {
    /// One page of votes, newest first.
    pub async fn page(db: &Database, page: &PageInfo) -> Result<Vec<VoteRow>> {
        let pipeline = [
            doc! { "$sort": { "created_at": -1, "_id": -1 } },
            doc! { "$skip": page.skip() as i64 },
            doc! { "$limit": page.per_page as i64 },
            doc! { "$lookup": {
                "from": Token::NAME,
                "localField": "token_id",
                "foreignField": "_id",
                "as": "token",
            }},
            doc! { "$lookup": {
                "from": Candidate::NAME,
                "localField": "candidate_id",
                "foreignField": "_id",
                "as": "candidate",
            }},
            doc! { "$project": {
                "token": { "$arrayElemAt": ["$token.value", 0] },
                "candidate_id": 1,
                "candidate_name": { "$arrayElemAt": ["$candidate.name", 0] },
                "created_at": 1,
            }},
        ];
        let rows = Coll::<Vote>::from_db(db)
            .aggregate(pipeline, None)
            .await?
            .with_type::<JoinedVote>()
            .map_ok(VoteRow::from)
            .try_collect()
            .await?;
        Ok(rows)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VotePage {
    pub success: bool,
    pub votes: Vec<VoteRow>,
    pub pagination: PageInfo,
}
