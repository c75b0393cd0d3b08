//! Election statistics for the admin dashboard. Computed fresh on every request.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use mongodb::{bson::doc, Database};
use rocket::futures::TryStreamExt;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{
    db::{
        candidate::Candidate,
        settings::ElectionSettings,
        token::{Token, TokenStatus},
        vote::Vote,
    },
    mongodb::Coll,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub candidate_votes: Vec<CandidateVotes>,
    pub token_summary: TokenSummary,
    pub total_votes: u64,
    pub election_status: ElectionStatus,
    /// IDs of the leading candidates; several on a tie, none before any vote.
    pub winners: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateVotes {
    pub id: u32,
    pub name: String,
    pub photo: Option<String>,
    pub total_votes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSummary {
    pub active: u64,
    pub used: u64,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionStatus {
    #[serde(rename = "isEnded")]
    pub is_ended: bool,
    pub ended_at: Option<DateTime<Utc>>,
}

/// One row of the per-candidate vote count aggregation.
#[derive(Deserialize)]
struct Tally {
    #[serde(rename = "_id")]
    candidate_id: u32,
    total: u64,
}

impl Stats {
    pub async fn collect(db: &Database) -> Result<Self> {
        let candidates = Candidate::all(&Coll::from_db(db)).await?;

        let pipeline = [doc! {
            "$group": { "_id": "$candidate_id", "total": { "$sum": 1 } }
        }];
        let tallies: HashMap<u32, u64> = Coll::<Vote>::from_db(db)
            .aggregate(pipeline, None)
            .await?
            .with_type::<Tally>()
            .map_ok(|tally| (tally.candidate_id, tally.total))
            .try_collect()
            .await?;

        let candidate_votes: Vec<_> = candidates
            .into_iter()
            .map(|candidate| CandidateVotes {
                total_votes: tallies.get(&candidate.id).copied().unwrap_or(0),
                id: candidate.id,
                name: candidate.name,
                photo: candidate.photo,
            })
            .collect();
        let total_votes = candidate_votes.iter().map(|c| c.total_votes).sum();

        let tokens = Coll::<Token>::from_db(db);
        let active = tokens
            .count_documents(doc! { "status": TokenStatus::Active }, None)
            .await?;
        let used = tokens
            .count_documents(doc! { "status": TokenStatus::Used }, None)
            .await?;

        let settings = ElectionSettings::load(&Coll::from_db(db)).await?;

        Ok(Self {
            winners: winners(&candidate_votes),
            candidate_votes,
            token_summary: TokenSummary {
                active,
                used,
                total: active + used,
            },
            total_votes,
            election_status: ElectionStatus {
                is_ended: settings.is_ended,
                ended_at: settings.ended_at,
            },
        })
    }
}

/// The candidates with the most votes. Empty if nobody has voted.
pub fn winners(candidate_votes: &[CandidateVotes]) -> Vec<u32> {
    let top = candidate_votes
        .iter()
        .map(|c| c.total_votes)
        .max()
        .unwrap_or(0);
    if top == 0 {
        return Vec::new();
    }
    candidate_votes
        .iter()
        .filter(|c| c.total_votes == top)
        .map(|c| c.id)
        .collect()
}
