use mongodb::{
    bson::doc,
    options::{FindOptions, UpdateOptions},
};
use rocket::futures::TryStreamExt;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::mongodb::Coll;

/// A candidate on the ballot. Candidates are seeded from configuration and
/// never change while the election runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(rename = "_id", alias = "id")]
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub class_name: String,
    #[serde(default)]
    pub photo: Option<String>,
}

impl Candidate {
    /// All candidates, ordered by ID.
    pub async fn all(candidates: &Coll<Candidate>) -> Result<Vec<Candidate>> {
        let by_id = FindOptions::builder().sort(doc! { "_id": 1 }).build();
        let all = candidates.find(None, by_id).await?.try_collect().await?;
        Ok(all)
    }
}

/// Insert any configured candidate that is not already in the database.
/// Existing candidates are left untouched.
pub async fn ensure_candidates_exist(
    candidates: &Coll<Candidate>,
    configured: &[Candidate],
) -> Result<()> {
    let upsert = UpdateOptions::builder().upsert(true).build();
    for candidate in configured {
        if candidate.id == 0 {
            warn!("Ignoring candidate {:?}: IDs start at 1", candidate.name);
            continue;
        }
        let insert = doc! {
            "$setOnInsert": {
                "name": &candidate.name,
                "class_name": &candidate.class_name,
                "photo": &candidate.photo,
            }
        };
        let result = candidates
            .update_one(doc! { "_id": candidate.id }, insert, upsert.clone())
            .await?;
        if result.upserted_id.is_some() {
            info!("Seeded candidate {} ({})", candidate.id, candidate.name);
        }
    }
    Ok(())
}
