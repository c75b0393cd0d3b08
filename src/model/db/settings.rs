use chrono::{DateTime, Utc};
use mongodb::{
    bson::{doc, serde_helpers::chrono_datetime_as_bson_datetime_optional, Bson},
    options::UpdateOptions,
    Client, ClientSession, Database,
};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{
    db::token::{Token, TokenStatus},
    mongodb::{
        transaction::{self, retry_transient},
        Coll,
    },
};

/// The `_id` of the single settings document.
pub const SETTINGS_ID: &str = "election";

/// Global election state. Exactly one document of this type exists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionSettings {
    #[serde(default)]
    pub is_ended: bool,
    #[serde(default, with = "chrono_datetime_as_bson_datetime_optional")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Bumped by every token insert, so token generation conflicts with closeout.
    #[serde(default)]
    pub tokens_issued: i64,
}

impl ElectionSettings {
    /// Read the current settings. A missing document reads as a fresh, open election.
    pub async fn load(settings: &Coll<ElectionSettings>) -> Result<Self> {
        let current = settings.find_one(doc! { "_id": SETTINGS_ID }, None).await?;
        Ok(current.unwrap_or_default())
    }

    /// Read the current settings as part of a transaction.
    pub async fn load_in(
        settings: &Coll<ElectionSettings>,
        session: &mut ClientSession,
    ) -> Result<Self> {
        let current = settings
            .find_one_with_session(doc! { "_id": SETTINGS_ID }, None, session)
            .await?;
        Ok(current.unwrap_or_default())
    }
}

/// Create the settings document if it does not exist yet.
pub async fn ensure_settings_exist(settings: &Coll<ElectionSettings>) -> Result<()> {
    let defaults = doc! {
        "$setOnInsert": {
            "is_ended": false,
            "ended_at": Bson::Null,
            "tokens_issued": 0_i64,
        }
    };
    let upsert = UpdateOptions::builder().upsert(true).build();
    settings
        .update_one(doc! { "_id": SETTINGS_ID }, defaults, upsert)
        .await?;
    Ok(())
}

/// Result of closing the election.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Closeout {
    /// Tokens that were still active and have now been used up.
    pub affected_active_tokens: u64,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Close the election and use up every remaining active token, atomically.
///
/// Repeating this has no further effect: the original `ended_at` is kept and
/// no tokens are affected.
pub async fn end_election(db_client: &Client, db: &Database) -> Result<Closeout> {
    retry_transient(|| end_election_once(db_client, db)).await
}

async fn end_election_once(db_client: &Client, db: &Database) -> Result<Closeout> {
    let mut session = transaction::start(db_client).await?;
    let result = close_in(&mut session, db).await;
    transaction::finish(&mut session, result).await
}

async fn close_in(session: &mut ClientSession, db: &Database) -> Result<Closeout> {
    let now = Utc::now();
    let settings = Coll::<ElectionSettings>::from_db(db);

    // Pipeline updates so that existing timestamps survive.
    let close = vec![doc! {
        "$set": {
            "is_ended": true,
            "ended_at": { "$ifNull": ["$ended_at", now] },
        }
    }];
    let upsert = UpdateOptions::builder().upsert(true).build();
    settings
        .update_one_with_session(doc! { "_id": SETTINGS_ID }, close, upsert, session)
        .await?;

    let sweep = vec![doc! {
        "$set": {
            "status": TokenStatus::Used,
            "used_at": { "$ifNull": ["$used_at", now] },
        }
    }];
    let swept = Coll::<Token>::from_db(db)
        .update_many_with_session(doc! { "status": TokenStatus::Active }, sweep, None, session)
        .await?;

    let closed = ElectionSettings::load_in(&settings, session).await?;
    Ok(Closeout {
        affected_active_tokens: swept.modified_count,
        ended_at: closed.ended_at,
    })
}
