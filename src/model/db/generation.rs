//! Issuing new voter tokens in batches.

use std::collections::HashSet;
use std::future::Future;
use std::iter;

use mongodb::{bson::doc, Client, ClientSession, Database};
use rocket::http::Status;

use crate::error::{Error, Result};
use crate::model::{
    db::{
        settings::{ElectionSettings, SETTINGS_ID},
        token::{random_token_value, NewToken},
    },
    mongodb::{
        errors::is_duplicate_key_error,
        transaction::{self, retry_transient},
        Coll,
    },
};

pub const MAX_GENERATE_COUNT: u32 = 5000;
/// Random values tried per requested token before giving up.
pub const ATTEMPTS_PER_TOKEN: u32 = 40;
pub const PREVIEW_LENGTH: usize = 10;

/// What became of one attempted token value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    Inserted,
    /// The value is already taken.
    Collision,
    /// The election closed; nothing more may be inserted.
    Closed,
}

/// Outcome of a batch. May hold fewer tokens than were requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub requested: u32,
    pub generated: Vec<String>,
    /// The election closed part way through the batch.
    pub closed_early: bool,
}

impl Generation {
    pub fn is_complete(&self) -> bool {
        self.generated.len() == self.requested as usize
    }

    /// The first few generated values.
    pub fn preview(&self) -> &[String] {
        &self.generated[..self.generated.len().min(PREVIEW_LENGTH)]
    }
}

fn election_closed() -> Error {
    Error::Status(
        Status::Conflict,
        "The election has ended, so no new PINs can be created.".to_string(),
    )
}

/// Issue `requested` new active tokens with random values.
///
/// Fails if the election is closed or if not a single token could be created.
pub async fn generate_tokens(db_client: &Client, db: &Database, requested: u32) -> Result<Generation> {
    let settings = ElectionSettings::load(&Coll::from_db(db)).await?;
    if settings.is_ended {
        return Err(election_closed());
    }

    let values = iter::repeat_with(random_token_value);
    let generation =
        generate_with(requested, values, |value| insert_token(db_client, db, value)).await?;

    if generation.generated.is_empty() {
        if generation.closed_early {
            return Err(election_closed());
        }
        return Err(Error::internal("Failed to create any new PINs."));
    }
    if !generation.is_complete() {
        warn!(
            "Generated only {} of {} requested tokens",
            generation.generated.len(),
            generation.requested
        );
    }
    Ok(generation)
}

/// Try values from `values` with `insert` until `requested` have been inserted,
/// the attempt budget runs out, or the election closes.
pub async fn generate_with<V, F, Fut>(requested: u32, values: V, mut insert: F) -> Result<Generation>
where
    V: IntoIterator<Item = String>,
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Insertion>>,
{
    let max_attempts = requested.saturating_mul(ATTEMPTS_PER_TOKEN);
    let mut values = values.into_iter();
    let mut generated = Vec::with_capacity(requested as usize);
    let mut seen = HashSet::new();
    let mut closed_early = false;

    for _ in 0..max_attempts {
        if generated.len() >= requested as usize {
            break;
        }
        let Some(value) = values.next() else {
            break;
        };
        if !seen.insert(value.clone()) {
            continue;
        }
        match insert(value.clone()).await? {
            Insertion::Inserted => generated.push(value),
            Insertion::Collision => debug!("Token value collision, trying another"),
            Insertion::Closed => {
                closed_early = true;
                break;
            }
        }
    }

    Ok(Generation {
        requested,
        generated,
        closed_early,
    })
}

async fn insert_token(db_client: &Client, db: &Database, value: String) -> Result<Insertion> {
    retry_transient(|| insert_token_once(db_client, db, &value)).await
}

async fn insert_token_once(db_client: &Client, db: &Database, value: &str) -> Result<Insertion> {
    let mut session = transaction::start(db_client).await?;
    let result = insert_in(&mut session, db, value).await;
    match transaction::finish(&mut session, result).await {
        Err(Error::Db(err)) if is_duplicate_key_error(&err) => Ok(Insertion::Collision),
        other => other,
    }
}

async fn insert_in(session: &mut ClientSession, db: &Database, value: &str) -> Result<Insertion> {
    // Writing the settings document makes this conflict with a concurrent closeout.
    let open = doc! { "_id": SETTINGS_ID, "is_ended": false };
    let bump = doc! { "$inc": { "tokens_issued": 1 } };
    let bumped = Coll::<ElectionSettings>::from_db(db)
        .update_one_with_session(open, bump, None, session)
        .await?;
    if bumped.matched_count == 0 {
        return Ok(Insertion::Closed);
    }

    Coll::<NewToken>::from_db(db)
        .insert_one_with_session(NewToken::active(value), None, session)
        .await?;
    Ok(Insertion::Inserted)
}
