//! Checking and redeeming voter PINs.

use chrono::Utc;
use mongodb::{bson::doc, Client, ClientSession, Database};
use rocket::futures::TryStreamExt;

use crate::error::{Error, Result};
use crate::model::{
    api::pin::PinKeys,
    db::{
        candidate::Candidate,
        settings::ElectionSettings,
        token::{Token, TokenStatus},
        vote::NewVote,
    },
    mongodb::{
        errors::is_duplicate_key_error,
        transaction::{self, retry_transient},
        Coll, Id,
    },
};

/// A successfully cast vote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redemption {
    pub vote_id: Id,
    pub token_id: Id,
    pub candidate_id: u32,
}

/// Check whether a PIN could be used to vote, without using it up.
///
/// Returns the stored token value that matched, which may differ from what
/// the voter typed.
pub async fn check_pin(db: &Database, keys: &PinKeys) -> Result<String> {
    let settings = ElectionSettings::load(&Coll::from_db(db)).await?;
    if settings.is_ended {
        return Err(Error::ElectionClosed);
    }

    let tokens = Coll::<Token>::from_db(db);
    let active = doc! { "status": TokenStatus::Active };
    if tokens.count_documents(active, None).await? == 0 {
        return Err(Error::NoActiveTokens);
    }

    let filter = doc! { "value": { "$in": keys.as_slice() }, "status": TokenStatus::Active };
    let matches: Vec<Token> = tokens.find(filter, None).await?.try_collect().await?;
    keys.iter()
        .find(|key| matches.iter().any(|token| token.value == *key))
        .map(str::to_string)
        .ok_or(Error::InvalidPin)
}

/// Use up the token behind `keys` and record a vote for `candidate_id`, as
/// one transaction.
///
/// Concurrent attempts on the same token conflict; the losers are retried
/// and then find the token already used.
pub async fn redeem(
    db_client: &Client,
    db: &Database,
    keys: &PinKeys,
    candidate_id: u32,
) -> Result<Redemption> {
    retry_transient(|| redeem_once(db_client, db, keys, candidate_id)).await
}

async fn redeem_once(
    db_client: &Client,
    db: &Database,
    keys: &PinKeys,
    candidate_id: u32,
) -> Result<Redemption> {
    let mut session = transaction::start(db_client).await?;
    let result = redeem_in(&mut session, db, keys, candidate_id).await;
    transaction::finish(&mut session, result).await
}

async fn redeem_in(
    session: &mut ClientSession,
    db: &Database,
    keys: &PinKeys,
    candidate_id: u32,
) -> Result<Redemption> {
    let settings = ElectionSettings::load_in(&Coll::from_db(db), session).await?;
    if settings.is_ended {
        return Err(Error::ElectionClosed);
    }

    // Claim the first matching active token. The write holds it until commit.
    let now = Utc::now();
    let tokens = Coll::<Token>::from_db(db);
    let mut claimed = None;
    for key in keys.iter() {
        let filter = doc! { "value": key, "status": TokenStatus::Active };
        let update = doc! { "$set": { "status": TokenStatus::Used, "used_at": now } };
        if let Some(token) = tokens
            .find_one_and_update_with_session(filter, update, None, session)
            .await?
        {
            claimed = Some(token);
            break;
        }
    }
    let token = claimed.ok_or(Error::InvalidPin)?;

    let candidate = Coll::<Candidate>::from_db(db)
        .find_one_with_session(doc! { "_id": candidate_id }, None, session)
        .await?;
    if candidate.is_none() {
        return Err(Error::UnknownCandidate(candidate_id));
    }

    let vote = NewVote::new(token.id, candidate_id, now);
    let inserted = Coll::<NewVote>::from_db(db)
        .insert_one_with_session(&vote, None, session)
        .await;
    let vote_id = match inserted {
        Ok(result) => result.inserted_id.as_object_id().map(Id::from),
        Err(err) if is_duplicate_key_error(&err) => return Err(Error::AlreadyUsed),
        Err(err) => return Err(err.into()),
    }
    .ok_or_else(|| Error::internal("Inserted vote has no object ID"))?;

    Ok(Redemption {
        vote_id,
        token_id: token.id,
        candidate_id,
    })
}
