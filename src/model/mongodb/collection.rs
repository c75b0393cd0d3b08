use std::ops::Deref;

use mongodb::{
    bson::doc, error::Error as DbError, options::IndexOptions, Collection, Database, IndexModel,
};
use rocket::{
    http::Status,
    request::{self, FromRequest, Request},
};

use crate::model::db::{
    admin::{Admin, NewAdmin},
    candidate::Candidate,
    settings::ElectionSettings,
    token::{NewToken, Token},
    vote::{NewVote, Vote},
};

/// A type that can be directly inserted/read to/from the database.
pub trait MongoCollection {
    /// The name of the collection.
    const NAME: &'static str;
}

/// A database collection of the given type.
pub struct Coll<T>(Collection<T>);

impl<T> Coll<T>
where
    T: MongoCollection,
{
    /// Get a handle on this collection in the given database.
    pub fn from_db(db: &Database) -> Self {
        Self(db.collection(T::NAME))
    }
}

// `Derive(Clone)` would only derive if `T: Clone`, but we don't need that bound.
impl<T> Clone for Coll<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for Coll<T> {
    type Target = Collection<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[rocket::async_trait]
impl<'r, T> FromRequest<'r> for Coll<T>
where
    T: MongoCollection,
{
    type Error = ();

    /// Get the database connection from the managed state and wrap it in a collection.
    async fn from_request(req: &'r Request<'_>) -> request::Outcome<Self, Self::Error> {
        match req.rocket().state::<Database>() {
            Some(db) => request::Outcome::Success(Coll::from_db(db)),
            None => {
                error!("Database is not in managed state");
                request::Outcome::Error((Status::InternalServerError, ()))
            }
        }
    }
}

// Admin collections
const ADMINS: &str = "admins";
impl MongoCollection for Admin {
    const NAME: &'static str = ADMINS;
}
impl MongoCollection for NewAdmin {
    const NAME: &'static str = ADMINS;
}

// Candidate collection
const CANDIDATES: &str = "candidates";
impl MongoCollection for Candidate {
    const NAME: &'static str = CANDIDATES;
}

// Token collections
const TOKENS: &str = "tokens";
impl MongoCollection for Token {
    const NAME: &'static str = TOKENS;
}
impl MongoCollection for NewToken {
    const NAME: &'static str = TOKENS;
}

// Vote collections
const VOTES: &str = "votes";
impl MongoCollection for Vote {
    const NAME: &'static str = VOTES;
}
impl MongoCollection for NewVote {
    const NAME: &'static str = VOTES;
}

// Election settings singleton
const ELECTION_SETTINGS: &str = "election_settings";
impl MongoCollection for ElectionSettings {
    const NAME: &'static str = ELECTION_SETTINGS;
}

/// Ensure that all the required indexes exist on the given database.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = IndexOptions::builder().unique(true).build();

    // Token collection: values are unique, listings are newest first.
    let tokens = Coll::<Token>::from_db(db);
    let value_index = IndexModel::builder()
        .keys(doc! {"value": 1})
        .options(unique.clone())
        .build();
    let status_index = IndexModel::builder().keys(doc! {"status": 1}).build();
    let token_age_index = IndexModel::builder()
        .keys(doc! {"created_at": -1, "_id": -1})
        .build();
    tokens
        .create_indexes([value_index, status_index, token_age_index], None)
        .await?;

    // Vote collection: at most one vote per token.
    let votes = Coll::<Vote>::from_db(db);
    let token_index = IndexModel::builder()
        .keys(doc! {"token_id": 1})
        .options(unique.clone())
        .build();
    let vote_age_index = IndexModel::builder()
        .keys(doc! {"created_at": -1, "_id": -1})
        .build();
    votes
        .create_indexes([token_index, vote_age_index], None)
        .await?;

    // Admin collection.
    let admin_index = IndexModel::builder()
        .keys(doc! {"email": 1})
        .options(unique)
        .build();
    Coll::<Admin>::from_db(db)
        .create_index(admin_index, None)
        .await?;

    Ok(())
}
