use std::ops::Deref;

use mongodb::{
    bson::{doc, Document},
    error::Error as DbError,
    options::IndexOptions,
    Collection, Database, IndexModel,
};
use rocket::{
    http::Status,
    request::{self, FromRequest, Request},
    State,
};

use crate::model::db::{
    ballot::{Ballot, BallotSelection, BallotSubmission},
    candidate::Candidate,
    credential::Credential,
    question::Question,
    user::User,
    vote::Vote,
};

use super::counter::Counter;

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
        match req.guard::<&State<Database>>().await {
            request::Outcome::Success(db) => request::Outcome::Success(Coll::from_db(db)),
            _ => request::Outcome::Error((Status::InternalServerError, ())),
        }
    }
}

impl MongoCollection for User {
    const NAME: &'static str = "users";
}

impl MongoCollection for Vote {
    const NAME: &'static str = "votes";
}

impl MongoCollection for Question {
    const NAME: &'static str = "questions";
}

impl MongoCollection for Candidate {
    const NAME: &'static str = "candidates";
}

// Voting credentials are called passwords by the people who hand them out.
impl MongoCollection for Credential {
    const NAME: &'static str = "passwords";
}

impl MongoCollection for Ballot {
    const NAME: &'static str = "ballots";
}

impl MongoCollection for BallotSelection {
    const NAME: &'static str = "ballot_selections";
}

impl MongoCollection for BallotSubmission {
    const NAME: &'static str = "ballot_submissions";
}

impl MongoCollection for Counter {
    const NAME: &'static str = "counters";
}

/// Ensure that all the required indexes exist on the given database.
///
/// This operation is idempotent.
pub async fn ensure_indexes_exist(db: &Database) -> Result<(), DbError> {
    debug!("Ensuring collection indexes exist");

    let unique = IndexOptions::builder().unique(true).build();

    // User collection.
    for key in ["account", "email"] {
        let mut keys = Document::new();
        keys.insert(key, 1);
        let index = IndexModel::builder()
            .keys(keys)
            .options(unique.clone())
            .build();
        Coll::<User>::from_db(db).create_index(index, None).await?;
    }

    // Vote collection, listed per owner in row order.
    let vote_index = IndexModel::builder()
        .keys(doc! {"owner": 1, "row": 1})
        .build();
    Coll::<Vote>::from_db(db).create_index(vote_index, None).await?;
    let vote_row_index = IndexModel::builder()
        .keys(doc! {"row": 1})
        .options(unique.clone())
        .build();
    Coll::<Vote>::from_db(db)
        .create_index(vote_row_index, None)
        .await?;

    // Question collection.
    let question_index = IndexModel::builder()
        .keys(doc! {"vote_id": 1, "_id": 1})
        .build();
    Coll::<Question>::from_db(db)
        .create_index(question_index, None)
        .await?;

    // Credential collection: a secret identifies at most one credential per vote.
    let credential_index = IndexModel::builder()
        .keys(doc! {"vote_id": 1, "password": 1})
        .options(unique.clone())
        .build();
    Coll::<Credential>::from_db(db)
        .create_index(credential_index, None)
        .await?;

    // Ballot collection: one ballot per credential per question.
    let ballot_index = IndexModel::builder()
        .keys(doc! {"credential_id": 1, "question_id": 1})
        .options(unique.clone())
        .build();
    Coll::<Ballot>::from_db(db)
        .create_index(ballot_index, None)
        .await?;

    // Selection collection.
    let selection_index = IndexModel::builder()
        .keys(doc! {"ballot_id": 1, "candidate_id": 1})
        .options(unique)
        .build();
    Coll::<BallotSelection>::from_db(db)
        .create_index(selection_index, None)
        .await?;

    Ok(())
}
