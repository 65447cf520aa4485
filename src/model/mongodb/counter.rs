use mongodb::{
    bson::doc,
    options::{FindOneAndUpdateOptions, ReturnDocument, UpdateOptions},
};
use rocket::http::Status;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::mongodb::{Coll, RowId};

/// A counter object used to implement auto-increment fields.
/// There is one counter per collection, keyed by the collection name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counter {
    #[serde(rename = "_id")]
    pub id: String,
    pub next: u64,
}

/// The collections whose rows are numbered by a counter.
pub const COUNTED_COLLECTIONS: [&str; 7] = [
    "users",
    "votes",
    "questions",
    "candidates",
    "passwords",
    "ballots",
    "ballot_selections",
];

impl Counter {
    /// Create a new `Counter` for the named collection starting at the given value.
    pub fn new(id: impl Into<String>, start: u64) -> Self {
        Self {
            id: id.into(),
            next: start,
        }
    }

    /// Atomically retrieve the next value of the counter with the given ID.
    pub async fn next(counters: &Coll<Counter>, id: &str) -> Result<RowId> {
        Self::reserve(counters, id, 1).await
    }

    /// Atomically reserve `n` consecutive values, returning the first.
    pub async fn reserve(counters: &Coll<Counter>, id: &str, n: u64) -> Result<RowId> {
        let update = doc! {
            "$inc": { "next": n as i64 }
        };
        let options: FindOneAndUpdateOptions = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::Before)
            .build();
        let counter = counters
            .find_one_and_update(doc! { "_id": id }, update, options)
            .await?
            .ok_or_else(|| missing_counter(id))?;
        Ok(RowId(counter.next))
    }
}

fn missing_counter(id: &str) -> Error {
    Error::Status(
        Status::InternalServerError,
        format!("Failed to find counter with ID {id}"),
    )
}

/// Ensure a counter exists for every counted collection, starting at 1.
///
/// This operation is idempotent and never resets an existing counter.
pub async fn ensure_counters_exist(counters: &Coll<Counter>) -> Result<()> {
    let upsert = UpdateOptions::builder().upsert(true).build();
    for name in COUNTED_COLLECTIONS {
        counters
            .update_one(
                doc! { "_id": name },
                doc! { "$setOnInsert": { "next": 1_i64 } },
                upsert.clone(),
            )
            .await?;
    }
    Ok(())
}
