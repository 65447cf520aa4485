use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::mongodb::{RowId, VoteId};

/// A vote from the database: the root of its questions, candidates and credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    #[serde(rename = "_id")]
    pub id: VoteId,
    /// Insertion-ordered row number, used as the keyset pagination key.
    pub row: RowId,
    pub title: String,
    pub description: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub start_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub end_at: DateTime<Utc>,
    /// The staff user who created this vote.
    pub owner: RowId,
    /// Status flag reported to clients. Votes are created with 0.
    #[serde(default)]
    pub status: i32,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Vote {
    /// Create a new vote. The time window must be non-empty.
    pub fn new(
        row: RowId,
        owner: RowId,
        title: String,
        description: String,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> Result<Self> {
        if end_at <= start_at {
            return Err(Error::validation("Vote must end after it starts"));
        }
        if title.trim().is_empty() {
            return Err(Error::validation("Vote title must not be empty"));
        }
        let now = Utc::now();
        Ok(Self {
            id: VoteId::new(),
            row,
            title,
            description,
            start_at,
            end_at,
            owner,
            status: 0,
            created_at: now,
            updated_at: now,
        })
    }
}
