use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::mongodb::{RowId, VoteId};

/// A question from the database, belonging to exactly one vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    #[serde(rename = "_id")]
    pub id: RowId,
    pub vote_id: VoteId,
    pub title: String,
    pub description: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl Question {
    pub fn new(id: RowId, vote_id: VoteId, title: String, description: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            vote_id,
            title,
            description,
            created_at: now,
            updated_at: now,
        }
    }
}
