use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::mongodb::RowId;

/// A candidate answer to a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(rename = "_id")]
    pub id: RowId,
    pub question_id: RowId,
    pub name: String,
    /// Tallied elsewhere; never written by ballot casting.
    #[serde(default)]
    pub result: Option<i64>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Candidate {
    pub fn new(id: RowId, question_id: RowId, name: String) -> Self {
        Self {
            id,
            question_id,
            name,
            result: None,
            created_at: Utc::now(),
        }
    }
}
