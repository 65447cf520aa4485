use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::mongodb::{RowId, VoteId};

/// Marks that a credential has cast its ballot.
///
/// Keyed by the credential ID, so a second submission for the same
/// credential is rejected by the database itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotSubmission {
    #[serde(rename = "_id")]
    pub credential_id: RowId,
    pub vote_id: VoteId,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

/// One credential's answer to one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    #[serde(rename = "_id")]
    pub id: RowId,
    pub credential_id: RowId,
    pub question_id: RowId,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

/// A chosen candidate within a ballot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotSelection {
    #[serde(rename = "_id")]
    pub id: RowId,
    pub ballot_id: RowId,
    pub candidate_id: RowId,
}
