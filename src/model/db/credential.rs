use chrono::{DateTime, Utc};
use mongodb::bson::{serde_helpers::chrono_datetime_as_bson_datetime, Bson};
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::model::mongodb::{RowId, VoteId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum CredentialStatus {
    Issued = 0,
    Used = 1,
}

impl From<CredentialStatus> for Bson {
    fn from(status: CredentialStatus) -> Self {
        Bson::Int32(status as i32)
    }
}

/// A per-vote access code. Only the encrypted form of the secret is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(rename = "_id")]
    pub id: RowId,
    pub vote_id: VoteId,
    /// Ciphertext of the secret handed to the voter.
    pub password: String,
    pub status: CredentialStatus,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(id: RowId, vote_id: VoteId, password: String) -> Self {
        Self {
            id,
            vote_id,
            password,
            status: CredentialStatus::Issued,
            created_at: Utc::now(),
        }
    }
}
