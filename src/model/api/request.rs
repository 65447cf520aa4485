use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{
    credentials::SecretFormat,
    mongodb::{RowId, VoteId},
};

/// Minimum length of a staff password.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// A voter's vote ID and the secret they were handed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterLoginRequest {
    pub vote_id: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffLoginRequest {
    pub account: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub account: String,
    pub password: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// A ballot as submitted: question ID to candidate ID to whether it is chosen.
pub type BallotRequest = BTreeMap<RowId, BTreeMap<RowId, bool>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordCreateRequest {
    pub vote_id: VoteId,
    pub number: usize,
    pub length: usize,
    pub format: SecretFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateVoteRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    #[serde(default)]
    pub questions: Vec<CreateQuestionRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateQuestionRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub candidates: Vec<String>,
}

#[cfg(test)]
pub(crate) mod examples {
    use super::*;

    use chrono::Duration;

    use crate::model::db::user::{examples::EXAMPLE_PASSWORD, User};

    /// The secret issued to the example voter.
    pub const EXAMPLE_SECRET: &str = "kq7r3mxp";

    impl VoterLoginRequest {
        pub fn example(vote_id: VoteId) -> Self {
            Self {
                vote_id: vote_id.to_string(),
                password: EXAMPLE_SECRET.to_string(),
            }
        }
    }

    impl StaffLoginRequest {
        pub fn example_admin() -> Self {
            Self {
                account: User::example_admin().account,
                password: EXAMPLE_PASSWORD.to_string(),
            }
        }

        pub fn example_creator() -> Self {
            Self {
                account: User::example_creator().account,
                password: EXAMPLE_PASSWORD.to_string(),
            }
        }
    }

    impl CreateVoteRequest {
        pub fn example() -> Self {
            let start = Utc::now() - Duration::hours(1);
            Self {
                title: "Committee election".to_string(),
                description: "Annual committee election".to_string(),
                start_at: start,
                end_at: start + Duration::days(3),
                questions: vec![
                    CreateQuestionRequest {
                        title: "Chair".to_string(),
                        description: String::new(),
                        candidates: vec!["Ana".to_string(), "Bo".to_string()],
                    },
                    CreateQuestionRequest {
                        title: "Treasurer".to_string(),
                        description: String::new(),
                        candidates: vec!["Cy".to_string(), "Di".to_string(), "Ed".to_string()],
                    },
                ],
            }
        }
    }
}
