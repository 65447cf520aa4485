use chrono::{DateTime, Utc};
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};

use crate::model::{
    db::{
        candidate::Candidate,
        credential::{Credential, CredentialStatus},
        question::Question,
        user::{Role, User},
        vote::Vote,
    },
    mongodb::{RowId, VoteId},
};

/// Envelope code for a successful request.
pub const CODE_SUCCESS: i32 = 0;

/// JSON body for every successful request.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub code: i32,
    pub msg: String,
    pub data: T,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Json<Self> {
        Self::with_msg("success", data)
    }

    pub fn with_msg(msg: impl Into<String>, data: T) -> Json<Self> {
        Json(Self {
            code: CODE_SUCCESS,
            msg: msg.into(),
            data,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenView {
    pub token: String,
}

/// What a voter's token says about them, refreshed from the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterStatus {
    pub id: RowId,
    pub vote_id: VoteId,
    pub voted: bool,
}

/// Acknowledgement of an accepted ballot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BallotReceipt {
    pub voter: RowId,
    pub vote_id: VoteId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteView {
    pub id: VoteId,
    pub title: String,
    pub description: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub owner: RowId,
    pub status: i32,
    pub created_at: DateTime<Utc>,
}

impl From<Vote> for VoteView {
    fn from(vote: Vote) -> Self {
        Self {
            id: vote.id,
            title: vote.title,
            description: vote.description,
            start_at: vote.start_at,
            end_at: vote.end_at,
            owner: vote.owner,
            status: vote.status,
            created_at: vote.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateView {
    pub id: RowId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<i64>,
}

impl From<Candidate> for CandidateView {
    fn from(candidate: Candidate) -> Self {
        Self {
            id: candidate.id,
            name: candidate.name,
            result: candidate.result,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionView {
    pub id: RowId,
    pub vote_id: VoteId,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    /// Only present when candidates were requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidates: Option<Vec<CandidateView>>,
}

impl From<Question> for QuestionView {
    fn from(question: Question) -> Self {
        Self {
            id: question.id,
            vote_id: question.vote_id,
            title: question.title,
            description: question.description,
            created_at: question.created_at,
            candidates: None,
        }
    }
}

/// A vote just created, with its questions and candidates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedVote {
    #[serde(flatten)]
    pub vote: VoteView,
    pub questions: Vec<QuestionView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserView {
    pub id: RowId,
    pub account: String,
    pub email: String,
    pub roles: Vec<Role>,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            account: user.account,
            email: user.email,
            roles: user.roles,
        }
    }
}

/// A credential as listed to staff: the secret stays encrypted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialView {
    pub id: RowId,
    pub password: String,
    pub status: CredentialStatus,
}

impl From<Credential> for CredentialView {
    fn from(credential: Credential) -> Self {
        Self {
            id: credential.id,
            password: credential.password,
            status: credential.status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedCredentials {
    pub vote_id: VoteId,
    pub count: usize,
}
