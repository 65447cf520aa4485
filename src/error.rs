use mongodb::error::Error as DbError;
use rocket::{
    http::Status,
    response::{self, Responder},
    serde::json::Json,
    Request,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::FormatError;
use crate::logging::RequestId;
use crate::session::SessionStage;
use crate::token::TokenError;

pub type Result<T> = std::result::Result<T, Error>;

/// Envelope code for a failed request.
pub const CODE_FAILURE: i32 = -1;
/// Envelope code for a staff request without a token.
pub const CODE_USER_NOT_LOGGED_IN: i32 = 10001;
/// Envelope code for a voter request without a `voter-token` cookie.
pub const CODE_VOTER_NOT_LOGGED_IN: i32 = 10002;
/// Envelope code for a second ballot submission.
pub const CODE_ALREADY_VOTED: i32 = 10003;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Unauthorized: {0}")]
    Auth(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Missing staff token")]
    UserNotLoggedIn,
    #[error("Authorization token not found in Cookie")]
    VoterNotLoggedIn,
    #[error("Voter has already voted")]
    AlreadyVoted,
    #[error("Request timeout during {0}")]
    Timeout(SessionStage),
    #[error(transparent)]
    Persistence(#[from] DbError),
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("{1}")]
    Status(Status, String),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// The HTTP status this error is reported with.
    pub fn status(&self) -> Status {
        match self {
            Self::Validation(_) | Self::Format(_) => Status::BadRequest,
            Self::NotFound(_) => Status::NotFound,
            Self::Auth(_) | Self::UserNotLoggedIn | Self::VoterNotLoggedIn => Status::Unauthorized,
            Self::Forbidden(_) => Status::Forbidden,
            Self::AlreadyVoted => Status::Conflict,
            Self::Timeout(_) => Status::GatewayTimeout,
            Self::Persistence(_) | Self::Internal(_) => Status::InternalServerError,
            Self::Status(status, _) => *status,
        }
    }

    /// The envelope code this error is reported with.
    pub fn code(&self) -> i32 {
        match self {
            Self::UserNotLoggedIn => CODE_USER_NOT_LOGGED_IN,
            Self::VoterNotLoggedIn => CODE_VOTER_NOT_LOGGED_IN,
            Self::AlreadyVoted => CODE_ALREADY_VOTED,
            _ => CODE_FAILURE,
        }
    }

    /// The message shown to the client. Storage failures are logged, not echoed.
    fn public_message(&self) -> String {
        match self {
            Self::Persistence(_) => "Storage failure".to_string(),
            Self::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<TokenError> for Error {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing(_) => Self::Internal(err.to_string()),
            _ => Self::Auth(err.to_string()),
        }
    }
}

/// JSON body for every failed request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: i32,
    pub msg: String,
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let status = self.status();
        let id = RequestId::of(req);
        if status.code >= 500 {
            error!("req{id} failed: {self}");
        } else {
            debug!("req{id} rejected: {self}");
        }
        let body = ErrorBody {
            code: self.code(),
            msg: self.public_message(),
        };
        (status, Json(body)).respond_to(req)
    }
}
