//! Voter login and silent re-authentication.
//!
//! A session runs through `ValidatingCredential -> CheckingVoteStatus -> IssuingToken`.
//! Each stage is spawned as its own task and raced against one deadline shared
//! by the whole request. A stage that loses the race is left to finish in the
//! background and its result is dropped; stages before the ballot write only read.

use std::fmt::{self, Display};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rocket::futures::future::join;
use rocket::tokio::{
    self,
    time::{timeout_at, Instant},
};

use crate::codec::SymmetricCodec;
use crate::error::{Error, Result};
use crate::model::{
    credentials::CredentialStore,
    ledger::BallotLedger,
    mongodb::{RowId, VoteId},
};
use crate::token::{TokenPair, TokenService, VoterClaims};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStage {
    ValidatingCredential,
    CheckingVoteStatus,
    IssuingToken,
}

impl Display for SessionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ValidatingCredential => "credential validation",
            Self::CheckingVoteStatus => "vote status check",
            Self::IssuingToken => "token issuance",
        };
        write!(f, "{name}")
    }
}

/// An authenticated voter: the claims just issued and their tokens.
#[derive(Debug, Clone)]
pub struct VoterLogin {
    pub claims: VoterClaims,
    pub tokens: TokenPair,
}

pub struct VoterSession {
    credentials: Arc<dyn CredentialStore>,
    ledger: Arc<dyn BallotLedger>,
    codec: SymmetricCodec,
    tokens: Arc<TokenService>,
    login_timeout: Duration,
    check_auth_timeout: Duration,
}

impl VoterSession {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        ledger: Arc<dyn BallotLedger>,
        codec: SymmetricCodec,
        tokens: TokenService,
        login_timeout: Duration,
        check_auth_timeout: Duration,
    ) -> Self {
        Self {
            credentials,
            ledger,
            codec,
            tokens: Arc::new(tokens),
            login_timeout,
            check_auth_timeout,
        }
    }

    /// Log a voter in with a vote ID and the plaintext secret they were given.
    ///
    /// An unknown vote is [`Error::NotFound`], a wrong secret is [`Error::Auth`]
    /// and a missed deadline is [`Error::Timeout`].
    pub async fn login(&self, vote_id: &str, secret: &str) -> Result<VoterLogin> {
        let deadline = Instant::now() + self.login_timeout;
        let vote_id: VoteId = vote_id
            .parse()
            .map_err(|_| Error::validation("Invalid vote ID"))?;

        let credentials = Arc::clone(&self.credentials);
        let encrypted = self.codec.encrypt(secret);
        let credential = run_stage(SessionStage::ValidatingCredential, deadline, async move {
            // Both lookups are independent, so run them together.
            let (exists, found) = join(
                credentials.vote_exists(vote_id),
                credentials.find_by_vote_and_secret(vote_id, &encrypted),
            )
            .await;
            if !exists? {
                return Err(Error::not_found(format!("Vote {vote_id}")));
            }
            found.map_err(|err| match err {
                Error::NotFound(_) => Error::Auth("Invalid voting password".to_string()),
                other => other,
            })
        })
        .await?;

        self.check_and_issue(deadline, credential.id, vote_id).await
    }

    /// Re-authenticate from an existing voter token, refreshing the voted flag.
    pub async fn check_auth(&self, token: &str) -> Result<VoterLogin> {
        let deadline = Instant::now() + self.check_auth_timeout;
        let claims = self.tokens.verify_voter(token)?;
        self.check_and_issue(deadline, claims.id, claims.vote_id)
            .await
    }

    /// Whether the voter holding this token has voted, according to the ledger.
    pub async fn has_voted(&self, token: &str) -> Result<(VoterClaims, bool)> {
        let deadline = Instant::now() + self.check_auth_timeout;
        let claims = self.tokens.verify_voter(token)?;
        let voted = self.check_status(deadline, claims.id).await?;
        Ok((claims, voted))
    }

    /// The token service voter tokens are issued by.
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    async fn check_status(&self, deadline: Instant, credential_id: RowId) -> Result<bool> {
        let ledger = Arc::clone(&self.ledger);
        run_stage(SessionStage::CheckingVoteStatus, deadline, async move {
            ledger.has_cast(credential_id).await
        })
        .await
    }

    async fn check_and_issue(
        &self,
        deadline: Instant,
        credential_id: RowId,
        vote_id: VoteId,
    ) -> Result<VoterLogin> {
        // Needs the resolved credential, so only starts once validation is done.
        let is_voted = self.check_status(deadline, credential_id).await?;

        let tokens = Arc::clone(&self.tokens);
        let pair = run_stage(SessionStage::IssuingToken, deadline, async move {
            Ok(tokens.issue_voter(credential_id, vote_id, is_voted)?)
        })
        .await?;

        Ok(VoterLogin {
            claims: VoterClaims {
                id: credential_id,
                vote_id,
                is_voted,
            },
            tokens: pair,
        })
    }
}

/// Spawn one stage and wait for it or the deadline, whichever comes first.
async fn run_stage<T, F>(stage: SessionStage, deadline: Instant, work: F) -> Result<T>
where
    T: Send + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
{
    debug!("Voter session entering {stage}");
    let handle = tokio::spawn(work);
    match timeout_at(deadline, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(Error::Internal(format!("{stage} failed: {join_err}"))),
        Err(_) => {
            warn!("Voter session timed out during {stage}");
            Err(Error::Timeout(stage))
        }
    }
}
