//! In-memory stores for unit tests, honouring the same contracts as the MongoDB ones.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use rocket::tokio::time::sleep;

use crate::codec::SymmetricCodec;
use crate::error::{Error, Result};
use crate::model::{
    credentials::CredentialStore,
    db::credential::Credential,
    ledger::{BallotLedger, BallotSelections},
    mongodb::{RowId, VoteId},
};

#[derive(Default)]
pub struct MemoryCredentialStore {
    votes: HashSet<VoteId>,
    credentials: Vec<Credential>,
    stall: Option<Duration>,
}

impl MemoryCredentialStore {
    /// A store holding one vote with the given plaintext secrets, numbered from 1.
    pub fn with_secrets(codec: &SymmetricCodec, vote_id: VoteId, secrets: &[&str]) -> Self {
        let credentials = secrets
            .iter()
            .enumerate()
            .map(|(i, secret)| Credential::new(RowId(i as u64 + 1), vote_id, codec.encrypt(secret)))
            .collect();
        Self {
            votes: HashSet::from([vote_id]),
            credentials,
            stall: None,
        }
    }

    /// Make every lookup take this long.
    pub fn stalling(mut self, stall: Duration) -> Self {
        self.stall = Some(stall);
        self
    }

    async fn maybe_stall(&self) {
        if let Some(stall) = self.stall {
            sleep(stall).await;
        }
    }
}

#[rocket::async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn vote_exists(&self, vote_id: VoteId) -> Result<bool> {
        self.maybe_stall().await;
        Ok(self.votes.contains(&vote_id))
    }

    async fn find_by_vote_and_secret(
        &self,
        vote_id: VoteId,
        encrypted_secret: &str,
    ) -> Result<Credential> {
        self.maybe_stall().await;
        self.credentials
            .iter()
            .find(|c| c.vote_id == vote_id && c.password == encrypted_secret)
            .cloned()
            .ok_or_else(|| Error::not_found("Credential"))
    }
}

#[derive(Default)]
pub struct MemoryBallotLedger {
    cast: Mutex<HashMap<RowId, BallotSelections>>,
    fail_writes: AtomicBool,
    stall: Option<Duration>,
}

impl MemoryBallotLedger {
    /// Make every status lookup take this long.
    pub fn stalling(mut self, stall: Duration) -> Self {
        self.stall = Some(stall);
        self
    }

    /// Make subsequent writes fail as if storage were unavailable.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// The recorded selections for a credential.
    pub fn recorded(&self, credential_id: RowId) -> Option<BallotSelections> {
        self.cast
            .lock()
            .ok()
            .and_then(|cast| cast.get(&credential_id).cloned())
    }

    pub fn count(&self) -> usize {
        self.cast.lock().map(|cast| cast.len()).unwrap_or_default()
    }
}

#[rocket::async_trait]
impl BallotLedger for MemoryBallotLedger {
    async fn has_cast(&self, credential_id: RowId) -> Result<bool> {
        if let Some(stall) = self.stall {
            sleep(stall).await;
        }
        let cast = self
            .cast
            .lock()
            .map_err(|_| Error::Internal("ledger lock poisoned".into()))?;
        Ok(cast.contains_key(&credential_id))
    }

    async fn cast_ballot(
        &self,
        credential_id: RowId,
        _vote_id: VoteId,
        selections: &BallotSelections,
    ) -> Result<()> {
        // Check and insert under one lock, like a unique index.
        let mut cast = self
            .cast
            .lock()
            .map_err(|_| Error::Internal("ledger lock poisoned".into()))?;
        if cast.contains_key(&credential_id) {
            return Err(Error::AlreadyVoted);
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Internal("simulated storage failure".into()));
        }
        cast.insert(credential_id, selections.clone());
        Ok(())
    }
}
