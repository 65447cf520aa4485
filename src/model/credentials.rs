//! Voting credentials: lookup, generation and batch issuance.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use mongodb::{
    bson::{doc, Bson},
    Client, Database,
};
use rocket::http::Status;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::codec::SymmetricCodec;
use crate::error::{Error, Result};
use crate::model::{
    db::{credential::Credential, vote::Vote},
    mongodb::{errors::is_conflict_error, Coll, Counter, MongoCollection, RowId, VoteId},
};

/// Secrets shorter than this are lengthened.
pub const MIN_SECRET_LENGTH: usize = 6;
/// Upper bound on credentials issued in one batch.
pub const MAX_BATCH_SIZE: usize = 10_000;
/// Random draws allowed per requested secret before the format counts as used up.
const DRAWS_PER_SECRET: usize = 50;
/// Batches retried after clashing with a concurrent batch for the same vote.
const ISSUE_ATTEMPTS: usize = 3;

/// Looks up voting credentials.
#[rocket::async_trait]
pub trait CredentialStore: Send + Sync {
    /// Does a vote with the given ID exist?
    async fn vote_exists(&self, vote_id: VoteId) -> Result<bool>;

    /// Find the credential with exactly this encrypted secret in the given vote.
    ///
    /// Returns [`Error::NotFound`] if there is none.
    async fn find_by_vote_and_secret(
        &self,
        vote_id: VoteId,
        encrypted_secret: &str,
    ) -> Result<Credential>;
}

/// The character set secrets are drawn from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecretFormat {
    #[serde(rename = "int")]
    Int,
    #[serde(rename = "en")]
    En,
    #[serde(rename = "mix")]
    Mix,
    /// Mixed case without look-alike glyphs.
    #[serde(rename = "mixExcl")]
    MixExcl,
    #[serde(rename = "mixLower")]
    MixLower,
    #[serde(rename = "mixUpper")]
    MixUpper,
}

impl SecretFormat {
    pub fn alphabet(self) -> &'static [u8] {
        match self {
            Self::Int => b"0123456789",
            Self::En => b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ",
            Self::Mix => b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ",
            Self::MixExcl => b"23456789abcdefghijkmnpqrstuvwxyzABCDEFGHJKLMNPQRSTUVWXYZ",
            Self::MixLower => b"23456789abcdefghijkmnpqrstuvwxyz",
            Self::MixUpper => b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ",
        }
    }
}

impl fmt::Display for SecretFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int => "int",
            Self::En => "en",
            Self::Mix => "mix",
            Self::MixExcl => "mixExcl",
            Self::MixLower => "mixLower",
            Self::MixUpper => "mixUpper",
        };
        write!(f, "{name}")
    }
}

impl FromStr for SecretFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "int" => Self::Int,
            "en" => Self::En,
            "mix" => Self::Mix,
            "mixExcl" => Self::MixExcl,
            "mixLower" => Self::MixLower,
            "mixUpper" => Self::MixUpper,
            other => return Err(Error::validation(format!("Unsupported format '{other}'"))),
        })
    }
}

/// Generate `number` distinct random secrets of `length` characters,
/// skipping any for which `taken` returns true.
pub fn generate_secrets(
    number: usize,
    length: usize,
    format: SecretFormat,
    mut taken: impl FnMut(&str) -> bool,
) -> Result<Vec<String>> {
    if number == 0 || number > MAX_BATCH_SIZE {
        return Err(Error::validation(format!(
            "Number of passwords must be between 1 and {MAX_BATCH_SIZE}"
        )));
    }
    let length = length.max(MIN_SECRET_LENGTH);
    let alphabet = format.alphabet();

    let mut rng = rand::thread_rng();
    let mut seen = HashSet::with_capacity(number);
    let mut secrets = Vec::with_capacity(number);
    let mut draws = number * DRAWS_PER_SECRET;
    while secrets.len() < number {
        if draws == 0 {
            return Err(Error::validation(format!(
                "Not enough unused {format} passwords of length {length} remain"
            )));
        }
        draws -= 1;
        let secret: String = (0..length)
            .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
            .collect();
        if !taken(&secret) && seen.insert(secret.clone()) {
            secrets.push(secret);
        }
    }
    Ok(secrets)
}

/// MongoDB-backed credential store.
#[derive(Clone)]
pub struct MongoCredentialStore {
    client: Client,
    db: Database,
}

impl MongoCredentialStore {
    pub fn new(client: Client, db: Database) -> Self {
        Self { client, db }
    }

    /// Generate and issue `number` fresh secrets for a vote.
    ///
    /// Secrets already issued for the vote are never drawn again. A batch that
    /// still clashes with one committed concurrently is regenerated.
    pub async fn issue_random(
        &self,
        codec: &SymmetricCodec,
        vote_id: VoteId,
        number: usize,
        length: usize,
        format: SecretFormat,
    ) -> Result<usize> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let existing = self.issued_ciphertexts(vote_id).await?;
            let secrets = generate_secrets(number, length, format, |secret| {
                existing.contains(&codec.encrypt(secret))
            })?;
            match self.issue_batch(codec, vote_id, &secrets).await {
                Err(Error::Persistence(err)) if is_conflict_error(&err) => {
                    if attempt >= ISSUE_ATTEMPTS {
                        return Err(Error::Status(
                            Status::Conflict,
                            "Passwords are being issued concurrently for this vote".to_string(),
                        ));
                    }
                    warn!("Credential batch for vote {vote_id} clashed, regenerating");
                }
                result => return result,
            }
        }
    }

    async fn issued_ciphertexts(&self, vote_id: VoteId) -> Result<HashSet<String>> {
        let values = Coll::<Credential>::from_db(&self.db)
            .distinct("password", doc! { "vote_id": vote_id }, None)
            .await?;
        Ok(values
            .into_iter()
            .filter_map(|value| match value {
                Bson::String(ciphertext) => Some(ciphertext),
                _ => None,
            })
            .collect())
    }

    /// Encrypt and insert a batch of secrets for a vote in one transaction.
    /// Returns the number of credentials created.
    pub async fn issue_batch(
        &self,
        codec: &SymmetricCodec,
        vote_id: VoteId,
        secrets: &[String],
    ) -> Result<usize> {
        let counters = Coll::<Counter>::from_db(&self.db);
        let credentials = Coll::<Credential>::from_db(&self.db);

        let first = Counter::reserve(&counters, Credential::NAME, secrets.len() as u64).await?;
        let batch: Vec<Credential> = secrets
            .iter()
            .enumerate()
            .map(|(i, secret)| {
                Credential::new(RowId(first.0 + i as u64), vote_id, codec.encrypt(secret))
            })
            .collect();

        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;
        if let Err(err) = credentials
            .insert_many_with_session(&batch, None, &mut session)
            .await
        {
            session.abort_transaction().await?;
            return Err(err.into());
        }
        session.commit_transaction().await?;

        info!("Issued {} credentials for vote {vote_id}", batch.len());
        Ok(batch.len())
    }
}

#[rocket::async_trait]
impl CredentialStore for MongoCredentialStore {
    async fn vote_exists(&self, vote_id: VoteId) -> Result<bool> {
        let count = Coll::<Vote>::from_db(&self.db)
            .count_documents(doc! { "_id": vote_id }, None)
            .await?;
        Ok(count > 0)
    }

    async fn find_by_vote_and_secret(
        &self,
        vote_id: VoteId,
        encrypted_secret: &str,
    ) -> Result<Credential> {
        let filter = doc! {
            "vote_id": vote_id,
            "password": encrypted_secret,
        };
        Coll::<Credential>::from_db(&self.db)
            .find_one(filter, None)
            .await?
            .ok_or_else(|| Error::not_found("Credential"))
    }
}
