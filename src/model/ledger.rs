//! The record of which credentials have voted and what they chose.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::Utc;
use mongodb::{bson::doc, Client, ClientSession, Database};
use rocket::futures::TryStreamExt;

use crate::error::{Error, Result};
use crate::model::{
    db::{
        ballot::{Ballot, BallotSelection, BallotSubmission},
        candidate::Candidate,
        credential::{Credential, CredentialStatus},
        question::Question,
    },
    mongodb::{errors::is_conflict_error, Coll, Counter, MongoCollection, RowId, VoteId},
};

/// The chosen candidates for each answered question, ordered by question ID.
///
/// Every question present has at least one chosen candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BallotSelections(Vec<(RowId, BTreeSet<RowId>)>);

impl BallotSelections {
    pub fn new(entries: impl IntoIterator<Item = (RowId, BTreeSet<RowId>)>) -> Result<Self> {
        let mut by_question: BTreeMap<RowId, BTreeSet<RowId>> = BTreeMap::new();
        for (question, candidates) in entries {
            if candidates.is_empty() {
                return Err(Error::validation(format!(
                    "No candidate selected for question {question}"
                )));
            }
            by_question.entry(question).or_default().extend(candidates);
        }
        if by_question.is_empty() {
            return Err(Error::validation("Ballot has no selections"));
        }
        Ok(Self(by_question.into_iter().collect()))
    }

    pub fn questions(&self) -> impl Iterator<Item = (RowId, &BTreeSet<RowId>)> {
        self.0.iter().map(|(question, candidates)| (*question, candidates))
    }

    /// Number of questions answered.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of chosen candidates across all questions.
    pub fn selection_count(&self) -> usize {
        self.0.iter().map(|(_, candidates)| candidates.len()).sum()
    }
}

/// Build selections from the wire format `question -> (candidate -> selected)`.
/// Unselected candidates are dropped.
impl TryFrom<BTreeMap<RowId, BTreeMap<RowId, bool>>> for BallotSelections {
    type Error = Error;

    fn try_from(raw: BTreeMap<RowId, BTreeMap<RowId, bool>>) -> Result<Self> {
        Self::new(raw.into_iter().map(|(question, marks)| {
            let chosen = marks
                .into_iter()
                .filter_map(|(candidate, selected)| selected.then_some(candidate))
                .collect();
            (question, chosen)
        }))
    }
}

/// Records ballots, at most one submission per credential.
#[rocket::async_trait]
pub trait BallotLedger: Send + Sync {
    /// Has this credential already cast a ballot?
    async fn has_cast(&self, credential_id: RowId) -> Result<bool>;

    /// Atomically record a ballot and all its selections.
    ///
    /// Fails with [`Error::AlreadyVoted`] if the credential has already cast
    /// a ballot, even if that happened concurrently with this call. On any
    /// failure nothing from this submission is stored.
    async fn cast_ballot(
        &self,
        credential_id: RowId,
        vote_id: VoteId,
        selections: &BallotSelections,
    ) -> Result<()>;
}

/// MongoDB-backed ballot ledger.
#[derive(Clone)]
pub struct MongoBallotLedger {
    client: Client,
    db: Database,
}

impl MongoBallotLedger {
    pub fn new(client: Client, db: Database) -> Self {
        Self { client, db }
    }

    /// Check every question belongs to the vote and every candidate to its question.
    async fn check_membership(&self, vote_id: VoteId, selections: &BallotSelections) -> Result<()> {
        let question_ids: Vec<RowId> = selections.questions().map(|(q, _)| q).collect();
        let known_questions = Coll::<Question>::from_db(&self.db)
            .count_documents(
                doc! { "_id": { "$in": question_ids.clone() }, "vote_id": vote_id },
                None,
            )
            .await?;
        if known_questions != question_ids.len() as u64 {
            return Err(Error::validation("Ballot answers a question outside this vote"));
        }

        let candidates: HashMap<RowId, RowId> = Coll::<Candidate>::from_db(&self.db)
            .find(doc! { "question_id": { "$in": question_ids.clone() } }, None)
            .await?
            .map_ok(|candidate| (candidate.id, candidate.question_id))
            .try_collect()
            .await?;
        for (question, chosen) in selections.questions() {
            if chosen
                .iter()
                .any(|candidate| candidates.get(candidate) != Some(&question))
            {
                return Err(Error::validation(format!(
                    "Ballot selects a candidate outside question {question}"
                )));
            }
        }
        Ok(())
    }

    async fn write_ballot(
        &self,
        session: &mut ClientSession,
        credential_id: RowId,
        vote_id: VoteId,
        selections: &BallotSelections,
    ) -> Result<()> {
        let counters = Coll::<Counter>::from_db(&self.db);
        let now = Utc::now();

        // The submission is keyed by credential, so a concurrent second cast
        // fails here with a duplicate key or write conflict.
        Coll::<BallotSubmission>::from_db(&self.db)
            .insert_one_with_session(
                BallotSubmission {
                    credential_id,
                    vote_id,
                    created_at: now,
                },
                None,
                session,
            )
            .await?;

        Coll::<Credential>::from_db(&self.db)
            .update_one_with_session(
                credential_id.as_doc(),
                doc! { "$set": { "status": CredentialStatus::Used } },
                None,
                session,
            )
            .await?;

        let first_ballot =
            Counter::reserve(&counters, Ballot::NAME, selections.len() as u64).await?;
        let first_selection = Counter::reserve(
            &counters,
            BallotSelection::NAME,
            selections.selection_count() as u64,
        )
        .await?;

        let mut ballots = Vec::with_capacity(selections.len());
        let mut chosen = Vec::with_capacity(selections.selection_count());
        for (i, (question_id, candidates)) in selections.questions().enumerate() {
            let ballot_id = RowId(first_ballot.0 + i as u64);
            ballots.push(Ballot {
                id: ballot_id,
                credential_id,
                question_id,
                created_at: now,
            });
            for candidate_id in candidates {
                chosen.push(BallotSelection {
                    id: RowId(first_selection.0 + chosen.len() as u64),
                    ballot_id,
                    candidate_id: *candidate_id,
                });
            }
        }

        Coll::<Ballot>::from_db(&self.db)
            .insert_many_with_session(ballots, None, session)
            .await?;
        Coll::<BallotSelection>::from_db(&self.db)
            .insert_many_with_session(chosen, None, session)
            .await?;
        Ok(())
    }
}

#[rocket::async_trait]
impl BallotLedger for MongoBallotLedger {
    async fn has_cast(&self, credential_id: RowId) -> Result<bool> {
        let count = Coll::<BallotSubmission>::from_db(&self.db)
            .count_documents(credential_id.as_doc(), None)
            .await?;
        Ok(count > 0)
    }

    async fn cast_ballot(
        &self,
        credential_id: RowId,
        vote_id: VoteId,
        selections: &BallotSelections,
    ) -> Result<()> {
        self.check_membership(vote_id, selections).await?;

        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;

        let written = self
            .write_ballot(&mut session, credential_id, vote_id, selections)
            .await;
        let result = match written {
            Ok(()) => session.commit_transaction().await.map_err(Error::from),
            Err(err) => {
                // Aborting an already-aborted transaction is harmless.
                let _ = session.abort_transaction().await;
                Err(err)
            }
        };

        result.map_err(|err| match err {
            Error::Persistence(ref db_err) if is_conflict_error(db_err) => Error::AlreadyVoted,
            other => other,
        })
    }
}
