use std::sync::Arc;

use crate::error::{Error, Result};
use crate::model::{
    ledger::{BallotLedger, BallotSelections},
    mongodb::{RowId, VoteId},
};

/// Checks a voter may still vote and hands their ballot to the ledger.
///
/// The eligibility check here is advisory. The ledger's own uniqueness
/// guarantee is what prevents a second ballot under concurrent submissions.
pub struct BallotCaster {
    ledger: Arc<dyn BallotLedger>,
}

impl BallotCaster {
    pub fn new(ledger: Arc<dyn BallotLedger>) -> Self {
        Self { ledger }
    }

    pub async fn cast(
        &self,
        credential_id: RowId,
        vote_id: VoteId,
        selections: &BallotSelections,
    ) -> Result<()> {
        if selections.is_empty() {
            return Err(Error::validation("Ballot has no selections"));
        }
        if self.ledger.has_cast(credential_id).await? {
            return Err(Error::AlreadyVoted);
        }
        self.ledger
            .cast_ballot(credential_id, vote_id, selections)
            .await?;
        info!(
            "Accepted ballot from credential {credential_id} answering {} question(s)",
            selections.len()
        );
        Ok(())
    }
}
