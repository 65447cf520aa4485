use rocket::{serde::json::Json, Route, State};

use crate::{
    caster::BallotCaster,
    error::{Error, Result},
    model::{
        api::{
            request::BallotRequest,
            response::{BallotReceipt, Envelope},
        },
        ledger::BallotSelections,
    },
    token::VoterClaims,
};

pub fn routes() -> Vec<Route> {
    routes![cast_ballot]
}

#[post("/ballot", data = "<ballot>", format = "json")]
pub async fn cast_ballot(
    voter: std::result::Result<VoterClaims, Error>,
    ballot: Json<BallotRequest>,
    caster: &State<BallotCaster>,
) -> Result<Json<Envelope<BallotReceipt>>> {
    let voter = voter?;
    let selections = BallotSelections::try_from(ballot.into_inner())?;
    caster.cast(voter.id, voter.vote_id, &selections).await?;
    Ok(Envelope::with_msg(
        "Ballot cast",
        BallotReceipt {
            voter: voter.id,
            vote_id: voter.vote_id,
        },
    ))
}
