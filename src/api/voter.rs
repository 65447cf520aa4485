use rocket::{
    http::{CookieJar, Status},
    serde::json::Json,
    Route, State,
};

use crate::{
    config::Config,
    error::{Error, Result},
    model::api::{
        guards::{clear_voter_cookie, voter_cookie, VoterToken},
        request::VoterLoginRequest,
        response::{Envelope, TokenView, VoterStatus},
    },
    session::VoterSession,
};

pub fn routes() -> Vec<Route> {
    routes![login, check_auth, logout, is_voted]
}

/// Unknown votes and wrong secrets are both reported as bad requests.
pub(crate) fn login_error(err: Error) -> Error {
    match err {
        Error::NotFound(_) | Error::Auth(_) => Error::Status(Status::BadRequest, err.to_string()),
        other => other,
    }
}

#[post("/voter/login", data = "<login>", format = "json")]
pub async fn login(
    login: Json<VoterLoginRequest>,
    session: &State<VoterSession>,
    config: &State<Config>,
    cookies: &CookieJar<'_>,
) -> Result<Json<Envelope<TokenView>>> {
    let voter = session
        .login(&login.vote_id, &login.password)
        .await
        .map_err(login_error)?;
    cookies.add(voter_cookie(voter.tokens.token.clone(), config));
    Ok(Envelope::ok(TokenView {
        token: voter.tokens.token,
    }))
}

#[get("/voter/check-auth")]
pub async fn check_auth(
    token: std::result::Result<VoterToken, Error>,
    session: &State<VoterSession>,
    config: &State<Config>,
    cookies: &CookieJar<'_>,
) -> Result<Json<Envelope<VoterStatus>>> {
    let voter = session.check_auth(&token?.0).await?;
    cookies.add(voter_cookie(voter.tokens.token, config));
    Ok(Envelope::ok(VoterStatus {
        id: voter.claims.id,
        vote_id: voter.claims.vote_id,
        voted: voter.claims.is_voted,
    }))
}

#[post("/voter/logout")]
pub async fn logout(cookies: &CookieJar<'_>) -> Json<Envelope<()>> {
    clear_voter_cookie(cookies);
    Envelope::ok(())
}

#[get("/voter/is-voted")]
pub async fn is_voted(
    token: std::result::Result<VoterToken, Error>,
    session: &State<VoterSession>,
) -> Result<Json<Envelope<VoterStatus>>> {
    let (claims, voted) = session.has_voted(&token?.0).await?;
    if voted {
        return Err(Error::Status(
            Status::BadRequest,
            "Voter has already voted".to_string(),
        ));
    }
    Ok(Envelope::ok(VoterStatus {
        id: claims.id,
        vote_id: claims.vote_id,
        voted,
    }))
}
