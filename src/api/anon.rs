use rocket::{serde::json::Json, Route, State};

use crate::{
    api::voter::login_error,
    error::Result,
    model::api::{request::VoterLoginRequest, response::Envelope},
    session::VoterSession,
    token::TokenPair,
};

pub fn routes() -> Vec<Route> {
    routes![login]
}

/// Log in with a single-use password without a cookie. The caller keeps the
/// token pair and presents the access token as a bearer token.
#[post("/anon/login", data = "<login>", format = "json")]
pub async fn login(
    login: Json<VoterLoginRequest>,
    session: &State<VoterSession>,
) -> Result<Json<Envelope<TokenPair>>> {
    let voter = session
        .login(&login.vote_id, &login.password)
        .await
        .map_err(login_error)?;
    info!("Anonymous login for credential {}", voter.claims.id);
    Ok(Envelope::with_msg("Anon login success", voter.tokens))
}
