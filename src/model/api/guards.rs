//! Request guards for authenticated staff and voters.

use rocket::{
    http::{Cookie, CookieJar, SameSite, Status},
    request::{FromRequest, Outcome},
    time::Duration,
    Request, State,
};

use crate::config::Config;
use crate::error::Error;
use crate::token::{StaffClaims, TokenService, VoterClaims};

pub const VOTER_TOKEN_COOKIE: &str = "voter-token";
pub const USER_TOKEN_COOKIE: &str = "user-token";

/// Build the `voter-token` cookie for a freshly issued token.
pub fn voter_cookie(token: String, config: &Config) -> Cookie<'static> {
    Cookie::build((VOTER_TOKEN_COOKIE, token))
        .max_age(Duration::seconds(config.voter_cookie_ttl().num_seconds()))
        .path("/")
        .secure(config.secure_cookies())
        .http_only(true)
        .same_site(SameSite::Strict)
        .build()
}

/// Build the `user-token` cookie for a freshly issued staff token.
pub fn user_cookie(token: String, config: &Config) -> Cookie<'static> {
    Cookie::build((USER_TOKEN_COOKIE, token))
        .max_age(Duration::seconds(config.access_ttl().num_seconds()))
        .path("/")
        .secure(config.secure_cookies())
        .http_only(true)
        .same_site(SameSite::Strict)
        .build()
}

pub fn clear_voter_cookie(cookies: &CookieJar<'_>) {
    cookies.remove(Cookie::build(VOTER_TOKEN_COOKIE).path("/"));
}

fn bearer_token(req: &Request<'_>) -> Option<String> {
    req.headers()
        .get_one("Authorization")
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

fn cookie_token(req: &Request<'_>, name: &str) -> Option<String> {
    req.cookies()
        .get(name)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
}

/// The raw voter token, not yet verified.
///
/// Browsers send the `voter-token` cookie; anonymous logins hold their token
/// themselves and send `Authorization: Bearer ...`.
pub struct VoterToken(pub String);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for VoterToken {
    type Error = Error;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match cookie_token(req, VOTER_TOKEN_COOKIE).or_else(|| bearer_token(req)) {
            Some(token) => Outcome::Success(VoterToken(token)),
            None => Outcome::Error((Status::Unauthorized, Error::VoterNotLoggedIn)),
        }
    }
}

async fn token_service<'r>(req: &'r Request<'_>) -> Result<&'r TokenService, Error> {
    match req.guard::<&State<TokenService>>().await {
        Outcome::Success(tokens) => Ok(tokens.inner()),
        _ => Err(Error::Internal("Token service is not managed".to_string())),
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for VoterClaims {
    type Error = Error;

    /// Verify the `voter-token` cookie.
    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let token = match VoterToken::from_request(req).await {
            Outcome::Success(token) => token,
            Outcome::Error(e) => return Outcome::Error(e),
            Outcome::Forward(status) => return Outcome::Forward(status),
        };
        let tokens = match token_service(req).await {
            Ok(tokens) => tokens,
            Err(e) => return Outcome::Error((Status::InternalServerError, e)),
        };
        match tokens.verify_voter(&token.0) {
            Ok(claims) => Outcome::Success(claims),
            Err(e) => Outcome::Error((Status::Unauthorized, e.into())),
        }
    }
}


#[rocket::async_trait]
impl<'r> FromRequest<'r> for StaffClaims {
    type Error = Error;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        // Staff tokens prefer the header over the `user-token` cookie.
        let Some(token) = bearer_token(req).or_else(|| cookie_token(req, USER_TOKEN_COOKIE)) else {
            return Outcome::Error((Status::Unauthorized, Error::UserNotLoggedIn));
        };
        let tokens = match token_service(req).await {
            Ok(tokens) => tokens,
            Err(e) => return Outcome::Error((Status::InternalServerError, e)),
        };
        match tokens.verify_staff(&token) {
            Ok(claims) => Outcome::Success(claims),
            Err(e) => Outcome::Error((Status::Unauthorized, e.into())),
        }
    }
}
