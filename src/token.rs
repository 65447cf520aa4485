//! Signed identity tokens for staff users and anonymous voters.

use chrono::{serde::ts_seconds, DateTime, Duration, Utc};
use jsonwebtoken::{
    errors::{Error as JwtError, ErrorKind as JwtErrorKind},
    Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};
use thiserror::Error;

use crate::model::{
    db::user::Role,
    mongodb::{RowId, VoteId},
};

/// Which kind of principal a token was issued to.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum Rights {
    Voter = 0,
    Staff = 1,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("Token has expired")]
    Expired,
    #[error("Token is invalid")]
    Invalid,
    #[error("Token was issued to a different kind of principal")]
    WrongPrincipal,
    #[error("Token could not be signed: {0}")]
    Signing(String),
}

impl From<JwtError> for TokenError {
    fn from(err: JwtError) -> Self {
        match err.kind() {
            JwtErrorKind::ExpiredSignature => Self::Expired,
            _ => Self::Invalid,
        }
    }
}

/// The claims specific to one kind of principal.
pub trait Principal: Serialize + DeserializeOwned {
    const RIGHTS: Rights;

    /// The ID the refresh token is issued for.
    fn subject(&self) -> RowId;
}

/// Claims identifying a staff user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffClaims {
    pub id: RowId,
    pub account: String,
    pub roles: Vec<Role>,
}

impl StaffClaims {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }
}

impl Principal for StaffClaims {
    const RIGHTS: Rights = Rights::Staff;

    fn subject(&self) -> RowId {
        self.id
    }
}

/// Claims identifying an anonymous voter by credential.
///
/// `is_voted` records the ballot state when the token was issued and must
/// not be trusted for authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterClaims {
    /// The credential ID.
    pub id: RowId,
    #[serde(rename = "voteId")]
    pub vote_id: VoteId,
    #[serde(rename = "isVoted")]
    pub is_voted: bool,
}

impl Principal for VoterClaims {
    const RIGHTS: Rights = Rights::Voter;

    fn subject(&self) -> RowId {
        self.id
    }
}

/// Access token claims: the principal plus rights, expiry and issuer.
#[derive(Debug, Serialize, Deserialize)]
struct Claims<P> {
    #[serde(flatten)]
    principal: P,
    #[serde(rename = "rgt")]
    rights: Rights,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
    #[serde(rename = "iss")]
    issuer: String,
}

/// Refresh token claims. These carry no roles or vote scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    #[serde(rename = "sub")]
    pub subject: RowId,
    #[serde(rename = "rgt")]
    pub rights: Rights,
    #[serde(rename = "exp", with = "ts_seconds")]
    pub expire_at: DateTime<Utc>,
    #[serde(rename = "iss")]
    pub issuer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub token: String,
    pub refresh_token: String,
}

/// Issues and verifies tokens. Access and refresh tokens use different secrets.
#[derive(Clone)]
pub struct TokenService {
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
}

impl TokenService {
    pub fn new(
        issuer: impl Into<String>,
        access_secret: &[u8],
        refresh_secret: &[u8],
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            access_ttl,
            refresh_ttl,
            access_encoding: EncodingKey::from_secret(access_secret),
            access_decoding: DecodingKey::from_secret(access_secret),
            refresh_encoding: EncodingKey::from_secret(refresh_secret),
            refresh_decoding: DecodingKey::from_secret(refresh_secret),
        }
    }

    /// Valid lifetime of access tokens.
    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn issue_staff(
        &self,
        id: RowId,
        account: String,
        roles: Vec<Role>,
    ) -> Result<TokenPair, TokenError> {
        self.issue(StaffClaims { id, account, roles })
    }

    pub fn issue_voter(
        &self,
        id: RowId,
        vote_id: VoteId,
        is_voted: bool,
    ) -> Result<TokenPair, TokenError> {
        self.issue(VoterClaims {
            id,
            vote_id,
            is_voted,
        })
    }

    pub fn verify_staff(&self, token: &str) -> Result<StaffClaims, TokenError> {
        self.verify(token)
    }

    pub fn verify_voter(&self, token: &str) -> Result<VoterClaims, TokenError> {
        self.verify(token)
    }

    /// Verify a refresh token, returning who it was issued to.
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        let data = jsonwebtoken::decode::<RefreshClaims>(
            token,
            &self.refresh_decoding,
            &self.validation(),
        )?;
        Ok(data.claims)
    }

    fn issue<P: Principal>(&self, principal: P) -> Result<TokenPair, TokenError> {
        let now = Utc::now();
        let refresh = RefreshClaims {
            subject: principal.subject(),
            rights: P::RIGHTS,
            expire_at: now + self.refresh_ttl,
            issuer: self.issuer.clone(),
        };
        let claims = Claims {
            principal,
            rights: P::RIGHTS,
            expire_at: now + self.access_ttl,
            issuer: self.issuer.clone(),
        };

        let signing = |err: JwtError| TokenError::Signing(err.to_string());
        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.access_encoding)
            .map_err(signing)?;
        let refresh_token =
            jsonwebtoken::encode(&Header::default(), &refresh, &self.refresh_encoding)
                .map_err(signing)?;
        Ok(TokenPair {
            token,
            refresh_token,
        })
    }

    fn verify<P: Principal>(&self, token: &str) -> Result<P, TokenError> {
        let data =
            jsonwebtoken::decode::<Claims<P>>(token, &self.access_decoding, &self.validation())?;
        if data.claims.rights != P::RIGHTS {
            return Err(TokenError::WrongPrincipal);
        }
        Ok(data.claims.principal)
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.leeway = 0;
        validation
    }
}

#[cfg(test)]
pub(crate) mod examples {
    use super::*;

    impl TokenService {
        pub fn example() -> Self {
            Self::new(
                "evote",
                b"access secret",
                b"refresh secret",
                Duration::hours(2),
                Duration::days(7),
            )
        }

        /// A service whose tokens are already expired when issued.
        pub fn example_expired() -> Self {
            Self::new(
                "evote",
                b"access secret",
                b"refresh secret",
                Duration::seconds(-30),
                Duration::seconds(-30),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staff_round_trip() {
        let service = TokenService::example();
        let pair = service.issue_staff(RowId(4), "alice".into(), vec![Role::Admin]).unwrap();
        let claims = service.verify_staff(&pair.token).unwrap();
        assert_eq!(claims.id, RowId(4));
        assert_eq!(claims.account, "alice");
        assert!(claims.is_admin());
    }

    #[test]
    fn voter_round_trip() {
        let service = TokenService::example();
        let vote_id = VoteId::new();
        let pair = service.issue_voter(RowId(9), vote_id, true).unwrap();
        let claims = service.verify_voter(&pair.token).unwrap();
        assert_eq!(claims.vote_id, vote_id);
        assert!(claims.is_voted);
    }

    #[test]
    fn principals_are_not_interchangeable() {
        let service = TokenService::example();
        let pair = service.issue_voter(RowId(9), VoteId::new(), false).unwrap();
        assert!(service.verify_staff(&pair.token).is_err());

        let pair = service.issue_staff(RowId(1), "bob".into(), vec![Role::Creator]).unwrap();
        assert!(service.verify_voter(&pair.token).is_err());
    }

    #[test]
    fn refresh_and_access_secrets_differ() {
        let service = TokenService::example();
        let pair = service.issue_staff(RowId(1), "bob".into(), vec![Role::Creator]).unwrap();

        let refresh = service.verify_refresh(&pair.refresh_token).unwrap();
        assert_eq!(refresh.subject, RowId(1));
        assert_eq!(refresh.rights, Rights::Staff);

        assert_eq!(
            service.verify_staff(&pair.refresh_token),
            Err(TokenError::Invalid)
        );
        assert_eq!(
            service.verify_refresh(&pair.token).err(),
            Some(TokenError::Invalid)
        );
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let service = TokenService::example_expired();
        let pair = service.issue_voter(RowId(2), VoteId::new(), false).unwrap();
        assert_eq!(service.verify_voter(&pair.token), Err(TokenError::Expired));
        assert_eq!(
            service.verify_refresh(&pair.refresh_token).err(),
            Some(TokenError::Expired)
        );
    }

    #[test]
    fn signing_failures_are_internal() {
        let err = crate::error::Error::from(TokenError::Signing("bad key".into()));
        assert_eq!(err.status(), rocket::http::Status::InternalServerError);
        assert_eq!(
            crate::error::Error::from(TokenError::Expired).status(),
            rocket::http::Status::Unauthorized
        );
    }

    #[test]
    fn tampered_and_foreign_tokens_are_rejected() {
        let service = TokenService::example();
        let pair = service.issue_voter(RowId(2), VoteId::new(), false).unwrap();
        let mut tampered = pair.token.clone();
        tampered.pop();
        tampered.push(if pair.token.ends_with('A') { 'B' } else { 'A' });
        assert_eq!(service.verify_voter(&tampered), Err(TokenError::Invalid));

        let other = TokenService::new(
            "someone-else",
            b"access secret",
            b"refresh secret",
            Duration::hours(2),
            Duration::days(7),
        );
        let foreign = other.issue_voter(RowId(2), VoteId::new(), false).unwrap();
        assert_eq!(service.verify_voter(&foreign.token), Err(TokenError::Invalid));
    }
}
