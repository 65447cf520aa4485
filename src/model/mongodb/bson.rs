use std::{fmt, num::ParseIntError, str::FromStr};

use mongodb::bson::{doc, Bson, Document};
use rocket::{
    form::{self, prelude::ErrorKind, FromFormField, ValueField},
    http::{
        impl_from_uri_param_identity,
        uri::fmt::{Path, UriDisplay},
    },
    request::FromParam,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A numeric row identifier allocated from a [`super::Counter`].
///
/// Ids are handed out in insertion order, so ordering by id agrees with
/// ordering by creation time.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(pub u64);

impl RowId {
    /// A filter document matching this ID.
    pub fn as_doc(&self) -> Document {
        doc! { "_id": *self }
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RowId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(Self)
    }
}

impl From<u64> for RowId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<RowId> for Bson {
    fn from(id: RowId) -> Self {
        // Counters never approach i64::MAX.
        Bson::Int64(id.0 as i64)
    }
}

impl<'a> FromParam<'a> for RowId {
    type Error = ParseIntError;

    fn from_param(param: &'a str) -> Result<Self, Self::Error> {
        param.parse()
    }
}

impl UriDisplay<Path> for RowId {
    fn fmt(&self, formatter: &mut rocket::http::uri::fmt::Formatter<'_, Path>) -> fmt::Result {
        formatter.write_value(self.to_string())
    }
}

impl_from_uri_param_identity!([Path] RowId);

/// The public identifier of a vote.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoteId(#[serde(with = "uuid_as_string")] Uuid);

impl VoteId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for VoteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for VoteId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<VoteId> for Bson {
    fn from(id: VoteId) -> Self {
        Bson::String(id.to_string())
    }
}

impl<'a> FromParam<'a> for VoteId {
    type Error = uuid::Error;

    fn from_param(param: &'a str) -> Result<Self, Self::Error> {
        param.parse()
    }
}

#[rocket::async_trait]
impl<'r> FromFormField<'r> for VoteId {
    fn from_value(field: ValueField<'r>) -> form::Result<'r, Self> {
        field.value.parse::<VoteId>().map_err(|err| {
            let error = ErrorKind::Custom(rocket::http::Status::UnprocessableEntity, Box::new(err));
            error.into()
        })
    }
}

impl UriDisplay<Path> for VoteId {
    fn fmt(&self, formatter: &mut rocket::http::uri::fmt::Formatter<'_, Path>) -> fmt::Result {
        formatter.write_value(self.to_string())
    }
}

impl_from_uri_param_identity!([Path] VoteId);

/// Vote ids are stored as hyphenated strings, not BSON binary.
mod uuid_as_string {
    use serde::{Deserialize, Deserializer, Serializer};
    use uuid::Uuid;

    pub fn serialize<S: Serializer>(id: &Uuid, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&id.hyphenated())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Uuid, D::Error> {
        let s = String::deserialize(deserializer)?;
        Uuid::parse_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_id_is_int64() {
        assert_eq!(Bson::from(RowId(42)), Bson::Int64(42));
        assert_eq!(RowId(7).as_doc(), doc! { "_id": 7_i64 });
    }

    #[test]
    fn vote_id_parses_hyphenated() {
        let id = VoteId::new();
        let parsed: VoteId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<VoteId>().is_err());
    }

    #[test]
    fn vote_id_serializes_as_string() {
        let id = VoteId::new();
        let bson = mongodb::bson::to_bson(&id).unwrap();
        assert_eq!(bson, Bson::String(id.to_string()));
    }
}
