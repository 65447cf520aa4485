//! API-compatible types.
//!
//! The types in this module are serialised in an API-friendly way, e.g.:
//!
//! - Vote IDs are serialised as hyphenated UUID strings.
//! - Datetimes are serialised as RFC 3339 strings.
//! - Successful responses are wrapped in an [`response::Envelope`].

pub mod guards;
pub mod request;
pub mod response;
