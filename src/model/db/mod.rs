//! DB-compatible (e.g. de/serialisable) types.
//!
//! The types in this module are serialised in an DB-friendly way, e.g.:
//!
//! - Datetimes are serialised in MongoDB's own format.
//! - Row IDs are 64-bit integers allocated from per-collection counters.

pub mod ballot;
pub mod candidate;
pub mod credential;
pub mod question;
pub mod user;
pub mod vote;
