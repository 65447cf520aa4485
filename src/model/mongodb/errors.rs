//! The mongodb crate doesn't provide server error code constants.

use mongodb::error::{Error as DbError, ErrorKind, WriteFailure};

pub const DUPLICATE_KEY: i32 = 11000;
pub const WRITE_CONFLICT: i32 = 112;

/// Return true if the given error is a duplicate key or write conflict error,
/// i.e. another writer got to the same unique key first.
pub fn is_conflict_error(err: &DbError) -> bool {
    let is_conflict = |code: i32| code == DUPLICATE_KEY || code == WRITE_CONFLICT;
    match *err.kind {
        ErrorKind::Write(WriteFailure::WriteError(ref e)) => is_conflict(e.code),
        ErrorKind::Write(WriteFailure::WriteConcernError(ref e)) => is_conflict(e.code),
        ErrorKind::BulkWrite(ref failure) => failure
            .write_errors
            .as_ref()
            .map_or(false, |errors| errors.iter().any(|e| is_conflict(e.code))),
        ErrorKind::Command(ref e) => is_conflict(e.code),
        _ => false,
    }
}

/// Return true if the given error is a duplicate key write error.
pub fn is_duplicate_key_error(err: &DbError) -> bool {
    match *err.kind {
        ErrorKind::Write(WriteFailure::WriteError(ref e)) => e.code == DUPLICATE_KEY,
        ErrorKind::BulkWrite(ref failure) => failure
            .write_errors
            .as_ref()
            .map_or(false, |errors| errors.iter().any(|e| e.code == DUPLICATE_KEY)),
        _ => false,
    }
}
