mod bson;
mod collection;
mod counter;
pub mod errors;

pub use bson::{RowId, VoteId};
pub use collection::{ensure_indexes_exist, Coll, MongoCollection};
pub use counter::{ensure_counters_exist, Counter, COUNTED_COLLECTIONS};
