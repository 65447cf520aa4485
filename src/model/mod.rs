pub mod api;
pub mod credentials;
pub mod db;
pub mod ledger;
#[cfg(test)]
pub mod memory;
pub mod mongodb;
