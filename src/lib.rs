#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use rocket::{Build, Rocket};

#[cfg(test)]
use mongodb::Client;

use crate::config::{ConfigFairing, DatabaseFairing, ServicesFairing};
use crate::logging::LoggerFairing;

pub mod api;
pub mod caster;
pub mod codec;
pub mod config;
pub mod error;
pub mod hasher;
pub mod logging;
pub mod model;
pub mod pagination;
pub mod policy;
pub mod session;
pub mod token;

/// Build a rocket from the `Rocket.toml` / `ROCKET_*` configuration.
pub fn build() -> Rocket<Build> {
    assemble(DatabaseFairing::connect())
}

fn assemble(database: DatabaseFairing) -> Rocket<Build> {
    rocket::build()
        .attach(LoggerFairing)
        .attach(ConfigFairing)
        .attach(database)
        .attach(ServicesFairing)
        .mount("/", api::routes())
        .register("/", api::catchers())
}

/// Build a rocket against an existing connection and database.
#[cfg(test)]
pub(crate) fn rocket_for_db(client: Client, db_name: &str) -> Rocket<Build> {
    let db = client.database(db_name);
    assemble(DatabaseFairing::existing(client, db))
}

/// Connect to the database configured for tests.
#[cfg(test)]
pub(crate) async fn db_client() -> Client {
    let db_uri = rocket::Config::figment()
        .extract_inner::<String>("db_uri")
        .expect("`db_uri` not set");
    Client::with_uri_str(&db_uri)
        .await
        .expect("Failed to connect to test database")
}

/// Get the name of the database to use.
/// Use a random name to avoid collisions between tests.
#[cfg(test)]
pub(crate) fn database() -> String {
    let random: u32 = rand::random();
    format!("evote_test{random}")
}
