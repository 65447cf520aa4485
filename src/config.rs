use std::sync::Arc;

use chrono::Duration;
use mongodb::{Client as MongoClient, Database};
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::caster::BallotCaster;
use crate::codec::SymmetricCodec;
use crate::hasher::{Argon2Hasher, PasswordHasher};
use crate::model::{
    credentials::MongoCredentialStore,
    db::user::{ensure_admin_exists, AdminSeed},
    ledger::MongoBallotLedger,
    mongodb::{ensure_counters_exist, ensure_indexes_exist, Coll},
};
use crate::pagination::PaginationEngine;
use crate::policy::{Authorize, RolePolicy};
use crate::session::VoterSession;
use crate::token::TokenService;

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Deserialize)]
pub struct Config {
    // non-secrets
    #[serde(default = "default_app_name")]
    app_name: String,
    #[serde(default = "default_access_ttl")]
    access_ttl: u32,
    #[serde(default = "default_refresh_ttl")]
    refresh_ttl: u32,
    #[serde(default = "default_voter_cookie_ttl")]
    voter_cookie_ttl: u32,
    #[serde(default = "default_login_timeout_ms")]
    login_timeout_ms: u64,
    #[serde(default = "default_check_auth_timeout_ms")]
    check_auth_timeout_ms: u64,
    #[serde(default = "default_secure_cookies")]
    secure_cookies: bool,
    admin_account: Option<String>,
    admin_email: Option<String>,
    // secrets
    jwt_secret: String,
    jwt_refresh_secret: String,
    codec_key: String,
    codec_iv: String,
    admin_password: Option<String>,
}

fn default_app_name() -> String {
    "evote".to_string()
}

fn default_access_ttl() -> u32 {
    7200
}

fn default_refresh_ttl() -> u32 {
    604_800
}

fn default_voter_cookie_ttl() -> u32 {
    3600
}

fn default_login_timeout_ms() -> u64 {
    5000
}

fn default_check_auth_timeout_ms() -> u64 {
    3000
}

fn default_secure_cookies() -> bool {
    true
}

impl Config {
    /// Name of the application, used as the token issuer.
    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Valid lifetime of access tokens in seconds.
    pub fn access_ttl(&self) -> Duration {
        Duration::seconds(self.access_ttl.into())
    }

    /// Valid lifetime of refresh tokens in seconds.
    pub fn refresh_ttl(&self) -> Duration {
        Duration::seconds(self.refresh_ttl.into())
    }

    /// Valid lifetime of the `voter-token` cookie in seconds.
    pub fn voter_cookie_ttl(&self) -> Duration {
        Duration::seconds(self.voter_cookie_ttl.into())
    }

    /// Deadline for a whole voter login.
    pub fn login_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.login_timeout_ms)
    }

    /// Deadline for re-authenticating a voter from their token.
    pub fn check_auth_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.check_auth_timeout_ms)
    }

    /// Whether cookies are marked `Secure`.
    pub fn secure_cookies(&self) -> bool {
        self.secure_cookies
    }

    /// Secret key used to sign access tokens.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }

    /// Secret key used to sign refresh tokens.
    pub fn jwt_refresh_secret(&self) -> &[u8] {
        self.jwt_refresh_secret.as_bytes()
    }

    /// AES key for voting passwords and pagination cursors.
    pub fn codec_key(&self) -> &[u8] {
        self.codec_key.as_bytes()
    }

    /// Base64 IV for voting passwords and pagination cursors.
    pub fn codec_iv(&self) -> &str {
        &self.codec_iv
    }

    /// The administrator to create at startup, if one is configured.
    pub fn admin_seed(&self) -> Option<AdminSeed> {
        match (&self.admin_account, &self.admin_password) {
            (Some(account), Some(password)) => Some(AdminSeed {
                account: account.clone(),
                password: password.clone(),
                email: self
                    .admin_email
                    .clone()
                    .unwrap_or_else(|| format!("{account}@localhost")),
            }),
            _ => None,
        }
    }

    fn check(&self) -> Result<(), String> {
        if self.jwt_secret.is_empty() || self.jwt_refresh_secret.is_empty() {
            return Err("JWT secrets must not be empty".to_string());
        }
        if self.jwt_secret == self.jwt_refresh_secret {
            return Err("`jwt_secret` and `jwt_refresh_secret` must differ".to_string());
        }
        Ok(())
    }
}

/// A fairing that loads the application config and puts it in managed state.
/// This could easily be achieved using `AdHoc::config`, but is written out
/// explicitly for symmetry with the other fairings and control over error
/// messages.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };
        if let Err(e) = config.check() {
            error!("Invalid application config: {e}");
            return Err(rocket);
        }

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Configuration for the database.
#[derive(Deserialize)]
struct DbConfig {
    // non-secrets
    #[serde(default = "default_db_name")]
    db_name: String,
    // secrets
    db_uri: String,
}

fn default_db_name() -> String {
    "evote".to_string()
}

/// A fairing that connects to the database, performs any setup necessary,
/// and places both a `Client` and a `Database` into managed state.
pub struct DatabaseFairing {
    existing: Option<(MongoClient, Database)>,
}

impl DatabaseFairing {
    /// Connect using the `db_uri` and `db_name` config keys.
    pub fn connect() -> Self {
        Self { existing: None }
    }

    /// Use an existing connection instead of configuring one.
    pub fn existing(client: MongoClient, db: Database) -> Self {
        Self {
            existing: Some((client, db)),
        }
    }

    async fn open(rocket: &Rocket<Build>) -> Option<(MongoClient, Database)> {
        // Load the config.
        let config = match rocket.figment().extract::<DbConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load database config");
                rocket::config::pretty_print_error(e);
                return None;
            }
        };
        info!("Loaded database config, connecting...");
        // Construct the connection.
        match MongoClient::with_uri_str(config.db_uri).await {
            Ok(client) => {
                let db = client.database(&config.db_name);
                Some((client, db))
            }
            Err(e) => {
                error!("Failed to connect to database: {e}");
                None
            }
        }
    }
}

#[rocket::async_trait]
impl Fairing for DatabaseFairing {
    fn info(&self) -> Info {
        Info {
            name: "MongoDB",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        let (client, db) = match &self.existing {
            Some(existing) => existing.clone(),
            None => match Self::open(&rocket).await {
                Some(opened) => opened,
                None => return Err(rocket),
            },
        };

        // Ensure the required indexes and ID counters exist.
        if let Err(e) = ensure_indexes_exist(&db).await {
            error!("Failed to create database indexes: {e}");
            return Err(rocket);
        }
        if let Err(e) = ensure_counters_exist(&Coll::from_db(&db)).await {
            error!("Failed to create ID counters: {e}");
            return Err(rocket);
        }

        // Create the configured administrator, if any.
        let seed = rocket.state::<Config>().and_then(Config::admin_seed);
        if let Some(seed) = seed {
            let created = ensure_admin_exists(
                &Coll::from_db(&db),
                &Coll::from_db(&db),
                &Argon2Hasher,
                &seed,
            )
            .await;
            if let Err(e) = created {
                error!("Failed to create administrator: {e}");
                return Err(rocket);
            }
        }
        info!("...database connection online!");

        // Manage the state.
        rocket = rocket.manage(client).manage(db);
        Ok(rocket)
    }
}

/// A fairing that builds every service from the config and database
/// connection and places it into managed state. Must be attached after
/// [`ConfigFairing`] and [`DatabaseFairing`].
pub struct ServicesFairing;

#[rocket::async_trait]
impl Fairing for ServicesFairing {
    fn info(&self) -> Info {
        Info {
            name: "Services",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let (config, client, db) = match (
            rocket.state::<Config>(),
            rocket.state::<MongoClient>(),
            rocket.state::<Database>(),
        ) {
            (Some(config), Some(client), Some(db)) => (config, client.clone(), db.clone()),
            _ => {
                error!("Services need the config and database to be loaded first");
                return Err(rocket);
            }
        };

        let codec = match SymmetricCodec::new(config.codec_key(), config.codec_iv()) {
            Ok(codec) => codec,
            Err(e) => {
                error!("Invalid codec config: {e}");
                return Err(rocket);
            }
        };
        let tokens = TokenService::new(
            config.app_name(),
            config.jwt_secret(),
            config.jwt_refresh_secret(),
            config.access_ttl(),
            config.refresh_ttl(),
        );
        let credentials = MongoCredentialStore::new(client.clone(), db.clone());
        let ledger = MongoBallotLedger::new(client, db);
        let session = VoterSession::new(
            Arc::new(credentials.clone()),
            Arc::new(ledger.clone()),
            codec.clone(),
            tokens.clone(),
            config.login_timeout(),
            config.check_auth_timeout(),
        );
        let caster = BallotCaster::new(Arc::new(ledger.clone()));
        let pages = PaginationEngine::new(codec.clone());
        let policy: Arc<dyn Authorize> = Arc::new(RolePolicy);
        let hasher: Arc<dyn PasswordHasher> = Arc::new(Argon2Hasher);
        info!("Services configured");

        Ok(rocket
            .manage(codec)
            .manage(tokens)
            .manage(credentials)
            .manage(ledger)
            .manage(session)
            .manage(caster)
            .manage(pages)
            .manage(policy)
            .manage(hasher))
    }
}
