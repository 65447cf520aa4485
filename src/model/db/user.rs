use std::fmt::Display;

use chrono::{DateTime, Utc};
use mongodb::bson::{doc, serde_helpers::chrono_datetime_as_bson_datetime, Bson};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::hasher::PasswordHasher;
use crate::model::mongodb::{Coll, Counter, MongoCollection, RowId};

/// Staff roles. Voters never have a user record.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    /// Sees and manages everything.
    Admin,
    /// Creates votes and manages only their own.
    Creator,
    Voter,
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Admin => "ADMIN",
            Self::Creator => "CREATOR",
            Self::Voter => "VOTER",
        };
        write!(f, "{name}")
    }
}

impl From<Role> for Bson {
    fn from(role: Role) -> Self {
        Bson::String(role.to_string())
    }
}

/// A staff user from the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: RowId,
    pub account: String,
    pub email: String,
    pub password_hash: String,
    pub roles: Vec<Role>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        id: RowId,
        account: String,
        email: String,
        password_hash: String,
        roles: Vec<Role>,
    ) -> Self {
        Self {
            id,
            account,
            email,
            password_hash,
            roles,
            created_at: Utc::now(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.roles.contains(&Role::Admin)
    }
}

/// An administrator to create at startup.
#[derive(Debug, Clone)]
pub struct AdminSeed {
    pub account: String,
    pub email: String,
    pub password: String,
}

/// Create the seeded administrator unless an account with that name exists.
pub async fn ensure_admin_exists(
    users: &Coll<User>,
    counters: &Coll<Counter>,
    hasher: &dyn PasswordHasher,
    seed: &AdminSeed,
) -> Result<()> {
    let existing = users
        .find_one(doc! { "account": &seed.account }, None)
        .await?;
    if existing.is_some() {
        return Ok(());
    }

    let id = Counter::next(counters, User::NAME).await?;
    let admin = User::new(
        id,
        seed.account.clone(),
        seed.email.clone(),
        hasher.hash(&seed.password)?,
        vec![Role::Admin],
    );
    users.insert_one(&admin, None).await?;
    warn!("Created administrator {}", seed.account);
    Ok(())
}
