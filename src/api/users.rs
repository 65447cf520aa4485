use std::sync::Arc;

use mongodb::bson::doc;
use rocket::{
    http::{CookieJar, Status},
    serde::json::Json,
    Route, State,
};

use crate::{
    config::Config,
    error::{Error, Result},
    hasher::PasswordHasher,
    model::{
        api::{
            guards::user_cookie,
            request::{RefreshRequest, RegisterRequest, StaffLoginRequest, MIN_PASSWORD_LENGTH},
            response::{Envelope, UserView},
        },
        db::user::{Role, User},
        mongodb::{errors::is_duplicate_key_error, Coll, Counter, MongoCollection},
    },
    token::{Rights, TokenPair, TokenService},
};

pub fn routes() -> Vec<Route> {
    routes![login, register, refresh]
}

#[post("/users/login", data = "<credentials>", format = "json")]
pub async fn login(
    credentials: Json<StaffLoginRequest>,
    users: Coll<User>,
    hasher: &State<Arc<dyn PasswordHasher>>,
    tokens: &State<TokenService>,
    config: &State<Config>,
    cookies: &CookieJar<'_>,
) -> Result<Json<Envelope<TokenPair>>> {
    let invalid = || Error::Auth("Invalid account or password".to_string());
    let user = users
        .find_one(doc! { "account": &credentials.account }, None)
        .await?
        .ok_or_else(invalid)?;
    if !hasher.compare(&credentials.password, &user.password_hash) {
        return Err(invalid());
    }

    let pair = tokens.issue_staff(user.id, user.account, user.roles)?;
    cookies.add(user_cookie(pair.token.clone(), config));
    Ok(Envelope::ok(pair))
}

#[post("/users", data = "<registration>", format = "json")]
pub async fn register(
    registration: Json<RegisterRequest>,
    users: Coll<User>,
    counters: Coll<Counter>,
    hasher: &State<Arc<dyn PasswordHasher>>,
) -> Result<Json<Envelope<UserView>>> {
    let RegisterRequest {
        account,
        password,
        email,
    } = registration.into_inner();
    let account = account.trim().to_string();
    let email = email.trim().to_string();
    if account.is_empty() {
        return Err(Error::validation("Account must not be empty"));
    }
    if !email.contains('@') {
        return Err(Error::validation("Invalid email address"));
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(Error::validation(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    let taken = Error::Status(
        Status::BadRequest,
        "Account or email already in use".to_string(),
    );
    let existing = users
        .count_documents(
            doc! { "$or": [ { "account": &account }, { "email": &email } ] },
            None,
        )
        .await?;
    if existing > 0 {
        return Err(taken);
    }

    let id = Counter::next(&counters, User::NAME).await?;
    let user = User::new(id, account, email, hasher.hash(&password)?, vec![Role::Creator]);
    match users.insert_one(&user, None).await {
        Ok(_) => {}
        // Lost a race with a concurrent registration.
        Err(e) if is_duplicate_key_error(&e) => return Err(taken),
        Err(e) => return Err(e.into()),
    }
    info!("Registered user {} ({})", user.id, user.account);
    Ok(Envelope::ok(user.into()))
}

#[post("/users/refresh", data = "<request>", format = "json")]
pub async fn refresh(
    request: Json<RefreshRequest>,
    users: Coll<User>,
    tokens: &State<TokenService>,
    config: &State<Config>,
    cookies: &CookieJar<'_>,
) -> Result<Json<Envelope<TokenPair>>> {
    let claims = tokens.verify_refresh(&request.refresh_token)?;
    if claims.rights != Rights::Staff {
        return Err(Error::Auth("Not a staff refresh token".to_string()));
    }
    let user = users
        .find_one(claims.subject.as_doc(), None)
        .await?
        .ok_or_else(|| Error::Auth("User no longer exists".to_string()))?;

    let pair = tokens.issue_staff(user.id, user.account, user.roles)?;
    cookies.add(user_cookie(pair.token.clone(), config));
    Ok(Envelope::ok(pair))
}
