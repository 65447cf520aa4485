use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use mongodb::bson::doc;
use rocket::{serde::json::Json, Route, State};

use crate::{
    api::votes::visible_vote,
    codec::SymmetricCodec,
    error::{Error, Result},
    model::{
        api::{
            request::PasswordCreateRequest,
            response::{CredentialView, Envelope, IssuedCredentials},
        },
        credentials::MongoCredentialStore,
        db::{credential::Credential, vote::Vote},
        mongodb::{Coll, VoteId},
    },
    pagination::{Connection, PageArgs, PaginationEngine},
    policy::{Action, Authorize, Resource},
    token::StaffClaims,
};

pub fn routes() -> Vec<Route> {
    routes![list_passwords, create_passwords, decrypt_passwords]
}

#[get("/passwords?<vote_id>&<page..>")]
pub async fn list_passwords(
    staff: std::result::Result<StaffClaims, Error>,
    vote_id: VoteId,
    page: PageArgs,
    votes: Coll<Vote>,
    credentials: Coll<Credential>,
    policy: &State<Arc<dyn Authorize>>,
    pages: &State<PaginationEngine>,
) -> Result<Json<Envelope<Connection<CredentialView>>>> {
    let staff = staff?;
    policy.require(&staff, Resource::Passwords, Action::Read)?;
    visible_vote(&votes, &staff, vote_id).await?;

    let connection = pages
        .paginate(&credentials, doc! { "vote_id": vote_id }, &page)
        .await?;
    Ok(Envelope::ok(connection.map(CredentialView::from)))
}

#[post("/passwords", data = "<request>", format = "json")]
pub async fn create_passwords(
    staff: std::result::Result<StaffClaims, Error>,
    request: Json<PasswordCreateRequest>,
    votes: Coll<Vote>,
    store: &State<MongoCredentialStore>,
    codec: &State<SymmetricCodec>,
    policy: &State<Arc<dyn Authorize>>,
) -> Result<Json<Envelope<IssuedCredentials>>> {
    let staff = staff?;
    policy.require(&staff, Resource::Passwords, Action::Create)?;
    let vote = visible_vote(&votes, &staff, request.vote_id).await?;

    let count = store
        .issue_random(codec, vote.id, request.number, request.length, request.format)
        .await?;
    Ok(Envelope::ok(IssuedCredentials {
        vote_id: vote.id,
        count,
    }))
}

/// Non-admins may only decrypt credentials issued for votes they own.
async fn require_owned(
    staff: &StaffClaims,
    ciphertexts: &[String],
    votes: &Coll<Vote>,
    credentials: &Coll<Credential>,
) -> Result<()> {
    if staff.is_admin() {
        return Ok(());
    }
    let requested: BTreeSet<&String> = ciphertexts.iter().collect();
    let known = doc! { "password": { "$in": ciphertexts } };
    let matched = credentials
        .distinct("password", known.clone(), None)
        .await?
        .len();
    let vote_ids = credentials.distinct("vote_id", known, None).await?;
    let foreign = votes
        .count_documents(
            doc! { "_id": { "$in": vote_ids }, "owner": { "$ne": staff.id } },
            None,
        )
        .await?;
    if matched != requested.len() || foreign > 0 {
        warn!(
            "Denied decrypting passwords outside own votes to user {} ({})",
            staff.id, staff.account
        );
        return Err(Error::Forbidden(
            "Passwords do not belong to your votes".to_string(),
        ));
    }
    Ok(())
}

/// Map each ciphertext to its secret. One malformed entry fails the request.
#[post("/passwords/decrypt", data = "<ciphertexts>", format = "json")]
pub async fn decrypt_passwords(
    staff: std::result::Result<StaffClaims, Error>,
    ciphertexts: Json<Vec<String>>,
    votes: Coll<Vote>,
    credentials: Coll<Credential>,
    codec: &State<SymmetricCodec>,
    policy: &State<Arc<dyn Authorize>>,
) -> Result<Json<Envelope<BTreeMap<String, String>>>> {
    let staff = staff?;
    policy.require(&staff, Resource::Passwords, Action::Decrypt)?;
    let ciphertexts = ciphertexts.into_inner();
    if ciphertexts.is_empty() {
        return Err(Error::validation("No password provided"));
    }
    require_owned(&staff, &ciphertexts, &votes, &credentials).await?;

    let plain = ciphertexts
        .into_iter()
        .map(|ciphertext| -> Result<(String, String)> {
            let secret = codec.decrypt(&ciphertext)?;
            Ok((ciphertext, secret))
        })
        .collect::<Result<BTreeMap<_, _>>>()?;
    Ok(Envelope::ok(plain))
}

#[cfg(test)]
mod tests {
    use rocket::{
        futures::TryStreamExt,
        http::{ContentType, Status},
        local::asynchronous::Client,
        serde::json::serde_json::json,
    };

    use crate::model::{
        api::{request::CreateVoteRequest, response::CreatedVote},
        credentials::SecretFormat,
        db::{credential::CredentialStatus, user::User},
    };

    use super::*;

    async fn create_vote(client: &Client) -> VoteId {
        let response = client
            .post(uri!(crate::api::votes::create_vote))
            .header(ContentType::JSON)
            .body(json!(CreateVoteRequest::example()).to_string())
            .dispatch()
            .await;
        let created: Envelope<CreatedVote> = response.into_json().await.unwrap();
        created.data.vote.id
    }

    #[backend_test(admin)]
    async fn issue_list_and_decrypt(client: Client, credentials: Coll<Credential>) {
        let vote_id = create_vote(&client).await;

        let request = PasswordCreateRequest {
            vote_id,
            number: 12,
            length: 8,
            format: SecretFormat::MixUpper,
        };
        let response = client
            .post(uri!(create_passwords))
            .header(ContentType::JSON)
            .body(json!(request).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let issued: Envelope<IssuedCredentials> = response.into_json().await.unwrap();
        assert_eq!(issued.data.count, 12);
        assert_eq!(credentials.count_documents(None, None).await.unwrap(), 12);

        let response = client
            .get(format!("/passwords?vote_id={vote_id}&first=5"))
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let page: Envelope<Connection<CredentialView>> = response.into_json().await.unwrap();
        assert_eq!(page.data.total_count, 12);
        assert_eq!(page.data.edges.len(), 5);
        assert!(page
            .data
            .edges
            .iter()
            .all(|e| e.node.status == CredentialStatus::Issued));

        let ciphertexts: Vec<String> = page
            .data
            .edges
            .iter()
            .map(|e| e.node.password.clone())
            .collect();
        let response = client
            .post(uri!(decrypt_passwords))
            .header(ContentType::JSON)
            .body(json!(ciphertexts).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let plain: Envelope<BTreeMap<String, String>> = response.into_json().await.unwrap();
        assert_eq!(plain.data.len(), 5);
        for secret in plain.data.values() {
            assert_eq!(secret.len(), 8);
            assert!(secret
                .bytes()
                .all(|c| SecretFormat::MixUpper.alphabet().contains(&c)));
        }
    }

    #[backend_test(admin)]
    async fn malformed_ciphertext_is_rejected(client: Client) {
        let codec = client.rocket().state::<SymmetricCodec>().unwrap();
        let good = codec.encrypt("abcdef");
        let response = client
            .post(uri!(decrypt_passwords))
            .header(ContentType::JSON)
            .body(json!([good, "%%%"]).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());
    }

    #[backend_test(admin)]
    async fn bad_batches(client: Client, credentials: Coll<Credential>) {
        let vote_id = create_vote(&client).await;
        for request in [
            PasswordCreateRequest {
                vote_id,
                number: 0,
                length: 8,
                format: SecretFormat::Int,
            },
            PasswordCreateRequest {
                vote_id: VoteId::new(),
                number: 3,
                length: 8,
                format: SecretFormat::Int,
            },
        ] {
            let response = client
                .post(uri!(create_passwords))
                .header(ContentType::JSON)
                .body(json!(request).to_string())
                .dispatch()
                .await;
            assert!(response.status().code >= 400);
        }
        assert_eq!(credentials.count_documents(None, None).await.unwrap(), 0);
    }

    async fn issue(client: &Client, vote_id: VoteId, number: usize) -> Status {
        let request = PasswordCreateRequest {
            vote_id,
            number,
            length: 6,
            format: SecretFormat::Int,
        };
        client
            .post(uri!(create_passwords))
            .header(ContentType::JSON)
            .body(json!(request).to_string())
            .dispatch()
            .await
            .status()
    }

    async fn decrypt_status(client: &Client, ciphertexts: &[String]) -> Status {
        client
            .post(uri!(decrypt_passwords))
            .header(ContentType::JSON)
            .body(json!(ciphertexts).to_string())
            .dispatch()
            .await
            .status()
    }

    #[backend_test(admin)]
    async fn batches_accumulate_per_vote(client: Client, credentials: Coll<Credential>) {
        let vote_id = create_vote(&client).await;
        assert_eq!(Status::Ok, issue(&client, vote_id, 3000).await);
        assert_eq!(Status::Ok, issue(&client, vote_id, 3000).await);
        assert_eq!(credentials.count_documents(None, None).await.unwrap(), 6000);
    }

    #[backend_test(admin)]
    async fn empty_decrypt_is_rejected(client: Client) {
        let response = client
            .post(uri!(decrypt_passwords))
            .header(ContentType::JSON)
            .body("[]")
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());
        let body: crate::error::ErrorBody = response.into_json().await.unwrap();
        assert_eq!(body.msg, "No password provided");
    }

    #[backend_test(creator)]
    async fn creators_decrypt_only_their_own(
        client: Client,
        votes: Coll<Vote>,
        credentials: Coll<Credential>,
    ) {
        let own_vote = create_vote(&client).await;
        assert_eq!(Status::Ok, issue(&client, own_vote, 2).await);
        let own: Vec<String> = credentials
            .find(doc! { "vote_id": own_vote }, None)
            .await
            .unwrap()
            .map_ok(|c| c.password)
            .try_collect()
            .await
            .unwrap();

        let foreign_vote = Vote::example(99, User::example_admin().id);
        votes.insert_one(&foreign_vote, None).await.unwrap();
        let codec = client.rocket().state::<SymmetricCodec>().unwrap();
        let store = client.rocket().state::<MongoCredentialStore>().unwrap();
        store
            .issue_batch(codec, foreign_vote.id, &["foreign-secret".to_string()])
            .await
            .unwrap();
        let foreign = codec.encrypt("foreign-secret");
        let unissued = codec.encrypt("never-issued");

        assert_eq!(Status::Ok, decrypt_status(&client, &own).await);
        let mixed = vec![own[0].clone(), foreign];
        assert_eq!(Status::Forbidden, decrypt_status(&client, &mixed).await);
        assert_eq!(Status::Forbidden, decrypt_status(&client, &[unissued]).await);
    }

    #[backend_test]
    async fn passwords_require_staff(client: Client) {
        let response = client
            .post(uri!(decrypt_passwords))
            .header(ContentType::JSON)
            .body("[]")
            .dispatch()
            .await;
        assert_eq!(Status::Unauthorized, response.status());
    }
}
