use rocket::{http::Status, serde::json::Json, Catcher, Request, Route};

use crate::error::{ErrorBody, CODE_FAILURE};

pub mod anon;
pub mod ballot;
pub mod passwords;
pub mod users;
pub mod voter;
pub mod votes;

pub fn routes() -> Vec<Route> {
    let mut routes = routes![health_check];
    routes.extend(voter::routes());
    routes.extend(anon::routes());
    routes.extend(ballot::routes());
    routes.extend(users::routes());
    routes.extend(votes::routes());
    routes.extend(passwords::routes());
    routes
}

pub fn catchers() -> Vec<Catcher> {
    catchers![bad_request, unauthorized, forbidden, not_found, unprocessable, internal]
}

#[get("/hc")]
async fn health_check() -> &'static str {
    "ok"
}

fn envelope(status: Status, req: &Request<'_>) -> Json<ErrorBody> {
    debug!("Caught {status} for {}", req.uri());
    Json(ErrorBody {
        code: CODE_FAILURE,
        msg: status.reason_lossy().to_string(),
    })
}

#[catch(400)]
fn bad_request(req: &Request) -> Json<ErrorBody> {
    envelope(Status::BadRequest, req)
}

#[catch(401)]
fn unauthorized(req: &Request) -> Json<ErrorBody> {
    envelope(Status::Unauthorized, req)
}

#[catch(403)]
fn forbidden(req: &Request) -> Json<ErrorBody> {
    envelope(Status::Forbidden, req)
}

#[catch(404)]
fn not_found(req: &Request) -> Json<ErrorBody> {
    envelope(Status::NotFound, req)
}

#[catch(422)]
fn unprocessable(req: &Request) -> Json<ErrorBody> {
    envelope(Status::UnprocessableEntity, req)
}

#[catch(500)]
fn internal(req: &Request) -> Json<ErrorBody> {
    envelope(Status::InternalServerError, req)
}
