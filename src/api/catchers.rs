//! Error catchers, so that every failure is answered in the same JSON shape.

use rocket::{
    http::Status,
    response::status::Custom,
    serde::json::Json,
    Catcher, Request,
};

use crate::error::INTERNAL_ERROR_MESSAGE;
use crate::model::api::response::Message;

/// Body of any `401` response.
pub const SESSION_INVALID_MESSAGE: &str = "Admin session is invalid. Please sign in again.";

pub fn catchers() -> Vec<Catcher> {
    catchers![
        bad_request,
        unauthorized,
        not_found,
        unprocessable,
        internal_error,
        fallback
    ]
}

type Failure = Custom<Json<Message>>;

fn failure(status: Status, message: &str) -> Failure {
    Custom(status, Json(Message::failure(message)))
}

#[catch(400)]
fn bad_request() -> Failure {
    failure(Status::BadRequest, "Invalid payload.")
}

#[catch(401)]
fn unauthorized() -> Failure {
    failure(Status::Unauthorized, SESSION_INVALID_MESSAGE)
}

#[catch(404)]
fn not_found(req: &Request) -> Failure {
    failure(Status::NotFound, &format!("No endpoint at {}.", req.uri().path()))
}

/// Bodies that parse but do not fit are reported as plain bad requests.
#[catch(422)]
fn unprocessable() -> Failure {
    failure(Status::BadRequest, "Invalid payload.")
}

#[catch(500)]
fn internal_error() -> Failure {
    failure(Status::InternalServerError, INTERNAL_ERROR_MESSAGE)
}

#[catch(default)]
fn fallback(status: Status, _req: &Request) -> Failure {
    failure(status, status.reason().unwrap_or("Request failed."))
}
