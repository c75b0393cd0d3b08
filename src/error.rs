use argon2::Error as Argon2Error;
use mongodb::error::Error as DbError;
use rocket::{
    http::{Status, StatusClass},
    response::{status::Custom, Responder},
    serde::json::Json,
    Request,
};
use thiserror::Error;

use crate::model::api::response::Message;

pub type Result<T> = std::result::Result<T, Error>;

/// Shown to clients in place of the details of any internal failure.
pub const INTERNAL_ERROR_MESSAGE: &str = "An internal server error occurred.";

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Argon2(#[from] Argon2Error),
    #[error("Voting is closed because the election has ended.")]
    ElectionClosed,
    #[error("PIN is invalid or has already been used.")]
    InvalidPin,
    #[error("This PIN has already been used to vote.")]
    AlreadyUsed,
    #[error("Candidate {0} not found.")]
    UnknownCandidate(u32),
    #[error("No active PINs exist yet. Ask the committee to generate PINs first.")]
    NoActiveTokens,
    #[error("{1}")]
    Status(Status, String),
}

impl Error {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::Status(Status::BadRequest, message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Status(Status::InternalServerError, message.into())
    }

    /// The HTTP status this error is reported with.
    pub fn status(&self) -> Status {
        match self {
            Self::Db(_) | Self::Argon2(_) => Status::InternalServerError,
            Self::ElectionClosed => Status::Forbidden,
            Self::InvalidPin => Status::Unauthorized,
            Self::AlreadyUsed | Self::NoActiveTokens => Status::Conflict,
            Self::UnknownCandidate(_) => Status::NotFound,
            Self::Status(status, _) => *status,
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> rocket::response::Result<'o> {
        let status = self.status();
        let message = match self {
            // Never leak storage or hashing details.
            Self::Db(_) | Self::Argon2(_) => {
                error!("{self}");
                INTERNAL_ERROR_MESSAGE.to_string()
            }
            _ if status.class() == StatusClass::ServerError => {
                error!("{self}");
                self.to_string()
            }
            _ => {
                debug!("{self}");
                self.to_string()
            }
        };
        Custom(status, Json(Message::failure(message))).respond_to(req)
    }
}
