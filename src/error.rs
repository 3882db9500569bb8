use jsonwebtoken::errors::{Error as JwtError, ErrorKind as JwtErrorKind};
use log::{error, warn};
use mongodb::{bson::ser::Error as BsonError, error::Error as MongoError};
use rocket::{
    http::Status,
    response::{self, Responder},
    serde::json::Json,
    Request,
};
use serde_json::{json, Error as JsonError};
use sqlx::Error as SqlxError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Mongo(#[from] MongoError),
    #[error(transparent)]
    Bson(#[from] BsonError),
    #[error(transparent)]
    Sqlite(#[from] SqlxError),
    #[error("Malformed record: {0}")]
    Json(#[from] JsonError),
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error("Duplicate key '{key}' in {collection}")]
    DuplicateKey {
        collection: &'static str,
        key: String,
    },
    #[error("{1}")]
    Status(Status, String),
}

impl Error {
    pub fn not_found(what: impl AsRef<str>) -> Self {
        Self::Status(Status::NotFound, format!("Not found: {}", what.as_ref()))
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Status(Status::BadRequest, message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::Status(Status::BadRequest, message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Status(Status::Unauthorized, message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Status(Status::InternalServerError, message.into())
    }

    /// The HTTP status this error is reported with.
    pub fn status(&self) -> Status {
        match self {
            Self::Mongo(_) | Self::Bson(_) | Self::Sqlite(_) | Self::Json(_) => {
                Status::InternalServerError
            }
            Self::Jwt(err) => match err.kind() {
                JwtErrorKind::ExpiredSignature | JwtErrorKind::ImmatureSignature => {
                    Status::Unauthorized
                }
                _ => Status::BadRequest,
            },
            Self::DuplicateKey { .. } => Status::BadRequest,
            Self::Status(status, _) => *status,
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let status = self.status();
        if status.code >= 500 {
            error!("{self}");
        } else {
            warn!("{self}");
        }
        let body = Json(json!({
            "success": false,
            "error": self.to_string(),
        }));
        (status, body).respond_to(req)
    }
}
