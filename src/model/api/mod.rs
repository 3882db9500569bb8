//! Request and response bodies of the HTTP API.

use rocket::{
    data::{self, Data, FromData},
    http::Status,
    outcome::Outcome,
    serde::json::Json,
    Request,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::Error;

pub mod admin;
pub mod election;
pub mod stats;
pub mod user;

/// A JSON request body. Unlike [`Json`], a missing field or malformed body
/// fails the request with 400 rather than 422.
#[derive(Debug)]
pub struct Body<T>(pub T);

impl<T> Body<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

#[rocket::async_trait]
impl<'r, T: DeserializeOwned> FromData<'r> for Body<T> {
    type Error = Error;

    async fn from_data(req: &'r Request<'_>, data: Data<'r>) -> data::Outcome<'r, Self> {
        match Json::<T>::from_data(req, data).await {
            Outcome::Success(json) => Outcome::Success(Body(json.into_inner())),
            Outcome::Failure((_, e)) => {
                Outcome::Failure((Status::BadRequest, Error::bad_request(e.to_string())))
            }
            Outcome::Forward(data) => Outcome::Forward(data),
        }
    }
}

/// A successful mutation: `{ "success": true, ...body }`.
#[derive(Debug, Serialize)]
pub struct Success<T: Serialize> {
    success: bool,
    #[serde(flatten)]
    body: T,
}

/// No further fields.
#[derive(Debug, Serialize)]
pub struct Empty {}

impl<T: Serialize> Success<T> {
    pub fn new(body: T) -> Json<Self> {
        Json(Self {
            success: true,
            body,
        })
    }
}

impl Success<Empty> {
    pub fn ok() -> Json<Self> {
        Self::new(Empty {})
    }
}
