use rocket::{http::Status, serde::json::Json, Catcher, Request, Route};
use serde_json::{json, Value};

mod admin;
mod auth;
mod election;
mod public;
mod voter;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(public::routes());
    routes.extend(auth::routes());
    routes.extend(voter::routes());
    routes.extend(admin::routes());
    routes.extend(election::routes());
    routes
}

pub fn catchers() -> Vec<Catcher> {
    catchers![default_catcher]
}

/// Render guard and routing failures in the same shape as [`crate::error::Error`].
#[catch(default)]
fn default_catcher(status: Status, _req: &Request) -> (Status, Json<Value>) {
    let message = match status.code {
        401 => "Login required.",
        _ => status.reason().unwrap_or("Unknown error"),
    };
    (
        status,
        Json(json!({
            "success": false,
            "error": message,
        })),
    )
}
