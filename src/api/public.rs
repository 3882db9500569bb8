use rocket::{serde::json::Json, Route};

use crate::{
    error::Result,
    model::{
        api::user::CandidateProfile,
        directory,
        election::{self, ElectionState},
    },
    store::Storage,
};

pub fn routes() -> Vec<Route> {
    routes![status, candidates]
}

#[get("/status")]
async fn status(storage: Storage) -> Result<Json<ElectionState>> {
    let state = election::get_status(&storage).await?;
    Ok(Json(state))
}

/// The ballot: every contestant, without vote counts.
#[get("/candidates")]
async fn candidates(storage: Storage) -> Result<Json<Vec<CandidateProfile>>> {
    let candidates = directory::list_candidates(&storage)
        .await?
        .into_iter()
        .map(CandidateProfile::from)
        .collect();
    Ok(Json(candidates))
}

#[cfg(test)]
mod tests {
    use rocket::{http::Status, local::asynchronous::Client};
    use serde_json::Value;

    use super::*;
    use crate::model::user::User;

    #[backend_test]
    async fn fresh_status_is_inactive(client: Client) {
        let response = client.get(uri!("/api", status)).dispatch().await;
        assert_eq!(Status::Ok, response.status());

        let state: ElectionState = response.into_json().await.unwrap();
        assert_eq!(ElectionState::default(), state);
    }

    #[backend_test]
    async fn status_reflects_store(client: Client, storage: Storage) {
        election::set_active(&storage, true).await.unwrap();

        let response = client.get(uri!("/api", status)).dispatch().await;
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["isActive"], Value::Bool(true));
        assert_eq!(body["isCompleted"], Value::Bool(false));
        assert_eq!(body["endTime"], Value::Null);
    }

    #[backend_test]
    async fn candidates_lists_contestants(client: Client, storage: Storage) {
        for user in [
            User::example_contestant("C2"),
            User::example_voted("V1", "C2"),
            User::example_contestant("C1"),
        ] {
            directory::register(&storage, &user).await.unwrap();
        }

        let response = client.get(uri!("/api", candidates)).dispatch().await;
        assert_eq!(Status::Ok, response.status());

        let body: Vec<Value> = response.into_json().await.unwrap();
        let regs: Vec<_> = body.iter().map(|c| c["regNum"].as_str().unwrap()).collect();
        assert_eq!(vec!["C1", "C2"], regs);
        assert!(body.iter().all(|c| c.get("password").is_none()));
        assert!(body.iter().all(|c| c.get("hasVoted").is_none()));
    }
}
