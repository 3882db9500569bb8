use rocket::{serde::json::Json, Route};

use crate::{
    error::Result,
    model::{
        api::{
            election::{Completion, Pause, ResetSummary, Resumed, Schedule, Toggle},
            Body, Success,
        },
        auth::AdminSession,
        election::{self, ElectionState},
    },
    store::Storage,
};

pub fn routes() -> Vec<Route> {
    routes![toggle, set_times, complete, pause, resume, reset]
}

/// Respond with the election state after a change.
async fn current_state(storage: &Storage) -> Result<Json<Success<ElectionState>>> {
    let state = election::get_status(storage).await?;
    Ok(Success::new(state))
}

#[post("/election/toggle", data = "<request>", format = "json")]
async fn toggle(
    _admin: AdminSession,
    request: Body<Toggle>,
    storage: Storage,
) -> Result<Json<Success<ElectionState>>> {
    election::set_active(&storage, request.0.is_active).await?;
    current_state(&storage).await
}

#[post("/election/times", data = "<request>", format = "json")]
async fn set_times(
    _admin: AdminSession,
    request: Body<Schedule>,
    storage: Storage,
) -> Result<Json<Success<ElectionState>>> {
    let Schedule {
        start_time,
        end_time,
    } = request.into_inner();
    election::set_times(&storage, start_time, end_time).await?;
    current_state(&storage).await
}

#[post("/election/complete", data = "<request>", format = "json")]
async fn complete(
    _admin: AdminSession,
    request: Body<Completion>,
    storage: Storage,
) -> Result<Json<Success<ElectionState>>> {
    election::set_completed(&storage, request.0.is_completed).await?;
    current_state(&storage).await
}

#[post("/election/pause", data = "<request>", format = "json")]
async fn pause(
    _admin: AdminSession,
    request: Body<Pause>,
    storage: Storage,
) -> Result<Json<Success<ElectionState>>> {
    election::pause(&storage, request.0.remaining_ms).await?;
    current_state(&storage).await
}

#[post("/election/resume")]
async fn resume(_admin: AdminSession, storage: Storage) -> Result<Json<Success<Resumed>>> {
    let resumed = election::resume(&storage).await?;
    Ok(Success::new(Resumed { resumed }))
}

#[post("/election/reset")]
async fn reset(_admin: AdminSession, storage: Storage) -> Result<Json<Success<ResetSummary>>> {
    let users_cleared = election::reset(&storage).await?;
    Ok(Success::new(ResetSummary { users_cleared }))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::Client,
    };
    use serde_json::{json, Value};

    use super::*;
    use crate::model::{
        directory,
        user::{RegNum, User},
    };

    async fn post_json(client: &Client, uri: &'static str, body: Value) -> Status {
        client
            .post(uri)
            .header(ContentType::JSON)
            .body(body.to_string())
            .dispatch()
            .await
            .status()
    }

    #[backend_test]
    async fn election_routes_need_admin(client: Client, storage: Storage) {
        let status = post_json(&client, "/api/election/toggle", json!({ "isActive": true })).await;
        assert_eq!(Status::Unauthorized, status);

        let response = client.post(uri!("/api", reset)).dispatch().await;
        assert_eq!(Status::Unauthorized, response.status());

        let state = election::get_status(&storage).await.unwrap();
        assert!(!state.is_active);
    }

    #[backend_test(admin)]
    async fn toggle_and_complete(client: Client, storage: Storage) {
        let response = client
            .post(uri!("/api", toggle))
            .header(ContentType::JSON)
            .body(json!({ "isActive": true }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["isActive"], json!(true));

        let status = post_json(&client, "/api/election/complete", json!({ "isCompleted": true })).await;
        assert_eq!(Status::Ok, status);
        let state = election::get_status(&storage).await.unwrap();
        assert!(state.is_completed);
        assert!(!state.is_active);

        let status = post_json(&client, "/api/election/toggle", json!({})).await;
        assert_eq!(Status::BadRequest, status);
    }

    #[backend_test(admin)]
    async fn schedule_pause_resume(client: Client, storage: Storage) {
        let start = Utc.with_ymd_and_hms(2030, 1, 1, 9, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2030, 1, 1, 17, 0, 0).unwrap();

        // Nothing to resume yet.
        let response = client.post(uri!("/api", resume)).dispatch().await;
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body, json!({ "success": true, "resumed": false }));
        assert!(!election::get_status(&storage).await.unwrap().is_active);

        let status = post_json(
            &client,
            "/api/election/times",
            json!({ "startTime": start, "endTime": end }),
        )
        .await;
        assert_eq!(Status::Ok, status);
        let state = election::get_status(&storage).await.unwrap();
        assert_eq!(Some(start), state.start_time);
        assert_eq!(Some(end), state.end_time);

        for remaining in [json!(-1), json!(i64::MAX)] {
            let status =
                post_json(&client, "/api/election/pause", json!({ "remainingMs": remaining })).await;
            assert_eq!(Status::BadRequest, status);
        }
        assert_eq!(None, election::get_status(&storage).await.unwrap().frozen_remaining);

        let status = post_json(&client, "/api/election/pause", json!({ "remainingMs": 60_000 })).await;
        assert_eq!(Status::Ok, status);
        let state = election::get_status(&storage).await.unwrap();
        assert!(!state.is_active);
        assert_eq!(Some(60_000), state.frozen_remaining);

        let before = Utc::now();
        let response = client.post(uri!("/api", resume)).dispatch().await;
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["resumed"], json!(true));

        let state = election::get_status(&storage).await.unwrap();
        assert!(state.is_active);
        assert_eq!(None, state.frozen_remaining);
        let new_end = state.end_time.unwrap();
        assert!(new_end >= before + Duration::milliseconds(60_000) - Duration::seconds(1));
        assert!(new_end <= Utc::now() + Duration::milliseconds(60_000) + Duration::seconds(1));
    }

    #[backend_test(admin)]
    async fn reset_clears_votes(client: Client, storage: Storage) {
        for user in [
            User::example_contestant("C1"),
            User::example_voted("V1", "C1"),
            User::example_voter("V2"),
        ] {
            directory::register(&storage, &user).await.unwrap();
        }
        election::set_completed(&storage, true).await.unwrap();

        let response = client.post(uri!("/api", reset)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body, json!({ "success": true, "usersCleared": 3 }));

        let state = election::get_status(&storage).await.unwrap();
        assert!(!state.is_active);
        assert!(!state.is_completed);
        let voter = directory::get_user(&storage, &RegNum::example("V1"))
            .await
            .unwrap();
        assert!(!voter.has_voted);
        assert_eq!(None, voter.voted_for);
        assert_eq!(None, voter.voted_at);

        // Again, with nothing left to clear.
        let response = client.post(uri!("/api", reset)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
    }
}
