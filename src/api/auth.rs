use rocket::{http::CookieJar, serde::json::Json, Route, State};

use crate::{
    config::Config,
    error::{Error, Result},
    model::{
        api::{
            user::{Credentials, Registration, UserProfile},
            Body, Empty, Success,
        },
        auth::Session,
        directory,
        user::{Role, UserStatus},
    },
    store::Storage,
};

pub fn routes() -> Vec<Route> {
    routes![register, login, current_session, logout]
}

/// Self-registration of a voter or contestant, pending approval.
#[post("/register", data = "<registration>", format = "json")]
pub async fn register(
    registration: Body<Registration>,
    storage: Storage,
) -> Result<Json<Success<UserProfile>>> {
    let registration = registration.into_inner();
    if registration.role == Role::Admin {
        return Err(Error::bad_request("Cannot register as an admin."));
    }

    let user = registration.into_user(UserStatus::Pending);
    directory::register(&storage, &user).await?;
    Ok(Success::new(user.into()))
}

#[post("/login", data = "<credentials>", format = "json")]
pub async fn login(
    credentials: Body<Credentials>,
    cookies: &CookieJar<'_>,
    storage: Storage,
    config: &State<Config>,
) -> Result<Json<UserProfile>> {
    let user = directory::login(&storage, &credentials.0.reg_num, &credentials.0.password)
        .await?
        .ok_or_else(|| Error::unauthorized("Invalid credentials"))?;

    Session::save(cookies, config, &user);
    Ok(Json(user.into()))
}

#[get("/session")]
pub fn current_session(session: Option<Session>) -> Result<Json<Session>> {
    session
        .map(Json)
        .ok_or_else(|| Error::not_found("Session"))
}

#[delete("/session")]
pub fn logout(cookies: &CookieJar<'_>) -> Json<Success<Empty>> {
    Session::clear(cookies);
    Success::ok()
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::Client,
    };
    use serde_json::{json, Value};

    use super::*;
    use crate::model::{
        auth::SESSION_COOKIE,
        user::{RegNum, User},
    };

    #[backend_test]
    async fn register_is_pending(client: Client, storage: Storage) {
        let response = client
            .post(uri!("/api", register))
            .header(ContentType::JSON)
            .body(json!(Registration::example("abc123", Role::Voter)).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["regNum"], json!("ABC123"));
        assert!(body.get("password").is_none());

        let user = directory::get_user(&storage, &RegNum::example("ABC123"))
            .await
            .unwrap();
        assert_eq!(Some(UserStatus::Pending), user.status);
        assert!(!user.has_voted);
    }

    #[backend_test]
    async fn register_duplicate_rejected(client: Client) {
        let first = Registration::example("abc123", Role::Voter);
        client
            .post(uri!("/api", register))
            .header(ContentType::JSON)
            .body(json!(first).to_string())
            .dispatch()
            .await;

        let second = Registration::example("ABC123", Role::Contestant);
        let response = client
            .post(uri!("/api", register))
            .header(ContentType::JSON)
            .body(json!(second).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());

        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["error"], json!("Registration Number already exists."));
    }

    #[backend_test]
    async fn register_rejects_bad_bodies(client: Client) {
        // Admin accounts cannot be self-registered.
        let response = client
            .post(uri!("/api", register))
            .header(ContentType::JSON)
            .body(json!(Registration::example("X1", Role::Admin)).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());

        // Missing fields.
        let response = client
            .post(uri!("/api", register))
            .header(ContentType::JSON)
            .body(json!({ "regNum": "X2" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::BadRequest, response.status());
    }

    #[backend_test]
    async fn login_sets_session(client: Client, storage: Storage) {
        directory::register(&storage, &User::example_voter("V1"))
            .await
            .unwrap();

        let response = client
            .post(uri!("/api", login))
            .header(ContentType::JSON)
            .body(json!({ "regNum": "v1", "password": "password" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());
        assert!(client.cookies().get(SESSION_COOKIE).is_some());

        let profile: UserProfile = response.into_json().await.unwrap();
        assert_eq!(RegNum::example("V1"), profile.reg_num);

        let response = client.get(uri!("/api", current_session)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        let session: Session = response.into_json().await.unwrap();
        assert_eq!(RegNum::example("V1"), session.reg_num);
        assert_eq!(Role::Voter, session.role);

        // Logging out forgets the session.
        let response = client.delete(uri!("/api", logout)).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        assert!(client.cookies().get(SESSION_COOKIE).is_none());

        let response = client.get(uri!("/api", current_session)).dispatch().await;
        assert_eq!(Status::NotFound, response.status());
    }

    #[backend_test]
    async fn login_invalid(client: Client, storage: Storage) {
        directory::register(&storage, &User::example_voter("V1"))
            .await
            .unwrap();

        for (reg_num, password) in [("V1", "wrong"), ("V2", "password"), ("", "password")] {
            let response = client
                .post(uri!("/api", login))
                .header(ContentType::JSON)
                .body(json!({ "regNum": reg_num, "password": password }).to_string())
                .dispatch()
                .await;
            assert_eq!(Status::Unauthorized, response.status());
            assert!(client.cookies().get(SESSION_COOKIE).is_none());
        }
    }

    #[backend_test]
    async fn default_admin_can_log_in(client: Client) {
        let response = client
            .post(uri!("/api", login))
            .header(ContentType::JSON)
            .body(json!({ "regNum": "ADMIN001", "password": "admin123" }).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        let profile: UserProfile = response.into_json().await.unwrap();
        assert_eq!(Role::Admin, profile.role);
        assert_eq!("System Administrator", profile.name);
    }
}
