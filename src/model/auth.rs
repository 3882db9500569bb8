//! The "current user" session, kept client-side in a signed cookie.

use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation};
use rocket::{
    http::{Cookie, CookieJar, SameSite, Status},
    outcome::{try_outcome, IntoOutcome},
    request::{FromRequest, Outcome},
    time::Duration,
    Request, State,
};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Error;
use crate::model::user::{RegNum, Role, User};
use crate::store::Storage;

pub const SESSION_COOKIE: &str = "ovs_current_user";

/// The cached view of the logged-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub reg_num: RegNum,
    pub name: String,
    pub role: Role,
    pub has_voted: bool,
    pub voted_for: Option<RegNum>,
}

impl From<&User> for Session {
    fn from(user: &User) -> Self {
        Self {
            reg_num: user.reg_num.clone(),
            name: user.name.clone(),
            role: user.role,
            has_voted: user.has_voted,
            voted_for: user.voted_for.clone(),
        }
    }
}

impl Session {
    #[allow(clippy::missing_panics_doc)]
    /// Serialize this session into a cookie.
    pub fn into_cookie(self, config: &Config) -> Cookie<'static> {
        let claims = Claims {
            session: self,
            expire_at: Utc::now() + config.auth_ttl(),
        };

        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )
        .expect("JWT encoding is infallible with default settings");

        Cookie::build(SESSION_COOKIE, token)
            .max_age(Duration::seconds(config.auth_ttl().num_seconds()))
            .http_only(true)
            .same_site(SameSite::Strict)
            .finish()
    }

    /// Deserialize a session from a cookie.
    pub fn from_cookie(cookie: &Cookie<'_>, config: &Config) -> Result<Self, Error> {
        let session = jsonwebtoken::decode(
            cookie.value(),
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )
        .map(|claims: TokenData<Claims>| claims.claims.session)?;
        Ok(session)
    }

    /// Write `user` as the current session.
    pub fn save(cookies: &CookieJar<'_>, config: &Config, user: &User) {
        cookies.add(Session::from(user).into_cookie(config));
    }

    /// Rewrite the current session from `user`, but only if the session
    /// belongs to the user identified by `previous`.
    pub fn refresh_if_current(
        current: &Session,
        previous: &RegNum,
        cookies: &CookieJar<'_>,
        config: &Config,
        user: &User,
    ) {
        if &current.reg_num == previous {
            Session::save(cookies, config, user);
        }
    }

    pub fn clear(cookies: &CookieJar<'_>) {
        cookies.remove(Cookie::named(SESSION_COOKIE));
    }
}

/// Cookie claims: the session plus an expiry datetime.
#[derive(Serialize, Deserialize)]
struct Claims {
    #[serde(flatten)]
    session: Session,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for Session {
    type Error = Error;

    /// Get the session from the cookie, forwarding if there is none or it
    /// cannot be decoded.
    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        // Unwrap is safe as `Config` is always managed.
        let config = req.guard::<&State<Config>>().await.unwrap();
        let cookie = try_outcome!(req.cookies().get(SESSION_COOKIE).or_forward(()));
        Session::from_cookie(cookie, config).or_forward(())
    }
}

/// A session belonging to an admin whose account still exists.
pub struct AdminSession(pub Session);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminSession {
    type Error = Error;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let unauthorized = || {
            Outcome::Failure((
                Status::Unauthorized,
                Error::unauthorized("Admin login required."),
            ))
        };

        let session = match req.guard::<Session>().await {
            Outcome::Success(session) => session,
            Outcome::Failure(failure) => return Outcome::Failure(failure),
            Outcome::Forward(()) => return unauthorized(),
        };
        if session.role != Role::Admin {
            return unauthorized();
        }

        // Check the account still exists and is still an admin.
        let storage = req.guard::<&State<Storage>>().await.unwrap();
        match storage.fetch::<User>(session.reg_num.as_str()).await {
            Ok(Some(user)) if user.role == Role::Admin => Outcome::Success(AdminSession(session)),
            Ok(_) => unauthorized(),
            Err(e) => Outcome::Failure((Status::InternalServerError, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config::example()
    }

    #[test]
    fn cookie_round_trip() {
        let mut user = User::example_voted("V1", "C1");
        user.name = "Ann".to_string();
        let cookie = Session::from(&user).into_cookie(&config());
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));

        let session = Session::from_cookie(&cookie, &config()).unwrap();
        assert_eq!(session, Session::from(&user));
        assert!(session.has_voted);
        assert_eq!(session.voted_for, Some(RegNum::example("C1")));
    }

    #[test]
    fn wrong_secret_rejected() {
        let cookie = Session::from(&User::example_voter("V1")).into_cookie(&config());
        let other = Config::example_with_secret("a different secret");
        assert!(Session::from_cookie(&cookie, &other).is_err());
    }
}
