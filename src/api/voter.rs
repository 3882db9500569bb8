use rocket::{http::CookieJar, serde::json::Json, Route, State};

use crate::{
    config::Config,
    error::Result,
    model::{
        api::{
            user::{Ballot, Voted},
            Body, Success,
        },
        auth::Session,
        vote,
    },
    store::Storage,
};

pub fn routes() -> Vec<Route> {
    routes![cast_vote]
}

#[post("/vote", data = "<ballot>", format = "json")]
pub async fn cast_vote(
    ballot: Body<Ballot>,
    session: Option<Session>,
    cookies: &CookieJar<'_>,
    storage: Storage,
    config: &State<Config>,
) -> Result<Json<Success<Voted>>> {
    let Ballot {
        voter_id,
        candidate_id,
    } = ballot.into_inner();

    if config.strict_voting() {
        vote::check_vote(&storage, &voter_id, &candidate_id).await?;
    }
    let voted_at = vote::cast_vote(&storage, &voter_id, &candidate_id).await?;

    // Keep the voter's own session in step with the record.
    if let Some(mut session) = session.filter(|session| session.reg_num == voter_id) {
        session.has_voted = true;
        session.voted_for = Some(candidate_id);
        cookies.add(session.into_cookie(config));
    }

    Ok(Success::new(Voted { voted_at }))
}
