//! Casting votes.
//!
//! The vote itself is a single overwrite of the voter's record. Nothing here
//! stops a vote outside the election window, a repeat vote (the later one
//! wins), or a vote for someone who is not a contestant, unless the caller
//! runs [`check_vote`] first.

use chrono::{DateTime, Utc};
use log::info;

use crate::error::{Error, Result};
use crate::model::{
    election,
    user::{fields, RegNum, Role, User},
};
use crate::store::{Collection, Storage, Update};

/// Record that `voter` voted for `candidate`, returning the time of the vote.
/// Fails with a not-found error if there is no such voter record.
pub async fn cast_vote(
    storage: &Storage,
    voter: &RegNum,
    candidate: &RegNum,
) -> Result<DateTime<Utc>> {
    let now = Utc::now();
    let update = Update::new()
        .set(fields::HAS_VOTED, true)
        .set(fields::VOTED_FOR, candidate.clone())
        .set(fields::VOTED_AT, now.to_rfc3339());
    storage
        .update(Collection::Users, voter.as_str(), update)
        .await?;
    info!("{voter} voted");
    Ok(now)
}

/// The guards applied when strict voting is enabled: the election must be
/// active, the voter must be a voter who has not yet voted, and the
/// candidate must be an existing contestant.
pub async fn check_vote(storage: &Storage, voter: &RegNum, candidate: &RegNum) -> Result<()> {
    let state = election::get_status(storage).await?;
    if !state.is_active {
        return Err(Error::bad_request("The election is not active."));
    }

    let voter = storage
        .fetch::<User>(voter.as_str())
        .await?
        .ok_or_else(|| Error::not_found(format!("Voter {voter}")))?;
    if voter.role != Role::Voter {
        return Err(Error::bad_request(format!("{} is not a voter.", voter.reg_num)));
    }
    if voter.has_voted {
        return Err(Error::bad_request(format!(
            "{} has already voted.",
            voter.reg_num
        )));
    }

    let is_contestant = storage
        .fetch::<User>(candidate.as_str())
        .await?
        .map_or(false, |user| user.role == Role::Contestant);
    if !is_contestant {
        return Err(Error::bad_request(format!(
            "{candidate} is not a contestant."
        )));
    }
    Ok(())
}
