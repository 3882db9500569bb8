use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{api::user::UserProfile, tally::TallySnapshot, user::RegNum};

/// The admin view of a tally, including the contestant and voter lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsDescription {
    pub total_contestants: usize,
    pub total_voters: usize,
    pub votes_cast: usize,
    pub votes_not_cast: usize,
    pub candidate_votes: BTreeMap<RegNum, u64>,
    pub contestants: Vec<UserProfile>,
    pub voters: Vec<UserProfile>,
}

impl From<TallySnapshot> for StatsDescription {
    fn from(tally: TallySnapshot) -> Self {
        Self {
            total_contestants: tally.total_contestants,
            total_voters: tally.total_voters,
            votes_cast: tally.votes_cast,
            votes_not_cast: tally.votes_not_cast,
            candidate_votes: tally.candidate_votes,
            contestants: tally.contestants.into_iter().map(Into::into).collect(),
            voters: tally.voters.into_iter().map(Into::into).collect(),
        }
    }
}
