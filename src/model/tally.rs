use std::collections::BTreeMap;

use crate::model::user::{RegNum, Role, User};

/// Vote counts and aggregate statistics, derived from the user directory on
/// demand. Never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TallySnapshot {
    pub total_contestants: usize,
    pub total_voters: usize,
    pub votes_cast: usize,
    pub votes_not_cast: usize,
    /// Every contestant, including those with no votes.
    pub candidate_votes: BTreeMap<RegNum, u64>,
    pub contestants: Vec<User>,
    pub voters: Vec<User>,
}

impl TallySnapshot {
    /// Tally the given users. Admins are ignored.
    ///
    /// A vote naming someone who is not (or is no longer) a contestant still
    /// counts towards `votes_cast`, but not towards any candidate.
    pub fn compute(users: impl IntoIterator<Item = User>) -> Self {
        let mut contestants = Vec::new();
        let mut voters = Vec::new();
        for user in users {
            match user.role {
                Role::Contestant => contestants.push(user),
                Role::Voter => voters.push(user),
                Role::Admin => {}
            }
        }

        let votes_cast = voters.iter().filter(|voter| voter.has_voted).count();

        let mut candidate_votes: BTreeMap<RegNum, u64> = contestants
            .iter()
            .map(|contestant| (contestant.reg_num.clone(), 0))
            .collect();
        for voter in voters.iter().filter(|voter| voter.has_voted) {
            if let Some(count) = voter
                .voted_for
                .as_ref()
                .and_then(|candidate| candidate_votes.get_mut(candidate))
            {
                *count += 1;
            }
        }

        Self {
            total_contestants: contestants.len(),
            total_voters: voters.len(),
            votes_cast,
            votes_not_cast: voters.len() - votes_cast,
            candidate_votes,
            contestants,
            voters,
        }
    }

    /// Total of all per-candidate counts. At most `votes_cast`.
    pub fn counted_votes(&self) -> u64 {
        self.candidate_votes.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reg(raw: &str) -> RegNum {
        RegNum::example(raw)
    }

    #[test]
    fn single_vote() {
        let tally = TallySnapshot::compute(vec![
            User::example_contestant("C1"),
            User::example_contestant("C2"),
            User::example_voted("V1", "C1"),
        ]);
        assert_eq!(
            tally.candidate_votes,
            BTreeMap::from([(reg("C1"), 1), (reg("C2"), 0)])
        );
        assert_eq!(tally.votes_cast, 1);
        assert_eq!(tally.votes_not_cast, 0);
        assert_eq!(tally.total_contestants, 2);
        assert_eq!(tally.total_voters, 1);
    }

    #[test]
    fn stale_votes_are_dropped() {
        // C1 was deleted after V1 voted for them.
        let tally = TallySnapshot::compute(vec![
            User::example_contestant("C2"),
            User::example_voted("V1", "C1"),
        ]);
        assert!(!tally.candidate_votes.contains_key(&reg("C1")));
        assert_eq!(tally.candidate_votes.get(&reg("C2")), Some(&0));
        assert_eq!(tally.votes_cast, 1);
        assert_eq!(tally.counted_votes(), 0);
    }

    #[test]
    fn admins_and_unvoted_flags_ignored() {
        let mut admin = User::example_voted("ADMIN001", "C1");
        admin.role = Role::Admin;
        // Marked as voted-for but not as voted: does not count.
        let mut half = User::example_voter("V2");
        half.voted_for = Some(reg("C1"));
        // Voted for a voter: counts as cast, not for anyone.
        let odd = User::example_voted("V3", "V2");

        let tally = TallySnapshot::compute(vec![
            admin,
            User::example_contestant("C1"),
            half,
            odd,
            User::example_voted("V4", "C1"),
        ]);
        assert_eq!(tally.total_voters, 3);
        assert_eq!(tally.votes_cast, 2);
        assert_eq!(tally.votes_not_cast, 1);
        assert_eq!(tally.candidate_votes, BTreeMap::from([(reg("C1"), 1)]));
    }

    #[test]
    fn counts_are_consistent() {
        let mut users = vec![
            User::example_contestant("C1"),
            User::example_contestant("C2"),
            User::example_contestant("C3"),
        ];
        for i in 0..30 {
            let reg_num = format!("V{i}");
            users.push(match i % 5 {
                0 => User::example_voter(&reg_num),
                1 => User::example_voted(&reg_num, "C1"),
                2 => User::example_voted(&reg_num, "C2"),
                3 => User::example_voted(&reg_num, "GONE"),
                _ => User::example_voted(&reg_num, "C1"),
            });
        }
        let tally = TallySnapshot::compute(users);
        assert_eq!(tally.votes_cast + tally.votes_not_cast, tally.total_voters);
        assert!(tally.counted_votes() <= tally.votes_cast as u64);
        assert_eq!(tally.counted_votes(), 18);
        assert_eq!(tally.votes_cast, 24);
        assert_eq!(tally.candidate_votes.get(&reg("C3")), Some(&0));
    }

    #[test]
    fn no_stale_votes_means_equality() {
        let tally = TallySnapshot::compute(vec![
            User::example_contestant("C1"),
            User::example_voted("V1", "C1"),
            User::example_voted("V2", "C1"),
            User::example_voter("V3"),
        ]);
        assert_eq!(tally.counted_votes(), tally.votes_cast as u64);
    }
}
