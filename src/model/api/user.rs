use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::user::{RegNum, Role, User, UserStatus};

/// A new user, as submitted for registration or by an admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub reg_num: RegNum,
    pub name: String,
    pub password: String,
    pub role: Role,
    #[serde(default)]
    pub year: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
}

impl Registration {
    pub fn into_user(self, status: UserStatus) -> User {
        let mut user = User::new(self.reg_num, self.name, self.password, self.role);
        user.year = self.year;
        user.branch = self.branch;
        user.section = self.section;
        user.symbol = self.symbol;
        user.status = Some(status);
        user
    }
}

/// Login credentials. The registration number is taken raw and normalised on
/// lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub reg_num: String,
    pub password: String,
}

/// A vote for one candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ballot {
    pub voter_id: RegNum,
    pub candidate_id: RegNum,
}

/// Confirmation of a recorded vote.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Voted {
    pub voted_at: DateTime<Utc>,
}

/// A user as shown over the API: everything but the password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub reg_num: RegNum,
    pub name: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    pub has_voted: bool,
    pub voted_for: Option<RegNum>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<UserStatus>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            reg_num: user.reg_num,
            name: user.name,
            role: user.role,
            year: user.year,
            branch: user.branch,
            section: user.section,
            symbol: user.symbol,
            has_voted: user.has_voted,
            voted_for: user.voted_for,
            voted_at: user.voted_at,
            status: user.status,
        }
    }
}

/// A contestant as shown on the ballot. Carries no voting data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateProfile {
    pub reg_num: RegNum,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
}

impl From<User> for CandidateProfile {
    fn from(user: User) -> Self {
        Self {
            reg_num: user.reg_num,
            name: user.name,
            year: user.year,
            branch: user.branch,
            section: user.section,
            symbol: user.symbol,
        }
    }
}

#[cfg(test)]
impl Registration {
    pub fn example(reg_num: &str, role: Role) -> Self {
        Self {
            reg_num: RegNum::example(reg_num),
            name: format!("User {reg_num}"),
            password: "password".to_string(),
            role,
            year: Some("3".to_string()),
            branch: Some("CSE".to_string()),
            section: Some("A".to_string()),
            symbol: None,
        }
    }
}
