use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use rocket::{
    http::{
        impl_from_uri_param_identity,
        uri::fmt::{Path, UriDisplay},
    },
    request::FromParam,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::{Collection, StoredRecord};

/// Field names of a stored [`User`], for partial updates and filters.
pub mod fields {
    pub const REG_NUM: &str = "regNum";
    pub const PASSWORD: &str = "password";
    pub const ROLE: &str = "role";
    pub const HAS_VOTED: &str = "hasVoted";
    pub const VOTED_FOR: &str = "votedFor";
    pub const VOTED_AT: &str = "votedAt";
    pub const STATUS: &str = "status";
}

/// A registration number: the primary key of the user directory.
///
/// Always trimmed and upper-cased, so `abc123` and ` ABC123 ` name the same
/// user. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RegNum(String);

impl RegNum {
    /// Normalise a raw registration number, or `None` if it is blank.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalised = raw.trim().to_uppercase();
        if normalised.is_empty() {
            None
        } else {
            Some(Self(normalised))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RegNum {
    type Error = &'static str;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw).ok_or("registration number must not be blank")
    }
}

impl From<RegNum> for String {
    fn from(reg_num: RegNum) -> Self {
        reg_num.0
    }
}

impl From<RegNum> for Value {
    fn from(reg_num: RegNum) -> Self {
        Value::String(reg_num.0)
    }
}

impl Display for RegNum {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl UriDisplay<Path> for RegNum {
    fn fmt(&self, formatter: &mut rocket::http::uri::fmt::Formatter<'_, Path>) -> std::fmt::Result {
        formatter.write_value(&self.0)
    }
}

impl_from_uri_param_identity!([Path] RegNum);

impl<'a> FromParam<'a> for RegNum {
    type Error = &'a str;

    fn from_param(param: &'a str) -> Result<Self, Self::Error> {
        Self::parse(param).ok_or(param)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Voter,
    Contestant,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Voter => "voter",
            Self::Contestant => "contestant",
            Self::Admin => "admin",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Role> for Value {
    fn from(role: Role) -> Self {
        Value::String(role.as_str().to_string())
    }
}

/// Approval state of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Pending,
    Active,
    Rejected,
}

impl From<UserStatus> for Value {
    fn from(status: UserStatus) -> Self {
        Value::String(
            match status {
                UserStatus::Pending => "pending",
                UserStatus::Active => "active",
                UserStatus::Rejected => "rejected",
            }
            .to_string(),
        )
    }
}

/// A user record, as held in the user directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub reg_num: RegNum,
    pub name: String,
    /// Opaque credential; only ever compared via [`User::verify_password`].
    pub password: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default)]
    pub has_voted: bool,
    /// Registration number of the contestant voted for. Only meaningful for voters.
    #[serde(default)]
    pub voted_for: Option<RegNum>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<UserStatus>,
}

impl User {
    /// A user with no classification fields who has not voted.
    pub fn new(reg_num: RegNum, name: String, password: String, role: Role) -> Self {
        Self {
            reg_num,
            name,
            password,
            role,
            year: None,
            branch: None,
            section: None,
            symbol: None,
            has_voted: false,
            voted_for: None,
            voted_at: None,
            status: None,
        }
    }

    /// Check whether the supplied password is correct.
    pub fn verify_password(&self, supplied: &str) -> bool {
        credentials_match(&self.password, supplied)
    }
}

/// The one place stored and supplied credentials are compared.
///
/// Credentials are stored as given, so this is an exact match.
fn credentials_match(stored: &str, supplied: &str) -> bool {
    stored == supplied
}

impl StoredRecord for User {
    const COLLECTION: Collection = Collection::Users;

    fn key(&self) -> String {
        self.reg_num.to_string()
    }
}
