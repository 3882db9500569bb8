use serde::{Deserialize, Serialize};

use crate::model::user::{RegNum, Role};

/// Delete every user of one role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearRole {
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChange {
    pub reg_num: RegNum,
    pub new_password: String,
}

/// Move an admin account to a new registration number.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminIdChange {
    pub current_id: RegNum,
    pub new_id: RegNum,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cleared {
    pub deleted: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminIdChanged {
    pub changed: bool,
    pub reg_num: RegNum,
}
