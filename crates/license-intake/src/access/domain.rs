use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdminId(pub Uuid);

impl AdminId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for AdminId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for AdminId {
    type Err = uuid::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(raw.trim()).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminRole {
    Admin,
    SuperAdmin,
}

impl AdminRole {
    pub const fn label(self) -> &'static str {
        match self {
            AdminRole::Admin => "admin",
            AdminRole::SuperAdmin => "super_admin",
        }
    }

    pub const fn can_delete_submissions(self) -> bool {
        matches!(self, AdminRole::SuperAdmin)
    }

    pub const fn can_manage_admins(self) -> bool {
        matches!(self, AdminRole::SuperAdmin)
    }
}

impl fmt::Display for AdminRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for AdminRole {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "admin" => Ok(Self::Admin),
            "super_admin" => Ok(Self::SuperAdmin),
            other => Err(format!("unknown admin role '{other}'")),
        }
    }
}

/// Staff account able to review submissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Admin {
    pub id: AdminId,
    pub username: String,
    pub email: String,
    pub role: AdminRole,
    pub is_active: bool,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Admin {
    pub fn session(&self) -> AdminSession {
        AdminSession {
            admin_id: self.id,
            username: self.username.clone(),
            role: self.role,
        }
    }
}

/// Authenticated principal attached to admin requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminSession {
    pub admin_id: AdminId,
    pub username: String,
    pub role: AdminRole,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    pub total: u64,
    pub active: u64,
    pub inactive: u64,
    pub recent_logins: u64,
}
