//! Users: the signed-in profile and the admin user list.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Email, Money, UserId, UserRole};

/// The signed-in user's profile, supplied by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub email: Email,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub role: UserRole,
}

impl UserProfile {
    #[must_use]
    pub const fn new(email: Email) -> Self {
        Self {
            email,
            display_name: None,
            photo_url: None,
            role: UserRole::User,
        }
    }

    /// Display name, falling back to the email's local part.
    #[must_use]
    pub fn name(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| self.email.local_part())
    }
}

/// Body of `POST /users/sync`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSync<'a> {
    pub email: &'a str,
    pub name: &'a str,
}

/// Response of `POST /users/sync`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserSyncResponse {
    #[serde(default)]
    pub role: UserRole,
}

/// A row in the admin user list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedUser {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub email: String,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub orders: u32,
    #[serde(default)]
    pub total_spent: Money,
    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,
}

/// Days of inactivity after which a user counts as inactive.
pub const ACTIVE_WINDOW_DAYS: i64 = 7;

impl ManagedUser {
    /// Logged in within the last [`ACTIVE_WINDOW_DAYS`].
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.last_login
            .is_some_and(|at| at > now - Duration::days(ACTIVE_WINDOW_DAYS))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivityFilter {
    #[default]
    All,
    Active,
    Inactive,
}

/// Admin user list query.
#[derive(Debug, Clone, Default)]
pub struct UserQuery {
    pub search: String,
    pub role: Option<UserRole>,
    pub activity: ActivityFilter,
}

impl UserQuery {
    #[must_use]
    pub fn apply<'a>(&self, users: &'a [ManagedUser], now: DateTime<Utc>) -> Vec<&'a ManagedUser> {
        let needle = self.search.trim().to_lowercase();
        users
            .iter()
            .filter(|u| needle.is_empty() || u.email.to_lowercase().contains(&needle))
            .filter(|u| self.role.is_none_or(|r| u.role == r))
            .filter(|u| match self.activity {
                ActivityFilter::All => true,
                ActivityFilter::Active => u.is_active(now),
                ActivityFilter::Inactive => !u.is_active(now),
            })
            .collect()
    }
}

/// Summary cards on the admin user page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserStats {
    pub total: usize,
    pub admins: usize,
    pub users: usize,
    pub active: usize,
    pub total_revenue: Money,
}

impl UserStats {
    #[must_use]
    pub fn from_users(users: &[ManagedUser], now: DateTime<Utc>) -> Self {
        let admins = users.iter().filter(|u| u.role.is_admin()).count();
        Self {
            total: users.len(),
            admins,
            users: users.len() - admins,
            active: users.iter().filter(|u| u.is_active(now)).count(),
            total_revenue: users.iter().map(|u| u.total_spent).sum(),
        }
    }
}
