use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use madrasati_shared::types::auth::UserRole;

use crate::schema::{refresh_tokens, users};

// --- Users ---

#[derive(Debug, Queryable, Identifiable, Selectable, Clone)]
#[diesel(table_name = users)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub password_hash: String,
    pub role: String,
    pub admin_school_id: Option<i64>,
    pub admin_school_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Unknown role strings are treated as the least privileged role.
    pub fn role(&self) -> UserRole {
        self.role.parse().unwrap_or(UserRole::Parent)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub password_hash: String,
    pub role: String,
}

/// The school a school admin manages.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AdminSchool {
    pub id: i64,
    pub name: String,
}

/// Public shape of a user. The password hash never leaves the service.
#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub role: UserRole,
    pub admin_school: Option<AdminSchool>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        let role = user.role();
        let admin_school = match (user.admin_school_id, user.admin_school_name) {
            (Some(id), Some(name)) if role == UserRole::SchoolAdmin => Some(AdminSchool { id, name }),
            _ => None,
        };
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            phone: user.phone,
            city: user.city,
            role,
            admin_school,
            created_at: user.created_at,
        }
    }
}

// --- Refresh Tokens ---

#[derive(Debug, Queryable, Identifiable)]
#[diesel(table_name = refresh_tokens)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: i64,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = refresh_tokens)]
pub struct NewRefreshToken {
    pub user_id: i64,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: &str, school: Option<(i64, &str)>) -> User {
        User {
            id: 7,
            name: "Huda Salem".into(),
            email: "huda@example.ly".into(),
            phone: Some("0912345678".into()),
            city: Some("Tripoli".into()),
            password_hash: "$argon2id$...".into(),
            role: role.into(),
            admin_school_id: school.map(|(id, _)| id),
            admin_school_name: school.map(|(_, name)| name.to_string()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn school_admin_view_carries_school_reference() {
        let view = UserView::from(user("school_admin", Some((3, "Sunrise Academy"))));
        assert_eq!(view.role, UserRole::SchoolAdmin);
        assert_eq!(view.admin_school, Some(AdminSchool { id: 3, name: "Sunrise Academy".into() }));
    }

    #[test]
    fn parent_view_has_no_school_and_no_hash() {
        let view = UserView::from(user("parent", Some((3, "stale"))));
        assert!(view.admin_school.is_none());

        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "parent");
    }
}
