//! User records as served by the admin API.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::UserId;
use crate::role::Role;

/// A user row of the admin directory.
///
/// `created_at` and `is_active` are optional on the wire and only echoed back
/// for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

impl User {
    pub fn new(id: UserId, name: impl Into<String>, email: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            name: name.into(),
            email: email.into(),
            role,
            created_at: None,
            is_active: None,
        }
    }
}

/// Body of `PUT /admin/users/{id}/role`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleChangeRequest {
    #[serde(skip)]
    pub user_id: UserId,
    pub role: Role,
}

impl RoleChangeRequest {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn path(&self) -> String {
        format!("/admin/users/{}/role", self.user_id)
    }
}

/// Drop repeated ids, keeping the first occurrence and the original order.
pub fn dedupe_by_id(users: Vec<User>) -> Vec<User> {
    let mut seen = HashSet::with_capacity(users.len());
    users
        .into_iter()
        .filter(|user| {
            let fresh = seen.insert(user.id);
            if !fresh {
                tracing::warn!(user_id = %user.id, "dropping duplicate user id from list");
            }
            fresh
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_backend_user_out() {
        let json = r#"{
            "id": 7,
            "name": "Alice",
            "email": "alice@example.com",
            "role": "staff",
            "created_at": "2025-03-01T10:00:00Z",
            "is_active": true
        }"#;

        let user: User = serde_json::from_str(json).unwrap();
        assert_eq!(user.id, UserId::new(7));
        assert_eq!(user.role, Role::Staff);
        assert_eq!(user.is_active, Some(true));
        assert!(user.created_at.is_some());
    }

    #[test]
    fn minimal_user_without_optional_fields() {
        let json = r#"{"id":1,"name":"Admin","email":"admin@test.com","role":"admin"}"#;
        let user: User = serde_json::from_str(json).unwrap();
        assert_eq!(user, User::new(UserId::new(1), "Admin", "admin@test.com", Role::Admin));
    }

    #[test]
    fn role_change_body_only_carries_role() {
        let req = RoleChangeRequest::new(UserId::new(4), Role::Admin);
        assert_eq!(serde_json::to_value(&req).unwrap(), serde_json::json!({ "role": "admin" }));
        assert_eq!(req.path(), "/admin/users/4/role");
    }

    #[test]
    fn dedupe_keeps_first_occurrence() {
        let users = vec![
            User::new(UserId::new(1), "A", "a@x", Role::Client),
            User::new(UserId::new(2), "B", "b@x", Role::Staff),
            User::new(UserId::new(1), "A2", "a2@x", Role::Admin),
        ];

        let deduped = dedupe_by_id(users);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].name, "A");
        assert_eq!(deduped[1].id, UserId::new(2));
    }
}
