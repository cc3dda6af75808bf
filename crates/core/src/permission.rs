//! Permission table record types.
//!
//! Roles and actions are opaque strings, case-normalized to uppercase at
//! construction. Every comparison and every persisted row therefore sees the
//! normalized form; callers never have to remember to fold case themselves.

use serde::{Deserialize, Serialize};

/// Role identifier (the "who" half of a permission row).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Role(String);

impl Role {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Action identifier (the "what" half of a permission row).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Action(String);

impl Action {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Action {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<Action> for String {
    fn from(value: Action) -> Self {
        value.0
    }
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Uniqueness key of the permission table: one row per `(role, action)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionKey {
    pub role: Role,
    pub action: Action,
}

impl PermissionKey {
    pub fn new(role: Role, action: Action) -> Self {
        Self { role, action }
    }
}

impl core::fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.role, self.action)
    }
}

/// One row of the replicated permission table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRecord {
    pub role: Role,
    pub action: Action,
    pub active: bool,
}

impl PermissionRecord {
    pub fn new(role: Role, action: Action, active: bool) -> Self {
        Self {
            role,
            action,
            active,
        }
    }

    pub fn key(&self) -> PermissionKey {
        PermissionKey::new(self.role.clone(), self.action.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn role_and_action_normalize_to_uppercase() {
        assert_eq!(Role::new("admin").as_str(), "ADMIN");
        assert_eq!(Role::new(" Admin ").as_str(), "ADMIN");
        assert_eq!(Action::new("delete_item").as_str(), "DELETE_ITEM");
    }

    #[test]
    fn keys_compare_case_insensitively() {
        let a = PermissionKey::new(Role::new("admin"), Action::new("Delete_Item"));
        let b = PermissionKey::new(Role::new("ADMIN"), Action::new("DELETE_ITEM"));
        assert_eq!(a, b);
    }

    #[test]
    fn deserialized_roles_are_normalized() {
        let role: Role = serde_json::from_str("\"editor\"").unwrap();
        assert_eq!(role.as_str(), "EDITOR");
    }

    #[test]
    fn record_serializes_as_plain_strings() {
        let record = PermissionRecord::new(Role::new("admin"), Action::new("read"), true);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"role": "ADMIN", "action": "READ", "active": true})
        );
    }

    proptest! {
        /// Normalization is idempotent: re-wrapping an already-constructed
        /// role never changes it.
        #[test]
        fn role_normalization_is_idempotent(s in "[a-zA-Z_][a-zA-Z0-9_]{0,24}") {
            let once = Role::new(&s);
            let twice = Role::new(once.as_str());
            prop_assert_eq!(once, twice);
        }

        /// Key equality ignores the case of its inputs.
        #[test]
        fn key_equality_ignores_case(s in "[a-zA-Z_][a-zA-Z0-9_]{0,24}") {
            let lower = PermissionKey::new(Role::new(s.to_lowercase()), Action::new(s.to_lowercase()));
            let upper = PermissionKey::new(Role::new(s.to_uppercase()), Action::new(s.to_uppercase()));
            prop_assert_eq!(lower, upper);
        }
    }
}
