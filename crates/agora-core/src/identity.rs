//! Caller identity.
//!
//! The gateway does not authenticate callers itself. An upstream identity
//! collaborator (session layer, auth proxy) resolves who the caller is and
//! which roles they hold; the gateway only compares those roles against the
//! endpoint's declared `allowed_roles`.

use serde::{Deserialize, Serialize};

/// The identity of the caller as resolved upstream.
///
/// # Example
///
/// ```
/// use agora_core::CallerIdentity;
///
/// let caller = CallerIdentity::user("u-42", ["provider"]);
/// assert!(caller.has_any_role(&["admin".to_string(), "provider".to_string()]));
/// assert_eq!(caller.log_id(), "user:u-42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallerIdentity {
    /// No identity claim was supplied.
    #[default]
    Anonymous,

    /// An authenticated end user.
    User {
        /// Stable user identifier.
        user_id: String,
        /// Roles granted to the user (e.g. `customer`, `provider`, `admin`).
        roles: Vec<String>,
    },
}

impl CallerIdentity {
    /// Creates a user identity.
    #[must_use]
    pub fn user<I, S>(user_id: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::User {
            user_id: user_id.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns `true` if no identity was resolved.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }

    /// Returns the user id, if any.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::User { user_id, .. } => Some(user_id),
            Self::Anonymous => None,
        }
    }

    /// Returns the roles held by the caller.
    #[must_use]
    pub fn roles(&self) -> &[String] {
        match self {
            Self::User { roles, .. } => roles,
            Self::Anonymous => &[],
        }
    }

    /// Returns `true` if the caller holds at least one of `allowed`.
    #[must_use]
    pub fn has_any_role(&self, allowed: &[String]) -> bool {
        self.roles().iter().any(|role| allowed.contains(role))
    }

    /// Returns a string identifier suitable for logging.
    ///
    /// Never contains credentials.
    #[must_use]
    pub fn log_id(&self) -> String {
        match self {
            Self::User { user_id, .. } => format!("user:{user_id}"),
            Self::Anonymous => "anonymous".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_has_no_roles() {
        let identity = CallerIdentity::Anonymous;
        assert!(identity.is_anonymous());
        assert!(identity.roles().is_empty());
        assert!(!identity.has_any_role(&["admin".to_string()]));
        assert_eq!(identity.log_id(), "anonymous");
    }

    #[test]
    fn test_user_roles() {
        let identity = CallerIdentity::user("u123", ["admin", "customer"]);
        assert_eq!(identity.user_id(), Some("u123"));
        assert_eq!(identity.roles(), &["admin".to_string(), "customer".to_string()]);
        assert!(identity.has_any_role(&["customer".to_string()]));
        assert!(!identity.has_any_role(&["provider".to_string()]));
    }

    #[test]
    fn test_identity_serialization() {
        let identity = CallerIdentity::user("u1", ["admin"]);
        let json = serde_json::to_value(&identity).unwrap();
        assert_eq!(json["type"], "user");
        assert_eq!(json["user_id"], "u1");
    }
}
