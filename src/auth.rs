use std::sync::RwLock;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl AuthUser {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            roles: Vec::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }
}

/// Who is making the current request.
///
/// One context is resolved from the container per request, so pipes can record
/// the authenticated user without it leaking into other requests.
#[derive(Debug, Default)]
pub struct AuthContext {
    user: RwLock<Option<AuthUser>>,
}

impl AuthContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn login(&self, user: AuthUser) {
        tracing::debug!(user = %user.id, "authenticated");
        *self.user.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(user);
    }

    pub fn logout(&self) {
        self.user
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
    }

    pub fn user(&self) -> Option<AuthUser> {
        self.user
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// True when a user is logged in.
    pub fn check(&self) -> bool {
        self.user
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.user
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .is_some_and(|user| user.roles.iter().any(|r| r == role))
    }
}
