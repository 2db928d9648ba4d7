use serde::{Deserialize, Serialize};

use crate::engine::EngineError;

pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub uid: String,
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Who is driving the current request. Owned by the outer layer and passed by
/// reference; pricing and availability never see it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    user: Option<User>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn signed_in(user: User) -> Self {
        Self { user: Some(user) }
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn sign_out(&mut self) {
        self.user = None;
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.user
            .as_ref()
            .is_some_and(|u| u.roles.iter().any(|r| r == role))
    }

    pub fn require_role(&self, role: &'static str) -> Result<(), EngineError> {
        if self.has_role(role) {
            Ok(())
        } else {
            Err(EngineError::PermissionDenied(role))
        }
    }
}
