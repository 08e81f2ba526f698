//! Caller identity forwarded by the upstream gateway.
//!
//! The gateway has already authenticated the caller. Identity arrives as two
//! headers and is trusted as-is: no signature or token is checked here.

use http::HeaderMap;
use serde::{Deserialize, Serialize};

/// Header carrying the principal id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Header carrying the comma-separated role list.
pub const USER_ROLES_HEADER: &str = "x-user-roles";

/// An authenticated principal and its roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    id: String,
    roles: Vec<String>,
}

impl Identity {
    /// Creates an identity.
    pub fn new<I, S>(id: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    /// Reads the identity headers.
    ///
    /// Returns `None` when the principal header is absent, blank or not valid
    /// UTF-8. Roles are split on commas, trimmed and blanks dropped; the
    /// original order is kept.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let id = headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())?;

        let roles = headers
            .get(USER_ROLES_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(parse_roles)
            .unwrap_or_default();

        Some(Self {
            id: id.to_string(),
            roles,
        })
    }

    /// Returns the principal id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the roles in header order.
    #[must_use]
    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    /// Returns `true` if the identity lists `role`.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

fn parse_roles(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(ToString::to_string)
        .collect()
}
