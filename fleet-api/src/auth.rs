//! Authorization Module
//!
//! Identity is established upstream by the gateway, which forwards the
//! caller's role and user id as `role` and `id` request metadata. This module
//! reads that context and decides whether the role may perform an action.

use crate::constants::{ADMIN_ROLE, ROLE_METADATA_KEY, USER_ID_METADATA_KEY};
use crate::error::{ApiError, ApiResult};
use fleet_core::UserId;
use std::fmt;
use tonic::metadata::MetadataMap;

/// Operations subject to authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    View,
    Create,
    Update,
    Delete,
    Import,
    Export,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Import => "import",
            Action::Export => "export",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decides whether a role may perform an action.
pub trait Authorizer: Send + Sync {
    fn authorize(&self, role: &str, action: Action) -> bool;
}

/// Every role may view; only admins may change the inventory or move files.
#[derive(Debug, Clone, Copy, Default)]
pub struct RolePolicy;

impl Authorizer for RolePolicy {
    fn authorize(&self, role: &str, action: Action) -> bool {
        match action {
            Action::View => true,
            Action::Create | Action::Update | Action::Delete | Action::Import | Action::Export => {
                role == ADMIN_ROLE
            }
        }
    }
}

/// Caller identity taken from request metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerContext {
    pub role: String,
    pub user_id: UserId,
}

impl CallerContext {
    pub fn new(role: impl Into<String>, user_id: UserId) -> Self {
        Self {
            role: role.into(),
            user_id,
        }
    }

    /// Read `role` and `id`. The gateway always sets both, so their absence
    /// is an internal error rather than a client error.
    pub fn from_metadata(metadata: &MetadataMap) -> ApiResult<Self> {
        let role = metadata_str(metadata, ROLE_METADATA_KEY)?;
        let raw_id = metadata_str(metadata, USER_ID_METADATA_KEY)?;
        let user_id = raw_id.parse::<UserId>().map_err(|_| {
            ApiError::internal_error(format!("Malformed {} metadata: {}", USER_ID_METADATA_KEY, raw_id))
        })?;
        Ok(Self::new(role, user_id))
    }

    /// Fail with permission-denied unless the caller's role allows `action`.
    pub fn require(&self, authorizer: &dyn Authorizer, action: Action) -> ApiResult<()> {
        if authorizer.authorize(&self.role, action) {
            Ok(())
        } else {
            tracing::warn!(role = %self.role, user_id = self.user_id, action = %action, "Permission denied");
            Err(ApiError::permission_denied(format!(
                "Role {} may not {} servers",
                self.role, action
            )))
        }
    }
}

/// Read a required ASCII metadata value.
pub fn metadata_str<'a>(metadata: &'a MetadataMap, key: &str) -> ApiResult<&'a str> {
    metadata
        .get(key)
        .ok_or_else(|| ApiError::internal_error(format!("Missing {} metadata", key)))?
        .to_str()
        .map_err(|_| ApiError::internal_error(format!("Non-ASCII {} metadata", key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn metadata(pairs: &[(&'static str, &'static str)]) -> MetadataMap {
        let mut map = MetadataMap::new();
        for (k, v) in pairs {
            map.insert(*k, v.parse().unwrap());
        }
        map
    }

    #[test]
    fn test_policy() {
        let policy = RolePolicy;
        assert!(policy.authorize("viewer", Action::View));
        assert!(!policy.authorize("viewer", Action::Export));
        assert!(!policy.authorize("viewer", Action::Delete));
        assert!(policy.authorize("admin", Action::Import));
    }

    #[test]
    fn test_caller_from_metadata() {
        let caller = CallerContext::from_metadata(&metadata(&[("role", "admin"), ("id", "42")])).unwrap();
        assert_eq!(caller, CallerContext::new("admin", 42));
    }

    #[test]
    fn test_missing_metadata_is_internal() {
        let err = CallerContext::from_metadata(&metadata(&[("role", "admin")])).unwrap_err();
        assert_eq!(err.code, ErrorCode::InternalError);
    }

    #[test]
    fn test_denied_action_is_permission_denied() {
        let err = CallerContext::new("viewer", 1)
            .require(&RolePolicy, Action::Create)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::PermissionDenied);
    }
}
