use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable identifier for a registered player. Sessions without one belong
/// to an anonymous guest and are never attributed on leaderboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Who is playing. `None` denotes a guest/local session.
pub trait IdentityContext {
    fn current_user(&self) -> Option<UserId>;
}

/// Anonymous play; nothing is attributed.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuestIdentity;

impl IdentityContext for GuestIdentity {
    fn current_user(&self) -> Option<UserId> {
        None
    }
}

/// A caller with a known, stable user id (e.g. resolved from an auth token
/// upstream of this crate).
#[derive(Debug, Clone, Copy)]
pub struct FixedIdentity {
    user: UserId,
}

impl FixedIdentity {
    pub fn new(user: UserId) -> Self {
        Self { user }
    }
}

impl IdentityContext for FixedIdentity {
    fn current_user(&self) -> Option<UserId> {
        Some(self.user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guest_identity_has_no_user() {
        assert_eq!(GuestIdentity.current_user(), None);
    }

    #[test]
    fn fixed_identity_returns_its_user() {
        let user = UserId::new();
        assert_eq!(FixedIdentity::new(user).current_user(), Some(user));
    }

    #[test]
    fn parse_roundtrips_display() {
        let user = UserId::new();
        assert_eq!(UserId::parse(&user.to_string()), Some(user));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(UserId::parse("not-a-uuid"), None);
    }
}
