use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::InventoryError;
use crate::inventory::ParseValueError;
use crate::session::access::Route;

/// An authenticated session as issued by the data service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub email: String,
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Still valid but close enough to expiry that it should be re-issued
    pub fn needs_refresh(&self, now: DateTime<Utc>, window: Duration) -> bool {
        !self.is_expired(now) && self.expires_at - now <= window
    }

    pub fn identity(&self) -> Identity {
        Identity {
            user_id: self.user_id.clone(),
            email: self.email.clone(),
        }
    }
}

/// Who is acting on a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub email: String,
}

/// Capability level stored in `users_custom_data.rol`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Usuario,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Usuario => "usuario",
            Role::Admin => "admin",
        }
    }

    /// Admins may do everything a plain user may
    pub fn satisfies(&self, required: Role) -> bool {
        match required {
            Role::Usuario => true,
            Role::Admin => *self == Role::Admin,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "usuario" => Ok(Role::Usuario),
            "admin" => Ok(Role::Admin),
            other => Err(ParseValueError {
                kind: "rol",
                value: other.to_string(),
            }),
        }
    }
}

/// Immutable per-request snapshot handed to every operation
#[derive(Debug, Clone)]
pub struct RequestContext {
    correlation_id: String,
    route: Route,
    identity: Option<Identity>,
    role: Role,
}

impl RequestContext {
    pub fn new(correlation_id: &str, route: Route, identity: Option<Identity>, role: Role) -> Self {
        Self {
            correlation_id: correlation_id.to_string(),
            route,
            identity,
            role,
        }
    }

    pub fn anonymous(correlation_id: &str, route: Route) -> Self {
        Self::new(correlation_id, route, None, Role::Usuario)
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Entry check for the route this context was built for
    pub fn authorize(&self) -> Result<(), InventoryError> {
        crate::session::access::authorize(&self.route, self.identity(), self.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_expiring_in(seconds: i64) -> Session {
        Session {
            user_id: "u-1".to_string(),
            email: "ana@example.com".to_string(),
            access_token: "tok".to_string(),
            expires_at: Utc::now() + Duration::seconds(seconds),
        }
    }

    #[test]
    fn refresh_window_only_applies_to_live_sessions() {
        let now = Utc::now();
        let window = Duration::seconds(300);

        assert!(session_expiring_in(60).needs_refresh(now, window));
        assert!(!session_expiring_in(3600).needs_refresh(now, window));

        let expired = session_expiring_in(-10);
        assert!(expired.is_expired(now));
        assert!(!expired.needs_refresh(now, window));
    }

    #[test]
    fn admin_satisfies_user_but_not_reverse() {
        assert!(Role::Admin.satisfies(Role::Usuario));
        assert!(Role::Usuario.satisfies(Role::Usuario));
        assert!(!Role::Usuario.satisfies(Role::Admin));
        assert_eq!("ADMIN".parse::<Role>(), Ok(Role::Admin));
        assert_eq!(Role::default(), Role::Usuario);
    }
}
