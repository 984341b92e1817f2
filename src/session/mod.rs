// Session handling: guard, identity snapshot and route access

pub mod access;
pub mod guard;
pub mod types;

use tracing::warn;

use crate::data_service::DataService;

pub use access::{authorize, navigation_for, NavLink, Route};
pub use guard::{GuardDecision, GuardOutcome, GuardPolicy, SessionGuard};
pub use types::{Identity, RequestContext, Role, Session};

/// Build the per-request context after the guard let a request through. A
/// missing or unreadable role row falls back to [`Role::Usuario`].
pub async fn resolve_context(
    data: &dyn DataService,
    outcome: &GuardOutcome,
    route: Route,
    correlation_id: &str,
) -> RequestContext {
    let Some(session) = &outcome.session else {
        return RequestContext::anonymous(correlation_id, route);
    };

    let role = match data.fetch_role(&session.user_id).await {
        Ok(role) => role.unwrap_or_default(),
        Err(e) => {
            warn!(error = %e, user_id = %session.user_id, "Role lookup failed, using default role");
            Role::default()
        }
    };

    RequestContext::new(correlation_id, route, Some(session.identity()), role)
}
