// Session guard: evaluated before any handler runs on every request
//
// An absent or expired session is the normal unauthenticated state and always
// resolves to a redirect, never to an error.

use chrono::{Duration, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::RoutesConfig;
use crate::data_service::DataService;
use crate::session::access::request_path;
use crate::session::types::Session;

/// Static and asset paths that are not security relevant
const EXCLUDED_PATHS: &str =
    r"^/(?:_next/static|_next/image|favicon\.ico)(?:/|$)|\.(?:svg|png|jpg|jpeg|gif|webp)$";

/// Query delimiters still left in an already percent-encoded path. `/` and
/// `%` stay literal so the redirect reads `/login?redirectedFrom=/dashboard/elementos`.
const REDIRECT_VALUE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'&')
    .add(b'+')
    .add(b'=')
    .add(b'?');

/// What to do with a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    RedirectToLogin { location: String },
    RedirectToLanding { location: String },
}

impl GuardDecision {
    pub fn location(&self) -> Option<&str> {
        match self {
            GuardDecision::Allow => None,
            GuardDecision::RedirectToLogin { location }
            | GuardDecision::RedirectToLanding { location } => Some(location),
        }
    }
}

/// The fixed policy table, independent of any session lookup. Every check
/// runs on the path component only; query and fragment never take part.
#[derive(Debug, Clone)]
pub struct GuardPolicy {
    login_path: String,
    register_path: String,
    landing_path: String,
    public_paths: Vec<String>,
    excluded: Regex,
}

impl GuardPolicy {
    pub fn new(routes: &RoutesConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            login_path: routes.login_path.clone(),
            register_path: routes.register_path.clone(),
            landing_path: routes.landing_path.clone(),
            public_paths: routes.public_paths.clone(),
            excluded: Regex::new(EXCLUDED_PATHS)?,
        })
    }

    /// Asset paths skip the guard entirely
    pub fn is_excluded(&self, target: &str) -> bool {
        request_path(target).is_ok_and(|path| self.excluded.is_match(&path))
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.public_paths.iter().any(|public| public == path)
    }

    pub fn decide(&self, target: &str, has_session: bool) -> GuardDecision {
        let path = match request_path(target) {
            Ok(path) => path,
            Err(e) => {
                warn!(target = %target, error = %e, "Unparseable request target");
                return if has_session {
                    GuardDecision::RedirectToLanding {
                        location: self.landing_path.clone(),
                    }
                } else {
                    GuardDecision::RedirectToLogin {
                        location: self.login_path.clone(),
                    }
                };
            }
        };

        if self.excluded.is_match(&path) {
            return GuardDecision::Allow;
        }

        if !has_session && !self.is_public(&path) {
            return GuardDecision::RedirectToLogin {
                location: format!(
                    "{}?redirectedFrom={}",
                    self.login_path,
                    utf8_percent_encode(&path, REDIRECT_VALUE)
                ),
            };
        }

        if has_session && (path == self.login_path || path == self.register_path) {
            return GuardDecision::RedirectToLanding {
                location: self.landing_path.clone(),
            };
        }

        GuardDecision::Allow
    }
}

/// Result of mediating one request
#[derive(Debug, Clone)]
pub struct GuardOutcome {
    pub decision: GuardDecision,
    /// The live session, if any, after a possible refresh
    pub session: Option<Session>,
    /// Set when the session was re-issued and the caller must store the new token
    pub refreshed: bool,
}

impl GuardOutcome {
    pub fn is_allowed(&self) -> bool {
        self.decision == GuardDecision::Allow
    }

    pub fn refreshed_token(&self) -> Option<&str> {
        if self.refreshed {
            self.session.as_ref().map(|session| session.access_token.as_str())
        } else {
            None
        }
    }
}

pub struct SessionGuard {
    policy: GuardPolicy,
    data: Arc<dyn DataService>,
    refresh_window: Duration,
}

impl SessionGuard {
    pub fn new(policy: GuardPolicy, data: Arc<dyn DataService>, refresh_window: Duration) -> Self {
        Self {
            policy,
            data,
            refresh_window,
        }
    }

    /// Resolve the session behind `access_token` (refreshing it when close to
    /// expiry) and apply the policy table to `path`.
    pub async fn mediate(&self, path: &str, access_token: Option<&str>) -> GuardOutcome {
        if self.policy.is_excluded(path) {
            debug!(path = %path, "Excluded path bypasses session guard");
            return GuardOutcome {
                decision: GuardDecision::Allow,
                session: None,
                refreshed: false,
            };
        }

        let (session, refreshed) = match access_token {
            Some(token) => self.resolve_session(token).await,
            None => (None, false),
        };

        let decision = self.policy.decide(path, session.is_some());
        match &decision {
            GuardDecision::Allow => debug!(path = %path, "Request allowed"),
            other => info!(path = %path, location = ?other.location(), "Request redirected"),
        }

        GuardOutcome {
            decision,
            session,
            refreshed,
        }
    }

    async fn resolve_session(&self, token: &str) -> (Option<Session>, bool) {
        let session = match self.data.get_session(token).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                debug!("Unknown access token, treating request as unauthenticated");
                return (None, false);
            }
            Err(e) => {
                warn!(error = %e, "Session lookup failed, treating request as unauthenticated");
                return (None, false);
            }
        };

        let now = Utc::now();
        if session.is_expired(now) {
            debug!(user_id = %session.user_id, "Session expired");
            return (None, false);
        }

        if !session.needs_refresh(now, self.refresh_window) {
            return (Some(session), false);
        }

        match self.data.refresh_session(token).await {
            Ok(refreshed) => {
                info!(user_id = %refreshed.user_id, expires_at = %refreshed.expires_at, "Session refreshed");
                (Some(refreshed), true)
            }
            Err(e) => {
                warn!(error = %e, user_id = %session.user_id, "Session refresh failed, keeping current session");
                (Some(session), false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_service::{DataServiceError, MockDataService};

    fn policy() -> GuardPolicy {
        GuardPolicy::new(&RoutesConfig::default()).unwrap()
    }

    fn session(token: &str, expires_in: Duration) -> Session {
        Session {
            user_id: "u-1".to_string(),
            email: "ana@example.com".to_string(),
            access_token: token.to_string(),
            expires_at: Utc::now() + expires_in,
        }
    }

    #[test]
    fn unauthenticated_protected_path_redirects_to_login() {
        assert_eq!(
            policy().decide("/dashboard/elementos", false),
            GuardDecision::RedirectToLogin {
                location: "/login?redirectedFrom=/dashboard/elementos".to_string()
            }
        );
    }

    #[test]
    fn public_paths_pass_without_session() {
        let policy = policy();
        for path in ["/", "/login", "/register"] {
            assert_eq!(policy.decide(path, false), GuardDecision::Allow);
        }
    }

    #[test]
    fn authenticated_auth_forms_redirect_to_landing() {
        let policy = policy();
        for path in ["/login", "/register"] {
            assert_eq!(
                policy.decide(path, true),
                GuardDecision::RedirectToLanding {
                    location: "/dashboard/elementos".to_string()
                }
            );
        }
        assert_eq!(policy.decide("/", true), GuardDecision::Allow);
        assert_eq!(policy.decide("/dashboard/admin", true), GuardDecision::Allow);
    }

    #[test]
    fn assets_are_excluded() {
        let policy = policy();
        assert!(policy.is_excluded("/_next/static/chunks/app.js"));
        assert!(policy.is_excluded("/favicon.ico"));
        assert!(policy.is_excluded("/img/logo.svg"));
        assert!(!policy.is_excluded("/dashboard/elementos"));
        assert!(!policy.is_excluded("/favicon.icon"));
        assert_eq!(policy.decide("/logo.png", false), GuardDecision::Allow);
    }

    #[test]
    fn redirect_parameter_escapes_query_characters() {
        assert_eq!(
            policy().decide("/dashboard/a b&c=d", false).location(),
            Some("/login?redirectedFrom=/dashboard/a%20b%26c%3Dd")
        );
    }

    #[test]
    fn login_page_with_its_own_redirect_parameter_is_public() {
        let policy = policy();
        let first = policy.decide("/dashboard/elementos", false);
        let target = first.location().unwrap();
        assert_eq!(target, "/login?redirectedFrom=/dashboard/elementos");
        assert_eq!(policy.decide(target, false), GuardDecision::Allow);
    }

    #[test]
    fn query_and_fragment_are_ignored() {
        let policy = policy();
        assert!(policy.is_excluded("/logo.png?v=1"));
        assert_eq!(policy.decide("/?tab=1#top", false), GuardDecision::Allow);
        assert_eq!(
            policy.decide("/dashboard/elementos?placa=X1", false).location(),
            Some("/login?redirectedFrom=/dashboard/elementos")
        );
        assert_eq!(
            policy.decide("/register?ref=mail", true).location(),
            Some("/dashboard/elementos")
        );
    }

    #[tokio::test]
    async fn lookup_failure_is_treated_as_no_session() {
        let mut data = MockDataService::new();
        data.expect_get_session().returning(|_| {
            Err(DataServiceError::Unavailable {
                message: "timeout".to_string(),
            })
        });
        let guard = SessionGuard::new(policy(), Arc::new(data), Duration::minutes(5));

        let outcome = guard.mediate("/dashboard/elementos", Some("tok")).await;
        assert!(outcome.session.is_none());
        assert!(matches!(outcome.decision, GuardDecision::RedirectToLogin { .. }));
    }

    #[tokio::test]
    async fn near_expiry_session_is_refreshed() {
        let mut data = MockDataService::new();
        data.expect_get_session()
            .returning(|token| Ok(Some(session(token, Duration::seconds(30)))));
        data.expect_refresh_session()
            .times(1)
            .returning(|_| Ok(session("tok-2", Duration::hours(1))));
        let guard = SessionGuard::new(policy(), Arc::new(data), Duration::minutes(5));

        let outcome = guard.mediate("/dashboard/elementos", Some("tok-1")).await;
        assert!(outcome.is_allowed());
        assert_eq!(outcome.refreshed_token(), Some("tok-2"));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_the_valid_session() {
        let mut data = MockDataService::new();
        data.expect_get_session()
            .returning(|token| Ok(Some(session(token, Duration::seconds(30)))));
        data.expect_refresh_session().returning(|_| {
            Err(DataServiceError::Unavailable {
                message: "auth provider down".to_string(),
            })
        });
        let guard = SessionGuard::new(policy(), Arc::new(data), Duration::minutes(5));

        let outcome = guard.mediate("/dashboard/elementos", Some("tok-1")).await;
        assert!(outcome.is_allowed());
        assert!(outcome.refreshed_token().is_none());
        assert_eq!(outcome.session.unwrap().access_token, "tok-1");
    }

    #[tokio::test]
    async fn excluded_paths_skip_session_lookup() {
        let mut data = MockDataService::new();
        data.expect_get_session().never();
        let guard = SessionGuard::new(policy(), Arc::new(data), Duration::minutes(5));

        let outcome = guard.mediate("/_next/image/x", None).await;
        assert!(outcome.is_allowed());
    }
}
