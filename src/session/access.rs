//! Route table and role gating
//!
//! Every protected page declares the [`Role`] it needs. The check runs at the
//! page's entry point via [`authorize`], after the session guard has already
//! decided that the request may proceed.

use percent_encoding::percent_decode_str;
use serde::Serialize;
use std::fmt;
use url::Url;

use crate::errors::InventoryError;
use crate::session::types::{Identity, Role};

/// Known routes of the dashboard
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Home,
    Login,
    Register,
    Dashboard,
    ItemList,
    NewItem,
    ItemDetail { id: String },
    ItemHistory { id: String },
    Reports,
    Admin,
    /// Any other path; treated as protected
    Other(String),
}

impl Route {
    pub fn parse(target: &str) -> Self {
        let Ok(path) = request_path(target) else {
            return Route::Other(target.to_string());
        };
        let trimmed = path.trim_end_matches('/');
        let segments: Vec<&str> = trimmed
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect();

        match segments.as_slice() {
            [] => Route::Home,
            ["login"] => Route::Login,
            ["register"] => Route::Register,
            ["dashboard"] => Route::Dashboard,
            ["dashboard", "elementos"] => Route::ItemList,
            ["dashboard", "elementos", "nuevo"] => Route::NewItem,
            ["dashboard", "elementos", id] => Route::ItemDetail { id: decode_segment(id) },
            ["dashboard", "elementos", id, "historial"] => Route::ItemHistory { id: decode_segment(id) },
            ["dashboard", "reportes"] => Route::Reports,
            ["dashboard", "admin"] => Route::Admin,
            _ => Route::Other(trimmed.to_string()),
        }
    }

    pub fn path(&self) -> String {
        match self {
            Route::Home => "/".to_string(),
            Route::Login => "/login".to_string(),
            Route::Register => "/register".to_string(),
            Route::Dashboard => "/dashboard".to_string(),
            Route::ItemList => "/dashboard/elementos".to_string(),
            Route::NewItem => "/dashboard/elementos/nuevo".to_string(),
            Route::ItemDetail { id } => format!("/dashboard/elementos/{id}"),
            Route::ItemHistory { id } => format!("/dashboard/elementos/{id}/historial"),
            Route::Reports => "/dashboard/reportes".to_string(),
            Route::Admin => "/dashboard/admin".to_string(),
            Route::Other(path) => path.clone(),
        }
    }

    /// Role needed to enter; `None` for public routes
    pub fn required_role(&self) -> Option<Role> {
        match self {
            Route::Home | Route::Login | Route::Register => None,
            Route::Admin => Some(Role::Admin),
            _ => Some(Role::Usuario),
        }
    }
}

const REQUEST_BASE: &str = "http://inventario.local/";

/// Normalized path component of a request target (`/a/../b?x=1#y` gives `/b`)
pub fn request_path(target: &str) -> Result<String, url::ParseError> {
    let url = Url::parse(REQUEST_BASE)?.join(target)?;
    Ok(url.path().to_string())
}

fn decode_segment(segment: &str) -> String {
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Entry check for a route. A protected route without an identity is refused
/// even though the guard should already have redirected.
pub fn authorize(route: &Route, identity: Option<&Identity>, role: Role) -> Result<(), InventoryError> {
    let Some(required) = route.required_role() else {
        return Ok(());
    };

    if identity.is_none() {
        return Err(InventoryError::AuthRequired {
            operation: "acceder a una ruta protegida",
        });
    }

    if !role.satisfies(required) {
        tracing::warn!(route = %route, role = %role, required = %required, "Role check refused route");
        return Err(InventoryError::Forbidden {
            route: route.path(),
            role,
        });
    }

    Ok(())
}

/// A dashboard sidebar link
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavLink {
    pub label: &'static str,
    pub href: String,
}

/// Sidebar links for a role, admin-only entries included only for admins
pub fn navigation_for(role: Role) -> Vec<NavLink> {
    [
        ("Elementos", Route::ItemList),
        ("Añadir Elemento", Route::NewItem),
        ("Reportes", Route::Reports),
        ("Panel Administrador", Route::Admin),
    ]
    .into_iter()
    .filter(|(_, route)| route.required_role().is_some_and(|required| role.satisfies(required)))
    .map(|(label, route)| NavLink {
        label,
        href: route.path(),
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn someone() -> Identity {
        Identity {
            user_id: "u-1".to_string(),
            email: "ana@example.com".to_string(),
        }
    }

    #[test]
    fn parses_dashboard_routes() {
        assert_eq!(Route::parse("/"), Route::Home);
        assert_eq!(Route::parse("/login"), Route::Login);
        assert_eq!(Route::parse("/dashboard/elementos/"), Route::ItemList);
        assert_eq!(Route::parse("/dashboard/elementos/nuevo"), Route::NewItem);
        assert_eq!(
            Route::parse("/dashboard/elementos/A1"),
            Route::ItemDetail { id: "A1".to_string() }
        );
        assert_eq!(
            Route::parse("/dashboard/elementos/A1/historial?page=2"),
            Route::ItemHistory { id: "A1".to_string() }
        );
        assert_eq!(Route::parse("/dashboard/admin"), Route::Admin);
        assert_eq!(Route::parse("/otra/cosa"), Route::Other("/otra/cosa".to_string()));
    }

    #[test]
    fn request_path_drops_query_and_fragment() {
        assert_eq!(
            request_path("/login?redirectedFrom=/dashboard/elementos").unwrap(),
            "/login"
        );
        assert_eq!(request_path("/dashboard/./elementos#top").unwrap(), "/dashboard/elementos");
        assert_eq!(
            Route::parse("/dashboard/elementos/PL%C3%81CA-9"),
            Route::ItemDetail { id: "PLÁCA-9".to_string() }
        );
    }

    #[test]
    fn route_paths_round_trip_through_parse() {
        for route in [
            Route::ItemList,
            Route::ItemHistory { id: "B7".to_string() },
            Route::Reports,
        ] {
            assert_eq!(Route::parse(&route.path()), route);
        }
    }

    #[test]
    fn admin_panel_requires_admin_role() {
        let who = someone();
        assert!(authorize(&Route::Admin, Some(&who), Role::Admin).is_ok());
        assert!(matches!(
            authorize(&Route::Admin, Some(&who), Role::Usuario),
            Err(InventoryError::Forbidden { .. })
        ));
        assert!(authorize(&Route::ItemList, Some(&who), Role::Usuario).is_ok());
    }

    #[test]
    fn protected_route_without_identity_is_refused() {
        assert!(matches!(
            authorize(&Route::ItemList, None, Role::Usuario),
            Err(InventoryError::AuthRequired { .. })
        ));
        assert!(authorize(&Route::Login, None, Role::Usuario).is_ok());
    }

    #[test]
    fn navigation_hides_admin_panel_from_users() {
        let user_links = navigation_for(Role::Usuario);
        assert_eq!(user_links.len(), 3);
        assert!(user_links.iter().all(|link| link.href != "/dashboard/admin"));

        let admin_links = navigation_for(Role::Admin);
        assert_eq!(admin_links.len(), 4);
        assert_eq!(admin_links[3].label, "Panel Administrador");
    }
}
