//! Navigation targets and the role → destination table
//!
//! Every redirect decision made after authentication goes through
//! [`Route::landing`] so there is one place that says where a role lives.

use parking_lot::Mutex;
use propo_common::{Profile, Role};
use tracing::info;

/// Query flag marking the registration surface as profile completion
pub const COMPLETE_PROFILE_MODE: &str = "mode=complete_profile";

/// Destinations the session layer navigates to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Login,
    Register,
    CompleteProfile,
    Dashboard,
    AdminHome,
    OwnerHome,
    TenantHome,
}

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Route::Login => "/login",
            Route::Register => "/register",
            Route::CompleteProfile => "/register?mode=complete_profile",
            Route::Dashboard => "/dashboard",
            Route::AdminHome => "/admin",
            Route::OwnerHome => "/owner",
            Route::TenantHome => "/tenant",
        }
    }

    pub fn for_role(role: Role) -> Route {
        match role {
            Role::Admin => Route::AdminHome,
            Role::Owner => Route::OwnerHome,
            Role::Tenant => Route::TenantHome,
        }
    }

    /// Where to send a user after authentication
    pub fn landing(profile: Option<&Profile>) -> Route {
        profile
            .map(|p| Route::for_role(p.role))
            .unwrap_or(Route::Dashboard)
    }

    /// True for any path on the registration surface, whatever its mode
    pub fn is_registration_path(path: &str) -> bool {
        let route = path.split('?').next().unwrap_or(path);
        route == "/register" || route.starts_with("/register/")
    }

    pub fn is_complete_profile_path(path: &str) -> bool {
        Self::is_registration_path(path)
            && path
                .split_once('?')
                .is_some_and(|(_, query)| query.split('&').any(|p| p == COMPLETE_PROFILE_MODE))
    }
}

/// Sidebar entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavItem {
    pub label: &'static str,
    pub path: &'static str,
}

impl NavItem {
    const fn new(label: &'static str, path: &'static str) -> Self {
        Self { label, path }
    }

    pub fn is_active(&self, current_path: &str) -> bool {
        current_path == self.path
            || current_path
                .strip_prefix(self.path)
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

const ADMIN_NAV: &[NavItem] = &[
    NavItem::new("Dashboard", "/admin"),
    NavItem::new("Users", "/admin/users"),
];

const OWNER_NAV: &[NavItem] = &[
    NavItem::new("Dashboard", "/owner"),
    NavItem::new("Properties", "/owner/properties"),
    NavItem::new("Finance", "/owner/finance"),
];

const TENANT_NAV: &[NavItem] = &[
    NavItem::new("Dashboard", "/tenant"),
    NavItem::new("My Unit", "/tenant/unit"),
    NavItem::new("Services", "/tenant/requests"),
];

const DEFAULT_NAV: &[NavItem] = &[NavItem::new("Dashboard", "/dashboard")];

/// Navigation menu for a role; the generic dashboard when there is no profile
pub fn nav_items(role: Option<Role>) -> &'static [NavItem] {
    match role {
        Some(Role::Admin) => ADMIN_NAV,
        Some(Role::Owner) => OWNER_NAV,
        Some(Role::Tenant) => TENANT_NAV,
        None => DEFAULT_NAV,
    }
}

/// Router seam used for redirects
pub trait Navigator: Send + Sync {
    fn current_path(&self) -> String;

    fn navigate(&self, route: Route);
}

/// Navigator that records where it has been sent
#[derive(Debug)]
pub struct MemoryNavigator {
    inner: Mutex<NavigatorState>,
}

#[derive(Debug)]
struct NavigatorState {
    current: String,
    history: Vec<Route>,
}

impl MemoryNavigator {
    pub fn new(initial_path: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new(NavigatorState {
                current: initial_path.into(),
                history: Vec::new(),
            }),
        }
    }

    /// Routes navigated to, oldest first
    pub fn history(&self) -> Vec<Route> {
        self.inner.lock().history.clone()
    }

    /// Move without recording a redirect (user clicked a link)
    pub fn visit(&self, path: impl Into<String>) {
        self.inner.lock().current = path.into();
    }
}

impl Default for MemoryNavigator {
    fn default() -> Self {
        Self::new("/")
    }
}

impl Navigator for MemoryNavigator {
    fn current_path(&self) -> String {
        self.inner.lock().current.clone()
    }

    fn navigate(&self, route: Route) {
        info!(path = route.path(), "Navigating");
        let mut inner = self.inner.lock();
        inner.current = route.path().to_string();
        inner.history.push(route);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(role: Role) -> Profile {
        Profile {
            id: 1,
            external_id: "uid".to_string(),
            email: "a@b.com".to_string(),
            role,
            name: None,
            documents: None,
        }
    }

    #[test]
    fn test_landing_by_role() {
        assert_eq!(Route::landing(Some(&profile(Role::Owner))), Route::OwnerHome);
        assert_eq!(Route::landing(Some(&profile(Role::Tenant))), Route::TenantHome);
        assert_eq!(Route::landing(Some(&profile(Role::Admin))), Route::AdminHome);
        assert_eq!(Route::landing(None), Route::Dashboard);
    }

    #[test]
    fn test_registration_paths() {
        assert!(Route::is_registration_path("/register"));
        assert!(Route::is_registration_path("/register?mode=complete_profile"));
        assert!(!Route::is_registration_path("/registered-units"));
        assert!(!Route::is_registration_path("/login"));

        assert!(Route::is_complete_profile_path(Route::CompleteProfile.path()));
        assert!(!Route::is_complete_profile_path("/register"));
    }

    #[test]
    fn test_nav_items_per_role() {
        assert_eq!(nav_items(Some(Role::Owner)).len(), 3);
        assert_eq!(nav_items(Some(Role::Tenant))[1].path, "/tenant/unit");
        assert_eq!(nav_items(None)[0].path, "/dashboard");
        for role in Role::ALL {
            assert_eq!(nav_items(Some(role))[0].path, Route::for_role(role).path());
        }
    }

    #[test]
    fn test_nav_item_active() {
        let item = OWNER_NAV[1];
        assert!(item.is_active("/owner/properties"));
        assert!(item.is_active("/owner/properties/12/units"));
        assert!(!item.is_active("/owner/propertiesx"));
        assert!(!item.is_active("/owner"));
    }

    #[test]
    fn test_memory_navigator_records_history() {
        let nav = MemoryNavigator::default();
        nav.navigate(Route::Login);
        nav.visit("/register");
        assert_eq!(nav.current_path(), "/register");
        assert_eq!(nav.history(), vec![Route::Login]);
    }
}
