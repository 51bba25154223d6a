use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::{
    error::{AppError, AppResult},
    models::Role,
    roles::ResolvedRoles,
    session::SessionEvent,
};

/// Page
///
/// Every navigable page of the dashboard shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum Page {
    Dashboard,
    Courses,
    Attendance,
    Events,
    Notices,
    Assignments,
    Settings,
}

impl Page {
    pub const ALL: [Page; 7] = [
        Page::Dashboard,
        Page::Courses,
        Page::Attendance,
        Page::Events,
        Page::Notices,
        Page::Assignments,
        Page::Settings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Page::Dashboard => "dashboard",
            Page::Courses => "courses",
            Page::Attendance => "attendance",
            Page::Events => "events",
            Page::Notices => "notices",
            Page::Assignments => "assignments",
            Page::Settings => "settings",
        }
    }
}

/// Management affordances (create/post/mark). Any pair missing here is read-only.
pub const MANAGE_CAPABILITIES: [(Role, Page); 6] = [
    (Role::Faculty, Page::Assignments),
    (Role::Faculty, Page::Notices),
    (Role::Faculty, Page::Attendance),
    (Role::Admin, Page::Assignments),
    (Role::Admin, Page::Notices),
    (Role::Admin, Page::Attendance),
];

/// Whether `role` sees management affordances on `page`.
pub fn can_manage(role: Role, page: Page) -> bool {
    MANAGE_CAPABILITIES.contains(&(role, page))
}

/// DashboardVariant
///
/// The three mutually exclusive dashboard presentations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum DashboardVariant {
    Student,
    Faculty,
    Admin,
}

impl From<Role> for DashboardVariant {
    fn from(role: Role) -> Self {
        match role {
            Role::Student => DashboardVariant::Student,
            Role::Faculty => DashboardVariant::Faculty,
            Role::Admin => DashboardVariant::Admin,
        }
    }
}

/// DashboardState
///
/// Dispatcher state for one identity. Starts `Unresolved`; resolution moves it
/// to `NoAccess` or a role variant. Only a new resolution can move it between
/// those, the dispatcher never grants or revokes roles itself. `SignedOut` is
/// terminal until the identity signs in again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DashboardState {
    #[default]
    Unresolved,
    NoAccess,
    Student,
    Faculty,
    Admin,
    SignedOut,
}

impl DashboardState {
    /// State reached after resolving an identity's roles.
    pub fn resolved(access: &ResolvedRoles) -> Self {
        dispatch(access.primary_role)
    }

    /// Applies a session change of the identity:
    /// - sign-out ends the session, nothing is rendered any more;
    /// - sign-in starts over from `Unresolved`;
    /// - a role change drops the current resolution, unless already signed out.
    pub fn on_session_event(self, event: &SessionEvent) -> Self {
        match (self, event) {
            (_, SessionEvent::SignedOut { .. }) => DashboardState::SignedOut,
            (_, SessionEvent::SignedIn { .. }) => DashboardState::Unresolved,
            (DashboardState::SignedOut, SessionEvent::RolesChanged { .. }) => {
                DashboardState::SignedOut
            }
            (_, SessionEvent::RolesChanged { .. }) => DashboardState::Unresolved,
        }
    }

    /// The variant to render. `Unresolved`, `NoAccess` and `SignedOut` never
    /// fall back to a default dashboard.
    pub fn variant(self) -> AppResult<DashboardVariant> {
        match self {
            DashboardState::Unresolved => Err(AppError::InvalidSession(
                "identity has not been resolved".to_string(),
            )),
            DashboardState::SignedOut => Err(AppError::InvalidSession(
                "session has been signed out".to_string(),
            )),
            DashboardState::NoAccess => Err(AppError::NoAccess),
            DashboardState::Student => Ok(DashboardVariant::Student),
            DashboardState::Faculty => Ok(DashboardVariant::Faculty),
            DashboardState::Admin => Ok(DashboardVariant::Admin),
        }
    }
}

/// dispatch
///
/// Maps a primary role to the dashboard state. An absent role is `NoAccess`.
pub fn dispatch(primary_role: Option<Role>) -> DashboardState {
    match primary_role {
        None => DashboardState::NoAccess,
        Some(Role::Student) => DashboardState::Student,
        Some(Role::Faculty) => DashboardState::Faculty,
        Some(Role::Admin) => DashboardState::Admin,
    }
}

/// PageCapability
///
/// One row of the capability listing sent to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PageCapability {
    pub page: Page,
    pub can_manage: bool,
}

/// Capability listing for every page. Empty when there is no primary role.
pub fn capabilities(primary_role: Option<Role>) -> Vec<PageCapability> {
    let Some(role) = primary_role else {
        return Vec::new();
    };
    Page::ALL
        .iter()
        .map(|&page| PageCapability {
            page,
            can_manage: can_manage(role, page),
        })
        .collect()
}
