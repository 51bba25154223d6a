use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::Identity,
    dispatch::{DashboardState, DashboardVariant},
    error::{AppError, AppResult},
    models::{AdminStats, Assignment, Event, FacultyStats, ListQuery, Notice, Role, StudentStats},
    repository::{CountQuery, NoticeAudience, Repository},
    roles::{self, ResolvedRoles},
    session::SessionEvents,
};

/// How many rows each list on the student dashboard shows.
pub const DASHBOARD_LIST_LIMIT: i64 = 5;

/// Resolutions attempted when roles keep changing while a dashboard loads.
pub const MAX_RESOLUTION_ATTEMPTS: u32 = 3;

pub const SYSTEM_HEALTHY: &str = "healthy";

/// StudentDashboard
///
/// Counters plus the short lists shown under them.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct StudentDashboard {
    pub stats: StudentStats,
    pub recent_notices: Vec<Notice>,
    pub upcoming_events: Vec<Event>,
    pub upcoming_assignments: Vec<Assignment>,
}

/// DashboardView
///
/// The payload of exactly one dashboard variant.
/// Wire form: `{"variant":"faculty","data":{...}}`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "variant", content = "data", rename_all = "lowercase")]
pub enum DashboardView {
    Student(StudentDashboard),
    Faculty(FacultyStats),
    Admin(AdminStats),
}

impl DashboardView {
    pub fn variant(&self) -> DashboardVariant {
        match self {
            DashboardView::Student(_) => DashboardVariant::Student,
            DashboardView::Faculty(_) => DashboardVariant::Faculty,
            DashboardView::Admin(_) => DashboardVariant::Admin,
        }
    }
}

/// DashboardResponse
///
/// Body of GET /dashboard.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct DashboardResponse {
    pub primary_role: Role,
    /// Held roles, highest precedence first.
    pub roles: Vec<Role>,
    #[schema(value_type = Object)]
    pub view: DashboardView,
}

/// attendance_percent
///
/// `present / total` as a rounded percentage. No records reads as 0.
pub fn attendance_percent(present: i64, total: i64) -> i64 {
    if total <= 0 {
        return 0;
    }
    ((present as f64 / total as f64) * 100.0).round() as i64
}

/// load_dashboard
///
/// Issues every read behind `variant` concurrently and waits for all of them.
/// The first failed read fails the whole dashboard; the rest are dropped.
pub async fn load_dashboard(
    repo: &dyn Repository,
    user_id: Uuid,
    access: &ResolvedRoles,
    variant: DashboardVariant,
) -> AppResult<DashboardView> {
    match variant {
        DashboardVariant::Student => {
            let audience = NoticeAudience::Roles(access.by_precedence());
            let (
                enrolled_courses,
                upcoming_events,
                pending_assignments,
                attendance_total,
                attendance_present,
                recent_notices,
                events,
                assignments,
            ) = tokio::try_join!(
                repo.count(CountQuery::ActiveEnrollments {
                    student_id: user_id
                }),
                repo.count(CountQuery::RegisteredEvents { user_id }),
                repo.count(CountQuery::UpcomingAssignments),
                repo.count(CountQuery::AttendanceRecords {
                    student_id: user_id
                }),
                repo.count(CountQuery::PresentAttendance {
                    student_id: user_id
                }),
                repo.list_notices(audience, DASHBOARD_LIST_LIMIT),
                repo.list_events(ListQuery::upcoming(DASHBOARD_LIST_LIMIT)),
                repo.list_assignments(ListQuery::upcoming(DASHBOARD_LIST_LIMIT)),
            )?;

            Ok(DashboardView::Student(StudentDashboard {
                stats: StudentStats {
                    enrolled_courses,
                    upcoming_events,
                    pending_assignments,
                    attendance_percent: attendance_percent(attendance_present, attendance_total),
                },
                recent_notices,
                upcoming_events: events,
                upcoming_assignments: assignments,
            }))
        }
        DashboardVariant::Faculty => {
            let (assigned_courses, pending_grading, event_participation, total_students) = tokio::try_join!(
                repo.count(CountQuery::AssignedCourses {
                    faculty_id: user_id
                }),
                repo.count(CountQuery::UngradedSubmissions),
                repo.count(CountQuery::EventRegistrations { user_id }),
                repo.count(CountQuery::StudentsInCourses {
                    faculty_id: user_id
                }),
            )?;

            Ok(DashboardView::Faculty(FacultyStats {
                assigned_courses,
                pending_grading,
                event_participation,
                total_students,
            }))
        }
        DashboardVariant::Admin => {
            let (total_users, total_courses, active_events) = tokio::try_join!(
                repo.count(CountQuery::Profiles),
                repo.count(CountQuery::Courses),
                repo.count(CountQuery::UpcomingEvents),
            )?;

            Ok(DashboardView::Admin(AdminStats {
                total_users,
                total_courses,
                active_events,
                system_health: SYSTEM_HEALTHY.to_string(),
            }))
        }
    }
}

/// compose_dashboard
///
/// Resolves, dispatches and loads the dashboard of `identity` while watching
/// its session:
/// - sign-out before or during the load answers `InvalidSession`;
/// - a role change drops the in-flight reads and starts over, at most
///   `MAX_RESOLUTION_ATTEMPTS` times;
/// - zero roles answers `NoAccess` without reading anything else.
pub async fn compose_dashboard(
    repo: &dyn Repository,
    sessions: &SessionEvents,
    identity: &Identity,
) -> AppResult<DashboardResponse> {
    let mut state = DashboardState::default();

    for attempt in 1..=MAX_RESOLUTION_ATTEMPTS {
        // Subscribe first: anything published from here on is seen below.
        let mut watch = sessions.watch(identity.id);
        if sessions.is_revoked(identity.id, identity.issued_at).await {
            return Err(AppError::InvalidSession(
                "session has been signed out".to_string(),
            ));
        }

        let access = roles::resolve(repo, identity).await?;
        state = DashboardState::resolved(&access);
        let variant = state.variant()?;

        tokio::select! {
            biased;

            event = watch.changed() => {
                state = state.on_session_event(&event);
                if state == DashboardState::SignedOut {
                    return Err(AppError::InvalidSession(
                        "signed out while the dashboard was loading".to_string(),
                    ));
                }
                tracing::debug!(
                    user_id = %identity.id,
                    attempt,
                    ?event,
                    "roles changed while the dashboard was loading"
                );
            }
            view = load_dashboard(repo, identity.id, &access, variant) => {
                let view = view?;
                let primary_role = access.primary_role.ok_or(AppError::NoAccess)?;
                return Ok(DashboardResponse {
                    primary_role,
                    roles: access.by_precedence(),
                    view,
                });
            }
        }
    }

    tracing::warn!(
        user_id = %identity.id,
        ?state,
        "role set kept changing, giving up on dashboard"
    );
    Err(AppError::LookupFailure(
        "role assignments changed repeatedly while loading".to_string(),
    ))
}
