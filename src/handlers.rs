use crate::{
    AppState,
    auth::{self, Identity, SessionContext},
    dashboard::{self, DashboardResponse},
    dispatch::{self, DashboardState, Page, PageCapability},
    error::{AppError, AppResult, ErrorResponse},
    models::{
        Assignment, AttendanceQuery, AttendanceRecord, Course, CreateAssignmentRequest,
        CreateNoticeRequest, Event, ListQuery, MarkAttendanceRequest, Notice, NoticeQuery, Profile,
        Role, UpdateProfileRequest, clamp_limit,
    },
    repository::{AttendanceFilter, NoticeAudience},
    session::SessionEvent,
};
use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

/// AccessResponse
///
/// What the presentation layer needs to pick a dashboard and show or hide
/// management affordances.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AccessResponse {
    /// Held roles, highest precedence first.
    pub roles: Vec<Role>,
    pub primary_role: Option<Role>,
    pub state: DashboardState,
    pub capabilities: Vec<PageCapability>,
}

// --- Access & Dashboard ---

/// get_access
///
/// [Authenticated Route] Resolves the caller's roles. Answers 200 even for an
/// identity with no roles (`state = no_access`) so the client can explain why
/// no dashboard is available.
#[utoipa::path(
    get,
    path = "/me/access",
    responses(
        (status = 200, description = "Resolved access", body = AccessResponse),
        (status = 401, description = "Invalid session", body = ErrorResponse),
        (status = 503, description = "Role lookup failed", body = ErrorResponse)
    )
)]
pub async fn get_access(ctx: SessionContext) -> Json<AccessResponse> {
    Json(AccessResponse {
        roles: ctx.access.by_precedence(),
        primary_role: ctx.access.primary_role,
        state: ctx.state(),
        capabilities: dispatch::capabilities(ctx.access.primary_role),
    })
}

/// get_dashboard
///
/// [Authenticated Route] The dashboard of the caller's primary role. Resolution
/// runs inside the composer so a sign-out or role change during the load is
/// observed.
#[utoipa::path(
    get,
    path = "/dashboard",
    responses(
        (status = 200, description = "Dashboard for the primary role", body = DashboardResponse),
        (status = 401, description = "Invalid session", body = ErrorResponse),
        (status = 403, description = "No role assigned", body = ErrorResponse),
        (status = 503, description = "Lookup failed", body = ErrorResponse)
    )
)]
pub async fn get_dashboard(
    identity: Identity,
    State(state): State<AppState>,
) -> AppResult<Json<DashboardResponse>> {
    let response =
        dashboard::compose_dashboard(state.repo.as_ref(), &state.sessions, &identity).await?;
    Ok(Json(response))
}

// --- Courses & Events ---

#[utoipa::path(
    get,
    path = "/courses",
    responses((status = 200, description = "All courses", body = [Course]))
)]
pub async fn list_courses(
    ctx: SessionContext,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<Course>>> {
    ctx.primary_role()?;
    Ok(Json(state.repo.list_courses().await?))
}

#[utoipa::path(
    get,
    path = "/events",
    params(ListQuery),
    responses((status = 200, description = "Events ordered by date", body = [Event]))
)]
pub async fn list_events(
    ctx: SessionContext,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<Event>>> {
    ctx.primary_role()?;
    Ok(Json(state.repo.list_events(query).await?))
}

// --- Notices ---

/// list_notices
///
/// [Authenticated Route] Newest first. Readers who cannot manage notices only
/// see untargeted notices and those aimed at a role they hold.
#[utoipa::path(
    get,
    path = "/notices",
    params(NoticeQuery),
    responses((status = 200, description = "Visible notices", body = [Notice]))
)]
pub async fn list_notices(
    ctx: SessionContext,
    State(state): State<AppState>,
    Query(query): Query<NoticeQuery>,
) -> AppResult<Json<Vec<Notice>>> {
    ctx.primary_role()?;
    let audience = if ctx.can_manage(Page::Notices) {
        NoticeAudience::Everyone
    } else {
        NoticeAudience::Roles(ctx.access.by_precedence())
    };
    let notices = state
        .repo
        .list_notices(audience, clamp_limit(query.limit))
        .await?;
    Ok(Json(notices))
}

#[utoipa::path(
    post,
    path = "/notices",
    request_body = CreateNoticeRequest,
    responses(
        (status = 201, description = "Notice posted", body = Notice),
        (status = 400, description = "Invalid notice", body = ErrorResponse),
        (status = 403, description = "Role cannot manage notices", body = ErrorResponse)
    )
)]
pub async fn create_notice(
    ctx: SessionContext,
    State(state): State<AppState>,
    Json(payload): Json<CreateNoticeRequest>,
) -> AppResult<(StatusCode, Json<Notice>)> {
    ctx.require_manage(Page::Notices)?;
    let notice = state
        .repo
        .create_notice(ctx.identity.id, payload.validated()?)
        .await?;
    tracing::info!(notice_id = %notice.id, author_id = %ctx.identity.id, "notice posted");
    Ok((StatusCode::CREATED, Json(notice)))
}

// --- Assignments ---

#[utoipa::path(
    get,
    path = "/assignments",
    params(ListQuery),
    responses((status = 200, description = "Assignments by due date", body = [Assignment]))
)]
pub async fn list_assignments(
    ctx: SessionContext,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<Assignment>>> {
    ctx.primary_role()?;
    Ok(Json(state.repo.list_assignments(query).await?))
}

#[utoipa::path(
    post,
    path = "/assignments",
    request_body = CreateAssignmentRequest,
    responses(
        (status = 201, description = "Assignment created", body = Assignment),
        (status = 400, description = "Invalid assignment", body = ErrorResponse),
        (status = 403, description = "Role cannot manage assignments", body = ErrorResponse)
    )
)]
pub async fn create_assignment(
    ctx: SessionContext,
    State(state): State<AppState>,
    Json(payload): Json<CreateAssignmentRequest>,
) -> AppResult<(StatusCode, Json<Assignment>)> {
    ctx.require_manage(Page::Assignments)?;
    let assignment = state
        .repo
        .create_assignment(ctx.identity.id, payload.validated()?)
        .await?;
    Ok((StatusCode::CREATED, Json(assignment)))
}

// --- Attendance ---

/// list_attendance
///
/// [Authenticated Route] Managers read one course (`course_id` required);
/// everyone else reads only their own records, optionally narrowed to a course.
#[utoipa::path(
    get,
    path = "/attendance",
    params(AttendanceQuery),
    responses(
        (status = 200, description = "Attendance records", body = [AttendanceRecord]),
        (status = 400, description = "Missing course_id", body = ErrorResponse)
    )
)]
pub async fn list_attendance(
    ctx: SessionContext,
    State(state): State<AppState>,
    Query(query): Query<AttendanceQuery>,
) -> AppResult<Json<Vec<AttendanceRecord>>> {
    ctx.primary_role()?;
    let filter = if ctx.can_manage(Page::Attendance) {
        let course_id = query
            .course_id
            .ok_or_else(|| AppError::Validation("course_id is required".to_string()))?;
        AttendanceFilter {
            student_id: None,
            course_id: Some(course_id),
        }
    } else {
        AttendanceFilter {
            student_id: Some(ctx.identity.id),
            course_id: query.course_id,
        }
    };
    Ok(Json(state.repo.list_attendance(filter).await?))
}

#[utoipa::path(
    post,
    path = "/attendance",
    request_body = MarkAttendanceRequest,
    responses(
        (status = 201, description = "Attendance marked", body = AttendanceRecord),
        (status = 403, description = "Role cannot manage attendance", body = ErrorResponse)
    )
)]
pub async fn mark_attendance(
    ctx: SessionContext,
    State(state): State<AppState>,
    Json(payload): Json<MarkAttendanceRequest>,
) -> AppResult<(StatusCode, Json<AttendanceRecord>)> {
    ctx.require_manage(Page::Attendance)?;
    let record = state
        .repo
        .mark_attendance(ctx.identity.id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

// --- Profile (settings page) ---

#[utoipa::path(
    get,
    path = "/profile",
    responses(
        (status = 200, description = "Own profile", body = Profile),
        (status = 404, description = "No profile row", body = ErrorResponse)
    )
)]
pub async fn get_profile(
    ctx: SessionContext,
    State(state): State<AppState>,
) -> AppResult<Json<Profile>> {
    ctx.primary_role()?;
    state
        .repo
        .get_profile(ctx.identity.id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("profile".to_string()))
}

/// update_profile
///
/// [Authenticated Route] Owner-only edit. `student_id` is only written for
/// accounts whose primary role is student.
#[utoipa::path(
    put,
    path = "/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = Profile),
        (status = 400, description = "Invalid profile", body = ErrorResponse),
        (status = 404, description = "No profile row", body = ErrorResponse)
    )
)]
pub async fn update_profile(
    ctx: SessionContext,
    State(state): State<AppState>,
    Json(payload): Json<UpdateProfileRequest>,
) -> AppResult<Json<Profile>> {
    let role = ctx.primary_role()?;
    let update = payload.validate(role == Role::Student)?;
    state
        .repo
        .update_profile(ctx.identity.id, update)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("profile".to_string()))
}

// --- Session ---

/// sign_out
///
/// [Authenticated Route] Ends the session at the identity provider, then
/// refuses the presented token from now on and publishes `SignedOut` so
/// in-flight loads for this identity are cancelled. Local bypass sessions carry no token to revoke
/// upstream.
#[utoipa::path(
    post,
    path = "/auth/signout",
    responses(
        (status = 204, description = "Signed out"),
        (status = 401, description = "Invalid session", body = ErrorResponse),
        (status = 502, description = "Identity provider failed", body = ErrorResponse)
    )
)]
pub async fn sign_out(
    identity: Identity,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<StatusCode> {
    if let Some(token) = auth::bearer_token(&headers) {
        state.identity.sign_out(token).await?;
        // Bypass identities carry no real issue time.
        let issued_at = identity.issued_at.min(Utc::now().timestamp());
        state.sessions.revoke(identity.id, issued_at).await;
    }

    state
        .sessions
        .publish(SessionEvent::SignedOut {
            user_id: identity.id,
        })
        .await;
    tracing::info!(user_id = %identity.id, "signed out");

    Ok(StatusCode::NO_CONTENT)
}
