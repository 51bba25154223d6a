use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Authenticated Router Module
///
/// One route per dashboard page. Reads are open to any role; the POST
/// counterparts check the management capability inside the handler, so a
/// student reaching them gets 403 rather than 404.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /me/access
        // Roles, primary role, dispatch state and per-page capabilities.
        .route("/me/access", get(handlers::get_access))
        // GET /dashboard
        // Student, faculty or admin dashboard, chosen by primary role.
        .route("/dashboard", get(handlers::get_dashboard))
        .route("/courses", get(handlers::list_courses))
        .route("/events", get(handlers::list_events))
        .route(
            "/notices",
            get(handlers::list_notices).post(handlers::create_notice),
        )
        .route(
            "/assignments",
            get(handlers::list_assignments).post(handlers::create_assignment),
        )
        // GET /attendance?course_id=...
        // Students read their own records; managers read one course at a time.
        .route(
            "/attendance",
            get(handlers::list_attendance).post(handlers::mark_attendance),
        )
        // GET/PUT /profile
        // Settings page. Owner-only: the id always comes from the session.
        .route(
            "/profile",
            get(handlers::get_profile).put(handlers::update_profile),
        )
        // POST /auth/signout
        // Delegates to the identity provider and cancels in-flight loads.
        .route("/auth/signout", post(handlers::sign_out))
}
