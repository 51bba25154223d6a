use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Access: identity, role resolution and dashboard dispatch.
pub mod auth;
pub mod dispatch;
pub mod roles;
pub mod session;

// Page data and the services behind it.
pub mod config;
pub mod dashboard;
pub mod error;
pub mod handlers;
pub mod identity_provider;
pub mod models;
pub mod repository;

pub mod routes;
use auth::Identity;
use routes::{authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use identity_provider::{IdentityProviderState, MockIdentityProvider, SupabaseAuthClient};
pub use repository::{PostgresRepository, RepositoryState};
pub use session::SessionEvents;

/// ApiDoc
///
/// OpenAPI document for every route, served at `/api-docs/openapi.json` and
/// browsable under `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::get_access, handlers::get_dashboard, handlers::list_courses,
        handlers::list_events, handlers::list_notices, handlers::create_notice,
        handlers::list_assignments, handlers::create_assignment, handlers::list_attendance,
        handlers::mark_attendance, handlers::get_profile, handlers::update_profile,
        handlers::sign_out
    ),
    components(
        schemas(
            models::Role, models::Profile, models::UpdateProfileRequest, models::Course,
            models::Event, models::Assignment, models::CreateAssignmentRequest, models::Notice,
            models::NoticePriority, models::CreateNoticeRequest, models::AttendanceStatus,
            models::AttendanceRecord, models::MarkAttendanceRequest, models::StudentStats,
            models::FacultyStats, models::AdminStats, dashboard::StudentDashboard,
            dashboard::DashboardResponse, dispatch::Page, dispatch::DashboardState,
            dispatch::DashboardVariant, dispatch::PageCapability, handlers::AccessResponse,
            error::ErrorResponse,
        )
    ),
    tags(
        (name = "campus-connect", description = "Campus Connect dashboard API")
    )
)]
struct ApiDoc;

/// AppState
///
/// Everything a request may need, built once in `main` and cloned per request.
/// Handlers slice out what they use through the `FromRef` impls below.
#[derive(Clone)]
pub struct AppState {
    /// Row storage behind the hosted backend.
    pub repo: RepositoryState,
    /// Delegated session operations (sign-out).
    pub identity: IdentityProviderState,
    /// Fan-out of session changes fed by the LISTEN task.
    pub sessions: SessionEvents,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for IdentityProviderState {
    fn from_ref(app_state: &AppState) -> IdentityProviderState {
        app_state.identity.clone()
    }
}

impl FromRef<AppState> for SessionEvents {
    fn from_ref(app_state: &AppState) -> SessionEvents {
        app_state.sessions.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Rejects any request without a valid identity before it reaches a handler.
/// The `Identity` extractor answers 401 (or 503 if the local bypass lookup
/// fails) with the usual JSON error body.
async fn auth_middleware(_identity: Identity, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the routers, the authentication layer, the documentation and the
/// observability stack.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// One `http_request` span per request, tagged with the generated request id
/// so every log line of that request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
