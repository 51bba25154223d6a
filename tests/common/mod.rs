#![allow(dead_code)]

use async_trait::async_trait;
use campus_connect::{
    AppState,
    auth::{Claims, Identity, SessionContext},
    config::AppConfig,
    error::{AppError, AppResult},
    identity_provider::MockIdentityProvider,
    models::{
        Assignment, AttendanceRecord, Course, CreateAssignmentRequest, CreateNoticeRequest, Event,
        ListQuery, MarkAttendanceRequest, Notice, Profile, ProfileUpdate, Role, RoleAssignment,
    },
    repository::{AttendanceFilter, CountQuery, NoticeAudience, Repository},
    roles::ResolvedRoles,
    session::{SessionEvent, SessionEvents},
};
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};
use tokio::sync::Notify;
use uuid::Uuid;

pub const STUDENT_ID: Uuid = Uuid::from_u128(0x51);
pub const FACULTY_ID: Uuid = Uuid::from_u128(0xFA);
pub const ADMIN_ID: Uuid = Uuid::from_u128(0xAD);

// --- MOCK REPOSITORY IMPLEMENTATION ---

/// In-memory repository. Every field is a knob a test can turn; the `Mutex`
/// fields also record what handlers asked for.
#[derive(Default)]
pub struct MockRepo {
    pub roles: Mutex<Vec<Role>>,
    pub profile: Option<Profile>,
    /// Every read fails with `LookupFailure`.
    pub fail_lookups: bool,
    pub counts: HashMap<CountQuery, i64>,
    pub courses: Vec<Course>,
    pub events: Vec<Event>,
    pub assignments: Vec<Assignment>,
    pub notices: Vec<Notice>,
    pub attendance: Vec<AttendanceRecord>,

    /// While set, `count` never answers. `count_started` fires on entry.
    pub hold_counts: AtomicBool,
    pub count_started: Notify,
    /// Publishes `RolesChanged` for the reader on every role read.
    pub churn_roles: Option<SessionEvents>,

    pub role_reads: AtomicUsize,
    pub notice_audiences: Mutex<Vec<NoticeAudience>>,
    pub attendance_filters: Mutex<Vec<AttendanceFilter>>,
    pub profile_updates: Mutex<Vec<ProfileUpdate>>,
}

impl MockRepo {
    pub fn with_roles(roles: &[Role]) -> Self {
        Self {
            roles: Mutex::new(roles.to_vec()),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_lookups: true,
            ..Self::default()
        }
    }

    pub fn set_roles(&self, roles: &[Role]) {
        *self.roles.lock().unwrap() = roles.to_vec();
    }

    fn check(&self) -> AppResult<()> {
        if self.fail_lookups {
            return Err(AppError::LookupFailure("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for MockRepo {
    async fn get_role_assignments(&self, user_id: Uuid) -> AppResult<Vec<RoleAssignment>> {
        self.check()?;
        self.role_reads.fetch_add(1, Ordering::SeqCst);
        if let Some(events) = &self.churn_roles {
            events.publish(SessionEvent::RolesChanged { user_id }).await;
        }
        let roles = self.roles.lock().unwrap().clone();
        Ok(roles
            .into_iter()
            .map(|role| RoleAssignment { user_id, role })
            .collect())
    }

    async fn get_profile(&self, user_id: Uuid) -> AppResult<Option<Profile>> {
        self.check()?;
        Ok(self.profile.clone().filter(|p| p.id == user_id))
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        update: ProfileUpdate,
    ) -> AppResult<Option<Profile>> {
        self.check()?;
        self.profile_updates.lock().unwrap().push(update.clone());
        Ok(self
            .profile
            .clone()
            .filter(|p| p.id == user_id)
            .map(|mut profile| {
                profile.full_name = update.full_name;
                profile.department = update.department;
                if let Some(student_id) = update.student_id {
                    profile.student_id = student_id;
                }
                profile
            }))
    }

    async fn count(&self, query: CountQuery) -> AppResult<i64> {
        self.check()?;
        if self.hold_counts.load(Ordering::SeqCst) {
            self.count_started.notify_one();
            std::future::pending::<()>().await;
        }
        Ok(self.counts.get(&query).copied().unwrap_or(0))
    }

    async fn list_courses(&self) -> AppResult<Vec<Course>> {
        self.check()?;
        Ok(self.courses.clone())
    }

    async fn list_events(&self, query: ListQuery) -> AppResult<Vec<Event>> {
        self.check()?;
        Ok(self
            .events
            .iter()
            .take(query.clamped_limit() as usize)
            .cloned()
            .collect())
    }

    async fn list_assignments(&self, query: ListQuery) -> AppResult<Vec<Assignment>> {
        self.check()?;
        Ok(self
            .assignments
            .iter()
            .take(query.clamped_limit() as usize)
            .cloned()
            .collect())
    }

    async fn list_notices(&self, audience: NoticeAudience, limit: i64) -> AppResult<Vec<Notice>> {
        self.check()?;
        self.notice_audiences.lock().unwrap().push(audience.clone());
        Ok(self
            .notices
            .iter()
            .filter(|notice| match (&audience, notice.target_role) {
                (NoticeAudience::Everyone, _) | (_, None) => true,
                (NoticeAudience::Roles(roles), Some(target)) => roles.contains(&target),
            })
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn list_attendance(&self, filter: AttendanceFilter) -> AppResult<Vec<AttendanceRecord>> {
        self.check()?;
        self.attendance_filters.lock().unwrap().push(filter);
        Ok(self
            .attendance
            .iter()
            .filter(|r| filter.student_id.is_none_or(|id| r.student_id == id))
            .filter(|r| filter.course_id.is_none_or(|id| r.course_id == id))
            .cloned()
            .collect())
    }

    async fn create_assignment(
        &self,
        created_by: Uuid,
        req: CreateAssignmentRequest,
    ) -> AppResult<Assignment> {
        self.check()?;
        Ok(Assignment {
            id: Uuid::new_v4(),
            course_id: req.course_id,
            course_name: None,
            title: req.title,
            description: req.description,
            due_date: req.due_date,
            max_points: req.max_points,
            created_by: Some(created_by),
            is_overdue: false,
        }
        .with_overdue(Utc::now()))
    }

    async fn create_notice(&self, author_id: Uuid, req: CreateNoticeRequest) -> AppResult<Notice> {
        self.check()?;
        Ok(Notice {
            id: Uuid::new_v4(),
            title: req.title,
            content: req.content,
            priority: Some(req.priority.as_str().to_string()),
            target_role: req.target_role,
            author_id: Some(author_id),
            created_at: Some(Utc::now()),
        })
    }

    async fn mark_attendance(
        &self,
        marked_by: Uuid,
        req: MarkAttendanceRequest,
    ) -> AppResult<AttendanceRecord> {
        self.check()?;
        Ok(AttendanceRecord {
            id: Uuid::new_v4(),
            course_id: req.course_id,
            course_name: None,
            student_id: req.student_id,
            date: req.date.unwrap_or_else(|| Utc::now().date_naive()),
            status: req.status.as_str().to_string(),
            marked_by: Some(marked_by),
        })
    }
}

// --- TEST UTILITIES ---

pub fn create_test_state(repo: MockRepo) -> AppState {
    create_test_state_with(Arc::new(repo), MockIdentityProvider::new())
}

pub fn create_test_state_with(repo: Arc<MockRepo>, identity: MockIdentityProvider) -> AppState {
    AppState {
        repo,
        identity: Arc::new(identity),
        sessions: SessionEvents::new(),
        config: AppConfig::default(),
    }
}

pub fn profile_for(id: Uuid) -> Profile {
    Profile {
        id,
        email: format!("{id}@campus.test"),
        full_name: "Test User".to_string(),
        ..Profile::default()
    }
}

pub fn identity(id: Uuid) -> Identity {
    Identity {
        id,
        email: Some(format!("{id}@campus.test")),
        issued_at: Utc::now().timestamp() - 60,
    }
}

/// A session as the extractor would build it, for calling handlers directly.
pub fn session(id: Uuid, roles: &[Role]) -> SessionContext {
    SessionContext {
        identity: identity(id),
        access: ResolvedRoles::from_roles(roles.iter().copied()),
    }
}

/// Signs a provider-style token with the default test secret.
/// Offsets are seconds relative to now.
pub fn create_token(user_id: Uuid, iat_offset: i64, exp_offset: i64, aud: &str) -> String {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id,
        iat: (now + iat_offset) as usize,
        exp: (now + exp_offset) as usize,
        aud: aud.to_string(),
        email: Some("jwt@campus.test".to_string()),
    };
    let key = EncodingKey::from_secret(AppConfig::default().jwt_secret.as_bytes());
    encode(&Header::default(), &claims, &key).unwrap()
}

pub fn valid_token(user_id: Uuid) -> String {
    create_token(user_id, -10, 3600, "authenticated")
}
