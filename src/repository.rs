use crate::{
    error::{AppError, AppResult},
    models::{
        Assignment, AttendanceRecord, Course, CreateAssignmentRequest, CreateNoticeRequest, Event,
        ListQuery, MarkAttendanceRequest, Notice, Profile, ProfileUpdate, Role, RoleAssignment,
    },
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, query_builder::QueryBuilder};
use std::sync::Arc;
use uuid::Uuid;

/// CountQuery
///
/// Every counter the dashboards display. Each variant is one `SELECT COUNT(*)`
/// over a single collection with equality/range filters only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CountQuery {
    /// Enrollments of a student with status `active`.
    ActiveEnrollments { student_id: Uuid },
    /// Event registrations of a user with status `registered`.
    RegisteredEvents { user_id: Uuid },
    /// Event registrations of a user, any status.
    EventRegistrations { user_id: Uuid },
    /// Assignments due now or later.
    UpcomingAssignments,
    AttendanceRecords { student_id: Uuid },
    PresentAttendance { student_id: Uuid },
    /// Courses a faculty member teaches (`course_faculty` rows).
    AssignedCourses { faculty_id: Uuid },
    /// Submissions without a grade.
    UngradedSubmissions,
    /// Enrollment rows across the courses a faculty member teaches.
    StudentsInCourses { faculty_id: Uuid },
    Profiles,
    Courses,
    /// Events dated now or later.
    UpcomingEvents,
}

impl CountQuery {
    /// The statement and its single optional bind parameter.
    fn statement(&self) -> (&'static str, Option<Uuid>) {
        match *self {
            CountQuery::ActiveEnrollments { student_id } => (
                "SELECT COUNT(*) FROM course_enrollments WHERE student_id = $1 AND status = 'active'",
                Some(student_id),
            ),
            CountQuery::RegisteredEvents { user_id } => (
                "SELECT COUNT(*) FROM event_registrations WHERE user_id = $1 AND status = 'registered'",
                Some(user_id),
            ),
            CountQuery::EventRegistrations { user_id } => (
                "SELECT COUNT(*) FROM event_registrations WHERE user_id = $1",
                Some(user_id),
            ),
            CountQuery::UpcomingAssignments => (
                "SELECT COUNT(*) FROM assignments WHERE due_date >= NOW()",
                None,
            ),
            CountQuery::AttendanceRecords { student_id } => (
                "SELECT COUNT(*) FROM attendance WHERE student_id = $1",
                Some(student_id),
            ),
            CountQuery::PresentAttendance { student_id } => (
                "SELECT COUNT(*) FROM attendance WHERE student_id = $1 AND status = 'present'",
                Some(student_id),
            ),
            CountQuery::AssignedCourses { faculty_id } => (
                "SELECT COUNT(*) FROM course_faculty WHERE faculty_id = $1",
                Some(faculty_id),
            ),
            CountQuery::UngradedSubmissions => {
                ("SELECT COUNT(*) FROM submissions WHERE grade IS NULL", None)
            }
            CountQuery::StudentsInCourses { faculty_id } => (
                r#"SELECT COUNT(*) FROM course_enrollments
                   WHERE course_id IN (SELECT course_id FROM course_faculty WHERE faculty_id = $1)"#,
                Some(faculty_id),
            ),
            CountQuery::Profiles => ("SELECT COUNT(*) FROM profiles", None),
            CountQuery::Courses => ("SELECT COUNT(*) FROM courses", None),
            CountQuery::UpcomingEvents => (
                "SELECT COUNT(*) FROM events WHERE event_date >= NOW()",
                None,
            ),
        }
    }
}

/// NoticeAudience
///
/// Which notices a reader may see, by `target_role`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoticeAudience {
    /// Every notice, targeted or not.
    Everyone,
    /// Untargeted notices plus those targeting one of these roles.
    Roles(Vec<Role>),
}

/// AttendanceFilter
///
/// Equality filters for attendance listings. Unset fields do not filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttendanceFilter {
    pub student_id: Option<Uuid>,
    pub course_id: Option<Uuid>,
}

/// Repository Trait
///
/// The row-storage boundary. Every method is a pass-through query; failures
/// come back as `AppError::LookupFailure` and are never collapsed into empty
/// results, so callers can tell "nothing there" from "could not look".
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Access ---
    async fn get_role_assignments(&self, user_id: Uuid) -> AppResult<Vec<RoleAssignment>>;

    // --- Profiles ---
    async fn get_profile(&self, user_id: Uuid) -> AppResult<Option<Profile>>;
    // Owner-only: the id always comes from the authenticated identity.
    async fn update_profile(&self, user_id: Uuid, update: ProfileUpdate)
    -> AppResult<Option<Profile>>;

    // --- Counters ---
    async fn count(&self, query: CountQuery) -> AppResult<i64>;

    // --- Listings ---
    async fn list_courses(&self) -> AppResult<Vec<Course>>;
    async fn list_events(&self, query: ListQuery) -> AppResult<Vec<Event>>;
    async fn list_assignments(&self, query: ListQuery) -> AppResult<Vec<Assignment>>;
    async fn list_notices(&self, audience: NoticeAudience, limit: i64) -> AppResult<Vec<Notice>>;
    async fn list_attendance(&self, filter: AttendanceFilter) -> AppResult<Vec<AttendanceRecord>>;

    // --- Management ---
    async fn create_assignment(
        &self,
        created_by: Uuid,
        req: CreateAssignmentRequest,
    ) -> AppResult<Assignment>;
    async fn create_notice(&self, author_id: Uuid, req: CreateNoticeRequest) -> AppResult<Notice>;
    // Upsert on (course, student, date): marking twice corrects the status.
    async fn mark_attendance(
        &self,
        marked_by: Uuid,
        req: MarkAttendanceRequest,
    ) -> AppResult<AttendanceRecord>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// `Repository` backed by the Postgres database behind the hosted backend.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Logs a failed statement and converts it into a lookup failure.
fn lookup_failure(operation: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| {
        tracing::error!("{} error: {:?}", operation, e);
        AppError::from(e)
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_role_assignments(&self, user_id: Uuid) -> AppResult<Vec<RoleAssignment>> {
        sqlx::query_as::<_, RoleAssignment>("SELECT user_id, role FROM user_roles WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(lookup_failure("get_role_assignments"))
    }

    async fn get_profile(&self, user_id: Uuid) -> AppResult<Option<Profile>> {
        sqlx::query_as::<_, Profile>(
            r#"SELECT id, email, full_name, department, student_id, avatar_url, updated_at
               FROM profiles WHERE id = $1"#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(lookup_failure("get_profile"))
    }

    /// update_profile
    ///
    /// `student_id` is only written when the update carries it; `$4` tells the
    /// statement whether to overwrite or keep the stored value.
    async fn update_profile(
        &self,
        user_id: Uuid,
        update: ProfileUpdate,
    ) -> AppResult<Option<Profile>> {
        let writes_student_id = update.student_id.is_some();
        sqlx::query_as::<_, Profile>(
            r#"
            UPDATE profiles
            SET full_name = $2,
                department = $3,
                student_id = CASE WHEN $4 THEN $5 ELSE student_id END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, email, full_name, department, student_id, avatar_url, updated_at
            "#,
        )
        .bind(user_id)
        .bind(update.full_name)
        .bind(update.department)
        .bind(writes_student_id)
        .bind(update.student_id.flatten())
        .fetch_optional(&self.pool)
        .await
        .map_err(lookup_failure("update_profile"))
    }

    async fn count(&self, query: CountQuery) -> AppResult<i64> {
        let (statement, param) = query.statement();
        let mut scalar = sqlx::query_scalar::<_, i64>(statement);
        if let Some(id) = param {
            scalar = scalar.bind(id);
        }
        scalar
            .fetch_one(&self.pool)
            .await
            .map_err(lookup_failure("count"))
    }

    async fn list_courses(&self) -> AppResult<Vec<Course>> {
        sqlx::query_as::<_, Course>(
            "SELECT id, code, name, department, credits FROM courses ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(lookup_failure("list_courses"))
    }

    async fn list_events(&self, query: ListQuery) -> AppResult<Vec<Event>> {
        let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
            r#"
            SELECT id, title, description, event_date, location, category, organizer_id
            FROM events
            "#,
        );
        if query.upcoming_only() {
            builder.push(" WHERE event_date >= NOW()");
        }
        builder.push(" ORDER BY event_date ASC LIMIT ");
        builder.push_bind(query.clamped_limit());

        builder
            .build_query_as::<Event>()
            .fetch_all(&self.pool)
            .await
            .map_err(lookup_failure("list_events"))
    }

    async fn list_assignments(&self, query: ListQuery) -> AppResult<Vec<Assignment>> {
        let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
            r#"
            SELECT a.id, a.course_id, c.name AS course_name, a.title, a.description,
                   a.due_date, a.max_points, a.created_by
            FROM assignments a
            LEFT JOIN courses c ON c.id = a.course_id
            "#,
        );
        if query.upcoming_only() {
            builder.push(" WHERE a.due_date >= NOW()");
        }
        builder.push(" ORDER BY a.due_date ASC LIMIT ");
        builder.push_bind(query.clamped_limit());

        let now = Utc::now();
        let rows = builder
            .build_query_as::<Assignment>()
            .fetch_all(&self.pool)
            .await
            .map_err(lookup_failure("list_assignments"))?;
        Ok(rows.into_iter().map(|a| a.with_overdue(now)).collect())
    }

    /// list_notices
    ///
    /// Newest first. The role filter compares on the text form so the bind is a
    /// plain `text[]`.
    async fn list_notices(&self, audience: NoticeAudience, limit: i64) -> AppResult<Vec<Notice>> {
        let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
            r#"
            SELECT id, title, content, priority, target_role, author_id, created_at
            FROM notices
            "#,
        );
        if let NoticeAudience::Roles(roles) = audience {
            let roles: Vec<String> = roles.iter().map(|r| r.as_str().to_string()).collect();
            builder.push(" WHERE target_role IS NULL OR target_role::text = ANY(");
            builder.push_bind(roles);
            builder.push(")");
        }
        builder.push(" ORDER BY created_at DESC NULLS LAST LIMIT ");
        builder.push_bind(limit);

        builder
            .build_query_as::<Notice>()
            .fetch_all(&self.pool)
            .await
            .map_err(lookup_failure("list_notices"))
    }

    async fn list_attendance(&self, filter: AttendanceFilter) -> AppResult<Vec<AttendanceRecord>> {
        let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
            r#"
            SELECT at.id, at.course_id, c.name AS course_name, at.student_id,
                   at.date, at.status, at.marked_by
            FROM attendance at
            LEFT JOIN courses c ON c.id = at.course_id
            WHERE TRUE
            "#,
        );
        if let Some(student_id) = filter.student_id {
            builder.push(" AND at.student_id = ");
            builder.push_bind(student_id);
        }
        if let Some(course_id) = filter.course_id {
            builder.push(" AND at.course_id = ");
            builder.push_bind(course_id);
        }
        builder.push(" ORDER BY at.date DESC");

        builder
            .build_query_as::<AttendanceRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(lookup_failure("list_attendance"))
    }

    async fn create_assignment(
        &self,
        created_by: Uuid,
        req: CreateAssignmentRequest,
    ) -> AppResult<Assignment> {
        let created = sqlx::query_as::<_, Assignment>(
            r#"
            WITH inserted AS (
                INSERT INTO assignments (id, course_id, title, description, due_date, max_points, created_by, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
                RETURNING id, course_id, title, description, due_date, max_points, created_by
            )
            SELECT i.id, i.course_id, c.name AS course_name, i.title, i.description,
                   i.due_date, i.max_points, i.created_by
            FROM inserted i
            LEFT JOIN courses c ON c.id = i.course_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(req.course_id)
        .bind(req.title)
        .bind(req.description)
        .bind(req.due_date)
        .bind(req.max_points)
        .bind(created_by)
        .fetch_one(&self.pool)
        .await
        .map_err(lookup_failure("create_assignment"))?;
        Ok(created.with_overdue(Utc::now()))
    }

    async fn create_notice(&self, author_id: Uuid, req: CreateNoticeRequest) -> AppResult<Notice> {
        sqlx::query_as::<_, Notice>(
            r#"
            INSERT INTO notices (id, title, content, priority, target_role, author_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            RETURNING id, title, content, priority, target_role, author_id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(req.title)
        .bind(req.content)
        .bind(req.priority.as_str())
        .bind(req.target_role)
        .bind(author_id)
        .fetch_one(&self.pool)
        .await
        .map_err(lookup_failure("create_notice"))
    }

    async fn mark_attendance(
        &self,
        marked_by: Uuid,
        req: MarkAttendanceRequest,
    ) -> AppResult<AttendanceRecord> {
        let date = req.date.unwrap_or_else(|| Utc::now().date_naive());
        sqlx::query_as::<_, AttendanceRecord>(
            r#"
            WITH marked AS (
                INSERT INTO attendance (id, course_id, student_id, date, status, marked_by, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, NOW())
                ON CONFLICT (course_id, student_id, date)
                DO UPDATE SET status = EXCLUDED.status, marked_by = EXCLUDED.marked_by
                RETURNING id, course_id, student_id, date, status, marked_by
            )
            SELECT m.id, m.course_id, c.name AS course_name, m.student_id, m.date, m.status, m.marked_by
            FROM marked m
            LEFT JOIN courses c ON c.id = m.course_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(req.course_id)
        .bind(req.student_id)
        .bind(date)
        .bind(req.status.as_str())
        .bind(marked_by)
        .fetch_one(&self.pool)
        .await
        .map_err(lookup_failure("mark_attendance"))
    }
}
