use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

// --- Roles ---

/// Role
///
/// The `app_role` enum of the `user_roles` table. Declaration order is the
/// natural sort order only; dashboard precedence lives in `roles::ROLE_PRECEDENCE`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS, ToSchema,
    sqlx::Type,
)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "app_role", rename_all = "lowercase")]
pub enum Role {
    Student,
    Faculty,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Faculty => "faculty",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// RoleAssignment
///
/// One (user, role) grant from `public.user_roles`. Created by administrative
/// tooling outside this service; only ever read here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct RoleAssignment {
    pub user_id: Uuid,
    pub role: Role,
}

// --- Profiles ---

/// Profile
///
/// Display attributes of one identity (`public.profiles`). The primary key is
/// the identity provider's user id.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub department: Option<String>,
    pub student_id: Option<String>,
    pub avatar_url: Option<String>,
    #[ts(type = "string | null")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// UpdateProfileRequest
///
/// Self-service settings form (PUT /profile). Empty optional strings clear the column.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateProfileRequest {
    pub full_name: String,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub student_id: Option<String>,
}

/// ProfileUpdate
///
/// Validated form of `UpdateProfileRequest`. `student_id` is `None` when the
/// column must be left untouched, `Some(None)` when it must be cleared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub full_name: String,
    pub department: Option<String>,
    pub student_id: Option<Option<String>>,
}

impl UpdateProfileRequest {
    /// Trims and bounds every field. `edits_student_id` is false for non-student
    /// primary roles, whose settings form has no student identifier field.
    pub fn validate(&self, edits_student_id: bool) -> AppResult<ProfileUpdate> {
        let full_name = self.full_name.trim();
        let name_len = full_name.chars().count();
        if name_len < 2 {
            return Err(AppError::Validation(
                "Name must be at least 2 characters".to_string(),
            ));
        }
        if name_len > 100 {
            return Err(AppError::Validation("Name too long".to_string()));
        }

        let department = optional_field(self.department.as_deref(), 100, "Department name too long")?;
        let student_id = if edits_student_id {
            Some(optional_field(self.student_id.as_deref(), 20, "Student ID too long")?)
        } else {
            None
        };

        Ok(ProfileUpdate {
            full_name: full_name.to_string(),
            department,
            student_id,
        })
    }
}

fn optional_field(value: Option<&str>, max: usize, message: &str) -> AppResult<Option<String>> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    if value.chars().count() > max {
        return Err(AppError::Validation(message.to_string()));
    }
    Ok(Some(value.to_string()))
}

fn required_text(value: &str, max: usize, field: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Validation(format!("{field} is required")));
    }
    if value.chars().count() > max {
        return Err(AppError::Validation(format!("{field} too long")));
    }
    Ok(value.to_string())
}

// --- Courses & Events ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Course {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub department: String,
    pub credits: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    #[ts(type = "string")]
    pub event_date: DateTime<Utc>,
    pub location: Option<String>,
    pub category: Option<String>,
    pub organizer_id: Option<Uuid>,
}

// --- Assignments ---

/// Assignment
///
/// A row of `public.assignments` joined with its course name.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Assignment {
    pub id: Uuid,
    pub course_id: Option<Uuid>,
    #[sqlx(default)]
    pub course_name: Option<String>,
    pub title: String,
    pub description: Option<String>,
    #[ts(type = "string")]
    pub due_date: DateTime<Utc>,
    pub max_points: Option<i32>,
    pub created_by: Option<Uuid>,
    /// Computed at read time, not stored.
    #[sqlx(skip)]
    pub is_overdue: bool,
}

impl Assignment {
    pub fn with_overdue(mut self, now: DateTime<Utc>) -> Self {
        self.is_overdue = self.due_date < now;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateAssignmentRequest {
    #[serde(default)]
    pub course_id: Option<Uuid>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[ts(type = "string")]
    pub due_date: DateTime<Utc>,
    #[serde(default)]
    pub max_points: Option<i32>,
}

impl CreateAssignmentRequest {
    pub fn validated(self) -> AppResult<Self> {
        let title = required_text(&self.title, 200, "Title")?;
        let description = optional_field(self.description.as_deref(), 5000, "Description too long")?;
        if matches!(self.max_points, Some(points) if points <= 0) {
            return Err(AppError::Validation(
                "Max points must be positive".to_string(),
            ));
        }
        Ok(Self {
            title,
            description,
            ..self
        })
    }
}

// --- Notices ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Notice {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub priority: Option<String>,
    pub target_role: Option<Role>,
    pub author_id: Option<Uuid>,
    #[ts(type = "string | null")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum NoticePriority {
    Low,
    #[default]
    Normal,
    High,
}

impl NoticePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticePriority::Low => "low",
            NoticePriority::Normal => "normal",
            NoticePriority::High => "high",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateNoticeRequest {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub priority: NoticePriority,
    /// Restricts visibility to holders of this role; `None` targets everyone.
    #[serde(default)]
    pub target_role: Option<Role>,
}

impl CreateNoticeRequest {
    pub fn validated(self) -> AppResult<Self> {
        Ok(Self {
            title: required_text(&self.title, 200, "Title")?,
            content: required_text(&self.content, 5000, "Content")?,
            ..self
        })
    }
}

// --- Attendance ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Late => "late",
        }
    }
}

/// AttendanceRecord
///
/// A row of `public.attendance` joined with its course name. `status` stays a
/// plain string because older rows may carry values outside `AttendanceStatus`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub course_id: Uuid,
    #[sqlx(default)]
    pub course_name: Option<String>,
    pub student_id: Uuid,
    #[ts(type = "string")]
    pub date: NaiveDate,
    pub status: String,
    pub marked_by: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MarkAttendanceRequest {
    pub course_id: Uuid,
    pub student_id: Uuid,
    pub status: AttendanceStatus,
    /// Defaults to today (UTC).
    #[serde(default)]
    #[ts(type = "string | null")]
    pub date: Option<NaiveDate>,
}

// --- Dashboard Stats ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct StudentStats {
    pub enrolled_courses: i64,
    pub upcoming_events: i64,
    pub pending_assignments: i64,
    pub attendance_percent: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct FacultyStats {
    pub assigned_courses: i64,
    pub pending_grading: i64,
    pub event_participation: i64,
    pub total_students: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AdminStats {
    pub total_users: i64,
    pub total_courses: i64,
    pub active_events: i64,
    pub system_health: String,
}

// --- Query Parameters ---

/// Default and ceiling for list endpoints.
pub const DEFAULT_LIST_LIMIT: i64 = 50;
pub const MAX_LIST_LIMIT: i64 = 100;

/// ListQuery
///
/// Shared query string of the dated list endpoints (GET /events, GET /assignments).
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct ListQuery {
    /// Only rows dated now or later.
    pub upcoming: Option<bool>,
    pub limit: Option<i64>,
}

impl ListQuery {
    pub fn upcoming(limit: i64) -> Self {
        Self {
            upcoming: Some(true),
            limit: Some(limit),
        }
    }

    pub fn upcoming_only(&self) -> bool {
        self.upcoming.unwrap_or(false)
    }

    pub fn clamped_limit(&self) -> i64 {
        clamp_limit(self.limit)
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct NoticeQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct AttendanceQuery {
    /// Required for managers; narrows a student's own records otherwise.
    pub course_id: Option<Uuid>,
}

pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}
