mod common;

use campus_connect::{
    dashboard::{
        self, DASHBOARD_LIST_LIMIT, DashboardView, MAX_RESOLUTION_ATTEMPTS, attendance_percent,
    },
    dispatch::DashboardVariant,
    error::AppError,
    models::{Event, Notice, Role},
    repository::CountQuery,
    session::{SessionEvent, SessionEvents},
};
use common::{ADMIN_ID, FACULTY_ID, MockRepo, STUDENT_ID, identity};
use std::sync::{Arc, atomic::Ordering};
use uuid::Uuid;

#[test]
fn test_attendance_percent_rounds() {
    assert_eq!(attendance_percent(0, 0), 0);
    assert_eq!(attendance_percent(1, 3), 33);
    assert_eq!(attendance_percent(2, 3), 67);
    assert_eq!(attendance_percent(5, 5), 100);
}

#[tokio::test]
async fn test_student_dashboard() {
    let mut repo = MockRepo::with_roles(&[Role::Student]);
    repo.counts = [
        (CountQuery::ActiveEnrollments { student_id: STUDENT_ID }, 3),
        (CountQuery::RegisteredEvents { user_id: STUDENT_ID }, 2),
        (CountQuery::UpcomingAssignments, 4),
        (CountQuery::AttendanceRecords { student_id: STUDENT_ID }, 8),
        (CountQuery::PresentAttendance { student_id: STUDENT_ID }, 6),
    ]
    .into_iter()
    .collect();
    repo.notices = (0..7).map(|_| Notice::default()).collect();
    repo.notices.insert(
        0,
        Notice {
            target_role: Some(Role::Faculty),
            ..Notice::default()
        },
    );
    repo.events = (0..7).map(|_| Event::default()).collect();

    let response =
        dashboard::compose_dashboard(&repo, &SessionEvents::new(), &identity(STUDENT_ID))
            .await
            .unwrap();

    assert_eq!(response.primary_role, Role::Student);
    let DashboardView::Student(view) = response.view else {
        panic!("expected the student dashboard");
    };
    assert_eq!(view.stats.enrolled_courses, 3);
    assert_eq!(view.stats.upcoming_events, 2);
    assert_eq!(view.stats.pending_assignments, 4);
    assert_eq!(view.stats.attendance_percent, 75);
    assert_eq!(view.recent_notices.len(), DASHBOARD_LIST_LIMIT as usize);
    assert!(view.recent_notices.iter().all(|n| n.target_role.is_none()));
    assert_eq!(view.upcoming_events.len(), DASHBOARD_LIST_LIMIT as usize);
}

#[tokio::test]
async fn test_faculty_dashboard_for_faculty_and_student_roles() {
    let mut repo = MockRepo::with_roles(&[Role::Student, Role::Faculty]);
    repo.counts = [
        (CountQuery::AssignedCourses { faculty_id: FACULTY_ID }, 2),
        (CountQuery::UngradedSubmissions, 11),
        (CountQuery::EventRegistrations { user_id: FACULTY_ID }, 1),
        (CountQuery::StudentsInCourses { faculty_id: FACULTY_ID }, 40),
    ]
    .into_iter()
    .collect();

    let response =
        dashboard::compose_dashboard(&repo, &SessionEvents::new(), &identity(FACULTY_ID))
            .await
            .unwrap();

    assert_eq!(response.primary_role, Role::Faculty);
    assert_eq!(response.roles, vec![Role::Faculty, Role::Student]);
    let DashboardView::Faculty(stats) = response.view else {
        panic!("expected the faculty dashboard");
    };
    assert_eq!(stats.assigned_courses, 2);
    assert_eq!(stats.pending_grading, 11);
    assert_eq!(stats.event_participation, 1);
    assert_eq!(stats.total_students, 40);
}

#[tokio::test]
async fn test_admin_dashboard() {
    let mut repo = MockRepo::with_roles(&[Role::Faculty, Role::Admin]);
    repo.counts = [
        (CountQuery::Profiles, 120),
        (CountQuery::Courses, 14),
        (CountQuery::UpcomingEvents, 3),
    ]
    .into_iter()
    .collect();

    let response = dashboard::compose_dashboard(&repo, &SessionEvents::new(), &identity(ADMIN_ID))
        .await
        .unwrap();

    assert_eq!(response.view.variant(), DashboardVariant::Admin);
    let DashboardView::Admin(stats) = response.view else {
        panic!("expected the admin dashboard");
    };
    assert_eq!(stats.total_users, 120);
    assert_eq!(stats.total_courses, 14);
    assert_eq!(stats.active_events, 3);
    assert_eq!(stats.system_health, "healthy");
}

#[tokio::test]
async fn test_no_roles_is_no_access() {
    let repo = MockRepo::with_roles(&[]);

    let result =
        dashboard::compose_dashboard(&repo, &SessionEvents::new(), &identity(Uuid::new_v4())).await;

    assert!(matches!(result, Err(AppError::NoAccess)));
}

#[tokio::test]
async fn test_storage_failure_is_not_no_access() {
    let repo = MockRepo::failing();

    let result =
        dashboard::compose_dashboard(&repo, &SessionEvents::new(), &identity(STUDENT_ID)).await;

    assert!(matches!(result, Err(AppError::LookupFailure(_))));
}

#[tokio::test]
async fn test_signed_out_identity_is_refused_before_reading() {
    let repo = MockRepo::with_roles(&[Role::Student]);
    let sessions = SessionEvents::new();
    sessions
        .publish(SessionEvent::SignedOut {
            user_id: STUDENT_ID,
        })
        .await;

    let result = dashboard::compose_dashboard(&repo, &sessions, &identity(STUDENT_ID)).await;

    assert!(matches!(result, Err(AppError::InvalidSession(_))));
    assert_eq!(repo.role_reads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_sign_out_while_loading_cancels_reads() {
    let repo = Arc::new(MockRepo::with_roles(&[Role::Student]));
    repo.hold_counts.store(true, Ordering::SeqCst);
    let sessions = SessionEvents::new();

    let task = {
        let repo = repo.clone();
        let sessions = sessions.clone();
        tokio::spawn(async move {
            dashboard::compose_dashboard(repo.as_ref(), &sessions, &identity(STUDENT_ID)).await
        })
    };

    // Reads are now in flight and will never finish on their own.
    repo.count_started.notified().await;
    sessions
        .publish(SessionEvent::SignedOut {
            user_id: STUDENT_ID,
        })
        .await;

    let result = task.await.unwrap();
    assert!(matches!(result, Err(AppError::InvalidSession(_))));
}

#[tokio::test]
async fn test_other_users_sign_out_does_not_cancel() {
    let repo = Arc::new(MockRepo::with_roles(&[Role::Admin]));
    repo.hold_counts.store(true, Ordering::SeqCst);
    let sessions = SessionEvents::new();

    let task = {
        let repo = repo.clone();
        let sessions = sessions.clone();
        tokio::spawn(async move {
            dashboard::compose_dashboard(repo.as_ref(), &sessions, &identity(ADMIN_ID)).await
        })
    };

    repo.count_started.notified().await;
    sessions
        .publish(SessionEvent::SignedOut {
            user_id: STUDENT_ID,
        })
        .await;
    // Let the held read go; the pending one resumes only after a role change.
    repo.hold_counts.store(false, Ordering::SeqCst);
    sessions
        .publish(SessionEvent::RolesChanged { user_id: ADMIN_ID })
        .await;

    let response = task.await.unwrap().unwrap();
    assert_eq!(response.primary_role, Role::Admin);
    assert_eq!(repo.role_reads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_role_change_while_loading_resolves_again() {
    let mut repo = MockRepo::with_roles(&[Role::Student]);
    repo.counts = [(CountQuery::AssignedCourses { faculty_id: STUDENT_ID }, 4)]
        .into_iter()
        .collect();
    let repo = Arc::new(repo);
    repo.hold_counts.store(true, Ordering::SeqCst);
    let sessions = SessionEvents::new();

    let task = {
        let repo = repo.clone();
        let sessions = sessions.clone();
        tokio::spawn(async move {
            dashboard::compose_dashboard(repo.as_ref(), &sessions, &identity(STUDENT_ID)).await
        })
    };

    repo.count_started.notified().await;
    repo.hold_counts.store(false, Ordering::SeqCst);
    repo.set_roles(&[Role::Faculty]);
    sessions
        .publish(SessionEvent::RolesChanged {
            user_id: STUDENT_ID,
        })
        .await;

    let response = task.await.unwrap().unwrap();
    assert_eq!(response.primary_role, Role::Faculty);
    let DashboardView::Faculty(stats) = response.view else {
        panic!("stale student dashboard served after a role change");
    };
    assert_eq!(stats.assigned_courses, 4);
    assert_eq!(repo.role_reads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_role_churn_gives_up_after_bounded_attempts() {
    let sessions = SessionEvents::new();
    let repo = MockRepo {
        churn_roles: Some(sessions.clone()),
        ..MockRepo::with_roles(&[Role::Student])
    };

    let result = dashboard::compose_dashboard(&repo, &sessions, &identity(STUDENT_ID)).await;

    assert!(matches!(result, Err(AppError::LookupFailure(_))));
    assert_eq!(
        repo.role_reads.load(Ordering::SeqCst),
        MAX_RESOLUTION_ATTEMPTS as usize
    );
}

#[test]
fn test_view_wire_format() {
    let view = DashboardView::Faculty(Default::default());
    let json = serde_json::to_value(&view).unwrap();
    assert_eq!(json["variant"], "faculty");
    assert_eq!(json["data"]["pending_grading"], 0);
}
