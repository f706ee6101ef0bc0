mod common;

use chrono::Duration;
use serde_json::{Value, json};

use classroom_assistant::classroom::{Acceptance, CommitInfo};
use classroom_assistant::db::repository;
use classroom_assistant::models::Role;
use classroom_assistant::services::reconciler::{
    StudentRepository, link_student_repositories, reconcile,
};

use common::{at, descriptor, pool, user};

fn hw1() -> Value {
    json!({
        "id": 77,
        "title": "CS101 HW1",
        "slug": "cs101-hw1",
        "description": "Linked lists",
        "deadline": "2025-11-11T22:33:00Z",
        "starter_code_repository": {
            "full_name": "org/cs101-hw1-starter",
            "html_url": "https://github.com/org/cs101-hw1-starter"
        }
    })
}

fn acceptances(values: Vec<Value>) -> Vec<Acceptance> {
    values.into_iter().map(Acceptance::from_raw).collect()
}

async fn count(pool: &sqlx::SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .expect("count")
}

#[tokio::test]
async fn test_second_identical_pass_changes_nothing() {
    let pool = pool().await;
    let teacher = user(&pool, 1, Role::Teacher, Some("prof"), Some("t0ken")).await;
    let alice = user(&pool, 2, Role::Student, Some("Alice"), None).await;
    let remote = descriptor(hw1());
    let accepted = acceptances(vec![
        json!({
            "student": { "login": "alice" },
            "repository": { "full_name": "org/cs101-hw1-alice" },
            "submitted": true
        }),
        json!({
            "student": { "login": "bob" },
            "repository": { "full_name": "org/cs101-hw1-bob" }
        }),
    ]);
    let first_now = at(2025, 11, 1, 8, 0);

    let first = reconcile(&pool, &teacher, Some("1"), Some("CS101"), &remote, &accepted, first_now)
        .await
        .expect("first pass");
    assert!(first.assignment_created);
    assert_eq!(first.submissions_created, 1);
    assert_eq!(first.unmatched, 1);
    assert_eq!(first.assignment.deadline, Some(at(2025, 11, 11, 22, 33)));
    assert_eq!(first.assignment.repo_name, "cs101-hw1");

    let stored_assignment = first.assignment.clone();
    let stored_submission = repository::find_submission(&pool, &stored_assignment.id, &alice.id)
        .await
        .expect("query")
        .expect("alice linked");
    assert!(stored_submission.is_submitted);
    assert_eq!(stored_submission.submitted_at, Some(first_now));

    let second = reconcile(
        &pool,
        &teacher,
        Some("1"),
        Some("CS101"),
        &remote,
        &accepted,
        first_now + Duration::hours(1),
    )
    .await
    .expect("second pass");

    assert!(!second.changed());
    assert_eq!(count(&pool, "assignments").await, 1);
    assert_eq!(count(&pool, "submissions").await, 1);
    assert_eq!(second.assignment.updated_at, stored_assignment.updated_at);
    let resubmission = repository::find_submission(&pool, &stored_assignment.id, &alice.id)
        .await
        .expect("query")
        .expect("still linked");
    assert_eq!(resubmission, stored_submission);
}

#[tokio::test]
async fn test_empty_remote_values_never_clear_stored_fields() {
    let pool = pool().await;
    let teacher = user(&pool, 1, Role::Teacher, Some("prof"), Some("t0ken")).await;
    let now = at(2025, 11, 1, 8, 0);

    reconcile(&pool, &teacher, Some("1"), None, &descriptor(hw1()), &[], now)
        .await
        .expect("seed");

    let sparse = descriptor(json!({ "id": "77", "title": "CS101 HW1", "slug": "cs101-hw1", "description": "" }));
    let outcome = reconcile(&pool, &teacher, Some("1"), None, &sparse, &[], now + Duration::hours(1))
        .await
        .expect("sparse pass");

    assert!(!outcome.changed());
    assert_eq!(
        outcome.assignment.repo_url.as_deref(),
        Some("https://github.com/org/cs101-hw1-starter")
    );
    assert_eq!(outcome.assignment.description.as_deref(), Some("Linked lists"));
    assert_eq!(outcome.assignment.deadline, Some(at(2025, 11, 11, 22, 33)));
}

#[tokio::test]
async fn test_changed_remote_value_is_applied_and_stamped() {
    let pool = pool().await;
    let teacher = user(&pool, 1, Role::Teacher, Some("prof"), Some("t0ken")).await;
    let now = at(2025, 11, 1, 8, 0);

    reconcile(&pool, &teacher, Some("1"), None, &descriptor(hw1()), &[], now)
        .await
        .expect("seed");

    let mut moved = hw1();
    moved["deadline"] = json!("Nov 18, 2025, 22:33 UTC");
    let later = now + Duration::hours(2);
    let outcome = reconcile(&pool, &teacher, Some("1"), None, &descriptor(moved), &[], later)
        .await
        .expect("update");

    assert!(outcome.assignment_updated);
    assert_eq!(outcome.assignment.deadline, Some(at(2025, 11, 18, 22, 33)));
    assert_eq!(outcome.assignment.updated_at, later);
    assert_eq!(count(&pool, "assignments").await, 1);
}

#[tokio::test]
async fn test_assignment_without_external_id_dedups_by_classroom_and_name() {
    let pool = pool().await;
    let teacher = user(&pool, 1, Role::Teacher, Some("prof"), Some("t0ken")).await;
    let now = at(2025, 11, 1, 8, 0);
    let remote = descriptor(json!({ "title": "Essay" }));

    reconcile(&pool, &teacher, Some("1"), None, &remote, &[], now).await.expect("first");
    reconcile(&pool, &teacher, Some("1"), None, &remote, &[], now).await.expect("second");
    reconcile(&pool, &teacher, Some("2"), None, &remote, &[], now).await.expect("other classroom");

    assert_eq!(count(&pool, "assignments").await, 2);
}

#[tokio::test]
async fn test_submission_is_stamped_once_on_submit_transition() {
    let pool = pool().await;
    let teacher = user(&pool, 1, Role::Teacher, Some("prof"), Some("t0ken")).await;
    let alice = user(&pool, 2, Role::Student, Some("alice"), None).await;
    let remote = descriptor(hw1());
    let now = at(2025, 11, 1, 8, 0);

    let pending = acceptances(vec![json!({ "student": { "login": "alice" }, "submitted": false })]);
    let outcome = reconcile(&pool, &teacher, None, None, &remote, &pending, now)
        .await
        .expect("pending");
    let assignment_id = outcome.assignment.id.clone();

    let submitted = acceptances(vec![json!({ "student": { "login": "alice" }, "submitted": true })]);
    let turned_in = now + Duration::hours(5);
    let outcome = reconcile(&pool, &teacher, None, None, &remote, &submitted, turned_in)
        .await
        .expect("submitted");
    assert_eq!(outcome.submissions_updated, 1);

    let outcome = reconcile(&pool, &teacher, None, None, &remote, &submitted, turned_in + Duration::hours(1))
        .await
        .expect("repeat");
    assert!(!outcome.changed());

    let submission = repository::find_submission(&pool, &assignment_id, &alice.id)
        .await
        .expect("query")
        .expect("submission");
    assert!(submission.is_submitted);
    assert_eq!(submission.submitted_at, Some(turned_in));
    assert_eq!(submission.updated_at, turned_in);
}

#[tokio::test]
async fn test_duplicate_acceptances_keep_one_submission_per_pair() {
    let pool = pool().await;
    let teacher = user(&pool, 1, Role::Teacher, Some("prof"), Some("t0ken")).await;
    user(&pool, 2, Role::Student, Some("alice"), None).await;
    let remote = descriptor(hw1());
    let now = at(2025, 11, 1, 8, 0);

    let doubled = acceptances(vec![
        json!({ "student": { "login": "alice" }, "repository": { "full_name": "org/cs101-hw1-alice" } }),
        json!({ "login": "ALICE", "repository": { "full_name": "org/cs101-hw1-alice" } }),
    ]);
    let outcome = reconcile(&pool, &teacher, None, None, &remote, &doubled, now)
        .await
        .expect("reconcile");

    assert_eq!(outcome.submissions_created, 1);
    assert_eq!(outcome.submissions_updated, 0);
    assert_eq!(count(&pool, "submissions").await, 1);
}

#[tokio::test]
async fn test_student_repositories_link_to_assignments() {
    let pool = pool().await;
    let teacher = user(&pool, 1, Role::Teacher, Some("prof"), Some("t0ken")).await;
    let alice = user(&pool, 2, Role::Student, Some("alice"), Some("s3cret")).await;
    let now = at(2025, 11, 1, 8, 0);
    let outcome = reconcile(&pool, &teacher, None, None, &descriptor(hw1()), &[], now)
        .await
        .expect("assignment");

    let repos = vec![
        StudentRepository {
            full_name: "alice/cs101-hw1-alice".to_string(),
            html_url: None,
            latest_commit: Some(CommitInfo {
                sha: "abc123".to_string(),
                message: "done".to_string(),
                author: "Alice".to_string(),
                date: Some(at(2025, 11, 2, 9, 0)),
                url: None,
            }),
        },
        StudentRepository {
            full_name: "alice/dotfiles".to_string(),
            html_url: None,
            latest_commit: None,
        },
    ];

    let linked = link_student_repositories(&pool, &alice, &repos, now).await.expect("link");
    assert_eq!(linked.created, 1);
    let again = link_student_repositories(&pool, &alice, &repos, now + Duration::hours(1))
        .await
        .expect("relink");
    assert_eq!(again.created + again.updated, 0);

    let submission = repository::find_submission(&pool, &outcome.assignment.id, &alice.id)
        .await
        .expect("query")
        .expect("linked");
    assert_eq!(
        submission.repo_url.as_deref(),
        Some("https://github.com/alice/cs101-hw1-alice")
    );
    assert_eq!(submission.last_commit_sha.as_deref(), Some("abc123"));
    assert!(!submission.is_submitted);
}
