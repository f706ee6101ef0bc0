use chrono::{NaiveDateTime, Utc};
use sqlx::{Executor, FromRow, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::models::{
    AppSettings, Assignment, ChatIdentity, NewAssignment, Notification, NotifySettings, Role,
    Submission, TrackedRepository, User,
};

const USER_COLUMNS: &str = "id, chat_id, username, first_name, last_name, role, github_username, \
    github_token, notify_threshold_hours, notify_period_seconds, created_at";

const ASSIGNMENT_COLUMNS: &str = "id, user_id, name, description, repo_name, repo_url, deadline, \
    classroom_id, classroom_assignment_id, note, created_at, updated_at";

const SUBMISSION_COLUMNS: &str = "id, assignment_id, user_id, repo_url, last_commit_sha, \
    last_commit_date, is_submitted, submitted_at, created_at, updated_at";

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

// ---------------------------------------------------------------------------
// users
// ---------------------------------------------------------------------------

/// Creates the user on first contact; refreshes the chat profile fields afterwards.
pub async fn upsert_chat_user<'e, E>(db: E, identity: &ChatIdentity) -> Result<User, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        r#"
        INSERT INTO users (id, chat_id, username, first_name, last_name, role, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, 'student', ?6)
        ON CONFLICT (chat_id) DO UPDATE SET
            username = COALESCE(excluded.username, users.username),
            first_name = COALESCE(excluded.first_name, users.first_name),
            last_name = COALESCE(excluded.last_name, users.last_name)
        RETURNING {USER_COLUMNS}
        "#
    );
    sqlx::query_as::<_, User>(&sql)
        .bind(Uuid::new_v4().to_string())
        .bind(identity.chat_id)
        .bind(&identity.username)
        .bind(&identity.first_name)
        .bind(&identity.last_name)
        .bind(now())
        .fetch_one(db)
        .await
}

pub async fn find_user_by_chat_id<'e, E>(db: E, chat_id: i64) -> Result<Option<User>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE chat_id = ?");
    sqlx::query_as::<_, User>(&sql)
        .bind(chat_id)
        .fetch_optional(db)
        .await
}

pub async fn find_user_by_id<'e, E>(db: E, id: &str) -> Result<Option<User>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
    sqlx::query_as::<_, User>(&sql)
        .bind(id)
        .fetch_optional(db)
        .await
}

/// Case-insensitive match on the external-service login. Oldest account wins on duplicates.
pub async fn find_user_by_github_login<'e, E>(
    db: E,
    login: &str,
) -> Result<Option<User>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "SELECT {USER_COLUMNS} FROM users \
         WHERE github_username IS NOT NULL AND lower(github_username) = lower(?) \
         ORDER BY created_at ASC LIMIT 1"
    );
    sqlx::query_as::<_, User>(&sql)
        .bind(login.trim())
        .fetch_optional(db)
        .await
}

pub async fn fetch_users(db: &SqlitePool) -> Result<Vec<User>, sqlx::Error> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC");
    sqlx::query_as::<_, User>(&sql).fetch_all(db).await
}

pub async fn set_github_credentials(
    db: &SqlitePool,
    user_id: &str,
    token: &str,
    login: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE users SET github_token = ?1, github_username = ?2 WHERE id = ?3")
        .bind(token)
        .bind(login)
        .bind(user_id)
        .execute(db)
        .await?
        .rows_affected();
    Ok(result > 0)
}

pub async fn set_github_username(
    db: &SqlitePool,
    user_id: &str,
    login: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE users SET github_username = ?1 WHERE id = ?2")
        .bind(login)
        .bind(user_id)
        .execute(db)
        .await?
        .rows_affected();
    Ok(result > 0)
}

pub async fn set_role(db: &SqlitePool, user_id: &str, role: Role) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE users SET role = ?1 WHERE id = ?2")
        .bind(role)
        .bind(user_id)
        .execute(db)
        .await?
        .rows_affected();
    Ok(result > 0)
}

pub async fn set_notify_overrides(
    db: &SqlitePool,
    user_id: &str,
    threshold_hours: Option<i64>,
    period_seconds: Option<i64>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE users SET notify_threshold_hours = ?1, notify_period_seconds = ?2 WHERE id = ?3",
    )
    .bind(threshold_hours)
    .bind(period_seconds)
    .bind(user_id)
    .execute(db)
    .await?
    .rows_affected();
    Ok(result > 0)
}

// ---------------------------------------------------------------------------
// assignments
// ---------------------------------------------------------------------------

pub async fn insert_assignment<'e, E>(
    db: E,
    req: &NewAssignment,
    at: NaiveDateTime,
) -> Result<Assignment, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        r#"
        INSERT INTO assignments
            (id, user_id, name, description, repo_name, repo_url, deadline,
            classroom_id, classroom_assignment_id, note, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL, ?10, ?10)
        RETURNING {ASSIGNMENT_COLUMNS}
        "#
    );
    sqlx::query_as::<_, Assignment>(&sql)
        .bind(Uuid::new_v4().to_string())
        .bind(&req.user_id)
        .bind(&req.name)
        .bind(&req.description)
        .bind(&req.repo_name)
        .bind(&req.repo_url)
        .bind(req.deadline)
        .bind(&req.classroom_id)
        .bind(&req.classroom_assignment_id)
        .bind(at)
        .fetch_one(db)
        .await
}

/// Writes every mutable column of `assignment` back to its row.
pub async fn update_assignment<'e, E>(db: E, assignment: &Assignment) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        UPDATE assignments
        SET name = ?1,
            description = ?2,
            repo_name = ?3,
            repo_url = ?4,
            deadline = ?5,
            classroom_id = ?6,
            classroom_assignment_id = ?7,
            note = ?8,
            updated_at = ?9
        WHERE id = ?10
        "#,
    )
    .bind(&assignment.name)
    .bind(&assignment.description)
    .bind(&assignment.repo_name)
    .bind(&assignment.repo_url)
    .bind(assignment.deadline)
    .bind(&assignment.classroom_id)
    .bind(&assignment.classroom_assignment_id)
    .bind(&assignment.note)
    .bind(assignment.updated_at)
    .bind(&assignment.id)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn find_assignment_by_external_id<'e, E>(
    db: E,
    owner_id: &str,
    classroom_assignment_id: &str,
) -> Result<Option<Assignment>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "SELECT {ASSIGNMENT_COLUMNS} FROM assignments \
         WHERE user_id = ?1 AND classroom_assignment_id = ?2 \
         ORDER BY created_at ASC LIMIT 1"
    );
    sqlx::query_as::<_, Assignment>(&sql)
        .bind(owner_id)
        .bind(classroom_assignment_id)
        .fetch_optional(db)
        .await
}

pub async fn find_assignment_by_classroom_and_name<'e, E>(
    db: E,
    owner_id: &str,
    classroom_id: Option<&str>,
    name: &str,
) -> Result<Option<Assignment>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "SELECT {ASSIGNMENT_COLUMNS} FROM assignments \
         WHERE user_id = ?1 AND classroom_id IS ?2 AND name = ?3 \
         ORDER BY created_at ASC LIMIT 1"
    );
    sqlx::query_as::<_, Assignment>(&sql)
        .bind(owner_id)
        .bind(classroom_id)
        .bind(name)
        .fetch_optional(db)
        .await
}

/// Exact (case-insensitive) name match first, then the first substring match.
pub async fn find_owned_assignment_by_name(
    db: &SqlitePool,
    owner_id: &str,
    name: &str,
) -> Result<Option<Assignment>, sqlx::Error> {
    let exact_sql = format!(
        "SELECT {ASSIGNMENT_COLUMNS} FROM assignments \
         WHERE user_id = ?1 AND lower(name) = lower(?2) \
         ORDER BY created_at ASC LIMIT 1"
    );
    let exact = sqlx::query_as::<_, Assignment>(&exact_sql)
        .bind(owner_id)
        .bind(name.trim())
        .fetch_optional(db)
        .await?;
    if exact.is_some() {
        return Ok(exact);
    }

    let fuzzy_sql = format!(
        "SELECT {ASSIGNMENT_COLUMNS} FROM assignments \
         WHERE user_id = ?1 AND instr(lower(name), lower(?2)) > 0 \
         ORDER BY created_at ASC LIMIT 1"
    );
    sqlx::query_as::<_, Assignment>(&fuzzy_sql)
        .bind(owner_id)
        .bind(name.trim())
        .fetch_optional(db)
        .await
}

pub async fn fetch_owned_assignments<'e, E>(
    db: E,
    owner_id: &str,
) -> Result<Vec<Assignment>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE user_id = ? ORDER BY created_at ASC"
    );
    sqlx::query_as::<_, Assignment>(&sql)
        .bind(owner_id)
        .fetch_all(db)
        .await
}

/// Assignments the user is attached to through a Submission row.
pub async fn fetch_linked_assignments<'e, E>(
    db: E,
    user_id: &str,
) -> Result<Vec<Assignment>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "SELECT {ASSIGNMENT_COLUMNS} FROM assignments \
         WHERE id IN (SELECT assignment_id FROM submissions WHERE user_id = ?) \
         ORDER BY created_at ASC"
    );
    sqlx::query_as::<_, Assignment>(&sql)
        .bind(user_id)
        .fetch_all(db)
        .await
}

/// Owned and submission-linked assignments with a deadline, without duplicates.
pub async fn fetch_reminder_candidates<'e, E>(
    db: E,
    user_id: &str,
) -> Result<Vec<Assignment>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "SELECT {ASSIGNMENT_COLUMNS} FROM assignments \
         WHERE deadline IS NOT NULL \
           AND (user_id = ?1 OR id IN (SELECT assignment_id FROM submissions WHERE user_id = ?1)) \
         ORDER BY deadline ASC"
    );
    sqlx::query_as::<_, Assignment>(&sql)
        .bind(user_id)
        .fetch_all(db)
        .await
}

pub async fn fetch_assignments_by_external_id<'e, E>(
    db: E,
    classroom_assignment_id: &str,
) -> Result<Vec<Assignment>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "SELECT {ASSIGNMENT_COLUMNS} FROM assignments \
         WHERE classroom_assignment_id = ? ORDER BY created_at ASC"
    );
    sqlx::query_as::<_, Assignment>(&sql)
        .bind(classroom_assignment_id)
        .fetch_all(db)
        .await
}

pub async fn fetch_all_assignments<'e, E>(db: E) -> Result<Vec<Assignment>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT {ASSIGNMENT_COLUMNS} FROM assignments ORDER BY created_at ASC");
    sqlx::query_as::<_, Assignment>(&sql).fetch_all(db).await
}

pub async fn set_assignment_note(
    db: &SqlitePool,
    assignment_id: &str,
    note: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE assignments SET note = ?1, updated_at = ?2 WHERE id = ?3")
        .bind(note)
        .bind(now())
        .bind(assignment_id)
        .execute(db)
        .await?
        .rows_affected();
    Ok(result > 0)
}

/// Deletes the assignment together with its submissions and reminder history.
pub async fn delete_assignment(db: &SqlitePool, assignment_id: &str) -> Result<bool, sqlx::Error> {
    let mut tx = db.begin().await?;

    sqlx::query("DELETE FROM notifications WHERE assignment_id = ?")
        .bind(assignment_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM submissions WHERE assignment_id = ?")
        .bind(assignment_id)
        .execute(&mut *tx)
        .await?;
    let removed = sqlx::query("DELETE FROM assignments WHERE id = ?")
        .bind(assignment_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    tx.commit().await?;
    Ok(removed > 0)
}

// ---------------------------------------------------------------------------
// submissions
// ---------------------------------------------------------------------------

pub async fn find_submission<'e, E>(
    db: E,
    assignment_id: &str,
    user_id: &str,
) -> Result<Option<Submission>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE assignment_id = ?1 AND user_id = ?2"
    );
    sqlx::query_as::<_, Submission>(&sql)
        .bind(assignment_id)
        .bind(user_id)
        .fetch_optional(db)
        .await
}

pub async fn insert_submission<'e, E>(db: E, submission: &Submission) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO submissions
            (id, assignment_id, user_id, repo_url, last_commit_sha, last_commit_date,
            is_submitted, submitted_at, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(&submission.id)
    .bind(&submission.assignment_id)
    .bind(&submission.user_id)
    .bind(&submission.repo_url)
    .bind(&submission.last_commit_sha)
    .bind(submission.last_commit_date)
    .bind(submission.is_submitted)
    .bind(submission.submitted_at)
    .bind(submission.created_at)
    .bind(submission.updated_at)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn update_submission<'e, E>(db: E, submission: &Submission) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        UPDATE submissions
        SET repo_url = ?1,
            last_commit_sha = ?2,
            last_commit_date = ?3,
            is_submitted = ?4,
            submitted_at = ?5,
            updated_at = ?6
        WHERE id = ?7
        "#,
    )
    .bind(&submission.repo_url)
    .bind(&submission.last_commit_sha)
    .bind(submission.last_commit_date)
    .bind(submission.is_submitted)
    .bind(submission.submitted_at)
    .bind(submission.updated_at)
    .bind(&submission.id)
    .execute(db)
    .await?;
    Ok(())
}

pub async fn fetch_user_submissions<'e, E>(
    db: E,
    user_id: &str,
) -> Result<Vec<Submission>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE user_id = ? ORDER BY created_at ASC"
    );
    sqlx::query_as::<_, Submission>(&sql)
        .bind(user_id)
        .fetch_all(db)
        .await
}

/// A submission joined with the names a human needs to read it.
#[derive(Debug, Clone, FromRow)]
pub struct SubmissionRow {
    pub id: String,
    pub assignment_name: String,
    pub student_login: Option<String>,
    pub student_chat_id: i64,
    pub repo_url: Option<String>,
    pub last_commit_sha: Option<String>,
    pub last_commit_date: Option<NaiveDateTime>,
    pub is_submitted: bool,
    pub submitted_at: Option<NaiveDateTime>,
    pub updated_at: NaiveDateTime,
}

const SUBMISSION_ROW_SELECT: &str = "SELECT s.id, a.name AS assignment_name, \
    u.github_username AS student_login, u.chat_id AS student_chat_id, s.repo_url, \
    s.last_commit_sha, s.last_commit_date, s.is_submitted, s.submitted_at, s.updated_at \
    FROM submissions s \
    JOIN assignments a ON a.id = s.assignment_id \
    JOIN users u ON u.id = s.user_id";

/// Submissions on assignments owned by `owner_id`.
pub async fn fetch_submission_rows_for_owner(
    db: &SqlitePool,
    owner_id: &str,
) -> Result<Vec<SubmissionRow>, sqlx::Error> {
    let sql = format!("{SUBMISSION_ROW_SELECT} WHERE a.user_id = ? ORDER BY a.name, u.github_username");
    sqlx::query_as::<_, SubmissionRow>(&sql)
        .bind(owner_id)
        .fetch_all(db)
        .await
}

/// Submissions belonging to `user_id` as a student.
pub async fn fetch_submission_rows_for_student(
    db: &SqlitePool,
    user_id: &str,
) -> Result<Vec<SubmissionRow>, sqlx::Error> {
    let sql = format!("{SUBMISSION_ROW_SELECT} WHERE s.user_id = ? ORDER BY a.name");
    sqlx::query_as::<_, SubmissionRow>(&sql)
        .bind(user_id)
        .fetch_all(db)
        .await
}

// ---------------------------------------------------------------------------
// tracked repositories
// ---------------------------------------------------------------------------

/// Returns `false` when the pair was already tracked.
pub async fn add_tracked_repository(
    db: &SqlitePool,
    user_id: &str,
    repo_full_name: &str,
    repo_url: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO tracked_repositories (id, user_id, repo_full_name, repo_url, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT (user_id, repo_full_name) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(repo_full_name)
    .bind(repo_url)
    .bind(now())
    .execute(db)
    .await?
    .rows_affected();
    Ok(result > 0)
}

pub async fn remove_tracked_repository(
    db: &SqlitePool,
    user_id: &str,
    repo_full_name: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "DELETE FROM tracked_repositories WHERE user_id = ?1 AND lower(repo_full_name) = lower(?2)",
    )
    .bind(user_id)
    .bind(repo_full_name)
    .execute(db)
    .await?
    .rows_affected();
    Ok(result > 0)
}

pub async fn fetch_tracked_repositories(
    db: &SqlitePool,
    user_id: &str,
) -> Result<Vec<TrackedRepository>, sqlx::Error> {
    sqlx::query_as::<_, TrackedRepository>(
        "SELECT id, user_id, repo_full_name, repo_url, created_at FROM tracked_repositories \
         WHERE user_id = ? ORDER BY repo_full_name",
    )
    .bind(user_id)
    .fetch_all(db)
    .await
}

// ---------------------------------------------------------------------------
// notifications
// ---------------------------------------------------------------------------

pub async fn last_notification_sent_at<'e, E>(
    db: E,
    user_id: &str,
    assignment_id: &str,
    notification_type: &str,
) -> Result<Option<NaiveDateTime>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar::<_, NaiveDateTime>(
        "SELECT sent_at FROM notifications \
         WHERE user_id = ?1 AND assignment_id = ?2 AND notification_type = ?3 \
         ORDER BY sent_at DESC LIMIT 1",
    )
    .bind(user_id)
    .bind(assignment_id)
    .bind(notification_type)
    .fetch_optional(db)
    .await
}

pub async fn insert_notification<'e, E>(
    db: E,
    user_id: &str,
    assignment_id: &str,
    notification_type: &str,
    message: &str,
    sent_at: NaiveDateTime,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO notifications (id, user_id, assignment_id, notification_type, message, sent_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(assignment_id)
    .bind(notification_type)
    .bind(message)
    .bind(sent_at)
    .execute(db)
    .await?;
    Ok(())
}

/// Reminder history of one user, newest first.
pub async fn fetch_notifications(
    db: &SqlitePool,
    user_id: &str,
) -> Result<Vec<Notification>, sqlx::Error> {
    sqlx::query_as::<_, Notification>(
        "SELECT id, user_id, assignment_id, notification_type, message, sent_at \
         FROM notifications WHERE user_id = ? ORDER BY sent_at DESC",
    )
    .bind(user_id)
    .fetch_all(db)
    .await
}

// ---------------------------------------------------------------------------
// settings
// ---------------------------------------------------------------------------

/// Reads the global settings row, seeding it from `defaults` on first use.
pub async fn get_or_create_settings(
    db: &SqlitePool,
    defaults: NotifySettings,
) -> Result<AppSettings, sqlx::Error> {
    sqlx::query(
        "INSERT OR IGNORE INTO app_settings (id, notify_threshold_hours, notify_period_seconds, updated_at) \
         VALUES (1, ?1, ?2, ?3)",
    )
    .bind(defaults.threshold_hours)
    .bind(defaults.period_seconds)
    .bind(now())
    .execute(db)
    .await?;

    sqlx::query_as::<_, AppSettings>(
        "SELECT id, notify_threshold_hours, notify_period_seconds, updated_at FROM app_settings WHERE id = 1",
    )
    .fetch_one(db)
    .await
}

pub async fn update_settings(
    db: &SqlitePool,
    settings: NotifySettings,
) -> Result<AppSettings, sqlx::Error> {
    sqlx::query_as::<_, AppSettings>(
        r#"
        INSERT INTO app_settings (id, notify_threshold_hours, notify_period_seconds, updated_at)
        VALUES (1, ?1, ?2, ?3)
        ON CONFLICT (id) DO UPDATE SET
            notify_threshold_hours = excluded.notify_threshold_hours,
            notify_period_seconds = excluded.notify_period_seconds,
            updated_at = excluded.updated_at
        RETURNING id, notify_threshold_hours, notify_period_seconds, updated_at
        "#,
    )
    .bind(settings.threshold_hours)
    .bind(settings.period_seconds)
    .bind(now())
    .fetch_one(db)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;

    fn identity(chat_id: i64, username: &str) -> ChatIdentity {
        ChatIdentity {
            chat_id,
            username: Some(username.to_string()),
            first_name: None,
            last_name: None,
        }
    }

    fn manual_assignment(owner: &str, name: &str) -> NewAssignment {
        NewAssignment {
            user_id: owner.to_string(),
            name: name.to_string(),
            description: None,
            repo_name: "org/repo".to_string(),
            repo_url: Some("https://github.com/org/repo".to_string()),
            deadline: None,
            classroom_id: None,
            classroom_assignment_id: None,
        }
    }

    #[tokio::test]
    async fn test_upsert_chat_user_is_keyed_by_chat_id() {
        let pool = connect_in_memory().await.expect("db");

        let first = upsert_chat_user(&pool, &identity(42, "alice")).await.expect("insert");
        assert_eq!(first.role, Role::Student);

        let again = upsert_chat_user(&pool, &identity(42, "alice_renamed"))
            .await
            .expect("upsert");
        assert_eq!(again.id, first.id);
        assert_eq!(again.username.as_deref(), Some("alice_renamed"));
        assert_eq!(fetch_users(&pool).await.expect("users").len(), 1);
    }

    #[tokio::test]
    async fn test_github_login_lookup_ignores_case() {
        let pool = connect_in_memory().await.expect("db");
        let user = upsert_chat_user(&pool, &identity(7, "bob")).await.expect("user");
        set_github_username(&pool, &user.id, "BobTheBuilder").await.expect("set");

        let found = find_user_by_github_login(&pool, "bobthebuilder")
            .await
            .expect("query")
            .expect("match");
        assert_eq!(found.id, user.id);
        assert!(find_user_by_github_login(&pool, "bob").await.expect("query").is_none());
    }

    #[tokio::test]
    async fn test_delete_assignment_cascades_to_submissions() {
        let pool = connect_in_memory().await.expect("db");
        let teacher = upsert_chat_user(&pool, &identity(1, "t")).await.expect("teacher");
        let student = upsert_chat_user(&pool, &identity(2, "s")).await.expect("student");
        let at = now();
        let assignment = insert_assignment(&pool, &manual_assignment(&teacher.id, "HW 1"), at)
            .await
            .expect("assignment");

        insert_submission(
            &pool,
            &Submission {
                id: Uuid::new_v4().to_string(),
                assignment_id: assignment.id.clone(),
                user_id: student.id.clone(),
                repo_url: None,
                last_commit_sha: None,
                last_commit_date: None,
                is_submitted: false,
                submitted_at: None,
                created_at: at,
                updated_at: at,
            },
        )
        .await
        .expect("submission");
        insert_notification(&pool, &student.id, &assignment.id, "deadline_warning", "hi", at)
            .await
            .expect("notification");

        assert!(delete_assignment(&pool, &assignment.id).await.expect("delete"));
        assert!(fetch_user_submissions(&pool, &student.id).await.expect("subs").is_empty());
        assert!(!delete_assignment(&pool, &assignment.id).await.expect("delete twice"));
    }

    #[tokio::test]
    async fn test_user_owning_assignment_cannot_be_deleted() {
        let pool = connect_in_memory().await.expect("db");
        let teacher = upsert_chat_user(&pool, &identity(1, "t")).await.expect("teacher");
        insert_assignment(&pool, &manual_assignment(&teacher.id, "HW 1"), now())
            .await
            .expect("assignment");

        let deleted = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(&teacher.id)
            .execute(&pool)
            .await;
        assert!(deleted.is_err());
        assert_eq!(
            fetch_owned_assignments(&pool, &teacher.id).await.expect("list").len(),
            1
        );
    }

    #[tokio::test]
    async fn test_find_owned_assignment_prefers_exact_name() {
        let pool = connect_in_memory().await.expect("db");
        let teacher = upsert_chat_user(&pool, &identity(1, "t")).await.expect("teacher");
        let at = now();
        insert_assignment(&pool, &manual_assignment(&teacher.id, "Homework 10"), at)
            .await
            .expect("hw10");
        let hw1 = insert_assignment(&pool, &manual_assignment(&teacher.id, "Homework 1"), at)
            .await
            .expect("hw1");

        let found = find_owned_assignment_by_name(&pool, &teacher.id, "homework 1")
            .await
            .expect("query")
            .expect("match");
        assert_eq!(found.id, hw1.id);

        let fuzzy = find_owned_assignment_by_name(&pool, &teacher.id, "work 10")
            .await
            .expect("query")
            .expect("match");
        assert_eq!(fuzzy.name, "Homework 10");
    }

    #[tokio::test]
    async fn test_tracked_repository_pair_is_unique() {
        let pool = connect_in_memory().await.expect("db");
        let user = upsert_chat_user(&pool, &identity(3, "c")).await.expect("user");

        assert!(add_tracked_repository(&pool, &user.id, "org/app", None).await.expect("add"));
        assert!(!add_tracked_repository(&pool, &user.id, "org/app", None).await.expect("dup"));
        assert_eq!(fetch_tracked_repositories(&pool, &user.id).await.expect("list").len(), 1);
        assert!(remove_tracked_repository(&pool, &user.id, "ORG/app").await.expect("remove"));
        assert!(fetch_tracked_repositories(&pool, &user.id).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn test_settings_are_seeded_once() {
        let pool = connect_in_memory().await.expect("db");
        let defaults = NotifySettings { threshold_hours: 24, period_seconds: 3600 };

        let seeded = get_or_create_settings(&pool, defaults).await.expect("seed");
        assert_eq!(seeded.notify_threshold_hours, 24);

        update_settings(&pool, NotifySettings { threshold_hours: 48, period_seconds: 600 })
            .await
            .expect("update");
        let reread = get_or_create_settings(&pool, defaults).await.expect("reread");
        assert_eq!(reread.notify_threshold_hours, 48);
        assert_eq!(reread.notify_period_seconds, 600);
    }
}
